use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream feed endpoints and polling behavior
    #[serde(default)]
    pub feed: FeedConfig,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
}

/// Configuration for the live vehicle feed poller
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// URL returning the live vehicle position document
    #[serde(default = "FeedConfig::default_vehicles_url")]
    pub vehicles_url: String,
    /// URL returning the route reference table
    #[serde(default = "FeedConfig::default_routes_url")]
    pub routes_url: String,
    /// Optional API key appended to both requests as a query parameter
    #[serde(default)]
    pub api_key: Option<String>,
    /// Interval in seconds between poll cycles (default: 10)
    #[serde(default = "FeedConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Age in milliseconds after which a vehicle report counts as stale (default: 300000)
    #[serde(default = "FeedConfig::default_stale_threshold_ms")]
    pub stale_threshold_ms: i64,
    /// Maximum number of trail positions kept per vehicle (default: 20)
    #[serde(default = "FeedConfig::default_trail_cap")]
    pub trail_cap: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            vehicles_url: Self::default_vehicles_url(),
            routes_url: Self::default_routes_url(),
            api_key: None,
            poll_interval_secs: Self::default_poll_interval_secs(),
            stale_threshold_ms: Self::default_stale_threshold_ms(),
            trail_cap: Self::default_trail_cap(),
        }
    }
}

impl FeedConfig {
    fn default_vehicles_url() -> String {
        "https://api.example-transit.com/gtfs-rt/vehicle-positions.json".to_string()
    }
    fn default_routes_url() -> String {
        "https://api.example-transit.com/gtfs-static/routes.json".to_string()
    }
    fn default_poll_interval_secs() -> u64 {
        10
    }
    fn default_stale_threshold_ms() -> i64 {
        300_000
    }
    fn default_trail_cap() -> usize {
        20
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config: Config = serde_yaml::from_str("cors_permissive: true").unwrap();
        assert!(config.cors_permissive);
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.feed.poll_interval_secs, 10);
        assert_eq!(config.feed.stale_threshold_ms, 300_000);
        assert_eq!(config.feed.trail_cap, 20);
        assert!(config.feed.api_key.is_none());
    }

    #[test]
    fn test_feed_overrides() {
        let yaml = r#"
feed:
  vehicles_url: "http://localhost:9000/vehicles"
  routes_url: "http://localhost:9000/routes"
  api_key: "secret"
  poll_interval_secs: 15
  stale_threshold_ms: 120000
  trail_cap: 5
cors_origins:
  - "https://ops.example.com"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.feed.vehicles_url, "http://localhost:9000/vehicles");
        assert_eq!(config.feed.api_key.as_deref(), Some("secret"));
        assert_eq!(config.feed.poll_interval_secs, 15);
        assert_eq!(config.feed.stale_threshold_ms, 120_000);
        assert_eq!(config.feed.trail_cap, 5);
        assert_eq!(config.cors_origins.len(), 1);
        assert!(!config.cors_permissive);
    }
}

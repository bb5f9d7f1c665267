use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::FeedConfig;
use crate::sync::types::FeedRequestLog;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
}

/// HTTP client for the live vehicle feed and the route reference table.
///
/// Both documents are plain JSON GETs against configured URLs. Every request
/// emits a diagnostics record on the broadcast channel regardless of outcome,
/// for the ops diagnostics stream.
pub struct FeedClient {
    client: Client,
    vehicles_url: String,
    routes_url: String,
    api_key: Option<String>,
    diagnostics_tx: broadcast::Sender<FeedRequestLog>,
}

impl FeedClient {
    pub fn new(
        config: &FeedConfig,
        diagnostics_tx: broadcast::Sender<FeedRequestLog>,
    ) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FeedError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            vehicles_url: config.vehicles_url.clone(),
            routes_url: config.routes_url.clone(),
            api_key: config.api_key.clone(),
            diagnostics_tx,
        })
    }

    /// Send a diagnostics log entry
    fn log_request(&self, log: FeedRequestLog) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.diagnostics_tx.send(log);
    }

    fn request_url(&self, base: &str) -> String {
        match &self.api_key {
            Some(key) => {
                let separator = if base.contains('?') { '&' } else { '?' };
                format!("{}{}apiKey={}", base, separator, urlencoding::encode(key))
            }
            None => base.to_string(),
        }
    }

    /// Fetch the live vehicle position document.
    pub async fn fetch_vehicle_feed(&self) -> Result<Value, FeedError> {
        self.get_document(&self.vehicles_url, "vehicle-positions")
            .await
    }

    /// Fetch the route reference table.
    pub async fn fetch_route_table(&self) -> Result<Value, FeedError> {
        self.get_document(&self.routes_url, "route-table").await
    }

    /// GET a JSON document, logging the request on every exit path.
    async fn get_document(&self, base_url: &str, endpoint: &str) -> Result<Value, FeedError> {
        let start = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let url = self.request_url(base_url);

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.log_request(FeedRequestLog {
                    id: request_id,
                    timestamp: Utc::now().to_rfc3339(),
                    endpoint: endpoint.to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    status: 0,
                    response_size: None,
                    error: Some(e.to_string()),
                });
                return Err(FeedError::NetworkError(e.to_string()));
            }
        };

        let status = response.status().as_u16();

        if !response.status().is_success() {
            self.log_request(FeedRequestLog {
                id: request_id,
                timestamp: Utc::now().to_rfc3339(),
                endpoint: endpoint.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
                status,
                response_size: None,
                error: Some(format!("HTTP error: {}", status)),
            });
            return Err(FeedError::ApiError(format!("HTTP error: {}", status)));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                self.log_request(FeedRequestLog {
                    id: request_id,
                    timestamp: Utc::now().to_rfc3339(),
                    endpoint: endpoint.to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    status,
                    response_size: None,
                    error: Some(format!("Failed to read body: {}", e)),
                });
                return Err(FeedError::NetworkError(e.to_string()));
            }
        };

        let response_size = body.len();
        let result: Result<Value, _> = serde_json::from_str(&body);

        match &result {
            Ok(_) => {
                self.log_request(FeedRequestLog {
                    id: request_id,
                    timestamp: Utc::now().to_rfc3339(),
                    endpoint: endpoint.to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    status,
                    response_size: Some(response_size),
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {} response: {} - body: {}",
                    endpoint,
                    e,
                    &body[..body.len().min(500)]
                );
                self.log_request(FeedRequestLog {
                    id: request_id,
                    timestamp: Utc::now().to_rfc3339(),
                    endpoint: endpoint.to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    status,
                    response_size: Some(response_size),
                    error: Some(format!("Parse error: {}", e)),
                });
            }
        }

        result.map_err(|e| FeedError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_appends_api_key() {
        let (tx, _) = broadcast::channel(4);
        let config = FeedConfig {
            vehicles_url: "http://feed.test/vehicles".to_string(),
            routes_url: "http://feed.test/routes?format=json".to_string(),
            api_key: Some("k e y".to_string()),
            ..FeedConfig::default()
        };
        let client = FeedClient::new(&config, tx).unwrap();

        assert_eq!(
            client.request_url("http://feed.test/vehicles"),
            "http://feed.test/vehicles?apiKey=k%20e%20y"
        );
        assert_eq!(
            client.request_url("http://feed.test/routes?format=json"),
            "http://feed.test/routes?format=json&apiKey=k%20e%20y"
        );
    }

    #[test]
    fn test_request_url_without_api_key() {
        let (tx, _) = broadcast::channel(4);
        let client = FeedClient::new(&FeedConfig::default(), tx).unwrap();
        assert_eq!(
            client.request_url("http://feed.test/vehicles"),
            "http://feed.test/vehicles"
        );
    }
}

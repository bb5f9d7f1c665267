//! Background polling and reconciliation of the live vehicle feed.
//!
//! One spawned task drives a fixed-interval loop; each tick fetches the
//! vehicle feed and route table concurrently, reconciles against the previous
//! snapshot, and swaps the result into the shared store. Ticks are strictly
//! sequential - the loop awaits a full fetch-and-reconcile cycle before the
//! next tick, so a slow upstream response can never overlap the next cycle.

pub mod types;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::providers::feed::FeedClient;
use crate::reconcile::{
    normalize_route_table, normalize_vehicle_feed, FleetSnapshot, Reconciler, RouteTable,
};

pub use types::{
    FeedRequestLog, FeedRequestSender, FleetStore, FleetUpdate, FleetUpdateSender, RouteStore,
};

/// Manages background synchronization of the live fleet feed
pub struct SyncManager {
    feed_client: FeedClient,
    reconciler: Reconciler,
    config: FeedConfig,
    fleet: FleetStore,
    routes: RouteStore,
    fleet_updates_tx: FleetUpdateSender,
    feed_requests_tx: FeedRequestSender,
}

impl SyncManager {
    pub fn new(config: FeedConfig) -> Result<Self, SyncError> {
        // Create broadcast channel for feed request diagnostics (capacity 100)
        let (feed_requests_tx, _) = broadcast::channel(100);

        let feed_client = FeedClient::new(&config, feed_requests_tx.clone())
            .map_err(|e| SyncError::FeedError(e.to_string()))?;

        // Create broadcast channel for fleet updates (capacity 16 - clients read the store anyway)
        let (fleet_updates_tx, _) = broadcast::channel(16);

        let reconciler = Reconciler::new(config.trail_cap, config.stale_threshold_ms);

        Ok(Self {
            feed_client,
            reconciler,
            config,
            fleet: Arc::new(RwLock::new(FleetSnapshot::default())),
            routes: Arc::new(RwLock::new(RouteTable::default())),
            fleet_updates_tx,
            feed_requests_tx,
        })
    }

    /// Get a reference to the fleet store for API access
    pub fn fleet_store(&self) -> FleetStore {
        self.fleet.clone()
    }

    /// Get a reference to the route store for API access
    pub fn route_store(&self) -> RouteStore {
        self.routes.clone()
    }

    /// Get the fleet updates sender for passing to API handlers
    pub fn fleet_updates_sender(&self) -> FleetUpdateSender {
        self.fleet_updates_tx.clone()
    }

    /// Get the feed request sender for passing to the diagnostics WebSocket
    pub fn feed_requests_sender(&self) -> FeedRequestSender {
        self.feed_requests_tx.clone()
    }

    /// A handle to the reconciler, for read-time classification in handlers
    pub fn reconciler(&self) -> Reconciler {
        self.reconciler.clone()
    }

    /// Run the poll loop forever. The first tick fires immediately.
    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.config.poll_interval_secs,
            stale_threshold_ms = self.config.stale_threshold_ms,
            trail_cap = self.config.trail_cap,
            "Starting fleet sync"
        );

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            self.config.poll_interval_secs.max(1),
        ));
        // A delayed cycle shifts the schedule instead of firing catch-up ticks
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }

    /// One fetch-and-reconcile cycle.
    ///
    /// Any failure is contained here: the previous snapshot and route table
    /// stay in place and the next scheduled tick retries.
    async fn poll_once(&self) {
        let (vehicle_result, route_result) = tokio::join!(
            self.feed_client.fetch_vehicle_feed(),
            self.feed_client.fetch_route_table()
        );

        match route_result {
            Ok(document) => match normalize_route_table(document) {
                Ok(normalized) => {
                    if normalized.skipped > 0 {
                        warn!(
                            skipped = normalized.skipped,
                            "Dropped route records without usable ids"
                        );
                    }
                    *self.routes.write().await = normalized.table;
                }
                Err(e) => {
                    warn!(error = %e, "Route table unusable, keeping previous table");
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to fetch route table, keeping previous table");
            }
        }

        match vehicle_result {
            Ok(document) => match normalize_vehicle_feed(document) {
                Ok(feed) => {
                    let now = Utc::now();
                    let report_count = feed.reports.len();
                    let rejected_count = feed.rejections.len();

                    if rejected_count > 0 {
                        let mut by_reason: std::collections::HashMap<&'static str, usize> =
                            std::collections::HashMap::new();
                        for rejection in &feed.rejections {
                            *by_reason.entry(rejection.reason.as_str()).or_default() += 1;
                        }
                        warn!(rejections = ?by_reason, "Skipped invalid vehicle reports");
                    }

                    let vehicle_count = {
                        let mut fleet = self.fleet.write().await;
                        let next = self.reconciler.ingest(&feed.reports, &fleet, now);
                        let count = next.len();
                        *fleet = next;
                        count
                    };

                    // Ignore send errors - they just mean no one is listening
                    let _ = self.fleet_updates_tx.send(FleetUpdate {
                        timestamp: now.to_rfc3339(),
                        vehicle_count,
                    });

                    info!(
                        reports = report_count,
                        rejected = rejected_count,
                        vehicles = vehicle_count,
                        "Completed fleet poll cycle"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Vehicle feed unusable, keeping previous snapshot");
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to fetch vehicle feed, keeping previous snapshot");
            }
        }
    }

    /// Named state transition for the out-of-service pin flag.
    ///
    /// Returns false when the vehicle is not in the snapshot.
    pub async fn set_pinned(&self, vehicle_id: &str, pinned: bool) -> bool {
        let known = self.fleet.write().await.set_pinned(vehicle_id, pinned);
        if known {
            info!(vehicle_id, pinned, "Updated pin flag");
        } else {
            warn!(vehicle_id, "Pin request for unknown vehicle");
        }
        known
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Feed client error: {0}")]
    FeedError(String),
}

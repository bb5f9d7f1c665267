//! Type definitions for the sync module.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::reconcile::{FleetSnapshot, RouteTable};

/// Shared handle to the reconciled fleet snapshot
pub type FleetStore = Arc<RwLock<FleetSnapshot>>;

/// Shared handle to the route reference table
pub type RouteStore = Arc<RwLock<RouteTable>>;

/// Update notification emitted after each completed poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct FleetUpdate {
    /// Timestamp when this update was generated
    pub timestamp: String,
    /// Number of vehicles in the snapshot after the cycle
    pub vehicle_count: usize,
}

/// Sender for fleet update notifications
pub type FleetUpdateSender = broadcast::Sender<FleetUpdate>;

/// Feed request log for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct FeedRequestLog {
    /// Unique request ID
    pub id: String,
    /// Timestamp when request was made
    pub timestamp: String,
    /// Upstream document requested
    pub endpoint: String,
    /// Duration of request in milliseconds
    pub duration_ms: u64,
    /// HTTP status code (0 when the request never completed)
    pub status: u16,
    /// Response size in bytes
    pub response_size: Option<usize>,
    /// Error message if request failed
    pub error: Option<String>,
}

/// Sender for feed request diagnostics
pub type FeedRequestSender = broadcast::Sender<FeedRequestLog>;

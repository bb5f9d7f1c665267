use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::sync::{FleetStore, RouteStore};

#[derive(Clone)]
pub struct HealthState {
    pub fleet_store: FleetStore,
    pub route_store: RouteStore,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of vehicles in the current snapshot
    pub vehicle_count: usize,
    /// Number of routes in the reference table
    pub route_count: usize,
    /// When the last successful poll cycle completed (ISO 8601)
    pub last_poll_at: Option<String>,
    /// Age of the snapshot in seconds; absent before the first successful poll
    pub snapshot_age_seconds: Option<i64>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let fleet = state.fleet_store.read().await;
    let routes = state.route_store.read().await;
    let now = Utc::now();

    Json(HealthResponse {
        healthy: true,
        vehicle_count: fleet.len(),
        route_count: routes.len(),
        last_poll_at: fleet.updated_at.map(|t| t.to_rfc3339()),
        snapshot_age_seconds: fleet
            .updated_at
            .map(|t| now.signed_duration_since(t).num_seconds()),
    })
}

pub fn router(fleet_store: FleetStore, route_store: RouteStore) -> Router {
    let state = HealthState {
        fleet_store,
        route_store,
    };
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}

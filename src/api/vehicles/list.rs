use axum::{extract::State, Json};
use chrono::Utc;

use super::VehiclesState;
use crate::models::{build_fleet_list, FleetListResponse};

/// Get the reconciled fleet snapshot with derived status fields
#[utoipa::path(
    get,
    path = "/api/vehicles",
    responses(
        (status = 200, description = "Current fleet snapshot", body = FleetListResponse)
    ),
    tag = "vehicles"
)]
pub async fn list_fleet(State(state): State<VehiclesState>) -> Json<FleetListResponse> {
    let now = Utc::now();
    let fleet = state.fleet_store.read().await;
    let routes = state.route_store.read().await;

    Json(build_fleet_list(&fleet, &routes, &state.reconciler, now))
}

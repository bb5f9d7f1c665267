use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::VehiclesState;
use crate::api::ErrorResponse;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PinRequest {
    /// Desired out-of-service flag state
    pub pinned: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PinResponse {
    pub vehicle_id: String,
    pub pinned: bool,
}

/// Set or clear the out-of-service pin flag on a vehicle
///
/// This is the only mutation path into the fleet snapshot from outside the
/// poll loop. A pinned vehicle classifies as pinned regardless of staleness.
#[utoipa::path(
    post,
    path = "/api/vehicles/{vehicle_id}/pin",
    params(
        ("vehicle_id" = String, Path, description = "Vehicle identifier from the snapshot")
    ),
    request_body = PinRequest,
    responses(
        (status = 200, description = "Pin flag updated", body = PinResponse),
        (status = 404, description = "Vehicle not in snapshot", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn pin_vehicle(
    State(state): State<VehiclesState>,
    Path(vehicle_id): Path<String>,
    Json(request): Json<PinRequest>,
) -> Result<Json<PinResponse>, (StatusCode, Json<ErrorResponse>)> {
    if state
        .sync_manager
        .set_pinned(&vehicle_id, request.pinned)
        .await
    {
        Ok(Json(PinResponse {
            vehicle_id,
            pinned: request.pinned,
        }))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Vehicle {} not found in snapshot", vehicle_id),
            }),
        ))
    }
}

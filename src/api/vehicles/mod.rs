mod list;
mod pin;

pub use list::*;
pub use pin::*;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::reconcile::Reconciler;
use crate::sync::{FleetStore, RouteStore, SyncManager};

#[derive(Clone)]
pub struct VehiclesState {
    pub fleet_store: FleetStore,
    pub route_store: RouteStore,
    pub reconciler: Reconciler,
    pub sync_manager: Arc<SyncManager>,
}

pub fn router(
    fleet_store: FleetStore,
    route_store: RouteStore,
    reconciler: Reconciler,
    sync_manager: Arc<SyncManager>,
) -> Router {
    let state = VehiclesState {
        fleet_store,
        route_store,
        reconciler,
        sync_manager,
    };
    Router::new()
        .route("/", get(list_fleet))
        .route("/{vehicle_id}/pin", post(pin_vehicle))
        .with_state(state)
}

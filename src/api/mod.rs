pub mod error;
pub mod health;
pub mod inventory;
pub mod routes;
pub mod vehicles;
pub mod ws;

pub use error::{internal_error, ErrorResponse};

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::sync::SyncManager;

pub fn router(pool: SqlitePool, sync_manager: Arc<SyncManager>) -> Router {
    let fleet_store = sync_manager.fleet_store();
    let route_store = sync_manager.route_store();
    let reconciler = sync_manager.reconciler();

    let ws_state = ws::WsState {
        fleet_store: fleet_store.clone(),
        route_store: route_store.clone(),
        reconciler: reconciler.clone(),
        fleet_updates_tx: sync_manager.fleet_updates_sender(),
        feed_requests_tx: sync_manager.feed_requests_sender(),
    };

    Router::new()
        .nest(
            "/vehicles",
            vehicles::router(
                fleet_store.clone(),
                route_store.clone(),
                reconciler,
                sync_manager,
            ),
        )
        .nest("/routes", routes::router(route_store.clone()))
        .nest("/inventory", inventory::router(pool))
        .nest("/health", health::router(fleet_store, route_store))
        .route("/ws/fleet", get(ws::ws_fleet).with_state(ws_state.clone()))
        .route(
            "/ws/diagnostics",
            get(ws::ws_diagnostics).with_state(ws_state),
        )
}

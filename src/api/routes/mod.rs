mod list;

pub use list::*;

use axum::{routing::get, Router};

use crate::sync::RouteStore;

#[derive(Clone)]
pub struct RoutesState {
    pub route_store: RouteStore,
}

pub fn router(route_store: RouteStore) -> Router {
    let state = RoutesState { route_store };
    Router::new().route("/", get(list_routes)).with_state(state)
}

use axum::{extract::State, Json};
use chrono::Utc;

use super::RoutesState;
use crate::models::{RouteListResponse, RouteView};

/// Get the current route reference table
#[utoipa::path(
    get,
    path = "/api/routes",
    responses(
        (status = 200, description = "Route reference table", body = RouteListResponse)
    ),
    tag = "routes"
)]
pub async fn list_routes(State(state): State<RoutesState>) -> Json<RouteListResponse> {
    let table = state.route_store.read().await;

    let mut routes: Vec<RouteView> = table
        .records()
        .map(|r| RouteView {
            route_id: r.route_id.clone(),
            short_name: r.short_name.clone(),
            long_name: r.long_name.clone(),
        })
        .collect();
    routes.sort_by(|a, b| a.short_name.cmp(&b.short_name));

    Json(RouteListResponse {
        total_count: routes.len(),
        routes,
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub mod api;
mod config;
mod models;
mod providers;
mod reconcile;
mod sync;

use std::sync::Arc;

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use sync::SyncManager;

#[derive(OpenApi)]
#[openapi(
    info(title = "Bus Fleet Ops API", version = "0.2.0"),
    paths(
        api::vehicles::list_fleet,
        api::vehicles::pin_vehicle,
        api::routes::list_routes,
        api::inventory::list_inventory,
        api::inventory::create_bus,
        api::inventory::change_bus_status,
        api::inventory::get_bus_history,
        api::inventory::delete_bus,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::vehicles::PinRequest,
        api::vehicles::PinResponse,
        api::inventory::Bus,
        api::inventory::BusStatus,
        api::inventory::CreateBusRequest,
        api::inventory::StatusChangeRequest,
        api::inventory::BusHistoryEntry,
        api::inventory::InventoryListResponse,
        api::inventory::BusHistoryResponse,
        api::health::HealthResponse,
        models::VehicleView,
        models::FleetListResponse,
        models::RouteView,
        models::RouteListResponse,
        reconcile::Position,
        reconcile::DisplayBucket,
    )),
    tags(
        (name = "vehicles", description = "Live fleet snapshot and pin transitions"),
        (name = "routes", description = "Route reference table"),
        (name = "inventory", description = "Out-of-service inventory tracker"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(
        vehicles_url = %config.feed.vehicles_url,
        poll_interval_secs = config.feed.poll_interval_secs,
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Initialize SQLite database
    let cwd = std::env::current_dir().expect("Failed to get current directory");
    let db_path = cwd.join("database");
    if let Err(e) = std::fs::create_dir_all(&db_path) {
        tracing::warn!("Could not create database directory: {}", e);
    }
    let db_file = db_path.join("data.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_file.display());
    let pool = SqlitePool::connect(&db_url)
        .await
        .expect("Failed to connect to SQLite database");

    // Run migrations
    let migrator = sqlx::migrate!("./migrations");
    tracing::info!(migrations = migrator.migrations.len(), "Found migrations");
    migrator
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Database migrations completed");

    // Start sync manager in background
    let sync_manager = Arc::new(
        SyncManager::new(config.feed.clone()).expect("Failed to initialize sync manager"),
    );
    let sync_manager_clone = sync_manager.clone();
    tokio::spawn(async move {
        sync_manager_clone.start().await;
    });

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(pool.clone(), sync_manager))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind to port 3000");

    tracing::info!("Server running on http://localhost:3000");
    tracing::info!("Swagger UI: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Bus Fleet Ops API"
}

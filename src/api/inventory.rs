//! Out-of-service inventory tracker.
//!
//! Operational records for fleet units (status, notes) with an append-only
//! status history per unit. Every status transition appends one history row;
//! history rows are never updated in place.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use utoipa::ToSchema;

use crate::api::{internal_error, ErrorResponse};

#[derive(Clone)]
pub struct InventoryState {
    pub pool: SqlitePool,
}

/// Operational status of a fleet unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BusStatus {
    Active,
    OnHold,
    InShop,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::Active => "active",
            BusStatus::OnHold => "on_hold",
            BusStatus::InShop => "in_shop",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BusStatus::Active),
            "on_hold" => Some(BusStatus::OnHold),
            "in_shop" => Some(BusStatus::InShop),
            _ => None,
        }
    }
}

/// An inventory record for one fleet unit
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Bus {
    pub id: i64,
    /// Fleet unit number
    pub number: String,
    pub status: BusStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, FromRow)]
struct BusRow {
    id: i64,
    number: String,
    status: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl BusRow {
    fn into_bus(self) -> Result<Bus, String> {
        let status = BusStatus::parse(&self.status)
            .ok_or_else(|| format!("Invalid status '{}' for unit {}", self.status, self.number))?;
        Ok(Bus {
            id: self.id,
            number: self.number,
            status,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBusRequest {
    /// Fleet unit number (unique)
    pub number: String,
    /// Initial status; defaults to active
    #[serde(default)]
    pub status: Option<BusStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChangeRequest {
    pub status: BusStatus,
    pub notes: Option<String>,
}

/// One entry in a unit's append-only status history
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BusHistoryEntry {
    pub status: BusStatus,
    pub notes: Option<String>,
    pub recorded_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryListResponse {
    pub buses: Vec<Bus>,
    pub total_count: usize,
    /// Timestamp when this list was generated
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BusHistoryResponse {
    pub number: String,
    /// Oldest first
    pub entries: Vec<BusHistoryEntry>,
    pub total_count: usize,
}

/// List all inventory records
#[utoipa::path(
    get,
    path = "/api/inventory",
    responses(
        (status = 200, description = "Inventory records", body = InventoryListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<InventoryState>,
) -> Result<Json<InventoryListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let rows: Vec<BusRow> = sqlx::query_as(
        "SELECT id, number, status, notes, created_at, updated_at FROM buses ORDER BY number",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let buses = rows
        .into_iter()
        .map(BusRow::into_bus)
        .collect::<Result<Vec<_>, _>>()
        .map_err(internal_error)?;

    Ok(Json(InventoryListResponse {
        total_count: buses.len(),
        buses,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Log a new fleet unit
#[utoipa::path(
    post,
    path = "/api/inventory",
    request_body = CreateBusRequest,
    responses(
        (status = 201, description = "Unit created", body = Bus),
        (status = 400, description = "Invalid unit number", body = ErrorResponse),
        (status = 409, description = "Unit number already logged", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn create_bus(
    State(state): State<InventoryState>,
    Json(request): Json<CreateBusRequest>,
) -> Result<(StatusCode, Json<Bus>), (StatusCode, Json<ErrorResponse>)> {
    let number = request.number.trim().to_string();
    if number.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Unit number must not be empty".to_string(),
            }),
        ));
    }
    let status = request.status.unwrap_or(BusStatus::Active);

    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let row: BusRow = sqlx::query_as(
        r#"
        INSERT INTO buses (number, status, notes)
        VALUES (?, ?, ?)
        RETURNING id, number, status, notes, created_at, updated_at
        "#,
    )
    .bind(&number)
    .bind(status.as_str())
    .bind(&request.notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Unit {} is already logged", number),
            }),
        ),
        _ => internal_error(e),
    })?;

    sqlx::query("INSERT INTO bus_history (bus_id, status, notes) VALUES (?, ?, ?)")
        .bind(row.id)
        .bind(status.as_str())
        .bind(&request.notes)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    let bus = row.into_bus().map_err(internal_error)?;
    tracing::info!(number = %bus.number, status = bus.status.as_str(), "Logged new unit");
    Ok((StatusCode::CREATED, Json(bus)))
}

/// Transition a unit's status, appending to its history
#[utoipa::path(
    post,
    path = "/api/inventory/{number}/status",
    params(
        ("number" = String, Path, description = "Fleet unit number")
    ),
    request_body = StatusChangeRequest,
    responses(
        (status = 200, description = "Status updated", body = Bus),
        (status = 404, description = "Unit not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn change_bus_status(
    State(state): State<InventoryState>,
    Path(number): Path<String>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<Bus>, (StatusCode, Json<ErrorResponse>)> {
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let row: Option<BusRow> = sqlx::query_as(
        r#"
        UPDATE buses
        SET status = ?, notes = ?, updated_at = datetime('now')
        WHERE number = ?
        RETURNING id, number, status, notes, created_at, updated_at
        "#,
    )
    .bind(request.status.as_str())
    .bind(&request.notes)
    .bind(&number)
    .fetch_optional(&mut *tx)
    .await
    .map_err(internal_error)?;

    let row = row.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unit {} not found", number),
            }),
        )
    })?;

    sqlx::query("INSERT INTO bus_history (bus_id, status, notes) VALUES (?, ?, ?)")
        .bind(row.id)
        .bind(request.status.as_str())
        .bind(&request.notes)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    let bus = row.into_bus().map_err(internal_error)?;
    tracing::info!(number = %bus.number, status = bus.status.as_str(), "Unit status changed");
    Ok(Json(bus))
}

/// Get a unit's append-only status history
#[utoipa::path(
    get,
    path = "/api/inventory/{number}/history",
    params(
        ("number" = String, Path, description = "Fleet unit number")
    ),
    responses(
        (status = 200, description = "Status history, oldest first", body = BusHistoryResponse),
        (status = 404, description = "Unit not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_bus_history(
    State(state): State<InventoryState>,
    Path(number): Path<String>,
) -> Result<Json<BusHistoryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let bus_id: Option<(i64,)> = sqlx::query_as("SELECT id FROM buses WHERE number = ?")
        .bind(&number)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?;

    let bus_id = bus_id
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Unit {} not found", number),
                }),
            )
        })?
        .0;

    let rows: Vec<(String, Option<String>, String)> = sqlx::query_as(
        r#"
        SELECT status, notes, recorded_at
        FROM bus_history
        WHERE bus_id = ?
        ORDER BY id
        "#,
    )
    .bind(bus_id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let entries = rows
        .into_iter()
        .map(|(status, notes, recorded_at)| {
            let status = BusStatus::parse(&status)
                .ok_or_else(|| format!("Invalid status '{}' in history for unit {}", status, number))?;
            Ok(BusHistoryEntry {
                status,
                notes,
                recorded_at,
            })
        })
        .collect::<Result<Vec<_>, String>>()
        .map_err(internal_error)?;

    Ok(Json(BusHistoryResponse {
        number,
        total_count: entries.len(),
        entries,
    }))
}

/// Remove a unit and its history from the inventory
#[utoipa::path(
    delete,
    path = "/api/inventory/{number}",
    params(
        ("number" = String, Path, description = "Fleet unit number")
    ),
    responses(
        (status = 204, description = "Unit removed"),
        (status = 404, description = "Unit not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn delete_bus(
    State(state): State<InventoryState>,
    Path(number): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let result = sqlx::query("DELETE FROM buses WHERE number = ?")
        .bind(&number)
        .execute(&state.pool)
        .await
        .map_err(internal_error)?;

    if result.rows_affected() == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unit {} not found", number),
            }),
        ));
    }

    tracing::info!(number = %number, "Unit removed from inventory");
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(pool: SqlitePool) -> Router {
    let state = InventoryState { pool };
    Router::new()
        .route("/", get(list_inventory).post(create_bus))
        .route("/{number}", delete(delete_bus))
        .route("/{number}/status", post(change_bus_status))
        .route("/{number}/history", get(get_bus_history))
        .with_state(state)
}

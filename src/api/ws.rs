use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{build_fleet_list, FleetListResponse};
use crate::reconcile::Reconciler;
use crate::sync::{FeedRequestLog, FeedRequestSender, FleetStore, FleetUpdateSender, RouteStore};

#[derive(Clone)]
pub struct WsState {
    pub fleet_store: FleetStore,
    pub route_store: RouteStore,
    pub reconciler: Reconciler,
    pub fleet_updates_tx: FleetUpdateSender,
    pub feed_requests_tx: FeedRequestSender,
}

/// Server message sent to fleet clients
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ServerMessage {
    /// Initial connection acknowledgment
    Connected { message: String },
    /// Full fleet snapshot (sent on connect and after each poll cycle)
    Fleet { fleet: FleetListResponse },
    /// A feed request diagnostics record
    FeedRequest { request: FeedRequestLog },
}

/// WebSocket endpoint for fleet snapshot pushes
pub async fn ws_fleet(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_fleet_socket(socket, state))
}

async fn handle_fleet_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let mut fleet_rx = state.fleet_updates_tx.subscribe();

    // Send connected message
    let connected_msg = ServerMessage::Connected {
        message: "Connected to fleet updates.".to_string(),
    };
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Send the current snapshot immediately so the client is never empty
    if let Some(json) = build_fleet_message(&state).await {
        if sender.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    // Forward a fresh snapshot to the client after each poll cycle
    let forward_state = state.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match fleet_rx.recv().await {
                Ok(_update) => {
                    if let Some(json) = build_fleet_message(&forward_state).await {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });

    // Handle incoming messages until the client goes away
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Client is gone; drop the subscription so late updates are discarded
    forward_task.abort();
}

async fn build_fleet_message(state: &WsState) -> Option<String> {
    let now = Utc::now();
    let fleet = state.fleet_store.read().await;
    let routes = state.route_store.read().await;
    let msg = ServerMessage::Fleet {
        fleet: build_fleet_list(&fleet, &routes, &state.reconciler, now),
    };
    serde_json::to_string(&msg).ok()
}

/// WebSocket endpoint streaming feed request diagnostics
pub async fn ws_diagnostics(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_diagnostics_socket(socket, state))
}

async fn handle_diagnostics_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let mut requests_rx = state.feed_requests_tx.subscribe();

    let forward_task = tokio::spawn(async move {
        loop {
            match requests_rx.recv().await {
                Ok(request) => {
                    let msg = ServerMessage::FeedRequest { request };
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    forward_task.abort();
}

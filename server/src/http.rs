//! HTTP status routes served next to the WebSocket relay

use crate::network::{RelayStatus, ServerMessage};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use serde::Serialize;
use shared::GameStateSnapshot;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
struct HttpState {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    started: Instant,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    /// Seconds since the relay started
    uptime: f64,
}

#[derive(Debug, Serialize)]
struct StateResponse {
    success: bool,
    data: GameStateSnapshot,
}

/// `GET /api/health` and `GET /api/state`, answered by the main relay loop.
pub fn routes(server_tx: mpsc::UnboundedSender<ServerMessage>, started: Instant) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/state", get(game_state))
        .with_state(HttpState { server_tx, started })
}

pub async fn serve(
    listener: TcpListener,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    started: Instant,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP status routes on {}", addr);
    }
    if let Err(e) = axum::serve(listener, routes(server_tx, started)).await {
        error!("HTTP server stopped: {}", e);
    }
}

async fn query(state: &HttpState) -> Option<RelayStatus> {
    let (reply, reply_rx) = oneshot::channel();
    state.server_tx.send(ServerMessage::Status { reply }).ok()?;
    reply_rx.await.ok()
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "relay stopped").into_response()
}

async fn health(State(state): State<HttpState>) -> Response {
    match query(&state).await {
        Some(status) => Json(HealthResponse {
            status: "ok",
            connections: status.connections,
            uptime: state.started.elapsed().as_secs_f64(),
        })
        .into_response(),
        None => unavailable(),
    }
}

async fn game_state(State(state): State<HttpState>) -> Response {
    match query(&state).await {
        Some(status) => Json(StateResponse {
            success: true,
            data: status.state,
        })
        .into_response(),
        None => unavailable(),
    }
}

//! # routes::monitor
//!
//! Read-only view of the position manager.
//!
//! ## Endpoints
//!
//! | Method    | Path                            | Description                          |
//! |-----------|---------------------------------|--------------------------------------|
//! | GET       | `/health`                       | Liveness, always unauthenticated     |
//! | GET       | `/api/monitor/stats`            | Cycle counters, account, universe    |
//! | GET       | `/api/monitor/positions`        | Held positions with runtime state    |
//! | GET       | `/api/monitor/positions/:symbol`| One position (404 when not tracked)  |
//! | GET       | `/api/monitor/pending`          | Swaps waiting for their reopen leg   |
//! | GET (WS)  | `/ws/monitor`                   | Snapshot frame, then live events     |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Result, TraderError};
use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_monitor(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── Current snapshot first ────────────────────────────────────────────────
    let snapshot = {
        let snap = state.snapshot.read().await;
        json!({
            "event":    "SNAPSHOT",
            "snapshot": *snap,
        })
        .to_string()
    };

    if sender.send(Message::Text(snapshot.into())).await.is_err() {
        return;
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST Endpoints ───────────────────────────────────────────────────────────

/// GET /health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let snap = state.snapshot.read().await;
    Json(json!({
        "ok":         true,
        "cycle":      snap.cycle,
        "started_at": snap.started_at,
    }))
}

/// GET /api/monitor/stats
pub async fn get_stats(State(state): State<SharedState>) -> impl IntoResponse {
    let snap = state.snapshot.read().await;
    Json(json!({
        "ok":               true,
        "cycle":            snap.cycle,
        "last_cycle_at":    snap.last_cycle_at,
        "market_open":      snap.market_open,
        "account":          snap.account,
        "position_count":   snap.positions.len(),
        "pending_reopens":  snap.pending_reopens.len(),
        "universe_size":    snap.universe_size,
        "last_rotation_at": snap.last_rotation_at,
        "entries_total":    snap.entries_total,
        "exits_total":      snap.exits_total,
        "rotations_total":  snap.rotations_total,
        "failed_cycles":    snap.failed_cycles,
        "last_error":       snap.last_error,
    }))
}

/// GET /api/monitor/positions
pub async fn get_positions(State(state): State<SharedState>) -> impl IntoResponse {
    let snap = state.snapshot.read().await;
    Json(json!({
        "ok":        true,
        "count":     snap.positions.len(),
        "positions": snap.positions,
    }))
}

/// GET /api/monitor/positions/:symbol
pub async fn get_position(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let snap = state.snapshot.read().await;
    let tracked = snap
        .position(&symbol)
        .ok_or_else(|| TraderError::NotFound(format!("position {symbol}")))?;

    Ok(Json(json!({
        "ok":       true,
        "position": tracked,
    })))
}

/// GET /api/monitor/pending
pub async fn get_pending(State(state): State<SharedState>) -> impl IntoResponse {
    let snap = state.snapshot.read().await;
    Json(json!({
        "ok":      true,
        "count":   snap.pending_reopens.len(),
        "pending": snap.pending_reopens,
    }))
}

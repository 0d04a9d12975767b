//! HTTP surface of the position manager: a read-only monitor API.

pub mod monitor;

use axum::{middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_api_key;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health",                        get(monitor::health))
        .route("/api/monitor/stats",             get(monitor::get_stats))
        .route("/api/monitor/positions",         get(monitor::get_positions))
        .route("/api/monitor/positions/:symbol", get(monitor::get_position))
        .route("/api/monitor/pending",           get(monitor::get_pending))
        .route("/ws/monitor",                    get(monitor::ws_monitor))
        // ── Middleware ───────────────────────────────────────────────────────
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

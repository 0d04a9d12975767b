//! # Position Rotator — Automated Position-Lifecycle Manager
//!
//! ## Architecture Overview
//!
//! ```text
//!                        every SCAN_INTERVAL_SECS
//!  ┌──────────────┐    ┌───────────────────────────────────┐
//!  │   Alpaca     │◀──▶│  Trader (scheduler)               │
//!  │  trading +   │    │   EntryScanner   → new positions  │
//!  │  market data │    │   PositionMonitor→ ladder / stops │
//!  └──────────────┘    │   RotationOptimizer → swaps       │
//!                      └───────────────┬───────────────────┘
//!                                      │ snapshot + events
//!  ┌──────────────┐   REST / WebSocket │
//!  │  Dashboard   │ ◀──────────────────┘  GET /api/monitor/*, /ws/monitor
//!  └──────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable                  | Default                 | Description                          |
//! |---------------------------|-------------------------|--------------------------------------|
//! | `APCA_API_KEY_ID`         | —                       | Alpaca key (or credentials file)     |
//! | `APCA_API_SECRET_KEY`     | —                       | Alpaca secret                        |
//! | `ALPACA_CREDENTIALS_FILE` | —                       | JSON with `apiKey` / `secretKey`     |
//! | `ALPACA_BASE_URL`         | paper trading API       | Trading endpoint                     |
//! | `SCAN_INTERVAL_SECS`      | `30`                    | Pause between cycles                 |
//! | `ROTATION_INTERVAL_SECS`  | `600`                   | Minimum gap between rotation passes  |
//! | `PROFIT_LADDER`           | `0.05:0.33,…,0.15:1.0`  | `threshold:fraction` rungs           |
//! | `BLACKLIST`               | `LCID,PLTR,…`           | Symbols never bought                 |
//! | `MONITOR_BIND_ADDR`       | `0.0.0.0:3000`          | Monitor API (empty = disabled)       |
//! | `MONITOR_API_KEY`         | unset                   | `X-API-Key` for the monitor API      |
//! | `RUST_LOG`                | `position_rotator=info` | Tracing filter                       |
//!
//! The full list lives in [`config`].

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod classifier;
mod config;
mod engine;
mod error;
mod events;
mod gateway;
mod models;
mod routes;
mod scheduler;
mod state;

#[cfg(test)]
mod testing;

use config::TraderConfig;
use gateway::alpaca::AlpacaClient;
use scheduler::Trader;
use state::build_state;

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env if present ──────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Initialise structured logging ─────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("position_rotator=debug".parse()?)
            .add_directive("reqwest=warn".parse()?)
            .add_directive("tower_http=info".parse()?))
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        POSITION ROTATOR — Alpaca              ║
  ║        Ladder · Trailing Stops · Rotation     ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 3. Config + brokerage client ─────────────────────────────────────────
    let config = TraderConfig::from_env().context("Failed to load config")?;
    let client = Arc::new(AlpacaClient::new(config.alpaca.clone()).context("Failed to build Alpaca client")?);

    info!(
        base_url      = %config.alpaca.base_url,
        max_positions = config.scan.max_positions,
        interval      = ?config.scan_interval,
        blacklisted   = config.blacklist.len(),
        "Configuration loaded"
    );

    // ── 4. Shared state + monitor API ────────────────────────────────────────
    let state = build_state(config.monitor_api_key.clone());

    match config.monitor_bind {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind monitor API on {addr}"))?;
            let app = routes::router(state.clone());

            if state.api_key.is_none() {
                warn!("⚠️  MONITOR_API_KEY not set — monitor API is open");
            }
            info!(?addr, "🚀 Monitor API listening");

            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "❌ Monitor API stopped");
                }
            });
        }
        None => info!("Monitor API disabled"),
    }

    // ── 5. Control loop until SIGINT / SIGTERM ───────────────────────────────
    let shutdown = shutdown_signal().context("Failed to install signal handlers")?;
    Trader::new(&config, client, state).run(shutdown).await;

    info!("👋 Position rotator stopped");
    Ok(())
}

/// Resolves on the first SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM — finishing current cycle"),
            _ = sigint.recv()  => info!("Received SIGINT — finishing current cycle"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
}

//! # state
//!
//! Shared state between the control loop (single writer) and the monitor
//! HTTP server (readers).
//!
//! The loop owns every engine store outright.  After each cycle it copies a
//! read-only [`StatusSnapshot`] behind an `RwLock` and broadcasts events;
//! handlers never see the stores themselves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::engine::monitor::RuntimeState;
use crate::engine::rotation::PendingReopen;
use crate::events::MonitorEvent;
use crate::models::{Account, Position};

/// Broadcast buffer per WebSocket subscriber before it starts lagging.
const EVENT_BUFFER: usize = 256;

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// A held position together with what the manager knows about it.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedPosition {
    #[serde(flatten)]
    pub position: Position,
    pub runtime: Option<RuntimeState>,
    pub momentum: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub started_at: DateTime<Utc>,
    pub cycle: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub market_open: bool,
    pub account: Option<Account>,
    pub positions: Vec<TrackedPosition>,
    pub pending_reopens: Vec<PendingReopen>,
    pub universe_size: usize,
    pub last_rotation_at: Option<DateTime<Utc>>,
    pub entries_total: u64,
    pub exits_total: u64,
    pub rotations_total: u64,
    pub failed_cycles: u64,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    pub fn position(&self, symbol: &str) -> Option<&TrackedPosition> {
        self.positions
            .iter()
            .find(|p| p.position.symbol.eq_ignore_ascii_case(symbol))
    }
}

// ─── AppState ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<RwLock<StatusSnapshot>>,
    /// Pre-serialised [`MonitorEvent`]s for WebSocket clients.
    pub broadcast_tx: broadcast::Sender<String>,
    /// `None` = monitor API open (dev mode).
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(api_key: Option<String>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_BUFFER);
        let snapshot = StatusSnapshot { started_at: Utc::now(), ..StatusSnapshot::default() };

        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            broadcast_tx,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// No receivers is not an error: the loop runs headless just fine.
    pub fn broadcast(&self, event: &MonitorEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    pub async fn publish(&self, snapshot: StatusSnapshot) {
        *self.snapshot.write().await = snapshot;
    }

    pub async fn read_snapshot(&self) -> StatusSnapshot {
        self.snapshot.read().await.clone()
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(api_key: Option<String>) -> SharedState {
    Arc::new(AppState::new(api_key))
}

//! # events
//!
//! [`MonitorEvent`] — everything the control loop broadcasts to WebSocket
//! clients on `/ws/monitor`.
//!
//! Events go out pre-serialised (`broadcast::Sender<String>`) so the channel
//! does not need the payload types to be `Clone` across subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::monitor::ExitRecord;
use crate::engine::rotation::{PendingReopen, RotationAction};
use crate::engine::scanner::EntryRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorEvent {
    /// A new position was bought by the entry scanner.
    PositionEntered {
        entry: EntryRecord,
    },

    /// Profit-take, stop-loss or trailing stop executed.
    PositionExited {
        exit: ExitRecord,
    },

    /// A swap or loss-cut from the rotation pass went through.
    RotationExecuted {
        action: RotationAction,
    },

    ReopenFilled {
        reopen: PendingReopen,
    },

    /// The replacement leg of a swap gave up; the capital stays in cash.
    ReopenAbandoned {
        reopen: PendingReopen,
    },

    AccountSummary {
        portfolio_value: f64,
        cash: f64,
        buying_power: f64,
        /// Change against the first portfolio value seen this session.
        change_pct: f64,
    },

    CycleCompleted {
        cycle: u64,
        market_open: bool,
        positions: usize,
        total_unrealized_pl: f64,
        at: DateTime<Utc>,
    },

    CycleFailed {
        cycle: u64,
        error: String,
    },
}

impl MonitorEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

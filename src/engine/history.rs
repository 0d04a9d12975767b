//! # engine::history
//!
//! Short-window price history per symbol and the momentum derived from it.
//!
//! Momentum is the plain rate of change between the oldest and the newest
//! sample still inside the window.  It is recomputed on demand and nothing
//! survives a restart.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub price: f64,
    pub pnl_pct: f64,
}

pub struct HistoryStore {
    window: Duration,
    series: HashMap<String, VecDeque<Sample>>,
}

impl HistoryStore {
    pub fn new(window: Duration) -> Self {
        Self { window, series: HashMap::new() }
    }

    /// Append a sample and drop everything older than `at - window`.
    ///
    /// A second sample at the same instant replaces the first.  Returns
    /// `false` (and records nothing) for a non-positive price or a sample
    /// older than the newest one already held.
    pub fn record(&mut self, symbol: &str, at: DateTime<Utc>, price: f64, pnl_pct: f64) -> bool {
        if !price.is_finite() || price <= 0.0 {
            return false;
        }

        let samples = self.series.entry(symbol.to_string()).or_default();
        let sample = Sample { at, price, pnl_pct };
        match samples.back_mut() {
            Some(last) if at < last.at => return false,
            Some(last) if at == last.at => *last = sample,
            _ => samples.push_back(sample),
        }

        let cutoff = at - self.window;
        while samples.front().is_some_and(|s| s.at < cutoff) {
            samples.pop_front();
        }
        true
    }

    /// `(newest - oldest) / oldest` over the retained window; `None` with
    /// fewer than two samples.
    pub fn momentum(&self, symbol: &str) -> Option<f64> {
        let samples = self.series.get(symbol)?;
        if samples.len() < 2 {
            return None;
        }
        let oldest = samples.front()?.price;
        let newest = samples.back()?.price;
        Some((newest - oldest) / oldest)
    }

    pub fn remove(&mut self, symbol: &str) {
        self.series.remove(symbol);
    }

    /// Drop series whose newest sample is already outside the window.
    /// Returns how many were dropped.
    pub fn prune_stale(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let before = self.series.len();
        self.series
            .retain(|_, samples| samples.back().is_some_and(|s| s.at >= cutoff));
        before - self.series.len()
    }

    pub fn sample_count(&self, symbol: &str) -> usize {
        self.series.get(symbol).map_or(0, |s| s.len())
    }

    pub fn tracked(&self) -> usize {
        self.series.len()
    }
}

//! # engine::monitor
//!
//! **Position Monitor** — the per-position exit state machine.
//!
//! ## Order of checks (every position, every cycle)
//!
//! ```text
//!  1. peak update        peak = max(peak, current)   (init on first sight)
//!  2. profit ladder      pnl ≥ ladder[0] and pnl ≥ ladder[tier]  → sell fraction
//!  3. stop-loss          pnl ≤ -stop(asset type)                  → full close
//!  4. trailing stop      armed and (current-peak)/peak ≤ -trail   → full close
//! ```
//!
//! At most one of 2/3/4 fires per position per cycle.  The decision step
//! ([`evaluate`]) is pure; [`execute`] talks to the brokerage and is the only
//! place runtime state changes after a sell.  A failed order leaves the state
//! untouched so the same decision is simply taken again next cycle.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::AssetType;
use crate::engine::history::HistoryStore;
use crate::error::Result;
use crate::gateway::Brokerage;
use crate::models::order::round_qty;
use crate::models::{OrderRequest, Position};

// ─── Config ───────────────────────────────────────────────────────────────────

/// One rung of the profit-taking ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LadderStep {
    /// Gain at which this rung fires, e.g. `0.05` for +5 %.
    pub threshold: f64,
    /// Fraction of the *current* quantity to sell; `1.0` closes the position.
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitConfig {
    pub ladder: Vec<LadderStep>,
    pub stop_loss_crypto: f64,
    pub stop_loss_etf: f64,
    pub stop_loss_stock: f64,
    pub trailing_stop_pct: f64,
    /// Gain that arms the trailing stop for the rest of the holding.
    pub trail_activation_pct: f64,
    /// Partial sells below this quantity are not submitted.
    pub min_order_qty: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            ladder: vec![
                LadderStep { threshold: 0.05, fraction: 0.33 },
                LadderStep { threshold: 0.10, fraction: 0.50 },
                LadderStep { threshold: 0.15, fraction: 1.00 },
            ],
            stop_loss_crypto: 0.10,
            stop_loss_etf: 0.05,
            stop_loss_stock: 0.08,
            trailing_stop_pct: 0.03,
            trail_activation_pct: 0.005,
            min_order_qty: 0.01,
        }
    }
}

impl ExitConfig {
    pub fn stop_loss_for(&self, asset_type: AssetType) -> f64 {
        match asset_type {
            AssetType::Crypto => self.stop_loss_crypto,
            AssetType::Etf => self.stop_loss_etf,
            AssetType::Stock => self.stop_loss_stock,
        }
    }
}

// ─── Runtime State ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeState {
    /// Highest price seen while held; never decreases.
    pub peak_price: f64,
    /// Index of the next ladder rung; only moves up after a confirmed sell.
    pub profit_tier: usize,
    pub trail_armed: bool,
    pub first_seen: DateTime<Utc>,
}

/// Runtime state of every held symbol.  Owned by the control loop.
#[derive(Debug, Default)]
pub struct PositionStore {
    states: HashMap<String, RuntimeState>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&RuntimeState> {
        self.states.get(symbol)
    }

    /// Peak update and trailing-stop arming for one observation.
    pub fn observe(&mut self, position: &Position, trail_activation: f64, now: DateTime<Utc>) -> &RuntimeState {
        let state = self
            .states
            .entry(position.symbol.clone())
            .or_insert_with(|| RuntimeState {
                peak_price: position.current_price,
                profit_tier: 0,
                trail_armed: false,
                first_seen: now,
            });

        if position.current_price > state.peak_price {
            state.peak_price = position.current_price;
        }
        if position.unrealized_pnl_pct >= trail_activation {
            state.trail_armed = true;
        }
        state
    }

    /// Confirmed ladder sell: move to the next rung, never past `ladder_len`.
    pub fn advance_tier(&mut self, symbol: &str, ladder_len: usize) {
        if let Some(state) = self.states.get_mut(symbol) {
            state.profit_tier = (state.profit_tier + 1).min(ladder_len);
        }
    }

    pub fn remove(&mut self, symbol: &str) -> Option<RuntimeState> {
        self.states.remove(symbol)
    }

    /// Drop state for symbols no longer held; returns the dropped symbols.
    pub fn retain_open(&mut self, held: &HashSet<&str>) -> Vec<String> {
        let gone: Vec<String> = self
            .states
            .keys()
            .filter(|s| !held.contains(s.as_str()))
            .cloned()
            .collect();
        for symbol in &gone {
            self.states.remove(symbol);
        }
        gone
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RuntimeState)> {
        self.states.iter()
    }
}

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitDecision {
    Hold,
    TakeProfit { tier: usize, fraction: f64, qty: f64 },
    StopLoss { pnl_pct: f64, threshold: f64 },
    TrailingStop { drawdown: f64, peak: f64 },
}

impl ExitDecision {
    pub fn is_full_exit(&self) -> bool {
        match self {
            ExitDecision::Hold => false,
            ExitDecision::TakeProfit { fraction, .. } => *fraction >= 1.0,
            ExitDecision::StopLoss { .. } | ExitDecision::TrailingStop { .. } => true,
        }
    }
}

/// Pure exit decision for one position given its (already observed) state.
pub fn evaluate(config: &ExitConfig, position: &Position, state: &RuntimeState) -> ExitDecision {
    let pnl = position.unrealized_pnl_pct;

    // ── 1. Profit ladder ──────────────────────────────────────────────────────
    if let (Some(first), Some(step)) = (config.ladder.first(), config.ladder.get(state.profit_tier)) {
        if pnl >= first.threshold && pnl >= step.threshold {
            if step.fraction >= 1.0 {
                return ExitDecision::TakeProfit {
                    tier: state.profit_tier,
                    fraction: step.fraction,
                    qty: position.qty,
                };
            }
            let qty = round_qty(position.qty * step.fraction);
            if qty >= config.min_order_qty {
                return ExitDecision::TakeProfit { tier: state.profit_tier, fraction: step.fraction, qty };
            }
            debug!(symbol = %position.symbol, qty, "Ladder sell below minimum quantity — holding rung");
        }
    }

    // ── 2. Stop-loss ──────────────────────────────────────────────────────────
    let threshold = config.stop_loss_for(position.asset_type);
    if pnl <= -threshold {
        return ExitDecision::StopLoss { pnl_pct: pnl, threshold };
    }

    // ── 3. Trailing stop ──────────────────────────────────────────────────────
    if state.trail_armed && state.peak_price > 0.0 {
        let drawdown = (position.current_price - state.peak_price) / state.peak_price;
        if drawdown <= -config.trailing_stop_pct {
            return ExitDecision::TrailingStop { drawdown, peak: state.peak_price };
        }
    }

    ExitDecision::Hold
}

// ─── Execution ────────────────────────────────────────────────────────────────

/// Cancel open orders then liquidate.  Cancel failures are logged only.
pub async fn close_fully(broker: &dyn Brokerage, symbol: &str) -> Result<()> {
    if let Err(e) = broker.cancel_orders(symbol).await {
        warn!(symbol, error = %e, "Could not cancel open orders before close");
    }
    broker.close_position(symbol).await.map(|_| ())
}

/// Carry out `decision`.  Runtime state only changes when the brokerage
/// accepted the order.
pub async fn execute(
    broker: &dyn Brokerage,
    config: &ExitConfig,
    store: &mut PositionStore,
    history: &mut HistoryStore,
    position: &Position,
    decision: &ExitDecision,
) -> Result<()> {
    let symbol = position.symbol.as_str();

    match decision {
        ExitDecision::Hold => return Ok(()),
        ExitDecision::TakeProfit { tier, fraction, qty } if *fraction < 1.0 => {
            info!(
                symbol,
                tier = tier + 1,
                fraction,
                qty,
                pnl_pct = position.unrealized_pnl_pct,
                "💰 Profit target — partial sell"
            );
            broker.place_order(&OrderRequest::sell_qty(symbol, *qty)).await?;
            store.advance_tier(symbol, config.ladder.len());
            return Ok(());
        }
        ExitDecision::TakeProfit { tier, .. } => {
            info!(symbol, tier = tier + 1, pnl_pct = position.unrealized_pnl_pct, "💰 Profit target — closing position");
        }
        ExitDecision::StopLoss { pnl_pct, threshold } => {
            info!(symbol, asset_type = ?position.asset_type, pnl_pct, threshold, "🛑 Stop-loss — closing position");
        }
        ExitDecision::TrailingStop { drawdown, peak } => {
            info!(symbol, pnl_pct = position.unrealized_pnl_pct, drawdown, peak, "📈 Trailing stop — closing position");
        }
    }

    close_fully(broker, symbol).await?;
    store.remove(symbol);
    history.remove(symbol);
    Ok(())
}

// ─── Monitor Pass ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ExitRecord {
    pub symbol: String,
    pub decision: ExitDecision,
    pub pnl_pct: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MonitorReport {
    pub evaluated: usize,
    /// Equity positions left alone because the market is closed.
    pub skipped_closed: usize,
    pub exits: Vec<ExitRecord>,
    pub failures: usize,
    pub total_unrealized_pl: f64,
    pub best: Option<(String, f64)>,
    pub worst: Option<(String, f64)>,
}

pub struct PositionMonitor {
    config: ExitConfig,
}

impl PositionMonitor {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    /// One monitor pass over an account snapshot.
    ///
    /// Records every position into `history`, forgets state for symbols that
    /// disappeared from the account, then runs the exit state machine in
    /// snapshot order.
    pub async fn run(
        &self,
        broker: &dyn Brokerage,
        store: &mut PositionStore,
        history: &mut HistoryStore,
        positions: &[Position],
        market_open: bool,
        now: DateTime<Utc>,
    ) -> MonitorReport {
        let mut report = MonitorReport::default();

        let held: HashSet<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        for symbol in store.retain_open(&held) {
            debug!(symbol = %symbol, "Position gone from account — dropping runtime state");
            history.remove(&symbol);
        }

        for p in positions {
            history.record(&p.symbol, now, p.current_price, p.unrealized_pnl_pct);
        }

        if positions.is_empty() {
            return report;
        }

        report.total_unrealized_pl = positions.iter().map(|p| p.unrealized_pl).sum();
        let by_pnl = |a: &&Position, b: &&Position| a.unrealized_pnl_pct.total_cmp(&b.unrealized_pnl_pct);
        report.best = positions.iter().max_by(by_pnl).map(|p| (p.symbol.clone(), p.unrealized_pnl_pct));
        report.worst = positions.iter().min_by(by_pnl).map(|p| (p.symbol.clone(), p.unrealized_pnl_pct));

        info!(
            positions = positions.len(),
            total_pl = report.total_unrealized_pl,
            "📊 Monitoring positions"
        );

        for position in positions {
            if !position.is_crypto() && !market_open {
                report.skipped_closed += 1;
                continue;
            }

            let state = store.observe(position, self.config.trail_activation_pct, now).clone();
            let decision = evaluate(&self.config, position, &state);
            report.evaluated += 1;

            if decision == ExitDecision::Hold {
                continue;
            }

            match execute(broker, &self.config, store, history, position, &decision).await {
                Ok(()) => report.exits.push(ExitRecord {
                    symbol: position.symbol.clone(),
                    decision,
                    pnl_pct: position.unrealized_pnl_pct,
                    at: now,
                }),
                Err(e) => {
                    report.failures += 1;
                    warn!(symbol = %position.symbol, error = %e, ?decision, "❌ Exit order failed — will retry next cycle");
                }
            }
        }

        if let (Some((best, best_pnl)), Some((worst, worst_pnl))) = (&report.best, &report.worst) {
            info!(best = %best, best_pnl, worst = %worst, worst_pnl, "🟢 Best / 🔴 Worst");
        }

        report
    }
}

//! # engine::rotation
//!
//! **Sector Rotation Optimizer** — replaces weak equity positions with
//! same-sector names showing materially stronger momentum, or cuts them
//! when nothing better exists.
//!
//! ## Pass (at most once per interval)
//!
//! ```text
//!  for each held equity (not crypto, not a strong performer)
//!     weak?  pnl ≤ threshold  or  momentum < 0 / unknown
//!        │
//!        ├─ best same-sector candidate beats the bar by the margin ──▶ Swap
//!        └─ none, and pnl ≤ threshold ────────────────────────────▶ Sell
//!
//!  actions sorted worst pnl first, capped at max_actions
//! ```
//!
//! ## Peer watchlist
//!
//! Momentum needs samples spread over the history window, but passes are an
//! interval apart.  Between passes [`RotationOptimizer::observe_peers`] keeps
//! quoting one fixed peer sample per weak sector every cycle; the next pass
//! judges exactly those peers and then draws a fresh sample.
//!
//! ## Two-phase swap
//!
//! ```text
//!  cancel ─▶ close ─▶ PendingReopen recorded ─▶ pause ─▶ open replacement
//!                            │                               │ ok  → cleared
//!                            └──── retried each cycle ◀──────┘ err → attempts += 1
//!                                  abandoned after max_reopen_attempts
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::classifier::{classify, Sector};
use crate::engine::history::HistoryStore;
use crate::engine::monitor::{close_fully, PositionStore};
use crate::engine::universe::UniverseCache;
use crate::engine::Gateways;
use crate::gateway::Brokerage;
use crate::models::{OrderRequest, Position};

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub interval: Duration,
    /// Underperformance threshold, e.g. `-0.025`.
    pub threshold: f64,
    /// Candidate momentum must beat the bar by this factor.
    pub margin: f64,
    pub sample_size: usize,
    pub max_actions: usize,
    pub min_price: f64,
    pub max_price: f64,
    /// Dollar cap on a replacement order.
    pub swap_notional_cap: f64,
    pub max_reopen_attempts: u32,
    pub order_pause: std::time::Duration,
    pub strong_performers: HashSet<String>,
    pub blacklist: HashSet<String>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::minutes(10),
            threshold: -0.025,
            margin: 1.5,
            sample_size: 20,
            max_actions: 5,
            min_price: 2.0,
            max_price: 10_000.0,
            swap_notional_cap: 1_800.0,
            max_reopen_attempts: 3,
            order_pause: std::time::Duration::from_secs(1),
            strong_performers: HashSet::new(),
            blacklist: HashSet::new(),
        }
    }
}

// ─── Actions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationAction {
    Swap {
        symbol: String,
        replacement: String,
        sector: Sector,
        pnl_pct: f64,
        momentum: Option<f64>,
        replacement_momentum: f64,
        notional: f64,
    },
    Sell {
        symbol: String,
        sector: Sector,
        pnl_pct: f64,
        momentum: Option<f64>,
    },
}

impl RotationAction {
    pub fn symbol(&self) -> &str {
        match self {
            RotationAction::Swap { symbol, .. } | RotationAction::Sell { symbol, .. } => symbol,
        }
    }

    pub fn pnl_pct(&self) -> f64 {
        match self {
            RotationAction::Swap { pnl_pct, .. } | RotationAction::Sell { pnl_pct, .. } => *pnl_pct,
        }
    }
}

/// Second half of a swap whose close already went through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReopen {
    pub symbol: String,
    pub notional: f64,
    pub replaced: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct RotationReport {
    pub planned: Vec<RotationAction>,
    /// Actions whose close went through.
    pub executed: Vec<RotationAction>,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct ReopenReport {
    pub reopened: Vec<PendingReopen>,
    pub abandoned: Vec<PendingReopen>,
}

/// `candidate` beats `bar` by `margin`.  For a negative bar the margin
/// relaxes towards zero instead of pushing the requirement further down.
pub fn beats(candidate: f64, bar: f64, margin: f64) -> bool {
    let required = if bar >= 0.0 { bar * margin } else { bar / margin };
    candidate > required
}

// ─── Optimizer ────────────────────────────────────────────────────────────────

pub struct RotationOptimizer {
    config: RotationConfig,
    last_run: Option<DateTime<Utc>>,
    pending: Vec<PendingReopen>,
    watchlist: HashMap<Sector, Vec<String>>,
}

impl RotationOptimizer {
    pub fn new(config: RotationConfig) -> Self {
        Self { config, last_run: None, pending: Vec::new(), watchlist: HashMap::new() }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_run.map_or(true, |at| now - at >= self.config.interval)
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub fn pending(&self) -> &[PendingReopen] {
        &self.pending
    }

    pub fn pending_symbols(&self) -> HashSet<String> {
        self.pending.iter().map(|p| p.symbol.clone()).collect()
    }

    pub fn watched(&self, sector: Sector) -> &[String] {
        self.watchlist.get(&sector).map_or(&[], Vec::as_slice)
    }

    /// A rotation target: an equity outside the allow-list that is either
    /// under the threshold or not trending up.
    fn is_weak(&self, p: &Position, momentum: Option<f64>) -> bool {
        if p.is_crypto() || self.config.strong_performers.contains(&p.symbol) {
            return false;
        }
        p.unrealized_pnl_pct <= self.config.threshold || !momentum.is_some_and(|m| m >= 0.0)
    }

    /// Same-sector universe names that may still be bought.
    async fn eligible_peers(
        &self,
        gw: Gateways<'_>,
        universe: &mut UniverseCache,
        sector: Sector,
        excluded: &HashSet<&str>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let pending = self.pending_symbols();
        universe
            .get_universe(gw.assets, now)
            .await
            .into_iter()
            .filter(|s| {
                classify(s).sector == sector
                    && !excluded.contains(s.as_str())
                    && !self.config.blacklist.contains(s)
                    && !pending.contains(s)
            })
            .collect()
    }

    /// Quote the watched peers of every weak sector and record them into
    /// `history`.  Runs each cycle between passes; returns the number of
    /// samples recorded.
    pub async fn observe_peers(
        &mut self,
        gw: Gateways<'_>,
        universe: &mut UniverseCache,
        history: &mut HistoryStore,
        positions: &[Position],
        now: DateTime<Utc>,
    ) -> usize {
        let held: HashSet<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        let sectors: HashSet<Sector> = positions
            .iter()
            .filter(|p| p.sector != Sector::Other && self.is_weak(p, history.momentum(&p.symbol)))
            .map(|p| p.sector)
            .collect();

        let mut recorded = 0;
        for sector in sectors {
            if !self.watchlist.contains_key(&sector) {
                let peers = self.eligible_peers(gw, universe, sector, &held, now).await;
                let sample = gw.selector.select(&peers, self.config.sample_size);
                debug!(?sector, watched = sample.len(), "Peer watchlist drawn");
                self.watchlist.insert(sector, sample);
            }

            for symbol in self.watched(sector).to_vec() {
                if held.contains(symbol.as_str()) {
                    continue;
                }
                let Some(quote) = gw.quotes.get_price(&symbol).await else {
                    continue;
                };
                if history.record(&symbol, now, quote.price, 0.0) {
                    recorded += 1;
                }
            }
        }
        recorded
    }

    /// Best same-sector replacement for `weak`, if one clears the margin.
    /// The watched sample is preferred; a fresh one is drawn only when no
    /// watched peer is still eligible.
    async fn find_alternative(
        &self,
        gw: Gateways<'_>,
        universe: &mut UniverseCache,
        history: &mut HistoryStore,
        weak: &Position,
        baseline: f64,
        excluded: &HashSet<&str>,
        now: DateTime<Utc>,
    ) -> Option<(String, f64)> {
        if weak.sector == Sector::Other {
            return None;
        }

        let peers = self.eligible_peers(gw, universe, weak.sector, excluded, now).await;
        let watched: Vec<String> = self
            .watched(weak.sector)
            .iter()
            .filter(|s| peers.contains(s))
            .cloned()
            .collect();
        let sample = if watched.is_empty() {
            gw.selector.select(&peers, self.config.sample_size)
        } else {
            watched
        };

        let mut best = None;
        let mut bar = baseline;

        for candidate in sample {
            let Some(quote) = gw.quotes.get_price(&candidate).await else {
                continue;
            };
            if quote.price < self.config.min_price || quote.price > self.config.max_price {
                continue;
            }

            history.record(&candidate, now, quote.price, 0.0);
            let Some(momentum) = history.momentum(&candidate) else {
                continue;
            };

            if beats(momentum, bar, self.config.margin) {
                debug!(symbol = %weak.symbol, candidate = %candidate, momentum, bar, "Stronger sector peer");
                bar = momentum;
                best = Some((candidate, momentum));
            }
        }

        best
    }

    /// Decide what to do with the current positions.  Read-only towards the
    /// brokerage; candidate quotes are recorded into `history`.
    pub async fn plan(
        &self,
        gw: Gateways<'_>,
        universe: &mut UniverseCache,
        history: &mut HistoryStore,
        positions: &[Position],
        now: DateTime<Utc>,
    ) -> Vec<RotationAction> {
        let held: HashSet<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        // Replacements already chosen this pass
        let mut claimed: HashSet<String> = HashSet::new();
        let mut actions = Vec::new();

        for p in positions {
            let pnl = p.unrealized_pnl_pct;
            let momentum = history.momentum(&p.symbol);
            if !self.is_weak(p, momentum) {
                continue;
            }
            let underwater = pnl <= self.config.threshold;

            let excluded: HashSet<&str> = held
                .iter()
                .copied()
                .chain(claimed.iter().map(String::as_str))
                .collect();
            let baseline = momentum.unwrap_or(pnl);

            match self.find_alternative(gw, universe, history, p, baseline, &excluded, now).await {
                Some((replacement, replacement_momentum)) => {
                    claimed.insert(replacement.clone());
                    actions.push(RotationAction::Swap {
                        symbol: p.symbol.clone(),
                        replacement,
                        sector: p.sector,
                        pnl_pct: pnl,
                        momentum,
                        replacement_momentum,
                        notional: p.market_value.min(self.config.swap_notional_cap),
                    });
                }
                None if underwater => actions.push(RotationAction::Sell {
                    symbol: p.symbol.clone(),
                    sector: p.sector,
                    pnl_pct: pnl,
                    momentum,
                }),
                None => {}
            }
        }

        actions.sort_by(|a, b| a.pnl_pct().total_cmp(&b.pnl_pct()));
        actions.truncate(self.config.max_actions);
        actions
    }

    /// One optimization pass.  Marks the interval as used even when nothing
    /// needed doing.
    pub async fn run(
        &mut self,
        gw: Gateways<'_>,
        universe: &mut UniverseCache,
        store: &mut PositionStore,
        history: &mut HistoryStore,
        positions: &[Position],
        now: DateTime<Utc>,
    ) -> RotationReport {
        let mut report = RotationReport::default();
        if positions.is_empty() {
            self.watchlist.clear();
            self.last_run = Some(now);
            return report;
        }

        info!(positions = positions.len(), "🔧 Sector rotation pass");
        report.planned = self.plan(gw, universe, history, positions, now).await;

        if report.planned.is_empty() {
            info!("✅ Portfolio healthy — no rotation needed");
        }

        for action in report.planned.clone() {
            if self.execute(gw.broker, store, history, &action, now).await {
                report.executed.push(action);
            } else {
                report.failed += 1;
            }
        }

        info!(
            planned = report.planned.len(),
            executed = report.executed.len(),
            failed = report.failed,
            pending = self.pending.len(),
            "🔧 Rotation pass complete"
        );

        self.watchlist.clear();
        self.last_run = Some(now);
        report
    }

    /// Returns `true` when the weak position was closed.
    async fn execute(
        &mut self,
        broker: &dyn Brokerage,
        store: &mut PositionStore,
        history: &mut HistoryStore,
        action: &RotationAction,
        now: DateTime<Utc>,
    ) -> bool {
        let symbol = action.symbol();

        match action {
            RotationAction::Swap { replacement, sector, pnl_pct, momentum, replacement_momentum, .. } => {
                info!(
                    symbol,
                    replacement = %replacement,
                    ?sector,
                    pnl_pct,
                    momentum = ?momentum,
                    replacement_momentum,
                    "🔄 Sector swap"
                );
            }
            RotationAction::Sell { sector, pnl_pct, momentum, .. } => {
                info!(symbol, ?sector, pnl_pct, momentum = ?momentum, "📤 Sector sell — no stronger peer, cutting loss");
            }
        }

        if let Err(e) = close_fully(broker, symbol).await {
            warn!(symbol, error = %e, "❌ Rotation close failed — action dropped");
            return false;
        }
        store.remove(symbol);
        history.remove(symbol);

        if let RotationAction::Swap { replacement, notional, .. } = action {
            self.pending.push(PendingReopen {
                symbol: replacement.clone(),
                notional: *notional,
                replaced: symbol.to_string(),
                created_at: now,
                attempts: 0,
            });
            tokio::time::sleep(self.config.order_pause).await;
            self.reopen_last(broker).await;
        }

        true
    }

    async fn reopen_last(&mut self, broker: &dyn Brokerage) {
        let Some(mut intent) = self.pending.pop() else {
            return;
        };

        match broker.place_order(&OrderRequest::buy_notional(&intent.symbol, intent.notional)).await {
            Ok(ack) => {
                info!(symbol = %intent.symbol, notional = intent.notional, order_id = %ack.id, "✅ Swap complete");
            }
            Err(e) => {
                intent.attempts += 1;
                warn!(symbol = %intent.symbol, error = %e, attempts = intent.attempts, "❌ Replacement order failed — pending reopen kept");
                self.pending.push(intent);
            }
        }
    }

    /// Retry every pending reopen once.  Equity reopens wait for the market.
    pub async fn retry_pending(&mut self, broker: &dyn Brokerage, market_open: bool) -> ReopenReport {
        let mut report = ReopenReport::default();
        let mut still_pending = Vec::new();

        for mut intent in std::mem::take(&mut self.pending) {
            if !market_open && !classify(&intent.symbol).asset_type.is_crypto() {
                still_pending.push(intent);
                continue;
            }

            match broker.place_order(&OrderRequest::buy_notional(&intent.symbol, intent.notional)).await {
                Ok(_) => {
                    info!(symbol = %intent.symbol, replaced = %intent.replaced, "✅ Pending reopen filled");
                    report.reopened.push(intent);
                }
                Err(e) => {
                    intent.attempts += 1;
                    if intent.attempts >= self.config.max_reopen_attempts {
                        error!(
                            symbol = %intent.symbol,
                            replaced = %intent.replaced,
                            notional = intent.notional,
                            attempts = intent.attempts,
                            error = %e,
                            "🚨 Reopen abandoned — slot left in cash"
                        );
                        report.abandoned.push(intent);
                    } else {
                        warn!(symbol = %intent.symbol, attempts = intent.attempts, error = %e, "Reopen retry failed");
                        still_pending.push(intent);
                    }
                }
            }
        }

        self.pending = still_pending;
        report
    }
}

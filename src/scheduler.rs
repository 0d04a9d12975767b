//! # scheduler
//!
//! The control loop.  One task, one cycle at a time:
//!
//! ```text
//!  loop:
//!    clock ─▶ retry pending reopens ─▶ account + positions ─▶ scan & enter
//!          ─▶ positions ─▶ monitor exits ─▶ market open: rotation pass when due,
//!                                           otherwise quote the watched peers
//!          ─▶ account summary (every N cycles) ─▶ publish snapshot
//!    sleep scan_interval          (error_backoff after a failed cycle)
//! ```
//!
//! The loop is the only writer of every engine store.  A shutdown signal is
//! honoured between cycles: the cycle in flight always completes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::TraderConfig;
use crate::engine::history::HistoryStore;
use crate::engine::monitor::{PositionMonitor, PositionStore};
use crate::engine::quotes::QuoteClient;
use crate::engine::rotation::{RotationOptimizer, RotationReport};
use crate::engine::scanner::{EntryScanner, ScanReport};
use crate::engine::selector::{CandidateSelector, RandomSelector};
use crate::engine::universe::UniverseCache;
use crate::engine::Gateways;
use crate::error::Result;
use crate::events::MonitorEvent;
use crate::gateway::{Brokerage, QuoteSource, UniverseSource};
use crate::models::{Account, Position};
use crate::state::{SharedState, StatusSnapshot, TrackedPosition};

/// What one cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub market_open: bool,
    pub scan: ScanReport,
    pub exits: usize,
    pub rotation: Option<RotationReport>,
    pub reopened: usize,
    pub abandoned: usize,
    /// Peer quotes recorded between rotation passes.
    pub peer_samples: usize,
}

#[derive(Debug, Clone)]
pub struct LoopTiming {
    pub scan_interval: Duration,
    pub error_backoff: Duration,
    pub summary_every: u64,
}

pub struct Trader {
    broker: Arc<dyn Brokerage>,
    assets: Arc<dyn UniverseSource>,
    quotes: QuoteClient,
    selector: Box<dyn CandidateSelector>,

    scanner: EntryScanner,
    monitor: PositionMonitor,
    optimizer: RotationOptimizer,

    store: PositionStore,
    history: HistoryStore,
    universe: UniverseCache,

    state: SharedState,
    timing: LoopTiming,
    cycle: u64,
    baseline_equity: Option<f64>,
    snapshot: StatusSnapshot,
}

impl Trader {
    /// Wire the loop to a single client implementing all three gateways.
    pub fn new<C>(config: &TraderConfig, client: Arc<C>, state: SharedState) -> Self
    where
        C: Brokerage + QuoteSource + UniverseSource + 'static,
    {
        Self::with_parts(config, client.clone(), client.clone(), client, Box::new(RandomSelector), state)
    }

    pub fn with_parts(
        config: &TraderConfig,
        broker: Arc<dyn Brokerage>,
        assets: Arc<dyn UniverseSource>,
        quotes: Arc<dyn QuoteSource>,
        selector: Box<dyn CandidateSelector>,
        state: SharedState,
    ) -> Self {
        Self {
            broker,
            assets,
            quotes: QuoteClient::new(quotes, config.quote_timeout),
            selector,
            scanner: EntryScanner::new(config.scan.clone()),
            monitor: PositionMonitor::new(config.exits.clone()),
            optimizer: RotationOptimizer::new(config.rotation.clone()),
            store: PositionStore::new(),
            history: HistoryStore::new(config.history_window),
            universe: UniverseCache::new(config.universe_refresh, config.blacklist.clone()),
            timing: LoopTiming {
                scan_interval: config.scan_interval,
                error_backoff: config.error_backoff,
                summary_every: config.summary_every,
            },
            cycle: 0,
            baseline_equity: None,
            snapshot: StatusSnapshot { started_at: Utc::now(), ..StatusSnapshot::default() },
            state,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Run until `shutdown` resolves.  Failed cycles are logged and followed
    /// by the longer error backoff; nothing short of the signal stops the loop.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        info!(
            interval = ?self.timing.scan_interval,
            backoff  = ?self.timing.error_backoff,
            "🤖 Position manager loop started"
        );

        loop {
            let pause = match self.run_cycle(Utc::now()).await {
                Ok(_) => self.timing.scan_interval,
                Err(e) => {
                    error!(cycle = self.cycle, error = %e, "❌ Cycle failed — backing off");
                    self.snapshot.failed_cycles += 1;
                    self.snapshot.last_error = Some(e.to_string());
                    self.state.publish(self.snapshot.clone()).await;
                    self.state.broadcast(&MonitorEvent::CycleFailed { cycle: self.cycle, error: e.to_string() });
                    self.timing.error_backoff
                }
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(cycle = self.cycle, "⚠️  Shutdown requested — loop stopped");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// One full cycle.  Errors from the clock, account or position snapshot
    /// abort the cycle; everything per-symbol is handled inside the engine.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport { cycle: self.cycle, ..CycleReport::default() };

        let market_open = self.broker.clock().await?.is_open;
        report.market_open = market_open;
        info!(
            cycle = self.cycle,
            market = if market_open { "STOCKS + CRYPTO" } else { "CRYPTO ONLY" },
            "⏱️  Cycle start"
        );

        // ── Pending swap legs ─────────────────────────────────────────────────
        if !self.optimizer.pending().is_empty() {
            let reopen = self.optimizer.retry_pending(self.broker.as_ref(), market_open).await;
            report.reopened = reopen.reopened.len();
            report.abandoned = reopen.abandoned.len();
            for r in reopen.reopened {
                self.state.broadcast(&MonitorEvent::ReopenFilled { reopen: r });
            }
            for r in reopen.abandoned {
                self.state.broadcast(&MonitorEvent::ReopenAbandoned { reopen: r });
            }
        }

        // ── Scan & enter ──────────────────────────────────────────────────────
        let account = self.broker.account().await?;
        self.baseline_equity.get_or_insert(account.portfolio_value);
        let positions = self.broker.positions().await?;
        let excluded = self.optimizer.pending_symbols();
        let gw = Gateways {
            broker: self.broker.as_ref(),
            assets: self.assets.as_ref(),
            quotes: &self.quotes,
            selector: self.selector.as_ref(),
        };
        report.scan = self
            .scanner
            .scan_and_enter(gw, &mut self.universe, &positions, &excluded, &account, market_open, now)
            .await;
        for entry in &report.scan.entered {
            self.state.broadcast(&MonitorEvent::PositionEntered { entry: entry.clone() });
        }

        // ── Monitor exits ─────────────────────────────────────────────────────
        let positions = self.broker.positions().await?;
        let monitored = self
            .monitor
            .run(self.broker.as_ref(), &mut self.store, &mut self.history, &positions, market_open, now)
            .await;
        report.exits = monitored.exits.len();
        for exit in monitored.exits {
            self.state.broadcast(&MonitorEvent::PositionExited { exit });
        }

        // ── Rotation ──────────────────────────────────────────────────────────
        let mut positions = positions;
        if market_open && report.exits > 0 {
            positions = self.broker.positions().await?;
        }
        let gw = Gateways {
            broker: self.broker.as_ref(),
            assets: self.assets.as_ref(),
            quotes: &self.quotes,
            selector: self.selector.as_ref(),
        };
        if market_open && !self.optimizer.is_due(now) {
            report.peer_samples = self
                .optimizer
                .observe_peers(gw, &mut self.universe, &mut self.history, &positions, now)
                .await;
        } else if market_open {
            let rotation = self
                .optimizer
                .run(gw, &mut self.universe, &mut self.store, &mut self.history, &positions, now)
                .await;
            for action in &rotation.executed {
                self.state.broadcast(&MonitorEvent::RotationExecuted { action: action.clone() });
            }
            if !rotation.executed.is_empty() {
                positions = self.broker.positions().await?;
            }
            report.rotation = Some(rotation);
        }

        self.history.prune_stale(now);

        // ── Account summary ───────────────────────────────────────────────────
        if self.cycle % self.timing.summary_every == 0 {
            self.account_summary(&account);
        }

        self.publish(&report, &account, &positions, now).await;
        Ok(report)
    }

    fn account_summary(&mut self, account: &Account) {
        let baseline = self.baseline_equity.unwrap_or(account.portfolio_value);
        let change_pct = if baseline > 0.0 {
            (account.portfolio_value - baseline) / baseline * 100.0
        } else {
            0.0
        };

        info!(
            portfolio = format!("{:.2}", account.portfolio_value),
            cash = format!("{:.2}", account.cash),
            change_pct = format!("{change_pct:+.3}"),
            "💰 Account summary"
        );
        self.state.broadcast(&MonitorEvent::AccountSummary {
            portfolio_value: account.portfolio_value,
            cash: account.cash,
            buying_power: account.buying_power,
            change_pct,
        });
    }

    async fn publish(&mut self, report: &CycleReport, account: &Account, positions: &[Position], now: DateTime<Utc>) {
        let snap = &mut self.snapshot;
        snap.cycle = self.cycle;
        snap.last_cycle_at = Some(now);
        snap.market_open = report.market_open;
        snap.account = Some(*account);
        snap.positions = positions
            .iter()
            .map(|p| TrackedPosition {
                position: p.clone(),
                runtime: self.store.get(&p.symbol).cloned(),
                momentum: self.history.momentum(&p.symbol),
            })
            .collect();
        snap.pending_reopens = self.optimizer.pending().to_vec();
        snap.universe_size = self.universe.len();
        snap.last_rotation_at = self.optimizer.last_run();
        snap.entries_total += report.scan.entered.len() as u64;
        snap.exits_total += report.exits as u64;
        snap.rotations_total += report.rotation.as_ref().map_or(0, |r| r.executed.len()) as u64;
        snap.last_error = None;

        self.state.publish(snap.clone()).await;

        let total_unrealized_pl: f64 = positions.iter().map(|p| p.unrealized_pl).sum();
        self.state.broadcast(&MonitorEvent::CycleCompleted {
            cycle: self.cycle,
            market_open: report.market_open,
            positions: positions.len(),
            total_unrealized_pl,
            at: now,
        });

        if report.scan.failed > 0 || report.abandoned > 0 {
            warn!(
                cycle = self.cycle,
                failed_entries = report.scan.failed,
                abandoned_reopens = report.abandoned,
                "Cycle finished with failures"
            );
        }
    }
}

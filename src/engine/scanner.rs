//! # engine::scanner
//!
//! **Scan-and-Enter** — opens new positions while slots are free.
//!
//! ```text
//!  slots = max_positions - held
//!  candidates = crypto (always) + universe equities (market open only)
//!               − held − blacklisted − pending reopens
//!  sample ≤ min(max_new_per_scan, slots) via CandidateSelector
//!  each: quote → price floor → size tier → buying power → notional buy
//! ```
//!
//! Sampling is deliberately unranked.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{classify, CRYPTO_SYMBOLS};
use crate::engine::universe::UniverseCache;
use crate::engine::Gateways;
use crate::models::{Account, OrderRequest, Position};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub max_positions: usize,
    pub max_new_per_scan: usize,
    pub crypto_size: f64,
    pub stock_size: f64,
    pub strong_size: f64,
    pub min_price: f64,
    pub strong_performers: HashSet<String>,
    pub blacklist: HashSet<String>,
    pub order_pause: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_positions: 50,
            max_new_per_scan: 3,
            crypto_size: 600.0,
            stock_size: 1_200.0,
            strong_size: 2_000.0,
            min_price: 2.0,
            strong_performers: HashSet::new(),
            blacklist: HashSet::new(),
            order_pause: Duration::from_secs(1),
        }
    }
}

impl ScanConfig {
    /// Dollar size of a new entry: crypto, strong performer or standard stock.
    pub fn size_for(&self, symbol: &str) -> f64 {
        if classify(symbol).asset_type.is_crypto() {
            self.crypto_size
        } else if self.strong_performers.contains(symbol) {
            self.strong_size
        } else {
            self.stock_size
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryRecord {
    pub symbol: String,
    pub notional: f64,
    pub price: f64,
    pub order_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub candidates: usize,
    pub sampled: usize,
    pub entered: Vec<EntryRecord>,
    pub failed: usize,
}

pub struct EntryScanner {
    config: ScanConfig,
}

impl EntryScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub async fn scan_and_enter(
        &self,
        gw: Gateways<'_>,
        universe: &mut UniverseCache,
        positions: &[Position],
        excluded: &HashSet<String>,
        account: &Account,
        market_open: bool,
        now: DateTime<Utc>,
    ) -> ScanReport {
        let mut report = ScanReport::default();

        let slots = self.config.max_positions.saturating_sub(positions.len());
        if slots == 0 {
            debug!(held = positions.len(), "No free position slots");
            return report;
        }

        let held: HashSet<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        let eligible = |s: &str| !held.contains(s) && !self.config.blacklist.contains(s) && !excluded.contains(s);

        let mut candidates: Vec<String> = CRYPTO_SYMBOLS
            .iter()
            .copied()
            .filter(|s| eligible(*s))
            .map(str::to_string)
            .collect();

        if market_open {
            candidates.extend(
                universe
                    .get_universe(gw.assets, now)
                    .await
                    .into_iter()
                    .filter(|s| eligible(s.as_str())),
            );
        }

        report.candidates = candidates.len();
        if candidates.is_empty() {
            return report;
        }

        let picks = gw.selector.select(&candidates, self.config.max_new_per_scan.min(slots));
        report.sampled = picks.len();
        let mut buying_power = account.buying_power;

        for symbol in picks {
            let Some(quote) = gw.quotes.get_price(&symbol).await else {
                debug!(symbol = %symbol, "No quote — skipping entry");
                continue;
            };
            if quote.price < self.config.min_price {
                debug!(symbol = %symbol, price = quote.price, "Below price floor");
                continue;
            }

            let size = self.config.size_for(&symbol);
            if buying_power < size {
                debug!(symbol = %symbol, size, buying_power, "Insufficient buying power");
                continue;
            }

            info!(
                symbol = %symbol,
                price = quote.price,
                notional = size,
                asset_type = ?classify(&symbol).asset_type,
                "🔵 Entering position"
            );

            match gw.broker.place_order(&OrderRequest::buy_notional(&symbol, size)).await {
                Ok(ack) => {
                    buying_power -= size;
                    report.entered.push(EntryRecord {
                        symbol,
                        notional: size,
                        price: quote.price,
                        order_id: ack.id,
                        at: now,
                    });
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(symbol = %symbol, error = %e, "❌ Entry order failed");
                }
            }

            tokio::time::sleep(self.config.order_pause).await;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::quotes::QuoteClient;
    use crate::models::Asset;
    use crate::testing::{FakeBroker, TakeFirst};
    use std::sync::Arc;

    fn scanner() -> EntryScanner {
        EntryScanner::new(ScanConfig {
            order_pause: Duration::ZERO,
            strong_performers: HashSet::from(["SLV".to_string()]),
            blacklist: HashSet::from(["ETHUSD".to_string()]),
            ..ScanConfig::default()
        })
    }

    fn account(buying_power: f64) -> Account {
        Account { buying_power, portfolio_value: 100_000.0, cash: buying_power }
    }

    fn setup() -> (Arc<FakeBroker>, QuoteClient, UniverseCache) {
        let fake = Arc::new(FakeBroker::new());
        let quotes = QuoteClient::new(fake.clone(), Duration::from_millis(200));
        let universe = UniverseCache::new(chrono::Duration::minutes(30), HashSet::new());
        (fake, quotes, universe)
    }

    fn gw<'a>(fake: &'a FakeBroker, quotes: &'a QuoteClient) -> Gateways<'a> {
        Gateways { broker: fake, assets: fake, quotes, selector: &TakeFirst }
    }

    #[test]
    fn test_size_tiers() {
        let s = scanner();
        assert_eq!(s.config().size_for("BTCUSD"), 600.0);
        assert_eq!(s.config().size_for("SLV"), 2_000.0);
        assert_eq!(s.config().size_for("XOM"), 1_200.0);
    }

    #[tokio::test]
    async fn test_crypto_only_while_market_closed() {
        let (fake, quotes, mut universe) = setup();
        fake.set_assets(vec![Asset {
            symbol: "XOM".into(),
            tradable: true,
            fractionable: true,
            shortable: true,
            easy_to_borrow: true,
        }]);

        let held = vec![Position::new("BTCUSD", 0.01, 100_000.0, 100_000.0)];
        let report = scanner()
            .scan_and_enter(gw(&fake, &quotes), &mut universe, &held, &HashSet::new(), &account(10_000.0), false, Utc::now())
            .await;

        // BTCUSD held and ETHUSD blacklisted leave SOL, AVAX, DOG
        assert_eq!(report.candidates, 3);
        assert_eq!(fake.asset_calls(), 0);
        // DOGUSD falls back to 0.35, below the $2 floor
        let symbols: Vec<String> = fake.orders().into_iter().map(|o| o.symbol).collect();
        assert_eq!(symbols, vec!["SOLUSD", "AVAXUSD"]);
        assert!(fake.orders().iter().all(|o| o.notional.as_deref() == Some("600.00")));
    }

    #[tokio::test]
    async fn test_price_floor_and_buying_power() {
        let (fake, quotes, mut universe) = setup();
        let report = scanner()
            .scan_and_enter(gw(&fake, &quotes), &mut universe, &[], &HashSet::new(), &account(1_000.0), false, Utc::now())
            .await;

        // BTC buys (600); SOL no longer fits in the remaining 400
        assert_eq!(report.sampled, 3);
        assert_eq!(report.entered.len(), 1);
        assert_eq!(report.entered[0].symbol, "BTCUSD");
    }

    #[tokio::test]
    async fn test_no_slots_no_orders() {
        let (fake, quotes, mut universe) = setup();
        let s = EntryScanner::new(ScanConfig { max_positions: 1, order_pause: Duration::ZERO, ..ScanConfig::default() });
        let held = vec![Position::new("XOM", 1.0, 100.0, 100.0)];

        let report = s
            .scan_and_enter(gw(&fake, &quotes), &mut universe, &held, &HashSet::new(), &account(50_000.0), true, Utc::now())
            .await;
        assert_eq!(report.candidates, 0);
        assert!(fake.orders().is_empty());
    }

    #[tokio::test]
    async fn test_pending_reopens_excluded() {
        let (fake, quotes, mut universe) = setup();
        let excluded = HashSet::from(["BTCUSD".to_string(), "SOLUSD".to_string()]);

        let report = scanner()
            .scan_and_enter(gw(&fake, &quotes), &mut universe, &[], &excluded, &account(10_000.0), false, Utc::now())
            .await;
        // ETHUSD blacklisted: AVAX and DOG remain
        assert_eq!(report.candidates, 2);
        assert!(report.entered.iter().all(|e| e.symbol != "BTCUSD" && e.symbol != "SOLUSD"));
    }

    #[tokio::test]
    async fn test_rejected_entry_keeps_buying_power() {
        let (fake, quotes, mut universe) = setup();
        fake.reject_orders(true);
        let report = scanner()
            .scan_and_enter(gw(&fake, &quotes), &mut universe, &[], &HashSet::new(), &account(700.0), false, Utc::now())
            .await;

        assert!(report.entered.is_empty());
        // every pick is attempted against the same 700
        assert_eq!(report.failed, 3);
    }
}

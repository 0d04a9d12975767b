//! # engine::universe
//!
//! **Universe Cache** — the list of equities eligible for entry and rotation.
//!
//! Refreshed from the brokerage at most once per `refresh_interval`.  A
//! failed refresh never empties a populated cache: the stale list keeps
//! being served until the next successful refresh.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::gateway::UniverseSource;
use crate::models::AssetFilter;

pub struct UniverseCache {
    symbols: Vec<String>,
    last_refreshed: Option<DateTime<Utc>>,
    refresh_interval: Duration,
    blacklist: HashSet<String>,
}

impl UniverseCache {
    pub fn new(refresh_interval: Duration, blacklist: HashSet<String>) -> Self {
        Self {
            symbols: Vec::new(),
            last_refreshed: None,
            refresh_interval,
            blacklist,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.last_refreshed {
            Some(at) => !self.symbols.is_empty() && now - at < self.refresh_interval,
            None => false,
        }
    }

    /// Sorted, de-duplicated eligible symbols.
    pub async fn get_universe(&mut self, source: &dyn UniverseSource, now: DateTime<Utc>) -> Vec<String> {
        if self.is_fresh(now) {
            return self.symbols.clone();
        }

        match source.list_assets(&AssetFilter::default()).await {
            Ok(assets) => {
                let total = assets.len();
                let eligible: BTreeSet<String> = assets
                    .into_iter()
                    .filter(|a| a.is_eligible() && !self.blacklist.contains(&a.symbol))
                    .map(|a| a.symbol)
                    .collect();

                self.symbols = eligible.into_iter().collect();
                self.last_refreshed = Some(now);
                info!(total, eligible = self.symbols.len(), "🌐 Universe refreshed");
            }
            Err(e) => {
                warn!(error = %e, cached = self.symbols.len(), "Universe refresh failed — serving cached list");
            }
        }

        self.symbols.clone()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Asset;
    use crate::testing::FakeBroker;

    fn asset(symbol: &str, eligible: bool) -> Asset {
        Asset {
            symbol: symbol.into(),
            tradable: true,
            fractionable: eligible,
            shortable: true,
            easy_to_borrow: true,
        }
    }

    fn cache() -> UniverseCache {
        UniverseCache::new(Duration::minutes(30), HashSet::from(["NVDA".to_string()]))
    }

    #[tokio::test]
    async fn test_filters_sorts_and_dedups() {
        let fake = FakeBroker::new();
        fake.set_assets(vec![
            asset("XOM", true),
            asset("AAPL", true),
            asset("NVDA", true),
            asset("PINK", false),
            asset("AAPL", true),
        ]);

        let symbols = cache().get_universe(&fake, Utc::now()).await;
        assert_eq!(symbols, vec!["AAPL", "XOM"]);
    }

    #[tokio::test]
    async fn test_served_from_cache_within_ttl() {
        let fake = FakeBroker::new();
        fake.set_assets(vec![asset("XOM", true)]);
        let mut cache = cache();
        let t0 = Utc::now();

        cache.get_universe(&fake, t0).await;
        fake.set_assets(vec![asset("CVX", true)]);

        assert_eq!(cache.get_universe(&fake, t0 + Duration::minutes(10)).await, vec!["XOM"]);
        assert_eq!(fake.asset_calls(), 1);

        assert_eq!(cache.get_universe(&fake, t0 + Duration::minutes(31)).await, vec!["CVX"]);
        assert_eq!(fake.asset_calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_list_survives_provider_failure() {
        let fake = FakeBroker::new();
        fake.set_assets(vec![asset("XOM", true), asset("CVX", true)]);
        let mut cache = cache();
        let t0 = Utc::now();
        cache.get_universe(&fake, t0).await;

        fake.fail_assets(true);
        let symbols = cache.get_universe(&fake, t0 + Duration::hours(2)).await;
        assert_eq!(symbols, vec!["CVX", "XOM"]);
        assert_eq!(cache.last_refreshed(), Some(t0));
    }

    #[tokio::test]
    async fn test_empty_when_never_populated() {
        let fake = FakeBroker::new();
        fake.fail_assets(true);
        assert!(cache().get_universe(&fake, Utc::now()).await.is_empty());
    }
}

//! In-memory brokerage used by unit tests.  Records every call and lets a
//! test script failures per endpoint.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::selector::CandidateSelector;
use crate::error::{Result, TraderError};
use crate::gateway::{Brokerage, QuoteSource, UniverseSource};
use crate::models::{Account, Asset, AssetFilter, Clock, OrderAck, OrderRequest, Position, Quote};

#[derive(Default)]
struct Inner {
    account: Account,
    positions: Vec<Position>,
    market_open: bool,
    quotes: HashMap<String, (f64, f64)>,
    quote_delay: Option<Duration>,
    assets: Vec<Asset>,
    fail_assets: bool,
    asset_calls: usize,
    reject_orders: bool,
    fail_close: bool,
    fail_positions: bool,
    orders: Vec<OrderRequest>,
    cancels: Vec<String>,
    closes: Vec<String>,
    account_calls: usize,
}

#[derive(Default)]
pub struct FakeBroker {
    inner: Mutex<Inner>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    // ── Scripting ────────────────────────────────────────────────────────────

    pub fn set_account(&self, account: Account) {
        self.with(|i| i.account = account);
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        self.with(|i| i.positions = positions);
    }

    pub fn set_market_open(&self, open: bool) {
        self.with(|i| i.market_open = open);
    }

    pub fn set_quote(&self, symbol: &str, bid: f64, ask: f64) {
        self.with(|i| i.quotes.insert(symbol.to_string(), (bid, ask)));
    }

    pub fn set_quote_delay(&self, delay: Duration) {
        self.with(|i| i.quote_delay = Some(delay));
    }

    pub fn set_assets(&self, assets: Vec<Asset>) {
        self.with(|i| i.assets = assets);
    }

    pub fn fail_assets(&self, fail: bool) {
        self.with(|i| i.fail_assets = fail);
    }

    pub fn reject_orders(&self, reject: bool) {
        self.with(|i| i.reject_orders = reject);
    }

    pub fn fail_close(&self, fail: bool) {
        self.with(|i| i.fail_close = fail);
    }

    pub fn fail_positions(&self, fail: bool) {
        self.with(|i| i.fail_positions = fail);
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    /// Accepted orders, in submission order.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.with(|i| i.orders.clone())
    }

    pub fn cancels(&self) -> Vec<String> {
        self.with(|i| i.cancels.clone())
    }

    pub fn closes(&self) -> Vec<String> {
        self.with(|i| i.closes.clone())
    }

    pub fn asset_calls(&self) -> usize {
        self.with(|i| i.asset_calls)
    }

    pub fn account_calls(&self) -> usize {
        self.with(|i| i.account_calls)
    }
}

#[async_trait]
impl Brokerage for FakeBroker {
    async fn account(&self) -> Result<Account> {
        Ok(self.with(|i| {
            i.account_calls += 1;
            i.account
        }))
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        self.with(|i| {
            if i.fail_positions {
                Err(TraderError::Network("connection reset".into()))
            } else {
                Ok(i.positions.clone())
            }
        })
    }

    async fn clock(&self) -> Result<Clock> {
        Ok(Clock { is_open: self.with(|i| i.market_open), next_open: None, next_close: None })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        self.with(|i| {
            if i.reject_orders {
                return Err(TraderError::Rejected {
                    symbol: order.symbol.clone(),
                    reason: "insufficient buying power".into(),
                });
            }
            i.orders.push(order.clone());
            Ok(OrderAck {
                id: format!("ord-{}", i.orders.len()),
                client_order_id: Some(order.client_order_id.clone()),
                symbol: Some(order.symbol.clone()),
                status: Some("accepted".into()),
            })
        })
    }

    async fn cancel_orders(&self, symbol: &str) -> Result<usize> {
        self.with(|i| i.cancels.push(symbol.to_string()));
        Ok(0)
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderAck> {
        self.with(|i| {
            if i.fail_close {
                return Err(TraderError::Api { status: 500, message: "close failed".into() });
            }
            i.closes.push(symbol.to_string());
            i.positions.retain(|p| p.symbol != symbol);
            Ok(OrderAck {
                id: format!("close-{}", i.closes.len()),
                client_order_id: None,
                symbol: Some(symbol.to_string()),
                status: Some("accepted".into()),
            })
        })
    }
}

#[async_trait]
impl QuoteSource for FakeBroker {
    async fn latest_quote(&self, symbol: &str) -> Result<Quote> {
        let (quote, delay) = self.with(|i| (i.quotes.get(symbol).copied(), i.quote_delay));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        quote
            .map(|(bid, ask)| Quote::live(bid, ask))
            .ok_or_else(|| TraderError::Api { status: 404, message: format!("no quote for {symbol}") })
    }
}

#[async_trait]
impl UniverseSource for FakeBroker {
    async fn list_assets(&self, _filter: &AssetFilter) -> Result<Vec<Asset>> {
        self.with(|i| {
            i.asset_calls += 1;
            if i.fail_assets {
                Err(TraderError::Timeout("assets".into()))
            } else {
                Ok(i.assets.clone())
            }
        })
    }
}

/// Deterministic selector: the first `count` candidates in order.
pub struct TakeFirst;

impl CandidateSelector for TakeFirst {
    fn select(&self, candidates: &[String], count: usize) -> Vec<String> {
        candidates.iter().take(count).cloned().collect()
    }
}

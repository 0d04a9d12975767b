//! # engine::quotes
//!
//! **Quote Client** — the latest price for a symbol, or nothing.
//!
//! ```text
//!  latest_quote (bounded by timeout)
//!     │ ok + well formed ──▶ Quote { origin: Live }
//!     │ error / timeout / crossed / non-positive
//!     ▼
//!  static fallback table
//!     │ hit  ──▶ Quote { origin: Fallback }
//!     │ miss ──▶ None   (caller skips the symbol)
//! ```
//!
//! Stateless per call: nothing is cached between cycles.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::classifier::normalize;
use crate::gateway::QuoteSource;
use crate::models::Quote;

/// Last-resort prices used while the market-data service is unavailable.
const FALLBACK_PRICES: &[(&str, f64)] = &[
    ("SPY", 610.0),
    ("QQQ", 530.0),
    ("TSLA", 350.0),
    ("AMD", 120.0),
    ("AAPL", 230.0),
    ("MSFT", 445.0),
    ("GOOGL", 195.0),
    ("AMZN", 230.0),
    ("BTCUSD", 108_000.0),
    ("ETHUSD", 3_400.0),
    ("SOLUSD", 250.0),
    ("AVAXUSD", 40.0),
    ("DOGUSD", 0.35),
];

pub fn fallback_price(symbol: &str) -> Option<f64> {
    let symbol = normalize(symbol);
    FALLBACK_PRICES
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, price)| *price)
}

pub struct QuoteClient {
    source: Arc<dyn QuoteSource>,
    timeout: Duration,
}

impl QuoteClient {
    pub fn new(source: Arc<dyn QuoteSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// `None` means NotAvailable: no live quote and no fallback entry.
    pub async fn get_price(&self, symbol: &str) -> Option<Quote> {
        match tokio::time::timeout(self.timeout, self.source.latest_quote(symbol)).await {
            Ok(Ok(quote)) if quote.is_well_formed() => return Some(quote),
            Ok(Ok(quote)) => {
                debug!(symbol, bid = quote.bid, ask = quote.ask, "Quote rejected as malformed");
            }
            Ok(Err(e)) => debug!(symbol, error = %e, "Quote service failed"),
            Err(_) => debug!(symbol, timeout = ?self.timeout, "Quote service timed out"),
        }

        let quote = fallback_price(symbol).map(Quote::fallback);
        if let Some(q) = &quote {
            debug!(symbol, price = q.price, "Using fallback price");
        }
        quote
    }
}

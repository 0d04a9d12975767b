//! # models::quote
//!
//! A top-of-book quote, either live from the market-data service or taken
//! from the static fallback table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteOrigin {
    Live,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    /// Mid price, used by sizing and filters.
    pub price: f64,
    pub origin: QuoteOrigin,
}

impl Quote {
    pub fn live(bid: f64, ask: f64) -> Self {
        Self { bid, ask, price: (bid + ask) / 2.0, origin: QuoteOrigin::Live }
    }

    /// Fallback entries only know one price; bid and ask collapse onto it.
    pub fn fallback(price: f64) -> Self {
        Self { bid: price, ask: price, price, origin: QuoteOrigin::Fallback }
    }

    /// A quote the engine can trust: finite, positive, not crossed.
    pub fn is_well_formed(&self) -> bool {
        self.bid.is_finite()
            && self.ask.is_finite()
            && self.bid > 0.0
            && self.ask > 0.0
            && self.ask >= self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_price() {
        let q = Quote::live(99.0, 101.0);
        assert_eq!(q.price, 100.0);
        assert!(q.is_well_formed());
    }

    #[test]
    fn test_malformed_quotes() {
        assert!(!Quote::live(0.0, 101.0).is_well_formed());
        assert!(!Quote::live(102.0, 101.0).is_well_formed());
        assert!(!Quote::live(f64::NAN, 1.0).is_well_formed());
    }
}

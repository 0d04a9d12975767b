//! # models::position
//!
//! Account-side views the manager reads every cycle: [`Position`],
//! [`Account`], [`Clock`] and the tradeable [`Asset`] list.
//!
//! None of these are owned by the manager; they are rebuilt from the
//! brokerage on every tick.  What the manager *does* own lives in
//! `engine::monitor::PositionStore` and `engine::history::HistoryStore`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{classify, AssetType, Sector};

// ─── Position ─────────────────────────────────────────────────────────────────

/// An open position as reported by the brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Fractional quantities are allowed.
    pub qty: f64,
    pub entry_price: f64,
    pub current_price: f64,
    /// `(current - entry) / entry`, e.g. `-0.05` for a 5 % loss.
    pub unrealized_pnl_pct: f64,
    /// Unrealised P/L in account currency.
    pub unrealized_pl: f64,
    pub market_value: f64,
    pub asset_type: AssetType,
    pub sector: Sector,
}

impl Position {
    /// Build a position from raw numbers; P/L figures and classification are
    /// derived here so every caller sees the same arithmetic.
    pub fn new(symbol: impl Into<String>, qty: f64, entry_price: f64, current_price: f64) -> Self {
        let symbol = symbol.into();
        let class = classify(&symbol);
        let unrealized_pnl_pct = if entry_price > 0.0 {
            (current_price - entry_price) / entry_price
        } else {
            0.0
        };

        Self {
            qty,
            entry_price,
            current_price,
            unrealized_pnl_pct,
            unrealized_pl: (current_price - entry_price) * qty,
            market_value: current_price * qty,
            asset_type: class.asset_type,
            sector: class.sector,
            symbol,
        }
    }

    #[inline]
    pub fn is_crypto(&self) -> bool {
        self.asset_type.is_crypto()
    }
}

// ─── Account ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Account {
    pub buying_power: f64,
    pub portfolio_value: f64,
    pub cash: f64,
}

// ─── Clock ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    pub is_open: bool,
    #[serde(default)]
    pub next_open: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_close: Option<DateTime<Utc>>,
}

// ─── Asset ────────────────────────────────────────────────────────────────────

/// One entry of the brokerage's asset list.
///
/// Missing flags follow the brokerage's conservative reading: an asset is
/// not tradable / fractionable / shortable unless it says so, but it is
/// considered easy to borrow unless told otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    #[serde(default)]
    pub tradable: bool,
    #[serde(default)]
    pub fractionable: bool,
    #[serde(default)]
    pub shortable: bool,
    #[serde(default = "default_true")]
    pub easy_to_borrow: bool,
}

fn default_true() -> bool {
    true
}

impl Asset {
    /// Passes all four quality flags.
    pub fn is_eligible(&self) -> bool {
        self.tradable && self.fractionable && self.shortable && self.easy_to_borrow
    }
}

/// Query parameters for the asset listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetFilter {
    pub status: &'static str,
    pub asset_class: &'static str,
}

impl Default for AssetFilter {
    fn default() -> Self {
        Self { status: "active", asset_class: "us_equity" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_derives_pnl_and_class() {
        let p = Position::new("XOM", 10.0, 100.0, 95.0);
        assert!((p.unrealized_pnl_pct - (-0.05)).abs() < 1e-12);
        assert!((p.unrealized_pl - (-50.0)).abs() < 1e-9);
        assert!((p.market_value - 950.0).abs() < 1e-9);
        assert_eq!(p.asset_type, AssetType::Stock);
        assert_eq!(p.sector, Sector::Energy);
    }

    #[test]
    fn test_zero_entry_price_is_flat() {
        let p = Position::new("BTCUSD", 0.01, 0.0, 100_000.0);
        assert_eq!(p.unrealized_pnl_pct, 0.0);
        assert!(p.is_crypto());
    }

    #[test]
    fn test_asset_flag_defaults() {
        let asset: Asset = serde_json::from_str(
            r#"{"symbol":"ABC","tradable":true,"fractionable":true,"shortable":true}"#,
        )
        .unwrap();
        assert!(asset.easy_to_borrow);
        assert!(asset.is_eligible());

        let asset: Asset = serde_json::from_str(r#"{"symbol":"ABC"}"#).unwrap();
        assert!(!asset.is_eligible());
    }
}

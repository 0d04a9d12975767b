//! # models::order
//!
//! Market order payloads sent to the brokerage and the acknowledgement it
//! returns.  Every order is a market order; what varies is the side, the
//! size (dollar notional or share quantity) and the time-in-force.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::classify;

// ─── Side / TIF ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Session-bound, for equities.
    Day,
    /// Good-till-cancelled; crypto trades 24/7.
    Gtc,
}

impl TimeInForce {
    pub fn for_symbol(symbol: &str) -> Self {
        if classify(symbol).asset_type.is_crypto() {
            TimeInForce::Gtc
        } else {
            TimeInForce::Day
        }
    }
}

// ─── OrderSize ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderSize {
    /// Dollar amount (entries).
    Notional(f64),
    /// Share / coin quantity (partial exits).
    Qty(f64),
}

// ─── OrderRequest ─────────────────────────────────────────────────────────────

/// Wire payload for `POST /v2/orders`.
///
/// Quantities go out as strings: the brokerage parses fractional sizes
/// from strings without float rounding surprises.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<String>,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: TimeInForce,
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, size: OrderSize) -> Self {
        let (notional, qty) = match size {
            OrderSize::Notional(dollars) => (Some(format!("{dollars:.2}")), None),
            OrderSize::Qty(q) => (None, Some(format_qty(q))),
        };

        Self {
            symbol: symbol.to_string(),
            notional,
            qty,
            side,
            order_type: "market",
            time_in_force: TimeInForce::for_symbol(symbol),
            client_order_id: format!("rot-{}", Uuid::new_v4()),
        }
    }

    /// Notional market buy.
    pub fn buy_notional(symbol: &str, dollars: f64) -> Self {
        Self::market(symbol, OrderSide::Buy, OrderSize::Notional(dollars))
    }

    /// Quantity market sell.
    pub fn sell_qty(symbol: &str, qty: f64) -> Self {
        Self::market(symbol, OrderSide::Sell, OrderSize::Qty(qty))
    }
}

/// Round a sell quantity down to something the brokerage accepts:
/// whole units at or above 1, otherwise 6 decimals.
pub fn round_qty(qty: f64) -> f64 {
    if qty >= 1.0 {
        qty.floor()
    } else {
        (qty * 1e6).floor() / 1e6
    }
}

pub fn format_qty(qty: f64) -> String {
    let q = round_qty(qty);
    if q >= 1.0 {
        format!("{q:.0}")
    } else {
        format!("{q:.6}")
    }
}

// ─── OrderAck ─────────────────────────────────────────────────────────────────

/// What the brokerage hands back for an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

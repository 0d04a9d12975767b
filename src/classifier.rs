//! # classifier
//!
//! **Instrument Classifier** — maps a symbol to its asset type and sector.
//!
//! Pure and total: static lookup tables, no I/O, never fails.  Anything not
//! listed is a `Stock` in sector `Other`.

use serde::{Deserialize, Serialize};

// ─── Static Tables ────────────────────────────────────────────────────────────

/// Crypto pairs the manager trades around the clock.
pub const CRYPTO_SYMBOLS: &[&str] = &["BTCUSD", "ETHUSD", "SOLUSD", "AVAXUSD", "DOGUSD"];

/// ETFs get the narrowest stop-loss.
const ETF_SYMBOLS: &[&str] = &[
    "SPY", "QQQ", "IWM", "DIA", "VTI", "VOO", "EEM", "GLD", "SLV",
    "XLF", "XLE", "XLK", "XLV", "XLI", "XLP", "XLU", "XLRE", "XLB",
    "TLT", "HYG", "LQD", "AGG", "BND", "VNQ",
];

// ─── AssetType ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Crypto,
    Etf,
    Stock,
}

impl AssetType {
    pub fn is_crypto(self) -> bool {
        self == AssetType::Crypto
    }
}

// ─── Sector ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Tech,
    Financials,
    Healthcare,
    Energy,
    Consumer,
    Industrials,
    RealEstate,
    Utilities,
    Materials,
    Broad,
    Crypto,
    Other,
}

// ─── Classification ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub asset_type: AssetType,
    pub sector: Sector,
}

/// Classify a symbol.  `BTC/USD` and `btcusd` are treated as `BTCUSD`.
pub fn classify(symbol: &str) -> Classification {
    let normalized = normalize(symbol);
    let symbol = normalized.as_str();

    let asset_type = if CRYPTO_SYMBOLS.contains(&symbol) {
        AssetType::Crypto
    } else if ETF_SYMBOLS.contains(&symbol) {
        AssetType::Etf
    } else {
        AssetType::Stock
    };

    Classification { asset_type, sector: sector_of(symbol) }
}

/// Upper-case, strip the `/` used by crypto pair notation.
pub fn normalize(symbol: &str) -> String {
    symbol.trim().replace('/', "").to_ascii_uppercase()
}

fn sector_of(symbol: &str) -> Sector {
    match symbol {
        "QQQ" | "XLK" | "AAPL" | "MSFT" | "GOOGL" | "NVDA" | "AMD" | "META" | "NFLX"
        | "TSLA" | "INTC" | "AVGO" | "ORCL" | "CRM" | "ADBE" => Sector::Tech,

        "XLF" | "JPM" | "BAC" | "WFC" | "GS" | "MS" | "C" | "BLK" => Sector::Financials,

        "XLV" | "UNH" | "JNJ" | "PFE" | "ABBV" | "LLY" | "MRK" | "TMO" => Sector::Healthcare,

        "XLE" | "XOM" | "CVX" | "COP" | "SLB" | "EOG" | "PXD" | "MPC" => Sector::Energy,

        "XLY" | "XLP" | "AMZN" | "HD" | "MCD" | "NKE" | "SBUX" | "TGT" => Sector::Consumer,

        "XLI" | "BA" | "CAT" | "GE" | "HON" | "UPS" | "RTX" | "LMT" => Sector::Industrials,

        "XLRE" | "VNQ" | "AMT" | "PLD" => Sector::RealEstate,

        "XLU" | "NEE" | "DUK" | "SO" => Sector::Utilities,

        "XLB" | "GLD" | "SLV" | "FCX" | "NEM" | "APD" | "LIN" => Sector::Materials,

        "SPY" | "IWM" | "DIA" | "VTI" | "VOO" => Sector::Broad,

        "BTCUSD" | "ETHUSD" | "SOLUSD" | "AVAXUSD" | "DOGUSD" => Sector::Crypto,

        _ => Sector::Other,
    }
}

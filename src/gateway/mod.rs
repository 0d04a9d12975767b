//! # gateway
//!
//! The three external collaborators the engine consumes, expressed as traits
//! so the engine never sees HTTP:
//!
//! ```text
//!  Brokerage       account · positions · clock · orders · cancel · close
//!  QuoteSource     latest bid/ask for one symbol
//!  UniverseSource  tradeable asset list with quality flags
//! ```
//!
//! [`alpaca::AlpacaClient`] implements all three against the Alpaca REST API.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Account, Asset, AssetFilter, Clock, OrderAck, OrderRequest, Position, Quote};

pub mod alpaca;
pub mod retry;

#[async_trait]
pub trait Brokerage: Send + Sync {
    async fn account(&self) -> Result<Account>;

    async fn positions(&self) -> Result<Vec<Position>>;

    async fn clock(&self) -> Result<Clock>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    /// Cancel every open order for `symbol`; returns how many were cancelled.
    async fn cancel_orders(&self, symbol: &str) -> Result<usize>;

    /// Liquidate the whole position in `symbol` at market.
    async fn close_position(&self, symbol: &str) -> Result<OrderAck>;
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn latest_quote(&self, symbol: &str) -> Result<Quote>;
}

#[async_trait]
pub trait UniverseSource: Send + Sync {
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>>;
}

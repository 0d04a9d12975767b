//! Domain models shared across the whole position manager.

pub mod order;
pub mod position;
pub mod quote;

pub use order::{OrderAck, OrderRequest};
pub use position::{Account, Asset, AssetFilter, Clock, Position};
pub use quote::{Quote, QuoteOrigin};

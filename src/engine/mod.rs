//! # engine
//!
//! Decision logic of the position manager.  Everything here is driven by the
//! single control loop in [`crate::scheduler`]; stores are passed in by
//! `&mut` and never shared.

pub mod history;
pub mod monitor;
pub mod quotes;
pub mod rotation;
pub mod scanner;
pub mod selector;
pub mod universe;

use crate::gateway::{Brokerage, UniverseSource};

use quotes::QuoteClient;
use selector::CandidateSelector;

/// Read-only collaborators handed to the entry scanner and the optimizer.
#[derive(Clone, Copy)]
pub struct Gateways<'a> {
    pub broker: &'a dyn Brokerage,
    pub assets: &'a dyn UniverseSource,
    pub quotes: &'a QuoteClient,
    pub selector: &'a dyn CandidateSelector,
}

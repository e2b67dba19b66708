//! Search orchestration module
//!
//! Stamps queries, fans them out to every registered provider, discards
//! superseded answers and exposes the aggregate progress of a search.

mod dispatcher;
mod executor;
mod models;
mod sequencer;
mod status;

pub use dispatcher::{DispatchError, Dispatcher};
pub use models::*;
pub use sequencer::Sequencer;
pub use status::{Aggregator, ProviderStatus, StatusSnapshot};

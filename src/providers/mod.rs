//! Search provider module
//!
//! Defines the provider contract, the registry that owns live providers,
//! their state machine, and a set of concrete provider adapters.

mod registry;
pub(crate) mod state;
mod traits;

// Provider adapters
pub mod features;
pub mod gallery;
pub mod properties;
pub mod timeout;

pub(crate) use registry::{erase, ErasedProvider, Payload, ProviderRegistry, ProviderSlot};
pub use registry::ProviderId;
pub use state::ProviderState;
pub use traits::*;

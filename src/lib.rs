//! fedsearch: a federated search dispatcher
//!
//! Fans a single query out to a dynamically registered set of independent
//! search providers, tracks each provider's progress, silently drops
//! answers to queries that have since been superseded, and reports whether
//! anything is still searching.
//!
//! ```no_run
//! use fedsearch::providers::{FnSource, ProviderError, SearchSource, SinkEvent};
//! use fedsearch::{Dispatcher, Query, Settings};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let dispatcher = Dispatcher::spawn(Settings::default());
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let echo = FnSource::new("Echo", |query: Query| async move {
//!     Ok::<_, ProviderError>(query.text().to_string())
//! });
//! dispatcher.register(echo.into_provider(tx)).await?;
//!
//! dispatcher.submit("paris", None).await?;
//! if let Some(SinkEvent::Result(text)) = rx.recv().await {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod providers;
pub mod search;

pub use config::Settings;
pub use providers::{ProviderError, ProviderId, ProviderState, SearchProvider, SearchSource};
pub use search::{
    Aggregator, DispatchError, Dispatcher, Generation, Geometry, ProviderStatus, Query,
    StatusSnapshot,
};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

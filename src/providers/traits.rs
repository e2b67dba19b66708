//! Provider traits and types

use crate::search::Query;
use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// Why a provider could not answer a query
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The search itself failed
    #[error("search failed: {0}")]
    Search(String),

    /// The backend behind the provider could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A provider-level deadline expired
    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    /// The provider panicked while searching
    #[error("provider panicked: {0}")]
    Panicked(String),

    /// The provider could not cancel its in-flight search
    #[error("cancellation failed: {0}")]
    Cancel(String),

    /// Any other backend error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    /// Create a search failure from a message
    pub fn search(message: impl Into<String>) -> Self {
        Self::Search(message.into())
    }

    /// Convert a caught panic payload into an error
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Main provider trait that every registered provider implements.
///
/// `search` is the only suspension point. `on_result` and `on_error` are
/// invoked on the dispatcher task, at most once per generation the provider
/// was actually asked about, and must not block.
#[async_trait]
pub trait SearchProvider: Send + Sync + 'static {
    /// Payload produced by a successful search, forwarded verbatim
    type Output: Send + 'static;

    /// Provider name, used for ordering and logging
    fn name(&self) -> &str;

    /// Preferred number of results to display (UI hint only)
    fn result_limit(&self) -> Option<usize> {
        None
    }

    /// Answer a query
    async fn search(&self, query: &Query) -> Result<Self::Output, ProviderError>;

    /// Receive the answer to the current query
    fn on_result(&self, output: Self::Output);

    /// Receive a failure for the current query
    fn on_error(&self, error: ProviderError);

    /// Whether `cancel` does anything
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Ask the in-flight search to stop (best effort)
    fn cancel(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// The search half of a provider.
///
/// Adapters implement this and are paired with a [`ResultSink`] through
/// [`SearchSource::into_provider`].
#[async_trait]
pub trait SearchSource: Send + Sync + 'static {
    type Output: Send + 'static;

    fn name(&self) -> &str;

    fn result_limit(&self) -> Option<usize> {
        None
    }

    async fn search(&self, query: &Query) -> Result<Self::Output, ProviderError>;

    fn supports_cancel(&self) -> bool {
        false
    }

    fn cancel(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Attach a sink, producing a registrable provider
    fn into_provider<K>(self, sink: K) -> Bound<Self, K>
    where
        Self: Sized,
        K: ResultSink<Self::Output>,
    {
        Bound { source: self, sink }
    }
}

/// The consumer half of a provider
pub trait ResultSink<T>: Send + Sync + 'static {
    fn on_result(&self, output: T);
    fn on_error(&self, error: ProviderError);
}

/// Event pushed into a channel sink
#[derive(Debug)]
pub enum SinkEvent<T> {
    Result(T),
    Error(ProviderError),
}

impl<T: Send + 'static> ResultSink<T> for mpsc::UnboundedSender<SinkEvent<T>> {
    fn on_result(&self, output: T) {
        if self.send(SinkEvent::Result(output)).is_err() {
            trace!("result receiver dropped");
        }
    }

    fn on_error(&self, error: ProviderError) {
        if self.send(SinkEvent::Error(error)).is_err() {
            trace!("result receiver dropped");
        }
    }
}

/// Sink built from a pair of closures
pub struct Callbacks<R, E> {
    on_result: R,
    on_error: E,
}

impl<R, E> Callbacks<R, E> {
    pub fn new(on_result: R, on_error: E) -> Self {
        Self { on_result, on_error }
    }
}

impl<T, R, E> ResultSink<T> for Callbacks<R, E>
where
    R: Fn(T) + Send + Sync + 'static,
    E: Fn(ProviderError) + Send + Sync + 'static,
{
    fn on_result(&self, output: T) {
        (self.on_result)(output)
    }

    fn on_error(&self, error: ProviderError) {
        (self.on_error)(error)
    }
}

/// A source paired with a sink
pub struct Bound<S, K> {
    source: S,
    sink: K,
}

#[async_trait]
impl<S, K> SearchProvider for Bound<S, K>
where
    S: SearchSource,
    K: ResultSink<S::Output>,
{
    type Output = S::Output;

    fn name(&self) -> &str {
        self.source.name()
    }

    fn result_limit(&self) -> Option<usize> {
        self.source.result_limit()
    }

    async fn search(&self, query: &Query) -> Result<Self::Output, ProviderError> {
        self.source.search(query).await
    }

    fn on_result(&self, output: Self::Output) {
        self.sink.on_result(output)
    }

    fn on_error(&self, error: ProviderError) {
        self.sink.on_error(error)
    }

    fn supports_cancel(&self) -> bool {
        self.source.supports_cancel()
    }

    fn cancel(&self) -> Result<(), ProviderError> {
        self.source.cancel()
    }
}

type CancelFn = Box<dyn Fn() -> Result<(), ProviderError> + Send + Sync>;

/// Source backed by a closure returning a future
pub struct FnSource<F> {
    name: String,
    search: F,
    cancel: Option<CancelFn>,
    result_limit: Option<usize>,
}

impl<F, Fut, T> FnSource<F>
where
    F: Fn(Query) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    T: Send + 'static,
{
    /// Create a source named `name` that runs `search` for every query
    pub fn new(name: impl Into<String>, search: F) -> Self {
        Self {
            name: name.into(),
            search,
            cancel: None,
            result_limit: None,
        }
    }

    /// Give the source a cancellation hook
    pub fn with_cancel<C>(mut self, cancel: C) -> Self
    where
        C: Fn() -> Result<(), ProviderError> + Send + Sync + 'static,
    {
        self.cancel = Some(Box::new(cancel));
        self
    }

    /// Set the result limit hint
    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = Some(limit);
        self
    }
}

#[async_trait]
impl<F, Fut, T> SearchSource for FnSource<F>
where
    F: Fn(Query) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn result_limit(&self) -> Option<usize> {
        self.result_limit
    }

    async fn search(&self, query: &Query) -> Result<T, ProviderError> {
        (self.search)(query.clone()).await
    }

    fn supports_cancel(&self) -> bool {
        self.cancel.is_some()
    }

    fn cancel(&self) -> Result<(), ProviderError> {
        match &self.cancel {
            Some(cancel) => cancel(),
            None => Ok(()),
        }
    }
}

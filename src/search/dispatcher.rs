//! Public handle to the dispatch loop

use super::executor::{Command, DispatchLoop};
use super::models::{Geometry, Query};
use super::status::{Aggregator, ProviderStatus, StatusSnapshot};
use crate::config::Settings;
use crate::metrics::DispatchMetrics;
use crate::providers::{erase, ProviderId, SearchProvider};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Errors returned by [`Dispatcher`] operations
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatch loop has stopped
    #[error("dispatcher is no longer running")]
    Closed,

    /// Registration refused by configuration
    #[error("provider '{0}' is disabled by configuration")]
    Disabled(String),
}

/// Federated search dispatcher.
///
/// Cloning is cheap; every clone talks to the same dispatch loop. The loop
/// stops on [`Dispatcher::shutdown`] or once every clone is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    commands: mpsc::UnboundedSender<Command>,
    aggregator: Aggregator,
    metrics: Arc<DispatchMetrics>,
    settings: Arc<Settings>,
}

impl Dispatcher {
    /// Start a dispatch loop on the current tokio runtime
    pub fn spawn(settings: Settings) -> Self {
        Self::spawn_with_handle(settings).0
    }

    /// Start a dispatch loop and return its task handle as well
    pub fn spawn_with_handle(settings: Settings) -> (Self, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let metrics = Arc::new(DispatchMetrics::new());

        let dispatch_loop = DispatchLoop::new(
            &settings.dispatcher.primary_provider,
            command_rx,
            status_tx,
            metrics.clone(),
        );
        let handle = tokio::spawn(dispatch_loop.run());

        let dispatcher = Self {
            commands,
            aggregator: Aggregator::new(status_rx),
            metrics,
            settings: Arc::new(settings),
        };
        (dispatcher, handle)
    }

    /// Register a provider.
    ///
    /// The provider starts `Idle` and only takes part from the next
    /// [`submit`](Self::submit) on.
    pub async fn register<P: SearchProvider>(&self, provider: P) -> Result<ProviderId, DispatchError> {
        let config = self.settings.get_provider(provider.name());
        if config.is_some_and(|c| c.disabled) {
            return Err(DispatchError::Disabled(provider.name().to_string()));
        }

        let result_limit = config
            .and_then(|c| c.result_limit)
            .or_else(|| provider.result_limit())
            .unwrap_or(self.settings.dispatcher.default_result_limit);

        let (reply, response) = oneshot::channel();
        self.send(Command::Register {
            provider: erase(provider),
            result_limit,
            reply,
        })?;
        response.await.map_err(|_| DispatchError::Closed)
    }

    /// Remove a provider. Returns whether it was registered.
    ///
    /// An in-flight search keeps running but its outcome is discarded.
    pub async fn unregister(&self, id: ProviderId) -> Result<bool, DispatchError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Unregister { id, reply })?;
        response.await.map_err(|_| DispatchError::Closed)
    }

    /// Submit a new query and fan it out to every registered provider.
    ///
    /// Results surface only through each provider's callbacks; the returned
    /// query carries the generation it was stamped with.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        geometry: Option<Geometry>,
    ) -> Result<Query, DispatchError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit {
            text: text.into(),
            geometry,
            reply,
        })?;
        response.await.map_err(|_| DispatchError::Closed)
    }

    /// Whether any provider is still searching
    pub fn is_in_progress(&self) -> bool {
        self.aggregator.is_in_progress()
    }

    /// Providers in presentation order, primary first
    pub fn ordered_providers(&self) -> Vec<ProviderStatus> {
        self.aggregator.ordered_providers()
    }

    /// A read-only view that can outlive this handle
    pub fn aggregator(&self) -> Aggregator {
        self.aggregator.clone()
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stop the dispatch loop; pending outcomes are dropped
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<(), DispatchError> {
        self.commands
            .send(command)
            .map_err(|_| DispatchError::Closed)
    }
}

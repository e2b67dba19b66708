//! The dispatch loop.
//!
//! A single task owns the registry, the sequencer and every provider's
//! state. Consumer requests and provider completions both arrive as
//! messages, so all state transitions are serialized without locks.

use super::models::{Generation, Geometry, Query};
use super::sequencer::Sequencer;
use super::status::StatusSnapshot;
use crate::metrics::DispatchMetrics;
use crate::providers::state::{transition, Effect, Event};
use crate::providers::{
    ErasedProvider, Payload, ProviderError, ProviderId, ProviderRegistry, ProviderSlot,
};
use futures::future::{self, FutureExt};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};

/// Requests sent by [`Dispatcher`](super::Dispatcher) handles
pub(crate) enum Command {
    Register {
        provider: Arc<dyn ErasedProvider>,
        result_limit: usize,
        reply: oneshot::Sender<ProviderId>,
    },
    Unregister {
        id: ProviderId,
        reply: oneshot::Sender<bool>,
    },
    Submit {
        text: String,
        geometry: Option<Geometry>,
        reply: oneshot::Sender<Query>,
    },
    Shutdown,
}

/// Outcome of one provider search, tagged with what it was asked
struct Completion {
    id: ProviderId,
    generation: Generation,
    outcome: Result<Payload, ProviderError>,
}

pub(crate) struct DispatchLoop {
    registry: ProviderRegistry,
    sequencer: Sequencer,
    commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    status: watch::Sender<StatusSnapshot>,
    metrics: Arc<DispatchMetrics>,
}

impl DispatchLoop {
    pub(crate) fn new(
        primary: &str,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<StatusSnapshot>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        let (completion_tx, completions) = mpsc::unbounded_channel();
        Self {
            registry: ProviderRegistry::new(primary),
            sequencer: Sequencer::new(),
            commands,
            completions,
            completion_tx,
            status,
            metrics,
        }
    }

    /// Run until shut down or every handle is dropped
    pub(crate) async fn run(mut self) {
        info!(primary = self.registry.primary(), "dispatch loop started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                    self.publish();
                }
            }
        }

        info!(
            providers = self.registry.len(),
            in_progress = self.registry.is_searching(),
            "dispatch loop stopped, discarding in-flight searches"
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register {
                provider,
                result_limit,
                reply,
            } => {
                let id = self.registry.register(provider, result_limit);
                if let Some(slot) = self.registry.get(id) {
                    info!(%id, provider = %slot.name, result_limit, "registered provider");
                }
                self.publish();
                let _ = reply.send(id);
            }
            Command::Unregister { id, reply } => {
                let removed = match self.registry.unregister(id) {
                    Some(slot) => {
                        info!(
                            %id,
                            provider = %slot.name,
                            in_flight = slot.state.is_searching(),
                            "unregistered provider"
                        );
                        true
                    }
                    None => false,
                };
                self.publish();
                let _ = reply.send(removed);
            }
            Command::Submit {
                text,
                geometry,
                reply,
            } => {
                let query = self.submit(text, geometry);
                self.publish();
                let _ = reply.send(query);
            }
            Command::Shutdown => {}
        }
    }

    fn submit(&mut self, text: String, geometry: Option<Geometry>) -> Query {
        let query = self.sequencer.submit(text, geometry);
        self.metrics.inc_query();

        info!(
            generation = %query.generation(),
            text = query.text(),
            providers = self.registry.len(),
            "dispatching query"
        );

        for id in self.registry.ids() {
            self.dispatch(id, &query);
        }
        query
    }

    /// Hand `query` to one provider, superseding whatever it is doing
    fn dispatch(&mut self, id: ProviderId, query: &Query) {
        let Some(slot) = self.registry.get_mut(id) else {
            return;
        };

        if slot.last_generation() == Some(query.generation()) {
            trace!(provider = %slot.name, generation = %query.generation(), "already dispatched");
            return;
        }

        if slot.state.is_searching() {
            let cancellable = slot.provider.supports_cancel();
            let (next, effect) = transition(slot.state, Event::Supersede { cancellable });
            slot.state = next;

            match effect {
                Effect::Cancel => {
                    Self::cancel(slot);
                    self.metrics.record_cancellation(&slot.name);
                }
                _ => {
                    debug!(
                        provider = %slot.name,
                        busy_with = ?slot.last_generation(),
                        "provider busy and not cancellable, re-driving on completion"
                    );
                    return;
                }
            }
        }

        let (next, effect) = transition(slot.state, Event::Dispatch);
        if effect == Effect::Launch {
            slot.state = next;
            Self::launch(slot, query.clone(), &self.completion_tx, &self.metrics);
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let Completion {
            id,
            generation,
            outcome,
        } = completion;

        let Some(slot) = self.registry.get_mut(id) else {
            trace!(%id, %generation, "dropping completion for unregistered provider");
            return;
        };

        if slot.last_generation() != Some(generation) || !slot.state.is_searching() {
            debug!(provider = %slot.name, %generation, "dropping completion of a cancelled search");
            return;
        }

        let current = self.sequencer.is_current(generation);
        let event = if outcome.is_ok() {
            Event::Resolved { current }
        } else {
            Event::Rejected { current }
        };
        let (next, effect) = transition(slot.state, event);
        slot.state = next;
        let elapsed = slot.started.take().map(|started| started.elapsed());

        match (effect, outcome) {
            (Effect::Deliver, Ok(payload)) => {
                self.metrics.record_success(&slot.name, elapsed);
                debug!(provider = %slot.name, %generation, ?elapsed, "delivering result");
                Self::deliver(slot, payload);
            }
            (Effect::Report, Err(error)) => {
                self.metrics.record_failure(&slot.name, elapsed);
                warn!(provider = %slot.name, %generation, %error, "search failed");
                Self::report(slot, error);
            }
            (Effect::Relaunch, _) => {
                self.metrics.record_stale(&slot.name);
                if let Some(query) = self.sequencer.current().cloned() {
                    debug!(
                        provider = %slot.name,
                        stale = %generation,
                        current = %query.generation(),
                        "dropping stale outcome, re-dispatching"
                    );
                    Self::launch(slot, query, &self.completion_tx, &self.metrics);
                }
            }
            (effect, _) => {
                trace!(provider = %slot.name, ?effect, "completion ignored");
            }
        }
    }

    /// Mark the slot busy with `query` and start the search
    fn launch(
        slot: &mut ProviderSlot,
        query: Query,
        completion_tx: &mpsc::UnboundedSender<Completion>,
        metrics: &DispatchMetrics,
    ) {
        let id = slot.id;
        let generation = query.generation();
        slot.last_query = Some(query.clone());
        slot.started = Some(Instant::now());
        metrics.record_dispatch(&slot.name);
        trace!(provider = %slot.name, %generation, "invoking search");

        // An ErasedProvider may panic before it hands back a future
        let provider = &slot.provider;
        let search = match panic::catch_unwind(AssertUnwindSafe(|| provider.search(query))) {
            Ok(search) => search,
            Err(panic) => future::ready(Err(ProviderError::from_panic(panic))).boxed(),
        };

        let completion_tx = completion_tx.clone();
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(search).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(ProviderError::from_panic(panic)),
            };
            // Fails only once the loop has stopped
            let _ = completion_tx.send(Completion {
                id,
                generation,
                outcome,
            });
        });
    }

    fn cancel(slot: &ProviderSlot) {
        match panic::catch_unwind(AssertUnwindSafe(|| slot.provider.cancel())) {
            Ok(Ok(())) => debug!(provider = %slot.name, "cancelled superseded search"),
            Ok(Err(error)) => {
                warn!(provider = %slot.name, %error, "cancel failed, re-dispatching anyway")
            }
            Err(panic) => warn!(
                provider = %slot.name,
                error = %ProviderError::from_panic(panic),
                "cancel panicked, re-dispatching anyway"
            ),
        }
    }

    fn deliver(slot: &ProviderSlot, payload: Payload) {
        let provider = &slot.provider;
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| provider.deliver(payload))) {
            error!(
                provider = %slot.name,
                error = %ProviderError::from_panic(panic),
                "result callback panicked"
            );
        }
    }

    fn report(slot: &ProviderSlot, error: ProviderError) {
        let provider = &slot.provider;
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| provider.fail(error))) {
            error!(
                provider = %slot.name,
                error = %ProviderError::from_panic(panic),
                "error callback panicked"
            );
        }
    }

    fn publish(&self) {
        self.status
            .send_replace(StatusSnapshot::capture(&self.registry, &self.sequencer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderState;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    /// Panics while building its search future
    #[derive(Default)]
    struct Eager {
        errors: Mutex<Vec<String>>,
    }

    impl ErasedProvider for Eager {
        fn name(&self) -> &str {
            "Eager"
        }

        fn result_limit(&self) -> Option<usize> {
            None
        }

        fn search(&self, _query: Query) -> BoxFuture<'static, Result<Payload, ProviderError>> {
            panic!("failed before returning a future")
        }

        fn deliver(&self, _payload: Payload) {}

        fn fail(&self, error: ProviderError) {
            self.errors.lock().unwrap().push(error.to_string());
        }

        fn supports_cancel(&self) -> bool {
            false
        }

        fn cancel(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panic_while_starting_search_is_a_rejection() {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = watch::channel(StatusSnapshot::default());
        let metrics = Arc::new(DispatchMetrics::new());
        let dispatch_loop = DispatchLoop::new("Gallery", command_rx, status_tx, metrics);
        let handle = tokio::spawn(dispatch_loop.run());

        let provider = Arc::new(Eager::default());
        let (reply, registered) = oneshot::channel();
        assert!(commands
            .send(Command::Register {
                provider: provider.clone(),
                result_limit: 5,
                reply,
            })
            .is_ok());
        registered.await.unwrap();

        let (reply, submitted) = oneshot::channel();
        assert!(commands
            .send(Command::Submit {
                text: "paris".to_string(),
                geometry: None,
                reply,
            })
            .is_ok());
        let query = submitted.await.unwrap();

        let snapshot = status_rx
            .wait_for(|status| !status.is_in_progress())
            .await
            .unwrap()
            .clone();
        let status = snapshot.provider("Eager").unwrap();
        assert_eq!(status.state, ProviderState::Failed);
        assert_eq!(status.last_generation, Some(query.generation()));
        assert_eq!(
            *provider.errors.lock().unwrap(),
            vec!["provider panicked: failed before returning a future".to_string()]
        );

        assert!(commands.send(Command::Shutdown).is_ok());
        handle.await.unwrap();
    }
}

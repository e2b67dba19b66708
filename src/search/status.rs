//! Aggregated, read-only view of dispatcher state

use super::dispatcher::DispatchError;
use super::models::Generation;
use super::sequencer::Sequencer;
use crate::providers::{ProviderId, ProviderRegistry, ProviderState};
use serde::Serialize;
use tokio::sync::watch;

/// Externally visible state of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub id: ProviderId,
    pub name: String,
    pub state: ProviderState,
    /// Display hint; the dispatcher never enforces it
    pub result_limit: usize,
    /// Generation the provider was last asked about
    pub last_generation: Option<Generation>,
}

/// Point-in-time copy of the dispatcher state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Generation of the current query
    pub generation: Option<Generation>,
    /// Providers in presentation order
    pub providers: Vec<ProviderStatus>,
}

impl StatusSnapshot {
    pub(crate) fn capture(registry: &ProviderRegistry, sequencer: &Sequencer) -> Self {
        Self {
            generation: sequencer.current_generation(),
            providers: registry.ordered().into_iter().map(|slot| slot.status()).collect(),
        }
    }

    /// True iff any provider is searching
    pub fn is_in_progress(&self) -> bool {
        self.providers.iter().any(|p| p.state.is_searching())
    }

    /// Look up a provider by name
    pub fn provider(&self, name: &str) -> Option<&ProviderStatus> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Read-only access to the latest published [`StatusSnapshot`]
#[derive(Debug, Clone)]
pub struct Aggregator {
    status: watch::Receiver<StatusSnapshot>,
}

impl Aggregator {
    pub(crate) fn new(status: watch::Receiver<StatusSnapshot>) -> Self {
        Self { status }
    }

    /// Whether any provider is still searching
    pub fn is_in_progress(&self) -> bool {
        self.status.borrow().is_in_progress()
    }

    /// Providers with the primary one first
    pub fn ordered_providers(&self) -> Vec<ProviderStatus> {
        self.status.borrow().providers.clone()
    }

    /// Copy of the latest snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Wait for the next published snapshot
    pub async fn changed(&mut self) -> Result<StatusSnapshot, DispatchError> {
        self.status
            .changed()
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok(self.status.borrow_and_update().clone())
    }

    /// Wait until no provider is searching
    pub async fn wait_until_idle(&mut self) -> Result<StatusSnapshot, DispatchError> {
        let snapshot = self
            .status
            .wait_for(|snapshot| !snapshot.is_in_progress())
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok((*snapshot).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Sequencer;

    fn status(name: &str, state: ProviderState) -> ProviderStatus {
        ProviderStatus {
            id: ProviderId::from_raw(0),
            name: name.to_string(),
            state,
            result_limit: 5,
            last_generation: None,
        }
    }

    #[test]
    fn test_in_progress_is_derived() {
        let mut snapshot = StatusSnapshot::default();
        assert!(!snapshot.is_in_progress());

        snapshot.providers.push(status("Gallery", ProviderState::Failed));
        snapshot.providers.push(status("Properties", ProviderState::Idle));
        assert!(!snapshot.is_in_progress());

        snapshot.providers.push(status("Geocoder", ProviderState::Searching));
        assert!(snapshot.is_in_progress());
        assert_eq!(
            snapshot.provider("Geocoder").map(|p| p.state),
            Some(ProviderState::Searching)
        );
    }

    #[test]
    fn test_capture_empty_registry() {
        let registry = ProviderRegistry::new("Gallery");
        let mut sequencer = Sequencer::new();
        let query = sequencer.submit("paris", None);

        let snapshot = StatusSnapshot::capture(&registry, &sequencer);
        assert_eq!(snapshot.generation, Some(query.generation()));
        assert!(snapshot.providers.is_empty());
    }

    #[tokio::test]
    async fn test_wait_until_idle() {
        let (tx, rx) = watch::channel(StatusSnapshot {
            generation: None,
            providers: vec![status("Gallery", ProviderState::Searching)],
        });
        let mut aggregator = Aggregator::new(rx);
        assert!(aggregator.is_in_progress());

        let mut waiting = tokio_test::task::spawn(async move {
            aggregator.wait_until_idle().await
        });
        tokio_test::assert_pending!(waiting.poll());

        tx.send_replace(StatusSnapshot {
            generation: None,
            providers: vec![status("Gallery", ProviderState::Idle)],
        });

        assert!(waiting.is_woken());
        let snapshot = tokio_test::assert_ready_ok!(waiting.poll());
        assert!(!snapshot.is_in_progress());
    }
}

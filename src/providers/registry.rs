//! Provider registry for managing the live set of providers

use super::state::ProviderState;
use super::traits::{ProviderError, SearchProvider};
use crate::search::{Generation, ProviderStatus, Query};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Opaque handle returned by registration.
///
/// Handles are never reused, so a completion for a removed provider can
/// never be mistaken for one belonging to a later registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ProviderId(u64);

impl ProviderId {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

pub(crate) type Payload = Box<dyn Any + Send>;

/// Object-safe view of a [`SearchProvider`] with its payload type erased
pub(crate) trait ErasedProvider: Send + Sync {
    fn name(&self) -> &str;
    fn result_limit(&self) -> Option<usize>;
    fn search(&self, query: Query) -> BoxFuture<'static, Result<Payload, ProviderError>>;
    fn deliver(&self, payload: Payload);
    fn fail(&self, error: ProviderError);
    fn supports_cancel(&self) -> bool;
    fn cancel(&self) -> Result<(), ProviderError>;
}

struct Erased<P>(Arc<P>);

impl<P: SearchProvider> ErasedProvider for Erased<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn result_limit(&self) -> Option<usize> {
        self.0.result_limit()
    }

    fn search(&self, query: Query) -> BoxFuture<'static, Result<Payload, ProviderError>> {
        let provider = Arc::clone(&self.0);
        async move {
            provider
                .search(&query)
                .await
                .map(|output| Box::new(output) as Payload)
        }
        .boxed()
    }

    fn deliver(&self, payload: Payload) {
        match payload.downcast::<P::Output>() {
            Ok(output) => self.0.on_result(*output),
            Err(_) => error!(provider = self.0.name(), "payload type mismatch, dropping result"),
        }
    }

    fn fail(&self, error: ProviderError) {
        self.0.on_error(error)
    }

    fn supports_cancel(&self) -> bool {
        self.0.supports_cancel()
    }

    fn cancel(&self) -> Result<(), ProviderError> {
        self.0.cancel()
    }
}

pub(crate) fn erase<P: SearchProvider>(provider: P) -> Arc<dyn ErasedProvider> {
    Arc::new(Erased(Arc::new(provider)))
}

/// Registration record, owned by the registry
pub(crate) struct ProviderSlot {
    pub(crate) id: ProviderId,
    pub(crate) name: String,
    pub(crate) state: ProviderState,
    pub(crate) result_limit: usize,
    pub(crate) last_query: Option<Query>,
    pub(crate) started: Option<Instant>,
    pub(crate) provider: Arc<dyn ErasedProvider>,
}

impl ProviderSlot {
    pub(crate) fn last_generation(&self) -> Option<Generation> {
        self.last_query.as_ref().map(Query::generation)
    }

    pub(crate) fn status(&self) -> ProviderStatus {
        ProviderStatus {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            result_limit: self.result_limit,
            last_generation: self.last_generation(),
        }
    }
}

/// Registry of live providers.
///
/// Slots are keyed by a monotonically increasing id, so iteration order is
/// registration order.
pub(crate) struct ProviderRegistry {
    next_id: u64,
    slots: BTreeMap<ProviderId, ProviderSlot>,
    primary: String,
}

impl ProviderRegistry {
    /// Create an empty registry whose `primary` provider sorts first
    pub(crate) fn new(primary: impl Into<String>) -> Self {
        Self {
            next_id: 0,
            slots: BTreeMap::new(),
            primary: primary.into(),
        }
    }

    /// Add a provider in the `Idle` state with no assigned query
    pub(crate) fn register(
        &mut self,
        provider: Arc<dyn ErasedProvider>,
        result_limit: usize,
    ) -> ProviderId {
        let id = ProviderId(self.next_id);
        self.next_id += 1;

        let slot = ProviderSlot {
            id,
            name: provider.name().to_string(),
            state: ProviderState::Idle,
            result_limit,
            last_query: None,
            started: None,
            provider,
        };
        self.slots.insert(id, slot);
        id
    }

    /// Remove a provider; its in-flight work becomes unresolvable
    pub(crate) fn unregister(&mut self, id: ProviderId) -> Option<ProviderSlot> {
        self.slots.remove(&id)
    }

    pub(crate) fn get(&self, id: ProviderId) -> Option<&ProviderSlot> {
        self.slots.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ProviderId) -> Option<&mut ProviderSlot> {
        self.slots.get_mut(&id)
    }

    /// Ids in registration order
    pub(crate) fn ids(&self) -> Vec<ProviderId> {
        self.slots.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn primary(&self) -> &str {
        &self.primary
    }

    /// Presentation order: providers named after the primary source first,
    /// everything else in registration order
    pub(crate) fn ordered(&self) -> Vec<&ProviderSlot> {
        let (mut ordered, rest): (Vec<_>, Vec<_>) = self
            .slots
            .values()
            .partition(|slot| slot.name == self.primary);
        ordered.extend(rest);
        ordered
    }

    /// Whether any provider is searching
    pub(crate) fn is_searching(&self) -> bool {
        self.slots.values().any(|slot| slot.state.is_searching())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Callbacks, FnSource, SearchSource};

    fn provider(name: &str) -> Arc<dyn ErasedProvider> {
        erase(
            FnSource::new(name, |_query: Query| async { Ok::<_, ProviderError>(()) })
                .into_provider(Callbacks::new(|_: ()| {}, |_: ProviderError| {})),
        )
    }

    #[test]
    fn test_registry() {
        let mut registry = ProviderRegistry::new("Gallery");
        let a = registry.register(provider("Properties"), 5);
        let b = registry.register(provider("Geocoder"), 10);

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        let slot = registry.get(a).unwrap();
        assert_eq!(slot.name, "Properties");
        assert_eq!(slot.state, ProviderState::Idle);
        assert!(slot.last_query.is_none());
        assert!(!registry.is_searching());
    }

    #[test]
    fn test_primary_first() {
        let mut registry = ProviderRegistry::new("Gallery");
        registry.register(provider("Properties"), 5);
        registry.register(provider("Geocoder"), 5);
        registry.register(provider("Gallery"), 5);
        registry.register(provider("Files"), 5);

        let names: Vec<_> = registry.ordered().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Gallery", "Properties", "Geocoder", "Files"]);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut registry = ProviderRegistry::new("Gallery");
        let first = registry.register(provider("A"), 5);
        assert!(registry.unregister(first).is_some());
        assert!(registry.unregister(first).is_none());

        let second = registry.register(provider("A"), 5);
        assert_ne!(first, second);
        assert!(registry.get(first).is_none());
        assert_eq!(registry.ids(), vec![second]);
    }
}

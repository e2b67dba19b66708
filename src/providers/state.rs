//! Per-provider state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a registered provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    /// Not searching; the last answer (if any) was delivered
    #[default]
    Idle,
    /// A search is in flight
    Searching,
    /// The last search was rejected or cancelled
    Failed,
}

impl ProviderState {
    pub fn is_searching(self) -> bool {
        self == Self::Searching
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Searching => "searching",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something that happened to a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// A query is being handed to the provider
    Dispatch,
    /// A newer query arrived while the provider was busy
    Supersede { cancellable: bool },
    /// The in-flight search resolved
    Resolved { current: bool },
    /// The in-flight search rejected
    Rejected { current: bool },
}

/// What the dispatcher must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Invoke the provider's search with the current query
    Launch,
    /// Call the provider's cancel hook
    Cancel,
    /// Leave the in-flight search running
    Wait,
    /// Hand the payload to `on_result`
    Deliver,
    /// Hand the error to `on_error`
    Report,
    /// Drop the stale outcome and search again with the current query
    Relaunch,
    /// The event does not apply in this state
    Ignore,
}

/// The transition table.
///
/// A stale outcome, success or failure, never leaves `Searching`: the
/// provider goes straight back to work on the latest query.
pub(crate) fn transition(state: ProviderState, event: Event) -> (ProviderState, Effect) {
    use Effect::*;
    use ProviderState::*;

    match (state, event) {
        (Idle | Failed, Event::Dispatch) => (Searching, Launch),
        (Searching, Event::Supersede { cancellable: true }) => (Failed, Cancel),
        (Searching, Event::Supersede { cancellable: false }) => (Searching, Wait),
        (Searching, Event::Resolved { current: true }) => (Idle, Deliver),
        (Searching, Event::Rejected { current: true }) => (Failed, Report),
        (Searching, Event::Resolved { current: false } | Event::Rejected { current: false }) => {
            (Searching, Relaunch)
        }
        (state, _) => (state, Ignore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use Effect::*;
        use ProviderState::*;

        let cases = [
            (Idle, Event::Dispatch, Searching, Launch),
            (Failed, Event::Dispatch, Searching, Launch),
            (Searching, Event::Dispatch, Searching, Ignore),
            (Searching, Event::Supersede { cancellable: true }, Failed, Cancel),
            (Searching, Event::Supersede { cancellable: false }, Searching, Wait),
            (Searching, Event::Resolved { current: true }, Idle, Deliver),
            (Searching, Event::Resolved { current: false }, Searching, Relaunch),
            (Searching, Event::Rejected { current: true }, Failed, Report),
            (Searching, Event::Rejected { current: false }, Searching, Relaunch),
            (Idle, Event::Resolved { current: true }, Idle, Ignore),
            (Failed, Event::Rejected { current: true }, Failed, Ignore),
            (Idle, Event::Supersede { cancellable: true }, Idle, Ignore),
        ];

        for (from, event, to, effect) in cases {
            assert_eq!(transition(from, event), (to, effect), "{from} on {event:?}");
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ProviderState::Searching.to_string(), "searching");
        assert!(ProviderState::Searching.is_searching());
        assert!(!ProviderState::Failed.is_searching());
    }
}

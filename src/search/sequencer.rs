//! Query sequencing

use super::models::{Generation, Geometry, Query};

/// Stamps submitted queries with strictly increasing generations and
/// remembers which one is current.
///
/// The counter is a `u64` starting at 1. Exhausting it is an accepted
/// limitation: at one query per microsecond it would take over half a
/// million years, and the sequencer panics rather than wrap around.
#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
    current: Option<Query>,
}

impl Sequencer {
    /// Create a sequencer that has not issued anything yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new query and make it current
    pub fn submit(&mut self, text: impl Into<String>, geometry: Option<Geometry>) -> Query {
        self.issued = self
            .issued
            .checked_add(1)
            .expect("query generation counter exhausted");

        let query = Query::new(text.into(), geometry, Generation::new(self.issued));
        self.current = Some(query.clone());
        query
    }

    /// The most recently submitted query
    pub fn current(&self) -> Option<&Query> {
        self.current.as_ref()
    }

    /// Generation of the most recently submitted query
    pub fn current_generation(&self) -> Option<Generation> {
        self.current.as_ref().map(Query::generation)
    }

    /// Whether `generation` is still the current one
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current_generation() == Some(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_strictly_increase() {
        let mut sequencer = Sequencer::new();
        assert!(sequencer.current().is_none());

        let first = sequencer.submit("paris", None);
        let second = sequencer.submit("paris, france", None);
        let third = sequencer.submit("paris, france", None);

        assert_eq!(first.generation().get(), 1);
        assert!(second.generation() > first.generation());
        assert!(third.generation() > second.generation());
    }

    #[test]
    fn test_latest_submission_is_current() {
        let mut sequencer = Sequencer::new();
        let first = sequencer.submit("a", None);
        let second = sequencer.submit("b", Some(Geometry::point(48.85, 2.35)));

        assert!(!sequencer.is_current(first.generation()));
        assert!(sequencer.is_current(second.generation()));
        assert_eq!(sequencer.current().map(Query::text), Some("b"));
    }
}

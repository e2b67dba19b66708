//! Metrics collection module
//!
//! Tracks per-provider dispatch outcomes and response times.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Number of response times kept per provider
const RESPONSE_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct Counters {
    dispatches: u64,
    successes: u64,
    failures: u64,
    stale_drops: u64,
    cancellations: u64,
    response_times: VecDeque<u64>,
}

/// Dispatcher metrics, written by the dispatch loop only
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    total_queries: AtomicU64,
    providers: RwLock<HashMap<String, Counters>>,
}

impl DispatchMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Counters>> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, provider: &str, f: impl FnOnce(&mut Counters)) {
        let mut providers: RwLockWriteGuard<'_, _> =
            self.providers.write().unwrap_or_else(PoisonError::into_inner);
        f(providers.entry(provider.to_string()).or_default());
    }

    /// Increment submitted query count
    pub fn inc_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a search started for a provider
    pub fn record_dispatch(&self, provider: &str) {
        self.update(provider, |c| c.dispatches += 1);
    }

    /// Record a delivered result
    pub fn record_success(&self, provider: &str, elapsed: Option<Duration>) {
        self.update(provider, |c| {
            c.successes += 1;
            push_time(c, elapsed);
        });
    }

    /// Record a reported failure
    pub fn record_failure(&self, provider: &str, elapsed: Option<Duration>) {
        self.update(provider, |c| {
            c.failures += 1;
            push_time(c, elapsed);
        });
    }

    /// Record an outcome dropped because a newer query arrived
    pub fn record_stale(&self, provider: &str) {
        self.update(provider, |c| c.stale_drops += 1);
    }

    /// Record a cancel request
    pub fn record_cancellation(&self, provider: &str) {
        self.update(provider, |c| c.cancellations += 1);
    }

    /// Get total submitted queries
    pub fn get_total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    /// Get average response time for a provider in milliseconds
    pub fn get_avg_response_time(&self, provider: &str) -> Option<u64> {
        self.read().get(provider).and_then(average)
    }

    /// Get reliability percentage for a provider
    pub fn get_reliability(&self, provider: &str) -> f64 {
        self.read().get(provider).map(reliability).unwrap_or(100.0)
    }

    /// Statistics for one provider
    pub fn provider_stats(&self, provider: &str) -> Option<ProviderStats> {
        self.read().get(provider).map(stats)
    }

    /// Get all provider statistics
    pub fn get_provider_stats(&self) -> HashMap<String, ProviderStats> {
        self.read()
            .iter()
            .map(|(name, counters)| (name.clone(), stats(counters)))
            .collect()
    }
}

fn push_time(counters: &mut Counters, elapsed: Option<Duration>) {
    let Some(elapsed) = elapsed else { return };
    if counters.response_times.len() >= RESPONSE_WINDOW {
        counters.response_times.pop_front();
    }
    counters
        .response_times
        .push_back(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
}

fn average(counters: &Counters) -> Option<u64> {
    let times = &counters.response_times;
    if times.is_empty() {
        None
    } else {
        let total: u128 = times.iter().map(|&t| u128::from(t)).sum();
        Some((total / times.len() as u128) as u64)
    }
}

fn reliability(counters: &Counters) -> f64 {
    let total = counters.successes + counters.failures;
    if total == 0 {
        100.0
    } else {
        (counters.successes as f64 / total as f64) * 100.0
    }
}

/// Statistics for a single provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStats {
    pub dispatches: u64,
    pub successes: u64,
    pub failures: u64,
    pub stale_drops: u64,
    pub cancellations: u64,
    pub avg_response_time: Option<u64>,
    pub reliability: f64,
}

fn stats(counters: &Counters) -> ProviderStats {
    ProviderStats {
        dispatches: counters.dispatches,
        successes: counters.successes,
        failures: counters.failures,
        stale_drops: counters.stale_drops,
        cancellations: counters.cancellations,
        avg_response_time: average(counters),
        reliability: reliability(counters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = DispatchMetrics::new();

        metrics.inc_query();
        metrics.record_dispatch("Gallery");
        metrics.record_success("Gallery", Some(Duration::from_millis(100)));

        assert_eq!(metrics.get_total_queries(), 1);
        assert_eq!(metrics.get_avg_response_time("Gallery"), Some(100));
        assert_eq!(metrics.get_reliability("Gallery"), 100.0);
        assert_eq!(metrics.get_reliability("unknown"), 100.0);
    }

    #[test]
    fn test_reliability_and_stale_counts() {
        let metrics = DispatchMetrics::new();

        metrics.record_dispatch("Geocoder");
        metrics.record_stale("Geocoder");
        metrics.record_dispatch("Geocoder");
        metrics.record_failure("Geocoder", None);
        metrics.record_dispatch("Geocoder");
        metrics.record_success("Geocoder", Some(Duration::from_millis(40)));
        metrics.record_cancellation("Geocoder");

        let stats = metrics.provider_stats("Geocoder").unwrap();
        assert_eq!(stats.dispatches, 3);
        assert_eq!(stats.stale_drops, 1);
        assert_eq!(stats.cancellations, 1);
        assert_eq!(stats.avg_response_time, Some(40));
        assert_eq!(stats.reliability, 50.0);
        assert_eq!(metrics.get_provider_stats().len(), 1);
    }

    #[test]
    fn test_response_window() {
        let metrics = DispatchMetrics::new();
        for _ in 0..RESPONSE_WINDOW {
            metrics.record_success("Files", Some(Duration::from_millis(10)));
        }
        metrics.record_success("Files", Some(Duration::from_millis(1010)));

        // one 10ms sample was evicted
        assert_eq!(metrics.get_avg_response_time("Files"), Some(20));
    }

    #[test]
    fn test_huge_response_times_saturate() {
        let metrics = DispatchMetrics::new();
        metrics.record_success("Stuck", Some(Duration::MAX));
        metrics.record_success("Stuck", Some(Duration::MAX));

        assert_eq!(metrics.get_avg_response_time("Stuck"), Some(u64::MAX));
    }
}

//! Provider-level deadline

use super::traits::{ProviderError, SearchSource};
use crate::config::Settings;
use crate::search::Query;
use async_trait::async_trait;
use std::time::Duration;

/// Rejects with [`ProviderError::Timeout`] when the wrapped source takes
/// longer than its deadline. Without a deadline it is transparent.
pub struct Timeout<S> {
    inner: S,
    deadline: Option<Duration>,
}

impl<S: SearchSource> Timeout<S> {
    pub fn new(inner: S, deadline: Duration) -> Self {
        Self {
            inner,
            deadline: Some(deadline),
        }
    }

    /// Use the `timeout` configured for the source's name, if any
    pub fn configured(inner: S, settings: &Settings) -> Self {
        let deadline = settings
            .get_provider(inner.name())
            .and_then(|config| config.timeout());
        Self { inner, deadline }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

#[async_trait]
impl<S: SearchSource> SearchSource for Timeout<S> {
    type Output = S::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn result_limit(&self) -> Option<usize> {
        self.inner.result_limit()
    }

    async fn search(&self, query: &Query) -> Result<S::Output, ProviderError> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.inner.search(query))
                .await
                .map_err(|_| ProviderError::Timeout(deadline))?,
            None => self.inner.search(query).await,
        }
    }

    fn supports_cancel(&self) -> bool {
        self.inner.supports_cancel()
    }

    fn cancel(&self) -> Result<(), ProviderError> {
        self.inner.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::search::Sequencer;

    struct Slow(&'static str);

    #[async_trait]
    impl SearchSource for Slow {
        type Output = u32;

        fn name(&self) -> &str {
            self.0
        }

        async fn search(&self, _query: &Query) -> Result<u32, ProviderError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(7)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_rejects() {
        let source = Timeout::new(Slow("Geocoder"), Duration::from_millis(50));
        let query = Sequencer::new().submit("paris", None);

        let err = source.search(&query).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_deadline() {
        let settings = Settings {
            providers: vec![ProviderConfig {
                name: "Geocoder".to_string(),
                timeout: Some(1.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        let query = Sequencer::new().submit("paris", None);

        let source = Timeout::configured(Slow("Geocoder"), &settings);
        assert_eq!(source.deadline(), Some(Duration::from_secs(1)));
        assert_eq!(source.search(&query).await.unwrap(), 7);

        let unconfigured = Timeout::configured(Slow("Files"), &settings);
        assert_eq!(unconfigured.deadline(), None);
        assert_eq!(unconfigured.search(&query).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_deadline_is_ignored() {
        let settings =
            Settings::from_yaml("providers:\n  - name: Geocoder\n    timeout: 1e20\n").unwrap();
        let query = Sequencer::new().submit("paris", None);

        let source = Timeout::configured(Slow("Geocoder"), &settings);
        assert_eq!(source.deadline(), None);
        assert_eq!(source.search(&query).await.unwrap(), 7);
    }
}

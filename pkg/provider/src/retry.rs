use async_trait::async_trait;
use pkg_constants::provider::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_SECS};
use pkg_types::lease::{Instance, Lease};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::{ComputeProvider, ProviderError, Provisioned};

/// Retries restart, delete and log extraction on transient failures, a bounded
/// number of times with a fixed pause. Create and list pass straight through:
/// a repeated create could double-provision, and a failed listing is simply
/// retried by the caller's next pass.
pub struct RetryingProvider<P> {
    inner: P,
    attempts: u32,
    backoff: Duration,
}

impl<P: ComputeProvider> RetryingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        }
    }

    /// Total attempts per call, including the first. Clamped to at least 1.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, op: &str, target: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        "Provider {} {} failed (attempt {}/{}): {}; retrying in {}s",
                        op,
                        target,
                        attempt,
                        self.attempts,
                        e,
                        self.backoff.as_secs()
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<P: ComputeProvider> ComputeProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_instance(&self, lease: &Lease) -> Result<Provisioned, ProviderError> {
        self.inner.create_instance(lease).await
    }

    async fn list_running(&self) -> Result<Vec<Instance>, ProviderError> {
        self.inner.list_running().await
    }

    async fn delete_instance(&self, name: &str) -> Result<(), ProviderError> {
        self.retry("delete", name, || self.inner.delete_instance(name))
            .await
    }

    async fn restart_instance(&self, name: &str) -> Result<(), ProviderError> {
        self.retry("restart", name, || self.inner.restart_instance(name))
            .await
    }

    async fn extract_logs(&self, name: &str) -> Result<Vec<u8>, ProviderError> {
        self.retry("extract-logs", name, || self.inner.extract_logs(name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{LocalProvider, Operation};
    use chrono::Utc;
    use std::sync::Arc;

    fn transient() -> ProviderError {
        ProviderError::Transient("ssh: connection refused".to_string())
    }

    fn seeded(name: &str) -> Arc<LocalProvider> {
        let local = Arc::new(LocalProvider::new(vec![]));
        local.seed(Instance {
            name: name.to_string(),
            region: "ams".to_string(),
            main_address: "10.0.0.2".to_string(),
            created_at: Utc::now(),
            running: true,
        });
        local
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let local = seeded("brave-otter");
        local.inject_fault(Operation::Restart, None, transient(), 2);
        let provider = RetryingProvider::new(local.clone()).with_attempts(3);

        provider.restart_instance("brave-otter").await.unwrap();
        assert_eq!(local.calls(Operation::Restart), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bounded_attempts() {
        let local = seeded("brave-otter");
        local.inject_fault(Operation::ExtractLogs, None, transient(), 10);
        let provider = RetryingProvider::new(local.clone()).with_attempts(4);

        let err = provider.extract_logs("brave-otter").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(local.calls(Operation::ExtractLogs), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failures_are_not_retried() {
        let local = seeded("brave-otter");
        let provider = RetryingProvider::new(local.clone());

        let err = provider.restart_instance("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(local.calls(Operation::Restart), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_is_never_retried() {
        let local = seeded("brave-otter");
        local.inject_fault(Operation::Create, None, transient(), 1);
        let provider = RetryingProvider::new(local.clone());

        let lease = Lease::from(Instance {
            name: "calm-heron".to_string(),
            region: "ams".to_string(),
            main_address: String::new(),
            created_at: Utc::now(),
            running: false,
        });
        assert!(provider.create_instance(&lease).await.is_err());
        assert_eq!(local.calls(Operation::Create), 1);
    }
}

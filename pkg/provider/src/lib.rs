//! Compute provider contract.
//!
//! The provider is the only authority on which instances are running.
//! Implementations: [`local::LocalProvider`] (in-process), wrapped by
//! [`retry::RetryingProvider`] for bounded fixed-backoff retries.

pub mod local;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkg_types::lease::{Instance, Lease};

pub use local::{LocalProvider, Operation};
pub use retry::RetryingProvider;

/// Errors surfaced by a compute provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The named instance does not exist.
    #[error("instance '{0}' not found")]
    NotFound(String),

    /// Connection-level failure; worth retrying.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider refused the request; retrying will not help.
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

/// What the provider reports back after creating an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    pub main_address: String,
    /// Authoritative creation time.
    pub created_at: DateTime<Utc>,
    /// Region as normalized by the provider.
    pub region: String,
}

/// Pluggable compute provider.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Create the remote instance for `lease`. May block for the provider's
    /// full boot acknowledgment.
    async fn create_instance(&self, lease: &Lease) -> Result<Provisioned, ProviderError>;

    /// Every instance currently managed by this provider.
    async fn list_running(&self) -> Result<Vec<Instance>, ProviderError>;

    /// Delete an instance. Deleting an instance that is already gone is not an error.
    async fn delete_instance(&self, name: &str) -> Result<(), ProviderError>;

    /// Restart the workload on an instance.
    async fn restart_instance(&self, name: &str) -> Result<(), ProviderError>;

    /// Gzip archive of the instance's logs.
    async fn extract_logs(&self, name: &str) -> Result<Vec<u8>, ProviderError>;
}

#[async_trait]
impl<P: ComputeProvider + ?Sized> ComputeProvider for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn create_instance(&self, lease: &Lease) -> Result<Provisioned, ProviderError> {
        (**self).create_instance(lease).await
    }

    async fn list_running(&self) -> Result<Vec<Instance>, ProviderError> {
        (**self).list_running().await
    }

    async fn delete_instance(&self, name: &str) -> Result<(), ProviderError> {
        (**self).delete_instance(name).await
    }

    async fn restart_instance(&self, name: &str) -> Result<(), ProviderError> {
        (**self).restart_instance(name).await
    }

    async fn extract_logs(&self, name: &str) -> Result<Vec<u8>, ProviderError> {
        (**self).extract_logs(name).await
    }
}

use pkg_provider::ProviderError;
use pkg_state::StoreError;
use pkg_types::lease::Lease;
use pkg_types::validate::format_duration;
use std::time::Duration;

/// Errors surfaced by lease engine operations.
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    // =========================================================================
    // Admission
    // =========================================================================
    /// Too many leases were created within the rate window.
    #[error("creation rate limit reached: at most {limit} leases per hour, try again later")]
    RateExceeded { limit: u32 },

    /// The provider already runs the maximum number of leases.
    #[error("capacity reached: at most {max} concurrent leases")]
    CapacityExceeded { max: u32 },

    /// No unique name could be generated within the attempt bound.
    #[error("unable to generate a unique lease name after {attempts} attempts")]
    NameExhausted { attempts: usize },

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// No cache record exists for this lease.
    #[error("lease '{0}' not found")]
    NotFound(String),

    /// Granting the extension would push the total past the configured cap.
    #[error(
        "extended lifetime {} exceeds the maximum allowed extension {}",
        format_duration(*.total),
        format_duration(*.max)
    )]
    ExceedsMaxExtension { total: Duration, max: Duration },

    /// Extensions must be a positive whole number of seconds.
    #[error("extension must be a positive whole number of seconds")]
    InvalidExtension,

    /// The caller cancelled the operation before it completed.
    #[error("operation on lease '{0}' was cancelled")]
    Cancelled(String),

    // =========================================================================
    // Collaborators
    // =========================================================================
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("lease store error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for LeaseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(name) => LeaseError::NotFound(name),
            other => LeaseError::Store(other),
        }
    }
}

impl LeaseError {
    /// Expected rejections that leave state untouched and deserve a clear
    /// answer to the requester rather than an opaque failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LeaseError::RateExceeded { .. }
                | LeaseError::CapacityExceeded { .. }
                | LeaseError::NameExhausted { .. }
                | LeaseError::NotFound(_)
                | LeaseError::ExceedsMaxExtension { .. }
                | LeaseError::InvalidExtension
        )
    }

    /// Rejected by the admission gate.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            LeaseError::RateExceeded { .. } | LeaseError::CapacityExceeded { .. }
        )
    }
}

/// Result of the two-step create: remote instance first, then cache record.
#[derive(Debug)]
pub enum CreateOutcome {
    /// Remote instance exists and its cache record was written.
    FullSuccess(Lease),

    /// Remote instance exists, but the cache write failed. The resource is
    /// real and billable without a tracked record; it is deliberately not
    /// rolled back. Remediate with a manual reconciliation.
    PartialSuccess { lease: Lease, error: StoreError },

    /// Nothing was created (or a cancelled creation was cleaned up best-effort).
    Failure(LeaseError),
}

impl CreateOutcome {
    /// The lease, when a remote instance was created.
    pub fn lease(&self) -> Option<&Lease> {
        match self {
            CreateOutcome::FullSuccess(lease) | CreateOutcome::PartialSuccess { lease, .. } => {
                Some(lease)
            }
            CreateOutcome::Failure(_) => None,
        }
    }

    pub fn is_full_success(&self) -> bool {
        matches!(self, CreateOutcome::FullSuccess(_))
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, CreateOutcome::PartialSuccess { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_lease_not_found() {
        let err = LeaseError::from(StoreError::NotFound("alpha".to_string()));
        assert!(matches!(err, LeaseError::NotFound(ref n) if n == "alpha"));
        assert!(err.is_user_facing());

        let err = LeaseError::from(StoreError::Backend(anyhow::anyhow!("disk full")));
        assert!(matches!(err, LeaseError::Store(_)));
        assert!(!err.is_user_facing());
    }

    #[test]
    fn extension_message_uses_compact_durations() {
        let err = LeaseError::ExceedsMaxExtension {
            total: Duration::from_secs(5400),
            max: Duration::from_secs(3600),
        };
        assert_eq!(
            err.to_string(),
            "extended lifetime 1h30m exceeds the maximum allowed extension 1h"
        );
    }

    #[test]
    fn admission_rejections() {
        assert!(LeaseError::RateExceeded { limit: 3 }.is_admission_rejection());
        assert!(LeaseError::CapacityExceeded { max: 1 }.is_admission_rejection());
        assert!(!LeaseError::InvalidExtension.is_admission_rejection());
    }
}

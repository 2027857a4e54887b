use chrono::{DateTime, Utc};
use pkg_constants::lease::LOG_ARCHIVE_SUFFIX;
use pkg_provider::{ComputeProvider, ProviderError};
use pkg_state::LeaseStore;
use pkg_types::clock::{Clock, SystemClock};
use pkg_types::lease::{Lease, LeasePhase, LeaseSpec};
use pkg_types::validate::format_duration;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::admission::{AdmissionController, AdmissionLimits, AdmissionState};
use crate::cancel::CancelSignal;
use crate::config::EngineConfig;
use crate::error::{CreateOutcome, LeaseError};
use crate::names::{NameAllocator, NameGenerator, generate_pin};
use crate::notifier::{Notifier, deliver};
use crate::reconcile::{ReconcileReport, Reconciler};

/// A lease as shown to requesters, with its computed expiry.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseView {
    #[serde(flatten)]
    pub lease: Lease,
    pub phase: LeasePhase,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_secs: Option<u64>,
}

impl LeaseView {
    pub fn new(lease: Lease, base_lifetime: Duration, now: DateTime<Utc>) -> Self {
        Self {
            phase: lease.phase(base_lifetime, now),
            expires_at: lease.expires_at(base_lifetime),
            remaining_secs: lease.remaining(base_lifetime, now).map(|d| d.as_secs()),
            lease,
        }
    }
}

/// Creates, extends, restarts and deletes leases.
pub struct LeaseManager {
    provider: Arc<dyn ComputeProvider>,
    store: Arc<dyn LeaseStore>,
    notifier: Option<Arc<dyn Notifier>>,
    admission: AdmissionController,
    names: NameAllocator,
    reconciler: Reconciler,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Serializes read-modify-write of granted extensions.
    extend_lock: tokio::sync::Mutex<()>,
}

fn phase_change(name: &str, from: LeasePhase, to: LeasePhase) {
    info!("Lease {} phase: {} → {}", name, from, to);
}

fn provider_error(e: ProviderError) -> LeaseError {
    match e {
        ProviderError::NotFound(name) => LeaseError::NotFound(name),
        other => LeaseError::Provider(other),
    }
}

impl LeaseManager {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn ComputeProvider>,
        store: Arc<dyn LeaseStore>,
    ) -> Self {
        let limits = AdmissionLimits {
            max_concurrent: config.max_concurrent_leases,
            max_per_window: config.max_creations_per_hour,
        };
        Self {
            reconciler: Reconciler::new(provider.clone(), store.clone()),
            provider,
            store,
            notifier: None,
            admission: AdmissionController::new(limits),
            names: NameAllocator::default(),
            clock: Arc::new(SystemClock),
            config,
            extend_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_name_generator(mut self, generator: Box<dyn NameGenerator>) -> Self {
        self.names = NameAllocator::new(generator);
        self
    }

    /// Share admission state (rate window, in-flight reservations) with
    /// another manager.
    pub fn with_admission_state(mut self, state: Arc<AdmissionState>) -> Self {
        self.admission = AdmissionController::with_state(self.admission.limits(), state);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn admission_state(&self) -> &Arc<AdmissionState> {
        self.admission.state()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    // ============================================================
    // Create
    // ============================================================

    /// Admit, create the remote instance, then write the cache record.
    pub async fn create(&self, spec: LeaseSpec, cancel: &CancelSignal) -> CreateOutcome {
        let permit = match self
            .admission
            .try_admit(
                self.clock.now(),
                self.provider.as_ref(),
                self.store.as_ref(),
                &self.names,
            )
            .await
        {
            Ok(permit) => permit,
            Err(e) => {
                if !e.is_user_facing() {
                    warn!("Lease admission failed: {}", e);
                }
                return CreateOutcome::Failure(e);
            }
        };

        let pin = generate_pin();
        let mut lease = Lease::requested(permit.name(), &pin, &spec, self.clock.now());
        info!(
            "Lease {} requested by {} in {}",
            lease.name,
            lease.requested_by.as_deref().unwrap_or("unknown"),
            lease.region
        );

        if cancel.is_cancelled() {
            phase_change(&lease.name, LeasePhase::Requested, LeasePhase::Failed);
            return CreateOutcome::Failure(LeaseError::Cancelled(lease.name));
        }
        phase_change(&lease.name, LeasePhase::Requested, LeasePhase::Provisioning);

        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.provider.create_instance(&lease) => Some(result),
        };
        let provisioned = match created {
            None => {
                warn!("Creation of lease {} cancelled while provisioning", lease.name);
                self.cleanup_cancelled(&lease.name).await;
                phase_change(&lease.name, LeasePhase::Provisioning, LeasePhase::Failed);
                return CreateOutcome::Failure(LeaseError::Cancelled(lease.name));
            }
            Some(Err(e)) => {
                error!("Provider failed to create lease {}: {}", lease.name, e);
                phase_change(&lease.name, LeasePhase::Provisioning, LeasePhase::Failed);
                return CreateOutcome::Failure(LeaseError::Provider(e));
            }
            Some(Ok(provisioned)) => provisioned,
        };
        permit.record_creation(self.clock.now());

        lease.main_address = provisioned.main_address;
        lease.created_at = provisioned.created_at;
        lease.region = provisioned.region;
        lease.running = true;

        if cancel.is_cancelled() {
            warn!("Creation of lease {} cancelled after provisioning", lease.name);
            self.cleanup_cancelled(&lease.name).await;
            phase_change(&lease.name, LeasePhase::Provisioning, LeasePhase::Failed);
            return CreateOutcome::Failure(LeaseError::Cancelled(lease.name));
        }

        match self.store.upsert(&lease).await {
            Ok(()) => {
                phase_change(&lease.name, LeasePhase::Provisioning, LeasePhase::Active);
                CreateOutcome::FullSuccess(lease)
            }
            Err(e) => {
                error!(
                    "Lease {} is running at {} but its cache record could not be written: {}. \
                     The instance is untracked until reconciled manually",
                    lease.name, lease.main_address, e
                );
                CreateOutcome::PartialSuccess { lease, error: e }
            }
        }
    }

    /// Delete the instance of a cancelled create before returning, so the
    /// caller's shutdown cannot outrun it.
    async fn cleanup_cancelled(&self, name: &str) {
        match self.provider.delete_instance(name).await {
            Ok(()) => info!("Cleaned up cancelled lease {}", name),
            Err(e) if e.is_not_found() => {
                debug!("Cancelled lease {} never reached the provider", name)
            }
            Err(e) => error!(
                "Cleanup of cancelled lease {} failed: {}; instance may be untracked",
                name, e
            ),
        }
    }

    // ============================================================
    // Extend
    // ============================================================

    /// Add `requested` to the lease's granted extension. Returns the new
    /// total. Rejected without mutation when the total would pass the cap.
    pub async fn extend(&self, name: &str, requested: Duration) -> Result<Duration, LeaseError> {
        if requested.is_zero() || requested.subsec_nanos() != 0 {
            return Err(LeaseError::InvalidExtension);
        }
        let _guard = self.extend_lock.lock().await;

        let mut lease = self.store.get_by_name(name).await?;
        let current = lease.granted_extension.unwrap_or_default();
        let max = self.config.max_extension;
        let total = match current.checked_add(requested) {
            Some(total) if total <= max => total,
            total => {
                info!(
                    "Extension of lease {} by {} rejected (granted {}, max {})",
                    name,
                    format_duration(requested),
                    format_duration(current),
                    format_duration(max)
                );
                return Err(LeaseError::ExceedsMaxExtension {
                    total: total.unwrap_or(Duration::MAX),
                    max,
                });
            }
        };

        lease.granted_extension = Some(total);
        self.store.upsert(&lease).await?;
        let from = if current.is_zero() {
            LeasePhase::Active
        } else {
            LeasePhase::Extended
        };
        phase_change(name, from, LeasePhase::Extended);
        info!(
            "Lease {} extended by {} (total extension {})",
            name,
            format_duration(requested),
            format_duration(total)
        );
        Ok(total)
    }

    // ============================================================
    // Delete
    // ============================================================

    /// Delete the remote instance, then the cache record. Cache deletion is
    /// attempted even when the provider call fails; an already-gone instance
    /// or record is not an error.
    pub async fn delete(&self, name: &str, cancel: &CancelSignal) -> Result<(), LeaseError> {
        let provider_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LeaseError::Cancelled(name.to_string())),
            result = self.provider.delete_instance(name) => result,
        };
        let provider_failure = match provider_result {
            Ok(()) => None,
            Err(e) if e.is_not_found() => {
                debug!("Lease {} already gone from provider", name);
                None
            }
            Err(e) => {
                error!(
                    "Provider delete of lease {} failed: {}; instance may still be running",
                    name, e
                );
                Some(e)
            }
        };

        let store_failure = match self.store.delete_by_name(name).await {
            Ok(()) => None,
            Err(e) if e.is_not_found() => {
                debug!("Lease {} had no cache record", name);
                None
            }
            Err(e) => {
                warn!("Cache delete of lease {} failed: {}", name, e);
                Some(e)
            }
        };

        if let Some(e) = provider_failure {
            return Err(LeaseError::Provider(e));
        }
        if let Some(e) = store_failure {
            return Err(LeaseError::Store(e));
        }
        info!("Lease {} deleted from provider and cache", name);
        Ok(())
    }

    /// Phase a lease is leaving when it is retired now.
    fn retiring_phase(&self, lease: &Lease) -> LeasePhase {
        lease.phase(self.config.base_lifetime, self.clock.now())
    }

    /// Delete `lease` and tell its requester why, attaching its logs when
    /// they can be fetched first.
    pub async fn retire(
        &self,
        lease: &Lease,
        reason: &str,
        cancel: &CancelSignal,
    ) -> Result<(), LeaseError> {
        let from = self.retiring_phase(lease);
        let Some(notifier) = &self.notifier else {
            self.delete(&lease.name, cancel).await?;
            phase_change(&lease.name, from, LeasePhase::Deleted);
            return Ok(());
        };

        let logs = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.provider.extract_logs(&lease.name) => match result {
                Ok(archive) => Some(archive),
                Err(e) => {
                    warn!("Log extraction for lease {} failed: {}", lease.name, e);
                    None
                }
            },
        };

        let result = self.delete(&lease.name, cancel).await;
        match &result {
            Ok(()) => {
                phase_change(&lease.name, from, LeasePhase::Deleted);
                let filename = format!("{}{}", lease.name, LOG_ARCHIVE_SUFFIX);
                let attachment = logs.as_deref().map(|data| (filename.as_str(), data));
                deliver(notifier.as_ref(), lease, reason, attachment).await;
            }
            Err(e) => {
                let message = format!("error deleting lease: {}", e);
                deliver(notifier.as_ref(), lease, &message, None).await;
            }
        }
        result
    }

    /// Explicit user-initiated delete.
    pub async fn delete_on_request(
        &self,
        name: &str,
        cancel: &CancelSignal,
    ) -> Result<(), LeaseError> {
        let lease = match self.store.get_by_name(name).await {
            Ok(lease) => lease,
            Err(e) if e.is_not_found() => self
                .provider
                .list_running()
                .await?
                .into_iter()
                .find(|i| i.name == name)
                .map(Lease::from)
                .ok_or_else(|| LeaseError::NotFound(name.to_string()))?,
            Err(e) => return Err(e.into()),
        };
        info!("Deleting lease {} on request", name);
        self.retire(&lease, "Deleted on request", cancel).await
    }

    // ============================================================
    // Queries and instance operations
    // ============================================================

    pub async fn list(&self) -> Result<Vec<LeaseView>, LeaseError> {
        let leases = self.reconciler.enriched().await?;
        let now = self.clock.now();
        Ok(leases
            .into_iter()
            .map(|l| LeaseView::new(l, self.config.base_lifetime, now))
            .collect())
    }

    /// Reconciled view of one running lease.
    pub async fn metadata(&self, name: &str) -> Result<LeaseView, LeaseError> {
        let lease = self
            .reconciler
            .enriched()
            .await?
            .into_iter()
            .find(|l| l.name == name)
            .ok_or_else(|| LeaseError::NotFound(name.to_string()))?;
        Ok(LeaseView::new(lease, self.config.base_lifetime, self.clock.now()))
    }

    pub async fn report(&self) -> Result<ReconcileReport, LeaseError> {
        self.reconciler.report().await
    }

    /// Restart a tracked lease's workload.
    pub async fn restart(&self, name: &str) -> Result<(), LeaseError> {
        self.store.get_by_name(name).await?;
        self.provider
            .restart_instance(name)
            .await
            .map_err(provider_error)?;
        info!("Lease {} restarted", name);
        Ok(())
    }

    pub async fn extract_logs(
        &self,
        name: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<u8>, LeaseError> {
        self.store.get_by_name(name).await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LeaseError::Cancelled(name.to_string())),
            result = self.provider.extract_logs(name) => result.map_err(provider_error),
        }
    }
}

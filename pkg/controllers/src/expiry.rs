use pkg_engine::{CancelSignal, LeaseError, LeaseManager};
use pkg_types::validate::format_duration;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: Vec<String>,
    /// (lease, error) for expired leases whose deletion failed.
    pub failed: Vec<(String, String)>,
}

/// Background controller that deletes leases past their effective lifetime.
/// Each tick reconciles the provider's live list with the cache; a failed
/// reconciliation skips the tick, a failed deletion skips only that lease.
pub struct ExpiryController {
    manager: Arc<LeaseManager>,
    check_interval: Duration,
    cancel: CancelSignal,
}

impl ExpiryController {
    pub fn new(manager: Arc<LeaseManager>) -> Self {
        let check_interval = manager.config().gc_interval;
        Self {
            manager,
            check_interval,
            cancel: CancelSignal::never(),
        }
    }

    /// Stop the loop and abandon in-flight provider calls once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let base = self.manager.config().base_lifetime;
            if base.is_zero() {
                info!("ExpiryController disabled (base lifetime is 0)");
                return;
            }
            info!(
                "ExpiryController started (interval={}s, lifetime={})",
                self.check_interval.as_secs(),
                format_duration(base)
            );
            let mut interval = tokio::time::interval(self.check_interval);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("ExpiryController stopped");
                        return;
                    }
                    _ = interval.tick() => {}
                }
                match self.sweep().await {
                    Ok(report) if !report.deleted.is_empty() || !report.failed.is_empty() => {
                        info!(
                            "ExpiryController sweep: {} examined, {} deleted, {} failed",
                            report.examined,
                            report.deleted.len(),
                            report.failed.len()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("ExpiryController sweep skipped: {}", e),
                }
            }
        })
    }

    /// One pass: delete every expired lease.
    pub async fn sweep(&self) -> Result<SweepReport, LeaseError> {
        let base = self.manager.config().base_lifetime;
        if base.is_zero() {
            return Ok(SweepReport::default());
        }

        let leases = self.manager.reconciler().enriched().await?;
        let now = self.manager.clock().now();
        let mut report = SweepReport {
            examined: leases.len(),
            ..Default::default()
        };

        for lease in leases.iter().filter(|l| l.is_expired(base, now)) {
            let lifetime = lease.effective_lifetime(base);
            info!(
                "Lease {} expired (created {}, lifetime {})",
                lease.name,
                lease.created_at.to_rfc3339(),
                format_duration(lifetime)
            );
            let reason = format!(
                "Deleted because it was up for over {}",
                format_duration(lifetime)
            );
            match self.manager.retire(lease, &reason, &self.cancel).await {
                Ok(()) => report.deleted.push(lease.name.clone()),
                Err(e) => {
                    warn!("ExpiryController failed to delete lease {}: {}", lease.name, e);
                    report.failed.push((lease.name.clone(), e.to_string()));
                }
            }
        }
        debug!(
            "ExpiryController examined {} leases at {}",
            report.examined,
            now.to_rfc3339()
        );
        Ok(report)
    }
}

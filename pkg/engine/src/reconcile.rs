//! Merge the provider's live view with the lease cache.
//!
//! The provider decides *what* is running; the cache only contributes the
//! fields the provider cannot know (pin, requester, options, extension).

use pkg_provider::ComputeProvider;
use pkg_state::LeaseStore;
use pkg_types::lease::{Instance, Lease};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::LeaseError;

/// One enriched lease per live instance, in provider order. Cache records
/// without a live instance are dropped; instances without a record keep
/// their provider fields only. First matching record wins.
pub fn reconcile(live: Vec<Instance>, cached: &[Lease]) -> Vec<Lease> {
    live.into_iter()
        .map(|instance| {
            let mut lease = Lease::from(instance);
            if let Some(record) = cached.iter().find(|c| c.name == lease.name) {
                lease.overlay(record);
            }
            lease
        })
        .collect()
}

/// Drift between the provider and the cache. Read-only: nothing is pruned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub leases: Vec<Lease>,
    /// Cache records whose instance is no longer running.
    pub stale_records: Vec<String>,
    /// Running instances with no cache record.
    pub untracked_instances: Vec<String>,
}

pub fn report(live: Vec<Instance>, cached: &[Lease]) -> ReconcileReport {
    let live_names: HashSet<&str> = live.iter().map(|i| i.name.as_str()).collect();
    let cached_names: HashSet<&str> = cached.iter().map(|c| c.name.as_str()).collect();

    let stale_records = cached
        .iter()
        .filter(|c| !live_names.contains(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();
    let untracked_instances = live
        .iter()
        .filter(|i| !cached_names.contains(i.name.as_str()))
        .map(|i| i.name.clone())
        .collect();

    ReconcileReport {
        leases: reconcile(live, cached),
        stale_records,
        untracked_instances,
    }
}

/// Fetches both views and reconciles them. A failure of either call fails
/// the whole read.
#[derive(Clone)]
pub struct Reconciler {
    provider: Arc<dyn ComputeProvider>,
    store: Arc<dyn LeaseStore>,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn ComputeProvider>, store: Arc<dyn LeaseStore>) -> Self {
        Self { provider, store }
    }

    pub async fn enriched(&self) -> Result<Vec<Lease>, LeaseError> {
        let live = self.provider.list_running().await?;
        let cached = self.store.get_all().await?;
        Ok(reconcile(live, &cached))
    }

    pub async fn report(&self) -> Result<ReconcileReport, LeaseError> {
        let live = self.provider.list_running().await?;
        let cached = self.store.get_all().await?;
        Ok(report(live, &cached))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pkg_provider::{LocalProvider, Operation, ProviderError};
    use pkg_state::MemoryLeaseStore;
    use pkg_types::lease::LeaseSpec;
    use std::time::Duration;

    fn instance(name: &str, address: &str) -> Instance {
        Instance {
            name: name.to_string(),
            region: "ams".to_string(),
            main_address: address.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
            running: true,
        }
    }

    fn cached(name: &str, pin: &str) -> Lease {
        let spec = LeaseSpec {
            region: "stale-region".to_string(),
            requested_by: "dana".to_string(),
            ..Default::default()
        };
        let mut lease = Lease::requested(name, pin, &spec, Utc::now());
        lease.main_address = "0.0.0.0".to_string();
        lease.granted_extension = Some(Duration::from_secs(600));
        lease
    }

    #[test]
    fn test_overlay_keeps_provider_fields() {
        let live = vec![instance("alpha", "10.0.0.2"), instance("beta", "10.0.0.3")];
        let records = vec![cached("alpha", "1111"), cached("ghost", "2222")];

        let leases = reconcile(live, &records);
        assert_eq!(leases.len(), 2);

        let alpha = &leases[0];
        assert_eq!(alpha.main_address, "10.0.0.2");
        assert_eq!(alpha.region, "ams");
        assert_eq!(alpha.pin.as_deref(), Some("1111"));
        assert_eq!(alpha.requested_by.as_deref(), Some("dana"));
        assert_eq!(alpha.granted_extension, Some(Duration::from_secs(600)));

        let beta = &leases[1];
        assert!(beta.pin.is_none());
        assert!(beta.granted_extension.is_none());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let live = vec![instance("alpha", "10.0.0.2"), instance("beta", "10.0.0.3")];
        let records = vec![cached("alpha", "1111")];
        let first = reconcile(live.clone(), &records);
        let second = reconcile(live, &records);
        assert_eq!(first, second);
    }

    #[test]
    fn test_first_duplicate_record_wins() {
        let live = vec![instance("alpha", "10.0.0.2")];
        let records = vec![cached("alpha", "1111"), cached("alpha", "9999")];
        assert_eq!(reconcile(live, &records)[0].pin.as_deref(), Some("1111"));
    }

    #[test]
    fn test_report_lists_drift() {
        let live = vec![instance("alpha", "10.0.0.2"), instance("beta", "10.0.0.3")];
        let records = vec![cached("alpha", "1111"), cached("ghost", "2222")];
        let report = report(live, &records);
        assert_eq!(report.leases.len(), 2);
        assert_eq!(report.stale_records, vec!["ghost".to_string()]);
        assert_eq!(report.untracked_instances, vec!["beta".to_string()]);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_the_read() {
        let provider = Arc::new(LocalProvider::new(vec![]));
        provider.inject_fault(
            Operation::List,
            None,
            ProviderError::Transient("timeout".to_string()),
            1,
        );
        let reconciler = Reconciler::new(provider, Arc::new(MemoryLeaseStore::new()));
        assert!(matches!(
            reconciler.enriched().await,
            Err(LeaseError::Provider(_))
        ));
        assert!(reconciler.enriched().await.unwrap().is_empty());
    }
}

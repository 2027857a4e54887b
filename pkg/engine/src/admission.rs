//! Admission control for new leases.
//!
//! Rate and capacity checks, plus name allocation, run inside one critical
//! section. Slow provider creation happens after the section is released, so
//! every admitted-but-not-yet-created lease holds an [`AdmissionPermit`] that
//! counts toward capacity and reserves its name until dropped.

use chrono::{DateTime, TimeDelta, Utc};
use pkg_constants::lease::RATE_WINDOW_SECS;
use pkg_provider::ComputeProvider;
use pkg_state::LeaseStore;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::LeaseError;
use crate::names::NameAllocator;

/// Sliding-window count of successful creations.
#[derive(Debug)]
pub struct RateCounter {
    window: TimeDelta,
    events: VecDeque<DateTime<Utc>>,
}

impl RateCounter {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            events: VecDeque::new(),
        }
    }

    /// Record a creation at `at`, dropping events that have left the window.
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.count(at);
        self.events.push_back(at);
    }

    /// Creations in `(now - window, now]`.
    pub fn count(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        while self.events.front().is_some_and(|t| *t <= cutoff) {
            self.events.pop_front();
        }
        self.events.len()
    }
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(RATE_WINDOW_SECS as i64))
    }
}

/// Mutable admission state, shared by every engine handle that should see
/// the same limits. Injected so tests and embedders control its scope.
#[derive(Debug, Default)]
pub struct AdmissionState {
    gate: tokio::sync::Mutex<()>,
    rate: Mutex<RateCounter>,
    reserved: Mutex<HashSet<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl AdmissionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently held by in-flight creations.
    pub fn in_flight(&self) -> usize {
        lock(&self.reserved).len()
    }

    pub fn creations_in_window(&self, now: DateTime<Utc>) -> usize {
        lock(&self.rate).count(now)
    }
}

/// Limits enforced at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub max_concurrent: u32,
    /// 0 = unlimited.
    pub max_per_window: u32,
}

pub struct AdmissionController {
    limits: AdmissionLimits,
    state: Arc<AdmissionState>,
}

impl AdmissionController {
    pub fn new(limits: AdmissionLimits) -> Self {
        Self::with_state(limits, Arc::new(AdmissionState::new()))
    }

    pub fn with_state(limits: AdmissionLimits, state: Arc<AdmissionState>) -> Self {
        Self { limits, state }
    }

    pub fn limits(&self) -> AdmissionLimits {
        self.limits
    }

    pub fn state(&self) -> &Arc<AdmissionState> {
        &self.state
    }

    /// Admit one creation or reject it. On success the returned permit
    /// carries a freshly allocated, reserved name.
    pub async fn try_admit(
        &self,
        now: DateTime<Utc>,
        provider: &dyn ComputeProvider,
        store: &dyn LeaseStore,
        names: &NameAllocator,
    ) -> Result<AdmissionPermit, LeaseError> {
        let _gate = self.state.gate.lock().await;

        if self.limits.max_per_window != 0 {
            let recent = self.state.creations_in_window(now);
            if recent > self.limits.max_per_window as usize {
                info!(
                    "Admission rejected: {} creations in the last hour (limit {})",
                    recent, self.limits.max_per_window
                );
                return Err(LeaseError::RateExceeded {
                    limit: self.limits.max_per_window,
                });
            }
        }

        let live = provider.list_running().await?;
        let mut taken: Vec<String> = live.into_iter().map(|i| i.name).collect();
        let live_count = taken.len();
        {
            let reserved = lock(&self.state.reserved);
            let in_flight = reserved.len();
            if live_count + in_flight >= self.limits.max_concurrent as usize {
                info!(
                    "Admission rejected: {} running + {} provisioning (max {})",
                    live_count, in_flight, self.limits.max_concurrent
                );
                return Err(LeaseError::CapacityExceeded {
                    max: self.limits.max_concurrent,
                });
            }
            taken.extend(reserved.iter().cloned());
        }

        let cached: Vec<String> = store.get_all().await?.into_iter().map(|l| l.name).collect();
        let name = names.allocate(&taken, &cached)?;

        lock(&self.state.reserved).insert(name.clone());
        debug!("Admitted {} ({} running)", name, live_count);
        Ok(AdmissionPermit {
            name,
            state: self.state.clone(),
        })
    }
}

/// An admitted creation in flight. Dropping it frees the capacity slot and
/// the reserved name.
#[derive(Debug)]
pub struct AdmissionPermit {
    name: String,
    state: Arc<AdmissionState>,
}

impl AdmissionPermit {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Count a successful remote creation against the rate window.
    pub fn record_creation(&self, at: DateTime<Utc>) {
        lock(&self.state.rate).record(at);
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        lock(&self.state.reserved).remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::ScriptedNames;
    use pkg_provider::LocalProvider;
    use pkg_state::MemoryLeaseStore;
    use pkg_types::lease::Instance;

    fn limits(max_concurrent: u32, max_per_window: u32) -> AdmissionLimits {
        AdmissionLimits {
            max_concurrent,
            max_per_window,
        }
    }

    fn seed(provider: &LocalProvider, name: &str) {
        provider.seed(Instance {
            name: name.to_string(),
            region: "ams".to_string(),
            main_address: "10.0.0.9".to_string(),
            created_at: Utc::now(),
            running: true,
        });
    }

    #[test]
    fn test_rate_counter_slides() {
        let t0 = Utc::now();
        let mut counter = RateCounter::default();
        counter.record(t0);
        counter.record(t0 + TimeDelta::minutes(30));
        assert_eq!(counter.count(t0 + TimeDelta::minutes(59)), 2);
        assert_eq!(counter.count(t0 + TimeDelta::minutes(60)), 1);
        assert_eq!(counter.count(t0 + TimeDelta::minutes(91)), 0);
    }

    #[test]
    fn test_rate_counter_stays_bounded_without_reads() {
        let t0 = Utc::now();
        let mut counter = RateCounter::default();
        for i in 0..1000 {
            counter.record(t0 + TimeDelta::minutes(10 * i));
        }
        assert_eq!(counter.events.len(), 6);
    }

    #[tokio::test]
    async fn test_capacity_counts_live_and_in_flight() {
        let provider = LocalProvider::new(vec![]);
        let store = MemoryLeaseStore::new();
        let names = NameAllocator::new(Box::new(ScriptedNames::new(["a", "b", "c"])));
        let admission = AdmissionController::new(limits(2, 0));
        seed(&provider, "live");

        let permit = admission
            .try_admit(Utc::now(), &provider, &store, &names)
            .await
            .unwrap();
        assert_eq!(permit.name(), "a");
        assert_eq!(admission.state().in_flight(), 1);

        let err = admission
            .try_admit(Utc::now(), &provider, &store, &names)
            .await
            .unwrap_err();
        assert!(matches!(err, LeaseError::CapacityExceeded { max: 2 }));

        drop(permit);
        assert_eq!(admission.state().in_flight(), 0);
        let permit = admission
            .try_admit(Utc::now(), &provider, &store, &names)
            .await
            .unwrap();
        assert_eq!(permit.name(), "b");
    }

    #[tokio::test]
    async fn test_reserved_names_are_not_reallocated() {
        let provider = LocalProvider::new(vec![]);
        let store = MemoryLeaseStore::new();
        let names = NameAllocator::new(Box::new(ScriptedNames::new(["a", "a", "b"])));
        let admission = AdmissionController::new(limits(5, 0));

        let first = admission
            .try_admit(Utc::now(), &provider, &store, &names)
            .await
            .unwrap();
        let second = admission
            .try_admit(Utc::now(), &provider, &store, &names)
            .await
            .unwrap();
        assert_eq!(first.name(), "a");
        assert_eq!(second.name(), "b");
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_when_window_exceeds_limit() {
        let provider = LocalProvider::new(vec![]);
        let store = MemoryLeaseStore::new();
        let names = NameAllocator::default();
        let admission = AdmissionController::new(limits(100, 1));
        let now = Utc::now();

        for _ in 0..2 {
            let permit = admission
                .try_admit(now, &provider, &store, &names)
                .await
                .unwrap();
            permit.record_creation(now);
        }
        let err = admission
            .try_admit(now, &provider, &store, &names)
            .await
            .unwrap_err();
        assert!(matches!(err, LeaseError::RateExceeded { limit: 1 }));

        // window has slid past both creations
        let later = now + TimeDelta::seconds(RATE_WINDOW_SECS as i64 + 1);
        assert!(
            admission
                .try_admit(later, &provider, &store, &names)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_zero_rate_limit_is_unlimited() {
        let provider = LocalProvider::new(vec![]);
        let store = MemoryLeaseStore::new();
        let names = NameAllocator::default();
        let admission = AdmissionController::new(limits(1000, 0));
        let now = Utc::now();
        for _ in 0..20 {
            let permit = admission
                .try_admit(now, &provider, &store, &names)
                .await
                .unwrap();
            permit.record_creation(now);
        }
    }
}

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::options::LeaseOptions;

// --- Lease phase ---

/// Lifecycle phase of a lease.
///
/// `Requested → Provisioning → Active → (Extended)* → Expiring → Deleted`,
/// with `Provisioning → Failed` as the abnormal exit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LeasePhase {
    Requested,
    Provisioning,
    Active,
    Extended,
    Expiring,
    Deleted,
    Failed,
}

impl std::fmt::Display for LeasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeasePhase::Requested => write!(f, "Requested"),
            LeasePhase::Provisioning => write!(f, "Provisioning"),
            LeasePhase::Active => write!(f, "Active"),
            LeasePhase::Extended => write!(f, "Extended"),
            LeasePhase::Expiring => write!(f, "Expiring"),
            LeasePhase::Deleted => write!(f, "Deleted"),
            LeasePhase::Failed => write!(f, "Failed"),
        }
    }
}

// --- Provider view ---

/// A remote instance as reported by the compute provider.
/// Carries only provider-authoritative fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub main_address: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub running: bool,
}

// --- Creation request ---

/// What a requester asks for when creating a lease.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseSpec {
    pub region: String,
    /// Opaque requester identity. Filled in by the caller's transport.
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub options: LeaseOptions,
    #[serde(default)]
    pub extra_args: String,
}

// --- Lease ---

/// One ephemeral compute instance plus its owner/config metadata and expiry state.
/// Stored at `/registry/leases/<name>` in the state store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lease {
    /// Unique, human-readable, immutable after creation.
    pub name: String,
    #[serde(default)]
    pub region: String,
    /// Only ever known to the cache.
    #[serde(default)]
    pub requested_by: Option<String>,
    /// Only ever known to the cache.
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub main_address: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub options: LeaseOptions,
    #[serde(default)]
    pub extra_args: String,
    /// Additive to the base lifetime. Only grows, capped by the configured maximum.
    #[serde(default)]
    pub granted_extension: Option<Duration>,
}

impl Lease {
    /// A fresh, not yet provisioned lease for `spec`.
    pub fn requested(name: &str, pin: &str, spec: &LeaseSpec, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            region: spec.region.clone(),
            requested_by: Some(spec.requested_by.clone()).filter(|r| !r.is_empty()),
            pin: Some(pin.to_string()),
            main_address: String::new(),
            created_at: now,
            running: false,
            options: spec.options.clone(),
            extra_args: spec.extra_args.clone(),
            granted_extension: None,
        }
    }

    /// Overlay the cache-only fields of `cached` onto this provider-reported record.
    /// Provider fields (address, creation time, running state) are left untouched.
    pub fn overlay(&mut self, cached: &Lease) {
        self.pin = cached.pin.clone();
        self.requested_by = cached.requested_by.clone();
        self.options = cached.options.clone();
        self.extra_args = cached.extra_args.clone();
        self.granted_extension = cached.granted_extension;
    }

    /// Base lifetime plus any granted extension.
    pub fn effective_lifetime(&self, base_lifetime: Duration) -> Duration {
        base_lifetime.saturating_add(self.granted_extension.unwrap_or_default())
    }

    /// Point in time after which the lease is expired, or `None` when
    /// expiry is disabled (`base_lifetime == 0`).
    pub fn expires_at(&self, base_lifetime: Duration) -> Option<DateTime<Utc>> {
        if base_lifetime.is_zero() {
            return None;
        }
        let lifetime = TimeDelta::from_std(self.effective_lifetime(base_lifetime)).ok()?;
        self.created_at.checked_add_signed(lifetime)
    }

    /// Whether the lease is past its effective expiry at `now`.
    pub fn is_expired(&self, base_lifetime: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at(base_lifetime)
            .is_some_and(|expiry| now > expiry)
    }

    /// Time left until expiry, saturating at zero. `None` when expiry is disabled.
    pub fn remaining(&self, base_lifetime: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let expiry = self.expires_at(base_lifetime)?;
        Some(
            expiry
                .signed_duration_since(now)
                .to_std()
                .unwrap_or_default(),
        )
    }

    /// Steady-state phase of a live lease at `now`.
    pub fn phase(&self, base_lifetime: Duration, now: DateTime<Utc>) -> LeasePhase {
        if self.is_expired(base_lifetime, now) {
            LeasePhase::Expiring
        } else if self.granted_extension.is_some_and(|e| !e.is_zero()) {
            LeasePhase::Extended
        } else {
            LeasePhase::Active
        }
    }
}

impl From<Instance> for Lease {
    fn from(instance: Instance) -> Self {
        Self {
            name: instance.name,
            region: instance.region,
            requested_by: None,
            pin: None,
            main_address: instance.main_address,
            created_at: instance.created_at,
            running: instance.running,
            options: LeaseOptions::default(),
            extra_args: String::new(),
            granted_extension: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOURS_2: Duration = Duration::from_secs(7200);

    fn lease_created(at: DateTime<Utc>) -> Lease {
        Lease::from(Instance {
            name: "brave-otter".to_string(),
            region: "ams".to_string(),
            main_address: "10.0.0.2".to_string(),
            created_at: at,
            running: true,
        })
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let just_past = lease_created(now - TimeDelta::seconds(7201));
        let just_before = lease_created(now - TimeDelta::seconds(7199));

        assert!(just_past.is_expired(HOURS_2, now));
        assert!(!just_before.is_expired(HOURS_2, now));
    }

    #[test]
    fn test_zero_base_lifetime_never_expires() {
        let now = Utc::now();
        let ancient = lease_created(now - TimeDelta::days(365));
        assert_eq!(ancient.expires_at(Duration::ZERO), None);
        assert!(!ancient.is_expired(Duration::ZERO, now));
        assert_eq!(ancient.remaining(Duration::ZERO, now), None);
    }

    #[test]
    fn test_extension_pushes_expiry() {
        let now = Utc::now();
        let mut lease = lease_created(now - TimeDelta::seconds(7300));
        assert!(lease.is_expired(HOURS_2, now));
        assert_eq!(lease.phase(HOURS_2, now), LeasePhase::Expiring);

        lease.granted_extension = Some(Duration::from_secs(3600));
        assert!(!lease.is_expired(HOURS_2, now));
        assert_eq!(lease.phase(HOURS_2, now), LeasePhase::Extended);
        assert_eq!(
            lease.remaining(HOURS_2, now),
            Some(Duration::from_secs(3500))
        );
    }

    #[test]
    fn test_overlay_keeps_provider_fields() {
        let now = Utc::now();
        let mut live = lease_created(now);
        let mut cached = lease_created(now - TimeDelta::hours(1));
        cached.main_address = "192.0.2.1".to_string();
        cached.pin = Some("1234".to_string());
        cached.requested_by = Some("user-1".to_string());
        cached.granted_extension = Some(Duration::from_secs(60));

        live.overlay(&cached);

        assert_eq!(live.main_address, "10.0.0.2");
        assert_eq!(live.created_at, now);
        assert!(live.running);
        assert_eq!(live.pin.as_deref(), Some("1234"));
        assert_eq!(live.requested_by.as_deref(), Some("user-1"));
        assert_eq!(live.granted_extension, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_requested_drops_empty_requester() {
        let spec = LeaseSpec {
            region: "ams".to_string(),
            ..Default::default()
        };
        let lease = Lease::requested("brave-otter", "0042", &spec, Utc::now());
        assert_eq!(lease.requested_by, None);
        assert_eq!(lease.pin.as_deref(), Some("0042"));
        assert!(!lease.running);
    }
}

//! In-process compute provider.
//!
//! Simulates a remote provider: instances live in memory, get a private
//! address and a boot log, and can be restarted, deleted and have their logs
//! extracted. Faults can be scripted per operation so callers can exercise
//! their failure paths.

use async_trait::async_trait;
use dashmap::DashMap;
use flate2::Compression;
use flate2::write::GzEncoder;
use pkg_constants::provider::MAX_LOG_ARCHIVE_BYTES;
use pkg_types::clock::{Clock, SystemClock};
use pkg_types::lease::{Instance, Lease};
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::{ComputeProvider, ProviderError, Provisioned};

/// Provider operations, used to script faults and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    List,
    Delete,
    Restart,
    ExtractLogs,
}

#[derive(Debug)]
struct Fault {
    op: Operation,
    /// `None` matches any instance name.
    target: Option<String>,
    error: ProviderError,
    remaining: u32,
}

#[derive(Debug, Clone)]
struct LocalInstance {
    instance: Instance,
    log: Vec<String>,
}

/// In-memory compute provider.
#[derive(Debug)]
pub struct LocalProvider {
    instances: DashMap<String, LocalInstance>,
    regions: Vec<String>,
    boot_delay: Duration,
    clock: Arc<dyn Clock>,
    next_host: AtomicU32,
    faults: Mutex<Vec<Fault>>,
    calls: DashMap<Operation, usize>,
}

impl LocalProvider {
    /// A provider offering `regions`. An empty list accepts any region.
    pub fn new(regions: Vec<String>) -> Self {
        Self {
            instances: DashMap::new(),
            regions,
            boot_delay: Duration::ZERO,
            clock: Arc::new(SystemClock),
            next_host: AtomicU32::new(2),
            faults: Mutex::new(Vec::new()),
            calls: DashMap::new(),
        }
    }

    /// Simulated time between the create request and boot acknowledgment.
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Time source for instance creation timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Make the next `times` calls of `op` (against `target`, or any instance
    /// when `None`) fail with `error`.
    pub fn inject_fault(
        &self,
        op: Operation,
        target: Option<&str>,
        error: ProviderError,
        times: u32,
    ) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(Fault {
                op,
                target: target.map(str::to_string),
                error,
                remaining: times,
            });
        }
    }

    /// Insert an already-running instance, bypassing creation.
    pub fn seed(&self, instance: Instance) {
        let log = vec![format!("seeded instance {}", instance.name)];
        self.instances
            .insert(instance.name.clone(), LocalInstance { instance, log });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// How many times `op` has been invoked.
    pub fn calls(&self, op: Operation) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    fn enter(&self, op: Operation, target: Option<&str>) -> Result<(), ProviderError> {
        *self.calls.entry(op).or_insert(0) += 1;

        let Ok(mut faults) = self.faults.lock() else {
            return Ok(());
        };
        let hit = faults.iter().position(|f| {
            f.op == op
                && f.remaining > 0
                && match (&f.target, target) {
                    (None, _) => true,
                    (Some(t), Some(name)) => t == name,
                    (Some(_), None) => false,
                }
        });
        if let Some(idx) = hit {
            let fault = &mut faults[idx];
            fault.remaining -= 1;
            let error = fault.error.clone();
            if fault.remaining == 0 {
                faults.remove(idx);
            }
            debug!("LocalProvider injected fault on {:?}: {}", op, error);
            return Err(error);
        }
        Ok(())
    }

    fn resolve_region(&self, requested: &str) -> Result<String, ProviderError> {
        if self.regions.is_empty() {
            return Ok(requested.to_string());
        }
        self.regions
            .iter()
            .find(|r| r.eq_ignore_ascii_case(requested.trim()))
            .cloned()
            .ok_or_else(|| {
                ProviderError::Rejected(format!(
                    "unknown region '{}' (available: {})",
                    requested,
                    self.regions.join(", ")
                ))
            })
    }

    fn next_address(&self) -> String {
        let host = self.next_host.fetch_add(1, Ordering::Relaxed);
        format!("10.{}.{}.{}", (host >> 16) & 0xff, (host >> 8) & 0xff, host & 0xff)
    }
}

#[async_trait]
impl ComputeProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_instance(&self, lease: &Lease) -> Result<Provisioned, ProviderError> {
        self.enter(Operation::Create, Some(&lease.name))?;
        let region = self.resolve_region(&lease.region)?;
        if self.instances.contains_key(&lease.name) {
            return Err(ProviderError::Rejected(format!(
                "instance '{}' already exists",
                lease.name
            )));
        }

        if !self.boot_delay.is_zero() {
            tokio::time::sleep(self.boot_delay).await;
        }

        let instance = Instance {
            name: lease.name.clone(),
            region: region.clone(),
            main_address: self.next_address(),
            created_at: self.clock.now(),
            running: true,
        };
        let mut log = vec![format!("boot: {} in {}", lease.name, region)];
        if !lease.extra_args.is_empty() {
            log.push(format!("boot: extra args {}", lease.extra_args));
        }
        for flag in lease.options.enabled_flags() {
            log.push(format!("boot: enabled {}", flag));
        }

        let provisioned = Provisioned {
            main_address: instance.main_address.clone(),
            created_at: instance.created_at,
            region,
        };
        info!(
            "LocalProvider created {} at {} ({})",
            instance.name, instance.main_address, instance.region
        );
        self.instances
            .insert(instance.name.clone(), LocalInstance { instance, log });
        Ok(provisioned)
    }

    async fn list_running(&self) -> Result<Vec<Instance>, ProviderError> {
        self.enter(Operation::List, None)?;
        let mut all: Vec<Instance> = self
            .instances
            .iter()
            .map(|e| e.value().instance.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn delete_instance(&self, name: &str) -> Result<(), ProviderError> {
        self.enter(Operation::Delete, Some(name))?;
        if self.instances.remove(name).is_some() {
            info!("LocalProvider deleted {}", name);
        } else {
            debug!("LocalProvider delete of {}: already gone", name);
        }
        Ok(())
    }

    async fn restart_instance(&self, name: &str) -> Result<(), ProviderError> {
        self.enter(Operation::Restart, Some(name))?;
        let now = self.clock.now();
        let mut entry = self
            .instances
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
        entry.log.push(format!("restart: {}", now.to_rfc3339()));
        entry.instance.running = true;
        info!("LocalProvider restarted {}", name);
        Ok(())
    }

    async fn extract_logs(&self, name: &str) -> Result<Vec<u8>, ProviderError> {
        self.enter(Operation::ExtractLogs, Some(name))?;
        let log = self
            .instances
            .get(name)
            .map(|e| e.log.join("\n"))
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(log.as_bytes())
            .map_err(|e| ProviderError::Transient(format!("log compression failed: {}", e)))?;
        let archive = encoder
            .finish()
            .map_err(|e| ProviderError::Transient(format!("log compression failed: {}", e)))?;
        if archive.len() > MAX_LOG_ARCHIVE_BYTES {
            return Err(ProviderError::Rejected(format!(
                "log archive for {} is {} bytes (limit {})",
                name,
                archive.len(),
                MAX_LOG_ARCHIVE_BYTES
            )));
        }
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flate2::read::GzDecoder;
    use pkg_types::lease::LeaseSpec;
    use std::io::Read;

    fn lease(name: &str, region: &str) -> Lease {
        let spec = LeaseSpec {
            region: region.to_string(),
            extra_args: "+maxplayers 8".to_string(),
            ..Default::default()
        };
        Lease::requested(name, "1234", &spec, Utc::now())
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let provider = LocalProvider::new(vec!["Amsterdam".to_string()]);
        let provisioned = provider
            .create_instance(&lease("brave-otter", "amsterdam"))
            .await
            .unwrap();
        assert_eq!(provisioned.region, "Amsterdam");
        assert!(provisioned.main_address.starts_with("10."));

        let listed = provider.list_running().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "brave-otter");
        assert!(listed[0].running);

        provider.delete_instance("brave-otter").await.unwrap();
        // idempotent
        provider.delete_instance("brave-otter").await.unwrap();
        assert!(provider.is_empty());
        assert_eq!(provider.calls(Operation::Delete), 2);
    }

    #[tokio::test]
    async fn test_unknown_region_rejected() {
        let provider = LocalProvider::new(vec!["ams".to_string()]);
        let err = provider
            .create_instance(&lease("brave-otter", "nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_fault_injection_is_targeted_and_bounded() {
        let provider = LocalProvider::new(vec![]);
        provider.inject_fault(
            Operation::Delete,
            Some("b"),
            ProviderError::Transient("connection reset".to_string()),
            1,
        );

        provider.delete_instance("a").await.unwrap();
        assert!(provider.delete_instance("b").await.is_err());
        provider.delete_instance("b").await.unwrap();
    }

    #[tokio::test]
    async fn test_extract_logs_is_gzip() {
        let provider = LocalProvider::new(vec![]);
        provider
            .create_instance(&lease("brave-otter", "ams"))
            .await
            .unwrap();
        provider.restart_instance("brave-otter").await.unwrap();

        let archive = provider.extract_logs("brave-otter").await.unwrap();
        let mut text = String::new();
        GzDecoder::new(&archive[..]).read_to_string(&mut text).unwrap();
        assert!(text.contains("boot: brave-otter in ams"));
        assert!(text.contains("extra args +maxplayers 8"));
        assert!(text.contains("restart:"));

        assert!(provider.extract_logs("missing").await.unwrap_err().is_not_found());
    }
}

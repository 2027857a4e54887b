//! In-process lease store.
//!
//! Used for `ephemeral-store` deployments and in tests. Thread-safe via
//! `DashMap`; records vanish with the process.

use async_trait::async_trait;
use dashmap::DashMap;
use pkg_types::lease::Lease;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use crate::lease_store::{LeaseStore, StoreError};

/// Concurrent in-memory lease store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseStore {
    leases: Arc<DashMap<String, Lease>>,
    failing_upserts: Arc<Mutex<HashSet<String>>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert for `name` fail with a backend error until cleared.
    pub fn fail_upserts_for(&self, name: &str) {
        if let Ok(mut failing) = self.failing_upserts.lock() {
            failing.insert(name.to_string());
        }
    }

    /// Make every upsert fail, whatever the name.
    pub fn fail_all_upserts(&self) {
        self.fail_upserts_for("*");
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_upserts.lock() {
            failing.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    fn upsert_fails(&self, name: &str) -> bool {
        self.failing_upserts
            .lock()
            .map(|failing| failing.contains(name) || failing.contains("*"))
            .unwrap_or(false)
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn get_all(&self) -> Result<Vec<Lease>, StoreError> {
        let mut all: Vec<Lease> = self.leases.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_by_name(&self, name: &str) -> Result<Lease, StoreError> {
        self.leases
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn upsert(&self, lease: &Lease) -> Result<(), StoreError> {
        if self.upsert_fails(&lease.name) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected write failure for {}",
                lease.name
            )));
        }
        self.leases.insert(lease.name.clone(), lease.clone());
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), StoreError> {
        self.leases
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pkg_types::lease::LeaseSpec;

    fn lease(name: &str) -> Lease {
        Lease::requested(name, "0000", &LeaseSpec::default(), Utc::now())
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let store = MemoryLeaseStore::new();
        store.upsert(&lease("b")).await.unwrap();
        store.upsert(&lease("a")).await.unwrap();

        let names: Vec<String> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        store.delete_by_name("a").await.unwrap();
        assert!(store.delete_by_name("a").await.unwrap_err().is_not_found());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_upsert_failure() {
        let store = MemoryLeaseStore::new();
        store.fail_upserts_for("doomed");

        let err = store.upsert(&lease("doomed")).await.unwrap_err();
        assert!(!err.is_not_found());
        store.upsert(&lease("fine")).await.unwrap();

        store.clear_failures();
        store.upsert(&lease("doomed")).await.unwrap();
        assert_eq!(store.len(), 2);
    }
}

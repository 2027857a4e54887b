use async_trait::async_trait;
use pkg_constants::state::LEASE_KEY_PREFIX;
use pkg_types::lease::Lease;
use tracing::debug;

use crate::client::StateStore;

/// Errors surfaced by a lease store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists under this name. Callers treat this as non-fatal.
    #[error("lease '{0}' not found in store")]
    NotFound(String),

    /// The backing store failed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Durable repository of lease cache records, keyed by lease name.
///
/// Reads and writes for different names are independent; a write to one
/// name is a single-document upsert (last write wins).
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Every cached lease record.
    async fn get_all(&self) -> Result<Vec<Lease>, StoreError>;

    /// The record for `name`, or `StoreError::NotFound`.
    async fn get_by_name(&self, name: &str) -> Result<Lease, StoreError>;

    /// Insert or replace the record for `lease.name`.
    async fn upsert(&self, lease: &Lease) -> Result<(), StoreError>;

    /// Remove the record for `name`; `StoreError::NotFound` if there was none.
    async fn delete_by_name(&self, name: &str) -> Result<(), StoreError>;
}

fn lease_key(name: &str) -> String {
    format!("{}{}", LEASE_KEY_PREFIX, name)
}

/// Lease store persisted in SlateDB under `/registry/leases/<name>`.
#[derive(Clone)]
pub struct SlateLeaseStore {
    store: StateStore,
}

impl SlateLeaseStore {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Consume the lease store, returning the underlying state store (for shutdown).
    pub fn into_inner(self) -> StateStore {
        self.store
    }
}

#[async_trait]
impl LeaseStore for SlateLeaseStore {
    async fn get_all(&self) -> Result<Vec<Lease>, StoreError> {
        Ok(self.store.list_json(LEASE_KEY_PREFIX).await?)
    }

    async fn get_by_name(&self, name: &str) -> Result<Lease, StoreError> {
        self.store
            .get_json(&lease_key(name))
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn upsert(&self, lease: &Lease) -> Result<(), StoreError> {
        self.store.put_json(&lease_key(&lease.name), lease).await?;
        debug!("Stored lease record {}", lease.name);
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), StoreError> {
        if self.store.delete(&lease_key(name)).await? {
            debug!("Deleted lease record {}", name);
            Ok(())
        } else {
            Err(StoreError::NotFound(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pkg_types::lease::LeaseSpec;

    fn temp_dir(tag: &str) -> String {
        let dir = std::env::temp_dir().join(format!(
            "leasehold-test-{}-{}",
            tag,
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        dir.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_slate_store_crud() {
        let dir = temp_dir("crud");
        let store = SlateLeaseStore::new(StateStore::open(&dir).await.unwrap());

        let spec = LeaseSpec {
            region: "ams".to_string(),
            requested_by: "user-1".to_string(),
            ..Default::default()
        };
        let mut lease = Lease::requested("brave-otter", "1234", &spec, Utc::now());
        store.upsert(&lease).await.unwrap();

        let fetched = store.get_by_name("brave-otter").await.unwrap();
        assert_eq!(fetched, lease);

        lease.granted_extension = Some(std::time::Duration::from_secs(600));
        store.upsert(&lease).await.unwrap();
        assert_eq!(store.get_all().await.unwrap(), vec![lease]);

        store.delete_by_name("brave-otter").await.unwrap();
        assert!(
            store
                .delete_by_name("brave-otter")
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            store
                .get_by_name("brave-otter")
                .await
                .unwrap_err()
                .is_not_found()
        );

        store.into_inner().close().await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}

use serde::Serialize;
use serde::de::DeserializeOwned;
use slatedb::{Db, DbIterator};
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Persistent key-value store backed by SlateDB on a local filesystem.
/// Values are JSON documents; every write is a single-key put.
#[derive(Clone)]
pub struct StateStore {
    db: Db,
}

impl StateStore {
    /// Open (or create) a state store rooted at `path` on the local filesystem.
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        info!("Opening SlateDB state store at {}", path);

        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", path, e))?;

        let object_store = Arc::new(
            LocalFileSystem::new_with_prefix(path)
                .map_err(|e| anyhow::anyhow!("Failed to create local object store: {}", e))?,
        );
        let db = Db::open(Path::from("/"), object_store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open SlateDB: {}", e))?;
        Ok(Self { db })
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let data = serde_json::to_vec(value)?;
        self.db
            .put(key.as_bytes(), &data)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("SlateDB put {} failed: {}", key, e))
    }

    /// Fetch and decode the JSON document under `key`, or `None` if absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let bytes = self
            .db
            .get(key.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB get {} failed: {}", key, e))?;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete `key`. Returns whether a value was present beforehand.
    pub async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let existed = self
            .db
            .get(key.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB get {} failed: {}", key, e))?
            .is_some();
        if existed {
            self.db
                .delete(key.as_bytes())
                .await
                .map_err(|e| anyhow::anyhow!("SlateDB delete {} failed: {}", key, e))?;
        }
        Ok(existed)
    }

    /// Decode every JSON document whose key starts with `prefix`.
    /// Entries that fail to decode are skipped with a warning; a failing
    /// scan is an error.
    pub async fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> anyhow::Result<Vec<T>> {
        let mut iter = self
            .db
            .scan_prefix(prefix.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB scan_prefix {} failed: {}", prefix, e))?;
        decode_all(&mut iter).await
    }

    /// Gracefully close the state store.
    pub async fn close(self) -> anyhow::Result<()> {
        info!("Closing SlateDB state store");
        self.db
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB close failed: {}", e))
    }
}

/// Source of scanned key-value pairs.
trait ScanCursor {
    async fn next_entry(&mut self) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>>;
}

impl ScanCursor for DbIterator {
    async fn next_entry(&mut self) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>> {
        let kv = self
            .next()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB scan failed: {}", e))?;
        Ok(kv.map(|kv| (kv.key.to_vec(), kv.value.to_vec())))
    }
}

async fn decode_all<T: DeserializeOwned, C: ScanCursor>(cursor: &mut C) -> anyhow::Result<Vec<T>> {
    let mut results = Vec::new();
    while let Some((key, value)) = cursor.next_entry().await? {
        match serde_json::from_slice::<T>(&value) {
            Ok(v) => results.push(v),
            Err(e) => warn!(
                "Skipping undecodable record {}: {}",
                String::from_utf8_lossy(&key),
                e
            ),
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedCursor(VecDeque<anyhow::Result<(Vec<u8>, Vec<u8>)>>);

    impl ScanCursor for ScriptedCursor {
        async fn next_entry(&mut self) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>> {
            self.0.pop_front().transpose()
        }
    }

    fn entry(key: &str, value: &str) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
        Ok((key.as_bytes().to_vec(), value.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn test_decode_all_skips_undecodable_records() {
        let mut cursor = ScriptedCursor(VecDeque::from([
            entry("/registry/leases/a", "1"),
            entry("/registry/leases/b", "not json"),
            entry("/registry/leases/c", "3"),
        ]));
        let values: Vec<u32> = decode_all(&mut cursor).await.unwrap();
        assert_eq!(values, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_decode_all_propagates_scan_failure() {
        let mut cursor = ScriptedCursor(VecDeque::from([
            entry("/registry/leases/a", "1"),
            Err(anyhow::anyhow!("SlateDB scan failed: object store unavailable")),
            entry("/registry/leases/c", "3"),
        ]));
        let err = decode_all::<u32, _>(&mut cursor).await.unwrap_err();
        assert!(err.to_string().contains("object store unavailable"));
    }
}

//! Request ledger: the persisted map from request identity to captured
//! request, with a process-wide mutual-exclusion lock around every
//! read-modify-write.
//!
//! Request lifecycle events (pre-flight, completion, response relay,
//! override save/clear) fire from independent asynchronous tasks and race on
//! the same key. Without the lock, two tasks could both read a stale
//! snapshot and each write back an incomplete merge. The lock is coarse and
//! process-wide rather than per-key: contention is low by construction, and
//! one lock keeps the serialization argument trivial. `tokio::sync::Mutex`
//! queues waiters in arrival order, giving the FIFO fairness the merge
//! discipline relies on.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use overwire_proto::{CapturedRequest, REQUESTS_RECORD};

use crate::backend::{StorageBackend, StoreError};

/// Persisted identity -> [`CapturedRequest`] map.
pub struct RequestLedger {
    backend: Arc<dyn StorageBackend>,
    lock: Mutex<()>,
}

impl RequestLedger {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, CapturedRequest>, StoreError> {
        match self.backend.read(REQUESTS_RECORD).await? {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Ok(HashMap::new()),
        }
    }

    async fn persist(&self, map: &HashMap<String, CapturedRequest>) -> Result<(), StoreError> {
        let payload = serde_json::to_string(map)?;
        if let Err(e) = self.backend.write(REQUESTS_RECORD, &payload).await {
            warn!("failed to persist request ledger: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Look up a single entry by identity.
    pub async fn get(&self, id: &str) -> Result<Option<CapturedRequest>, StoreError> {
        Ok(self.load().await?.get(id).cloned())
    }

    /// Snapshot of the full ledger map.
    pub async fn all(&self) -> Result<HashMap<String, CapturedRequest>, StoreError> {
        self.load().await
    }

    /// Insert a freshly-captured entry unless the identity is already
    /// claimed.
    ///
    /// Returns `false` without touching storage when an entry exists: repeat
    /// navigation to a captured endpoint must not clobber its response or
    /// override data.
    pub async fn insert_new(&self, entry: CapturedRequest) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        if map.contains_key(&entry.id) {
            debug!(id = %entry.id, "identity already claimed, skipping capture");
            return Ok(false);
        }
        map.insert(entry.id.clone(), entry);
        self.persist(&map).await?;
        Ok(true)
    }

    /// Read-modify-write a single entry under the lock.
    ///
    /// Returns the updated entry, or `None` when the identity has no ledger
    /// entry. The mutation closure sees the freshest persisted state, so
    /// field updates are last-write-wins without lost updates.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<Option<CapturedRequest>, StoreError>
    where
        F: FnOnce(&mut CapturedRequest),
    {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        let Some(entry) = map.get_mut(id) else {
            return Ok(None);
        };
        mutate(entry);
        let updated = entry.clone();
        self.persist(&map).await?;
        Ok(Some(updated))
    }

    /// Read-modify-write every entry in one locked pass.
    pub async fn update_all<F>(&self, mut mutate: F) -> Result<(), StoreError>
    where
        F: FnMut(&mut CapturedRequest),
    {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        for entry in map.values_mut() {
            mutate(entry);
        }
        self.persist(&map).await
    }

    /// Remove an entry; `false` when the identity was absent.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        let removed = map.remove(id).is_some();
        if removed {
            self.persist(&map).await?;
        }
        Ok(removed)
    }

    /// Empty the ledger.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.persist(&HashMap::new()).await
    }

    /// Number of entries currently in the ledger.
    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.load().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn ledger() -> RequestLedger {
        RequestLedger::new(Arc::new(MemoryBackend::new()))
    }

    fn entry(id: &str) -> CapturedRequest {
        CapturedRequest::new(id, id, "endpoint", "GET", 1000)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let ledger = ledger();
        assert!(ledger.insert_new(entry("https://h/a")).await.unwrap());

        let found = ledger.get("https://h/a").await.unwrap().unwrap();
        assert_eq!(found.method, "GET");
        assert!(!found.completed);
    }

    #[tokio::test]
    async fn test_insert_does_not_clobber_claimed_identity() {
        let ledger = ledger();
        assert!(ledger.insert_new(entry("https://h/a")).await.unwrap());

        ledger
            .update("https://h/a", |e| e.response_data = Some(json!({"a": 1})))
            .await
            .unwrap();

        // Second pre-flight for the same identity is a no-op
        assert!(!ledger.insert_new(entry("https://h/a")).await.unwrap());
        let found = ledger.get("https://h/a").await.unwrap().unwrap();
        assert_eq!(found.response_data, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_update_missing_entry() {
        let ledger = ledger();
        let updated = ledger.update("https://h/nope", |e| e.completed = true).await.unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let ledger = ledger();
        ledger.insert_new(entry("https://h/a")).await.unwrap();

        ledger
            .update("https://h/a", |e| {
                e.completed = true;
                e.completed_at = Some(2000);
                e.response_status = Some(200);
            })
            .await
            .unwrap();

        let found = ledger.get("https://h/a").await.unwrap().unwrap();
        assert!(found.completed);
        assert_eq!(found.completed_at, Some(2000));
        assert_eq!(found.response_status, Some(200));
        // Untouched fields survive the merge
        assert_eq!(found.method, "GET");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let ledger = ledger();
        ledger.insert_new(entry("https://h/a")).await.unwrap();
        ledger.insert_new(entry("https://h/b")).await.unwrap();

        assert!(ledger.delete("https://h/a").await.unwrap());
        assert!(!ledger.delete("https://h/a").await.unwrap());
        assert_eq!(ledger.len().await.unwrap(), 1);

        ledger.clear().await.unwrap();
        assert!(ledger.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        // Interleaved read-modify-write cycles on the same key: without the
        // lock, most of these merges would overwrite each other.
        let ledger = Arc::new(ledger());
        ledger.insert_new(entry("https://h/a")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20u16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .update("https://h/a", move |e| {
                        let count = e.response_status.unwrap_or(0);
                        e.response_status = Some(count + 1);
                        if i == 0 {
                            e.completed = true;
                        }
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let found = ledger.get("https://h/a").await.unwrap().unwrap();
        assert_eq!(found.response_status, Some(20));
        assert!(found.completed);
    }
}

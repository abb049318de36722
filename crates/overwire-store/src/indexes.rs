//! Override and rule-id indexes.
//!
//! Both maps are keyed by the normalized endpoint key (origin + path,
//! query-agnostic) and persisted together as a single record: the
//! active-override flag says "a redirect is in force for this endpoint", the
//! rule-id map remembers which rule handle serves it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use overwire_proto::OVERRIDES_RECORD;

use crate::backend::{StorageBackend, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRecord {
    #[serde(default)]
    active_overrides: HashMap<String, bool>,
    #[serde(default)]
    rule_ids: HashMap<String, u32>,
}

/// Persisted pair of normalized-key indexes backing override state.
pub struct OverrideIndexes {
    backend: Arc<dyn StorageBackend>,
}

impl OverrideIndexes {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    async fn load(&self) -> Result<IndexRecord, StoreError> {
        match self.backend.read(OVERRIDES_RECORD).await? {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Ok(IndexRecord::default()),
        }
    }

    async fn persist(&self, record: &IndexRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        if let Err(e) = self.backend.write(OVERRIDES_RECORD, &payload).await {
            warn!("failed to persist override indexes: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Record an active override and the rule handle serving it.
    pub async fn record_override(&self, key: &str, rule_id: u32) -> Result<(), StoreError> {
        let mut record = self.load().await?;
        record.active_overrides.insert(key.to_string(), true);
        record.rule_ids.insert(key.to_string(), rule_id);
        self.persist(&record).await
    }

    /// Drop an override entry, returning the rule handle that served it.
    pub async fn remove_override(&self, key: &str) -> Result<Option<u32>, StoreError> {
        let mut record = self.load().await?;
        let had_flag = record.active_overrides.remove(key).is_some();
        let rule_id = record.rule_ids.remove(key);
        if had_flag || rule_id.is_some() {
            self.persist(&record).await?;
        }
        Ok(rule_id)
    }

    /// Whether an override is currently active for the key.
    pub async fn is_active(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .load()
            .await?
            .active_overrides
            .get(key)
            .copied()
            .unwrap_or(false))
    }

    /// Keys with an active override.
    pub async fn active_keys(&self) -> Result<Vec<String>, StoreError> {
        let record = self.load().await?;
        let mut keys: Vec<String> = record
            .active_overrides
            .into_iter()
            .filter(|(_, active)| *active)
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// The rule handle recorded for a key, if any.
    pub async fn rule_id_for(&self, key: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.load().await?.rule_ids.get(key).copied())
    }

    /// Whether the rule-id index holds any entries.
    pub async fn has_rules(&self) -> Result<bool, StoreError> {
        Ok(!self.load().await?.rule_ids.is_empty())
    }

    /// Reset both indexes to empty. Safe to call when already empty.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.persist(&IndexRecord::default()).await
    }
}

//! The capture-and-override engine.
//!
//! Owns the persisted stores and the rule manager as explicit dependencies
//! (constructed once at process start, injected for tests) and implements
//! the override operations invoked through the command boundary.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use overwire_proto::{
    now_millis, CapturedRequest, DebugInfo, Notification, RecentRequest,
};
use overwire_store::{
    OverrideIndexes, PatternStore, RequestLedger, StorageBackend, StoreError,
};
use serde_json::Value;

use crate::identity::normalized_key;
use crate::rules::{RuleHost, RuleManager};

/// Notification channel capacity; laggy listeners drop old entries.
const NOTIFY_CAPACITY: usize = 64;

/// Core engine: pattern store, ledger, indexes and rule manager behind one
/// handle.
pub struct Engine {
    patterns: Arc<PatternStore>,
    ledger: Arc<RequestLedger>,
    indexes: Arc<OverrideIndexes>,
    rules: RuleManager,
    notifier: broadcast::Sender<Notification>,
}

impl Engine {
    pub fn new(backend: Arc<dyn StorageBackend>, host: Arc<dyn RuleHost>) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        let indexes = Arc::new(OverrideIndexes::new(backend.clone()));
        Self {
            patterns: Arc::new(PatternStore::new(backend.clone(), notifier.clone())),
            ledger: Arc::new(RequestLedger::new(backend)),
            rules: RuleManager::new(host, indexes.clone()),
            indexes,
            notifier,
        }
    }

    /// The pattern store (shared with the command boundary).
    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// The request ledger.
    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    pub(crate) fn notifier(&self) -> &broadcast::Sender<Notification> {
        &self.notifier
    }

    /// Subscribe to best-effort notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Store an override payload for a captured request and install its
    /// redirect rule.
    ///
    /// The real response is snapshotted the first time an override is
    /// applied in an episode; re-saving while overridden keeps the original
    /// snapshot intact.
    pub async fn save_override(
        &self,
        request_id: &str,
        data: Value,
    ) -> Result<CapturedRequest, StoreError> {
        let now = now_millis();
        let updated = self
            .ledger
            .update(request_id, |entry| {
                if !entry.is_overridden {
                    entry.original_response_data = entry.response_data.clone();
                    entry.original_response_data_raw = entry.response_data_raw.clone();
                }
                entry.override_data = Some(data.clone());
                entry.is_overridden = true;
                entry.override_updated_at = Some(now);
            })
            .await?;

        let Some(entry) = updated else {
            return Err(StoreError::RequestNotFound(request_id.to_string()));
        };

        self.rules.apply(&entry.url, &data).await?;
        info!(endpoint = %entry.endpoint, "override saved");
        Ok(entry)
    }

    /// Restore the snapshotted response, drop the override payload and
    /// remove the redirect rule.
    pub async fn clear_override(&self, request_id: &str) -> Result<CapturedRequest, StoreError> {
        let updated = self
            .ledger
            .update(request_id, |entry| {
                if entry.is_overridden {
                    entry.response_data = entry.original_response_data.take();
                    entry.response_data_raw = entry.original_response_data_raw.take();
                }
                entry.override_data = None;
                entry.is_overridden = false;
                entry.override_updated_at = None;
            })
            .await?;

        let Some(entry) = updated else {
            return Err(StoreError::RequestNotFound(request_id.to_string()));
        };

        self.rules.remove(&entry.url).await?;
        info!(endpoint = %entry.endpoint, "override cleared");
        Ok(entry)
    }

    /// Delete a ledger entry, tearing down its override and rule first so no
    /// orphaned rules survive.
    pub async fn delete_request(&self, request_id: &str) -> Result<(), StoreError> {
        let Some(entry) = self.ledger.get(request_id).await? else {
            return Err(StoreError::RequestNotFound(request_id.to_string()));
        };

        if entry.is_overridden {
            self.rules.remove(&entry.url).await?;
        }
        self.ledger.delete(request_id).await?;
        info!(endpoint = %entry.endpoint, "deleted captured request");
        Ok(())
    }

    /// Remove every redirect rule, reset both indexes, and bring ledger
    /// override flags back in line with the now-empty rule set.
    pub async fn clear_all_overrides(&self) -> Result<(), StoreError> {
        self.rules.clear_all().await?;
        self.ledger
            .update_all(|entry| {
                if entry.is_overridden {
                    entry.response_data = entry.original_response_data.take();
                    entry.response_data_raw = entry.original_response_data_raw.take();
                    entry.override_data = None;
                    entry.is_overridden = false;
                    entry.override_updated_at = None;
                }
            })
            .await?;
        info!("cleared all overrides");
        Ok(())
    }

    /// Empty the ledger. Associated rules and index entries go with it.
    pub async fn clear_all_requests(&self) -> Result<(), StoreError> {
        self.rules.clear_all().await?;
        self.ledger.clear().await?;
        info!("cleared all captured requests");
        Ok(())
    }

    /// Whether an override is active for the URL's endpoint.
    pub async fn check_override_status(&self, url: &str) -> Result<bool, StoreError> {
        self.indexes.is_active(&normalized_key(url)).await
    }

    /// Endpoint keys with an active override.
    pub async fn list_overrides(&self) -> Result<Vec<String>, StoreError> {
        self.indexes.active_keys().await
    }

    /// Aggregate counters and the five most recent entries.
    pub async fn debug_info(&self) -> Result<DebugInfo, StoreError> {
        let requests = self.ledger.all().await?;
        let patterns = self.patterns.list().await?;

        let mut entries: Vec<&CapturedRequest> = requests.values().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(DebugInfo {
            total_requests: requests.len(),
            overridden_requests: requests.values().filter(|r| r.is_overridden).count(),
            url_patterns: patterns.len(),
            enabled_patterns: patterns.iter().filter(|p| p.enabled).count(),
            recent_requests: entries
                .into_iter()
                .take(5)
                .map(|r| RecentRequest {
                    endpoint: r.endpoint.clone(),
                    url: r.url.clone(),
                    timestamp: r.timestamp,
                })
                .collect(),
        })
    }
}

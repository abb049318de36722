//! URL pattern store.
//!
//! Persists the user's pattern list as one wholesale record and broadcasts a
//! `PATTERNS_UPDATED` notification after every mutation. First run starts
//! with an empty list; there are no default patterns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use overwire_proto::{now_millis, Notification, UrlPattern, PATTERNS_RECORD};

use crate::backend::{StorageBackend, StoreError};

/// Persisted list of user-defined URL patterns.
pub struct PatternStore {
    backend: Arc<dyn StorageBackend>,
    notifier: broadcast::Sender<Notification>,
    id_counter: AtomicU64,
}

impl PatternStore {
    pub fn new(backend: Arc<dyn StorageBackend>, notifier: broadcast::Sender<Notification>) -> Self {
        Self {
            backend,
            notifier,
            id_counter: AtomicU64::new(0),
        }
    }

    async fn load(&self) -> Result<Vec<UrlPattern>, StoreError> {
        match self.backend.read(PATTERNS_RECORD).await? {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Ok(Vec::new()),
        }
    }

    async fn persist(&self, patterns: &[UrlPattern]) -> Result<(), StoreError> {
        let payload = serde_json::to_string(patterns)?;
        if let Err(e) = self.backend.write(PATTERNS_RECORD, &payload).await {
            warn!("failed to persist pattern list: {}", e);
            return Err(e);
        }
        // Listeners that are not currently connected are silently skipped
        let _ = self.notifier.send(Notification::PatternsUpdated);
        Ok(())
    }

    fn next_id(&self) -> String {
        let seq = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("pattern-{}-{}", now_millis(), seq)
    }

    /// All patterns in insertion order.
    pub async fn list(&self) -> Result<Vec<UrlPattern>, StoreError> {
        self.load().await
    }

    /// Enabled patterns in insertion order.
    pub async fn list_enabled(&self) -> Result<Vec<UrlPattern>, StoreError> {
        Ok(self.load().await?.into_iter().filter(|p| p.enabled).collect())
    }

    /// Append a new pattern, enabled by default.
    pub async fn add(&self, pattern: impl Into<String>) -> Result<UrlPattern, StoreError> {
        let entry = UrlPattern {
            id: self.next_id(),
            pattern: pattern.into(),
            enabled: true,
            created_at: now_millis(),
        };

        let mut patterns = self.load().await?;
        patterns.push(entry.clone());
        self.persist(&patterns).await?;

        debug!(pattern = %entry.pattern, "added URL pattern");
        Ok(entry)
    }

    /// Remove a pattern by id.
    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut patterns = self.load().await?;
        let before = patterns.len();
        patterns.retain(|p| p.id != id);
        if patterns.len() == before {
            return Err(StoreError::PatternNotFound(id.to_string()));
        }
        self.persist(&patterns).await?;
        debug!(id, "removed URL pattern");
        Ok(())
    }

    /// Enable or disable a pattern; flips the current state when `enabled`
    /// is omitted.
    pub async fn toggle(&self, id: &str, enabled: Option<bool>) -> Result<UrlPattern, StoreError> {
        let mut patterns = self.load().await?;
        let Some(entry) = patterns.iter_mut().find(|p| p.id == id) else {
            return Err(StoreError::PatternNotFound(id.to_string()));
        };
        entry.enabled = enabled.unwrap_or(!entry.enabled);
        let updated = entry.clone();
        self.persist(&patterns).await?;
        debug!(id, enabled = updated.enabled, "toggled URL pattern");
        Ok(updated)
    }

    /// Replace a pattern's substring.
    pub async fn edit(&self, id: &str, new_pattern: impl Into<String>) -> Result<UrlPattern, StoreError> {
        let mut patterns = self.load().await?;
        let Some(entry) = patterns.iter_mut().find(|p| p.id == id) else {
            return Err(StoreError::PatternNotFound(id.to_string()));
        };
        entry.pattern = new_pattern.into();
        let updated = entry.clone();
        self.persist(&patterns).await?;
        debug!(id, pattern = %updated.pattern, "edited URL pattern");
        Ok(updated)
    }
}

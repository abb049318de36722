//! Redirect rule management.
//!
//! An active override is materialized as a declarative redirect rule held by
//! the host's network-interception subsystem: the rule matches the endpoint
//! (origin + path, any or no query string) and substitutes a stored payload
//! for the real response. Rule handles are a pure function of the
//! normalized key so repeated apply/remove cycles for the same endpoint
//! reuse one handle and never leak rules.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use overwire_store::{OverrideIndexes, StoreError};

use crate::identity::normalized_key;

/// Upper bound for rule handles (positive 31-bit range).
pub const MAX_RULE_ID: u32 = 0x7FFF_FFFF;

/// Derive the rule handle for a normalized key: stable hash, bounded
/// positive, never zero.
pub fn rule_id_for_key(key: &str) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(prefix);
    ((hash % u64::from(MAX_RULE_ID - 1)) + 1) as u32
}

/// Resource types a redirect rule covers: API calls and document loads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    XmlHttpRequest,
    MainFrame,
    SubFrame,
}

/// A declarative redirect rule as handed to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRule {
    pub id: u32,
    /// Match condition: the normalized endpoint key, matched with any or no
    /// query string.
    pub key: String,
    /// Substituted payload as a UTF-8-safe data URL.
    pub redirect_url: String,
    pub resource_types: Vec<ResourceType>,
}

impl RedirectRule {
    /// Build the rule for a key and payload.
    pub fn build(key: &str, id: u32, payload: &Value) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(payload)?;
        Ok(Self {
            id,
            key: key.to_string(),
            redirect_url: format!("data:application/json;base64,{}", BASE64.encode(body)),
            resource_types: vec![
                ResourceType::XmlHttpRequest,
                ResourceType::MainFrame,
                ResourceType::SubFrame,
            ],
        })
    }

    /// Whether a request URL falls under this rule's match condition.
    pub fn matches_url(&self, url: &str) -> bool {
        normalized_key(url) == self.key
    }
}

/// Failure reported by the host's interception subsystem.
#[derive(Debug, Error)]
#[error("rule host failure: {0}")]
pub struct RuleHostError(pub String);

/// The host's network-interception subsystem.
///
/// `apply`/`remove` on the [`RuleManager`] are the only writers; `clear_all`
/// is the sole authority for bulk recovery.
#[async_trait]
pub trait RuleHost: Send + Sync {
    /// Install or replace a rule by id.
    async fn upsert_rule(&self, rule: RedirectRule) -> Result<(), RuleHostError>;

    /// Remove the rules with the given ids; absent ids are ignored.
    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleHostError>;

    /// Ids of every rule currently installed by this process.
    async fn installed_rule_ids(&self) -> Result<Vec<u32>, RuleHostError>;
}

/// In-process rule host.
#[derive(Default)]
pub struct MemoryRuleHost {
    rules: DashMap<u32, RedirectRule>,
}

impl MemoryRuleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an installed rule (for assertions and diagnostics).
    pub fn rule(&self, id: u32) -> Option<RedirectRule> {
        self.rules.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The installed rule matching a URL, if any.
    pub fn rule_for_url(&self, url: &str) -> Option<RedirectRule> {
        self.rules
            .iter()
            .find(|entry| entry.value().matches_url(url))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl RuleHost for MemoryRuleHost {
    async fn upsert_rule(&self, rule: RedirectRule) -> Result<(), RuleHostError> {
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleHostError> {
        for id in ids {
            self.rules.remove(id);
        }
        Ok(())
    }

    async fn installed_rule_ids(&self) -> Result<Vec<u32>, RuleHostError> {
        Ok(self.rules.iter().map(|entry| *entry.key()).collect())
    }
}

/// Translates active overrides into redirect rules and keeps the rule-id
/// index in step.
///
/// Rule-host failures are logged and swallowed so ledger bookkeeping follows
/// user intent; a stale rule can outlive its flag until `clear_all`.
pub struct RuleManager {
    host: Arc<dyn RuleHost>,
    indexes: Arc<OverrideIndexes>,
}

impl RuleManager {
    pub fn new(host: Arc<dyn RuleHost>, indexes: Arc<OverrideIndexes>) -> Self {
        Self { host, indexes }
    }

    /// Install (or replace) the redirect rule for a URL's endpoint and
    /// record the override in the indexes.
    pub async fn apply(&self, url: &str, payload: &Value) -> Result<u32, StoreError> {
        let key = normalized_key(url);
        let id = rule_id_for_key(&key);

        match RedirectRule::build(&key, id, payload) {
            Ok(rule) => {
                if let Err(e) = self.host.upsert_rule(rule).await {
                    warn!(key = %key, rule_id = id, "redirect rule install failed: {}", e);
                }
            }
            Err(e) => warn!(key = %key, "could not encode redirect payload: {}", e),
        }

        self.indexes.record_override(&key, id).await?;
        debug!(key = %key, rule_id = id, "redirect rule applied");
        Ok(id)
    }

    /// Remove the redirect rule for a URL's endpoint; no-op when the key has
    /// no recorded rule.
    pub async fn remove(&self, url: &str) -> Result<(), StoreError> {
        let key = normalized_key(url);
        if let Some(id) = self.indexes.remove_override(&key).await? {
            if let Err(e) = self.host.remove_rules(&[id]).await {
                warn!(key = %key, rule_id = id, "redirect rule removal failed: {}", e);
            }
            debug!(key = %key, rule_id = id, "redirect rule removed");
        }
        Ok(())
    }

    /// Recovery path: delete every installed rule in one batch and reset
    /// both indexes. Idempotent and safe with zero active rules.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        match self.host.installed_rule_ids().await {
            Ok(ids) if !ids.is_empty() => {
                if let Err(e) = self.host.remove_rules(&ids).await {
                    warn!(count = ids.len(), "bulk rule removal failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("could not enumerate installed rules: {}", e),
        }
        self.indexes.reset().await
    }
}

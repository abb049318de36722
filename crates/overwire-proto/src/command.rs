//! Command catalogue for UI clients.
//!
//! Every mutation of the ledger, pattern list, or override state enters the
//! core through one of these commands. Replies always use the uniform
//! [`CommandResponse`] shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command sent by a UI client (or the page-context shim, for
/// `RESPONSE_CAPTURED`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    /// Return the full ledger map keyed by identity.
    GetRequests,

    /// Remove a ledger entry; clears its override and rule first if needed.
    DeleteRequest { request_id: String },

    /// Snapshot the original response (first time only), store the override
    /// payload and install the redirect rule.
    SaveOverride { request_id: String, data: Value },

    /// Restore the snapshotted response and remove the redirect rule.
    ClearOverride { request_id: String },

    /// Remove every redirect rule and reset the override/rule indexes.
    ClearAllOverrides,

    /// Empty the ledger.
    ClearAllRequests,

    /// Report whether an override is active for the given URL's endpoint.
    CheckOverrideStatus { url: String },

    /// List endpoint keys with an active override.
    GetOverrides,

    /// Response Relay entry point: a raw response body forwarded from the
    /// page-context shim.
    ResponseCaptured {
        url: String,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },

    /// List all URL patterns.
    GetUrlPatterns,

    /// Add a pattern (enabled by default).
    AddUrlPattern { pattern: String },

    /// Delete a pattern by id.
    DeleteUrlPattern { pattern_id: String },

    /// Toggle a pattern; flips the current state when `enabled` is omitted.
    ToggleUrlPattern {
        pattern_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
    },

    /// Replace a pattern's substring.
    EditUrlPattern { pattern_id: String, pattern: String },

    /// Return aggregate counters and the most recent entries.
    DebugInfo,
}

/// Uniform reply shape for every command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    /// Successful reply with no payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Successful reply carrying a payload.
    pub fn ok_with(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failure reply with a human-readable message.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

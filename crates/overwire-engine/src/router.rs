//! Command router: the message-passing boundary for UI clients.
//!
//! Validates required fields per command, performs the corresponding
//! ledger/pattern/rule operation and replies with the uniform
//! `{success, data?, error?}` shape. Nothing here panics or propagates: a
//! failed operation becomes a failure reply.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use overwire_proto::{Command, CommandResponse};
use overwire_store::StoreError;

use crate::engine::Engine;

/// Dispatches commands against the engine.
pub struct CommandRouter {
    engine: Arc<Engine>,
}

impl CommandRouter {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Handle one command and produce its reply.
    pub async fn dispatch(&self, command: Command) -> CommandResponse {
        debug!(?command, "dispatching command");
        match command {
            Command::GetRequests => match self.engine.ledger().all().await {
                Ok(requests) => to_data_response(&requests),
                Err(e) => failure(e),
            },

            Command::DeleteRequest { request_id } => {
                if request_id.is_empty() {
                    return CommandResponse::err("Request ID is required");
                }
                match self.engine.delete_request(&request_id).await {
                    Ok(()) => CommandResponse::ok(),
                    Err(e) => failure(e),
                }
            }

            Command::SaveOverride { request_id, data } => {
                if request_id.is_empty() {
                    return CommandResponse::err("Request ID is required");
                }
                match self.engine.save_override(&request_id, data).await {
                    Ok(_) => CommandResponse::ok(),
                    Err(e) => failure(e),
                }
            }

            Command::ClearOverride { request_id } => {
                if request_id.is_empty() {
                    return CommandResponse::err("Request ID is required");
                }
                match self.engine.clear_override(&request_id).await {
                    Ok(_) => CommandResponse::ok(),
                    Err(e) => failure(e),
                }
            }

            Command::ClearAllOverrides => match self.engine.clear_all_overrides().await {
                Ok(()) => CommandResponse::ok(),
                Err(e) => failure(e),
            },

            Command::ClearAllRequests => match self.engine.clear_all_requests().await {
                Ok(()) => CommandResponse::ok(),
                Err(e) => failure(e),
            },

            Command::CheckOverrideStatus { url } => {
                if url.is_empty() {
                    return CommandResponse::err("URL is required");
                }
                match self.engine.check_override_status(&url).await {
                    Ok(active) => CommandResponse::ok_with(json!({ "active": active })),
                    Err(e) => failure(e),
                }
            }

            Command::GetOverrides => match self.engine.list_overrides().await {
                Ok(keys) => CommandResponse::ok_with(json!(keys)),
                Err(e) => failure(e),
            },

            Command::ResponseCaptured { url, data, .. } => {
                if url.is_empty() {
                    return CommandResponse::err("URL is required");
                }
                // A body with no matching entry is a log-only drop, still a
                // successful delivery from the shim's point of view
                match self.engine.on_response_captured(&url, &data).await {
                    Ok(()) => CommandResponse::ok(),
                    Err(e) => failure(e),
                }
            }

            Command::GetUrlPatterns => match self.engine.patterns().list().await {
                Ok(patterns) => to_data_response(&patterns),
                Err(e) => failure(e),
            },

            Command::AddUrlPattern { pattern } => {
                if pattern.is_empty() {
                    return CommandResponse::err("Pattern is required");
                }
                match self.engine.patterns().add(pattern).await {
                    Ok(added) => to_data_response(&added),
                    Err(e) => failure(e),
                }
            }

            Command::DeleteUrlPattern { pattern_id } => {
                if pattern_id.is_empty() {
                    return CommandResponse::err("Pattern ID is required");
                }
                match self.engine.patterns().remove(&pattern_id).await {
                    Ok(()) => CommandResponse::ok(),
                    Err(e) => failure(e),
                }
            }

            Command::ToggleUrlPattern {
                pattern_id,
                enabled,
            } => {
                if pattern_id.is_empty() {
                    return CommandResponse::err("Pattern ID is required");
                }
                match self.engine.patterns().toggle(&pattern_id, enabled).await {
                    Ok(toggled) => to_data_response(&toggled),
                    Err(e) => failure(e),
                }
            }

            Command::EditUrlPattern {
                pattern_id,
                pattern,
            } => {
                if pattern_id.is_empty() || pattern.is_empty() {
                    return CommandResponse::err("Pattern ID and pattern are required");
                }
                match self.engine.patterns().edit(&pattern_id, pattern).await {
                    Ok(edited) => to_data_response(&edited),
                    Err(e) => failure(e),
                }
            }

            Command::DebugInfo => match self.engine.debug_info().await {
                Ok(info) => to_data_response(&info),
                Err(e) => failure(e),
            },
        }
    }
}

fn to_data_response<T: serde::Serialize>(value: &T) -> CommandResponse {
    match serde_json::to_value(value) {
        Ok(data) => CommandResponse::ok_with(data),
        Err(e) => {
            error!("failed to encode reply payload: {}", e);
            CommandResponse::err("Internal encoding error")
        }
    }
}

fn failure(e: StoreError) -> CommandResponse {
    match e {
        StoreError::RequestNotFound(_) => CommandResponse::err("Request not found"),
        StoreError::PatternNotFound(_) => CommandResponse::err("Pattern not found"),
        other => {
            error!("command failed: {}", other);
            CommandResponse::err("Internal storage error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MemoryRuleHost;
    use overwire_store::MemoryBackend;
    use serde_json::json;

    fn router() -> CommandRouter {
        CommandRouter::new(Arc::new(Engine::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryRuleHost::new()),
        )))
    }

    #[tokio::test]
    async fn test_validation_rejects_before_mutation() {
        let router = router();

        let resp = router
            .dispatch(Command::AddUrlPattern {
                pattern: String::new(),
            })
            .await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("Pattern is required"));

        let resp = router
            .dispatch(Command::EditUrlPattern {
                pattern_id: "p1".to_string(),
                pattern: String::new(),
            })
            .await;
        assert_eq!(
            resp.error.as_deref(),
            Some("Pattern ID and pattern are required")
        );

        // Nothing was persisted
        let resp = router.dispatch(Command::GetUrlPatterns).await;
        assert_eq!(resp.data, Some(json!([])));
    }

    #[tokio::test]
    async fn test_not_found_replies() {
        let router = router();

        let resp = router
            .dispatch(Command::DeleteRequest {
                request_id: "https://h/missing".to_string(),
            })
            .await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("Request not found"));

        let resp = router
            .dispatch(Command::DeleteUrlPattern {
                pattern_id: "missing".to_string(),
            })
            .await;
        assert_eq!(resp.error.as_deref(), Some("Pattern not found"));
    }

    #[tokio::test]
    async fn test_pattern_lifecycle_through_commands() {
        let router = router();

        let added = router
            .dispatch(Command::AddUrlPattern {
                pattern: "/rest/x".to_string(),
            })
            .await;
        assert!(added.success);
        let id = added.data.unwrap()["id"].as_str().unwrap().to_string();

        let toggled = router
            .dispatch(Command::ToggleUrlPattern {
                pattern_id: id.clone(),
                enabled: None,
            })
            .await;
        assert_eq!(toggled.data.unwrap()["enabled"], json!(false));

        let edited = router
            .dispatch(Command::EditUrlPattern {
                pattern_id: id.clone(),
                pattern: "/rest/y".to_string(),
            })
            .await;
        assert_eq!(edited.data.unwrap()["pattern"], json!("/rest/y"));

        let deleted = router
            .dispatch(Command::DeleteUrlPattern { pattern_id: id })
            .await;
        assert!(deleted.success);
    }

    #[tokio::test]
    async fn test_check_override_status_shape() {
        let router = router();
        let resp = router
            .dispatch(Command::CheckOverrideStatus {
                url: "https://h/rest/a".to_string(),
            })
            .await;
        assert!(resp.success);
        assert_eq!(resp.data, Some(json!({"active": false})));
    }

    #[tokio::test]
    async fn test_response_captured_without_entry_still_succeeds() {
        let router = router();
        let resp = router
            .dispatch(Command::ResponseCaptured {
                url: "https://h/rest/unseen".to_string(),
                data: "{}".to_string(),
                timestamp: None,
            })
            .await;
        assert!(resp.success);
    }

    #[tokio::test]
    async fn test_debug_info_counters() {
        let router = router();
        router
            .dispatch(Command::AddUrlPattern {
                pattern: "/rest/".to_string(),
            })
            .await;

        let resp = router.dispatch(Command::DebugInfo).await;
        let data = resp.data.unwrap();
        assert_eq!(data["totalRequests"], json!(0));
        assert_eq!(data["urlPatterns"], json!(1));
        assert_eq!(data["enabledPatterns"], json!(1));
    }
}

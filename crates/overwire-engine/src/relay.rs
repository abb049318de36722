//! Response relay: merges raw response bodies forwarded from the
//! page-context shim into the matching ledger entry.

use serde_json::Value;
use tracing::debug;

use overwire_store::StoreError;

use crate::engine::Engine;
use crate::identity;

impl Engine {
    /// Merge a captured response body into the ledger entry for `url`.
    ///
    /// Unknown identities are dropped (log only). While an entry is
    /// overridden the update is skipped entirely: at this layer the shim
    /// cannot tell a real server body from our own injected payload, and
    /// accepting it would corrupt the snapshot needed for restoration.
    pub async fn on_response_captured(&self, url: &str, raw: &str) -> Result<(), StoreError> {
        let id = identity::identity(url);
        if self.ledger().get(&id).await?.is_none() {
            debug!(url, "no matching ledger entry for captured response");
            return Ok(());
        }

        let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        let raw_text = raw.to_string();

        let mut shielded = false;
        self.ledger()
            .update(&id, |entry| {
                if entry.is_overridden {
                    shielded = true;
                    return;
                }
                entry.response_data = Some(parsed);
                entry.response_data_raw = Some(raw_text);
            })
            .await?;

        if shielded {
            debug!(id = %id, "entry overridden, response capture skipped");
        } else {
            debug!(id = %id, bytes = raw.len(), "captured response data");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MemoryRuleHost;
    use overwire_proto::BeforeRequest;
    use overwire_store::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    async fn engine_with_capture(url: &str) -> Engine {
        let engine = Engine::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryRuleHost::new()),
        );
        engine.patterns().add("/rest/").await.unwrap();
        engine
            .on_before_request(&BeforeRequest {
                url: url.to_string(),
                method: "GET".to_string(),
                timestamp: 1000,
                body: None,
                headers: None,
            })
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_relay_stores_raw_and_parsed_forms() {
        let engine = engine_with_capture("https://h/rest/a").await;

        engine
            .on_response_captured("https://h/rest/a", r#"{"b":2,"a":1}"#)
            .await
            .unwrap();

        let entry = engine.ledger().get("https://h/rest/a").await.unwrap().unwrap();
        assert_eq!(entry.response_data, Some(json!({"a": 1, "b": 2})));
        // Raw text preserves field order
        assert_eq!(entry.response_data_raw.as_deref(), Some(r#"{"b":2,"a":1}"#));
    }

    #[tokio::test]
    async fn test_relay_non_json_body_degrades_to_text() {
        let engine = engine_with_capture("https://h/rest/a").await;

        engine
            .on_response_captured("https://h/rest/a", "<html>oops</html>")
            .await
            .unwrap();

        let entry = engine.ledger().get("https://h/rest/a").await.unwrap().unwrap();
        assert_eq!(
            entry.response_data,
            Some(Value::String("<html>oops</html>".to_string()))
        );
    }

    #[tokio::test]
    async fn test_relay_drops_unknown_identity() {
        let engine = Engine::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryRuleHost::new()),
        );
        engine
            .on_response_captured("https://h/rest/never-seen", "{}")
            .await
            .unwrap();
        assert!(engine.ledger().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_relay_is_shielded_while_overridden() {
        let engine = engine_with_capture("https://h/rest/a").await;
        engine
            .on_response_captured("https://h/rest/a", r#"{"a":1}"#)
            .await
            .unwrap();
        engine
            .save_override("https://h/rest/a", json!({"a": 2}))
            .await
            .unwrap();

        // The redirected payload comes back through the shim; it must not
        // touch the stored response
        engine
            .on_response_captured("https://h/rest/a", r#"{"a":2}"#)
            .await
            .unwrap();

        let entry = engine.ledger().get("https://h/rest/a").await.unwrap().unwrap();
        assert_eq!(entry.response_data, Some(json!({"a": 1})));
        assert_eq!(entry.response_data_raw.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(entry.original_response_data, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_relay_matches_trailing_slash_variant() {
        let engine = engine_with_capture("https://h/rest/a").await;

        engine
            .on_response_captured("https://h/rest/a/", r#"{"ok":true}"#)
            .await
            .unwrap();

        let entry = engine.ledger().get("https://h/rest/a").await.unwrap().unwrap();
        assert_eq!(entry.response_data, Some(json!({"ok": true})));
    }
}

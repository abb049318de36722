//! Capture pipeline: the pre-flight and completion handlers.
//!
//! Both handlers gate on the pattern list via the identity resolver, then
//! mutate the ledger. A pre-flight event for an identity that already has a
//! ledger entry is ignored: once captured, an identity is claimed until
//! deleted, so repeat navigation cannot clobber response or override data.

use serde_json::Value;
use tracing::debug;

use overwire_proto::{
    now_millis, BeforeRequest, CapturedRequest, Notification, RawBody, RequestFinished,
};
use overwire_store::StoreError;

use crate::engine::Engine;
use crate::identity;

/// Decode a raw request body: form bodies pass through as-is, raw bytes are
/// UTF-8 decoded and stored parsed when they are JSON, as text otherwise.
/// Decode failures yield `None`.
fn decode_request_body(body: &RawBody) -> Option<Value> {
    match body {
        RawBody::Form(fields) => serde_json::to_value(fields).ok(),
        RawBody::Raw(bytes) => {
            let text = String::from_utf8(bytes.clone()).ok()?;
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        }
    }
}

impl Engine {
    /// Pre-flight handler: capture a matching request unless its identity is
    /// already claimed.
    pub async fn on_before_request(&self, event: &BeforeRequest) -> Result<(), StoreError> {
        let patterns = self.patterns().list().await?;
        let matched = identity::matches(&event.url, &patterns);
        let Some(pattern) = matched.matched_pattern else {
            return Ok(());
        };
        debug!(url = %event.url, pattern = %pattern, "target endpoint detected");

        let id = identity::identity(&event.url);
        let mut entry = CapturedRequest::new(
            id.clone(),
            event.url.clone(),
            identity::endpoint_label(&event.url),
            event.method.clone(),
            event.timestamp,
        );
        entry.request_body = event.body.as_ref().and_then(decode_request_body);
        entry.request_headers = event.headers.clone();

        if self.ledger().insert_new(entry).await? {
            debug!(id = %id, "stored captured request");
        }
        Ok(())
    }

    /// Completion handler: mark a captured request finished and notify any
    /// listening UI.
    pub async fn on_request_completed(&self, event: &RequestFinished) -> Result<(), StoreError> {
        let patterns = self.patterns().list().await?;
        if !identity::matches(&event.url, &patterns).is_match {
            return Ok(());
        }

        let id = identity::identity(&event.url);
        let updated = self
            .ledger()
            .update(&id, |entry| {
                entry.completed = true;
                entry.completed_at = Some(now_millis());
                entry.response_status = Some(event.status);
                if event.headers.is_some() {
                    entry.response_headers = event.headers.clone();
                }
            })
            .await?;

        if let Some(entry) = updated {
            debug!(endpoint = %entry.endpoint, status = event.status, "request completed");
            let _ = self
                .notifier()
                .send(Notification::RequestCompleted { request_id: entry.id });
        }
        Ok(())
    }
}

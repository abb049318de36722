//! Network-observation events and best-effort notifications.
//!
//! Events are fired by the host adapter that watches network traffic; the
//! core consumes them through the capture pipeline. Notifications travel the
//! other way, from the core to any listening UI.

use serde::{Deserialize, Serialize};

use crate::model::HttpHeader;

/// Raw request body as observed pre-flight, before decoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum RawBody {
    /// Form-encoded body, already split into fields by the observer.
    Form(std::collections::HashMap<String, Vec<String>>),
    /// Raw request bytes.
    Raw(Vec<u8>),
}

/// Pre-flight observation of an outgoing request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeforeRequest {
    pub url: String,
    pub method: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RawBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HttpHeader>>,
}

/// Transport-level completion of a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestFinished {
    pub url: String,
    pub status: u16,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HttpHeader>>,
}

/// Host-adapter event feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkEvent {
    BeforeRequest(BeforeRequest),
    Completed(RequestFinished),
}

/// Best-effort broadcast to listening UI clients.
///
/// Delivery is fire-and-forget: listeners that are not currently connected
/// are silently skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Notification {
    /// A matched request finished its transport exchange.
    RequestCompleted { request_id: String },
    /// The pattern list changed; page-level listeners should refresh.
    PatternsUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_event_wire_shape() {
        let event = NetworkEvent::BeforeRequest(BeforeRequest {
            url: "https://h/api/users".to_string(),
            method: "GET".to_string(),
            timestamp: 5,
            body: None,
            headers: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"BEFORE_REQUEST","url":"https://h/api/users","method":"GET","timestamp":5}"#
        );

        let event = NetworkEvent::Completed(RequestFinished {
            url: "https://h/api/users".to_string(),
            status: 200,
            timestamp: 6,
            headers: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"COMPLETED","url":"https://h/api/users","status":200,"timestamp":6}"#
        );
    }

    #[test]
    fn test_raw_body_roundtrip() {
        let mut form = std::collections::HashMap::new();
        form.insert("q".to_string(), vec!["1".to_string()]);
        let body = RawBody::Form(form);
        let json = serde_json::to_string(&body).unwrap();
        let parsed: RawBody = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, body);

        let body = RawBody::Raw(br#"{"a":1}"#.to_vec());
        let parsed: RawBody =
            serde_json::from_str(&serde_json::to_string(&body).unwrap()).unwrap();
        assert_eq!(parsed, body);
    }

    #[test]
    fn test_notification_wire_names() {
        let note = Notification::PatternsUpdated;
        assert_eq!(
            serde_json::to_string(&note).unwrap(),
            r#"{"type":"PATTERNS_UPDATED"}"#
        );

        let note = Notification::RequestCompleted {
            request_id: "https://h/a".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&note).unwrap(),
            r#"{"type":"REQUEST_COMPLETED","requestId":"https://h/a"}"#
        );
    }
}

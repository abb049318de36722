//! Captured-request data model and pattern records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single HTTP header as observed on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A user-defined URL substring pattern.
///
/// Patterns are matched verbatim (no glob or regex semantics); a request is
/// interesting when its URL contains the pattern of any enabled entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UrlPattern {
    pub id: String,
    pub pattern: String,
    pub enabled: bool,
    pub created_at: i64,
}

/// Ledger entry for one captured endpoint, keyed by request identity.
///
/// The identity is the request URL with a single trailing slash stripped.
/// `response_data` holds the last observed real server response;
/// `original_response_data` is the snapshot taken when an override is first
/// applied and exists only while `is_overridden` is true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub id: String,
    pub url: String,
    pub endpoint: String,
    pub method: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Vec<HttpHeader>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<HttpHeader>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_response_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_response_data_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_data: Option<Value>,
    pub is_overridden: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_updated_at: Option<i64>,
}

impl CapturedRequest {
    /// Create a fresh ledger entry for a pre-flight observation.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            endpoint: endpoint.into(),
            method: method.into(),
            timestamp,
            request_body: None,
            request_headers: None,
            response_headers: None,
            response_status: None,
            response_data: None,
            response_data_raw: None,
            original_response_data: None,
            original_response_data_raw: None,
            override_data: None,
            is_overridden: false,
            completed: false,
            completed_at: None,
            override_updated_at: None,
        }
    }
}

/// Summary line for the most recent ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentRequest {
    pub endpoint: String,
    pub url: String,
    pub timestamp: i64,
}

/// Aggregate counters returned by the `DEBUG_INFO` command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub total_requests: usize,
    pub overridden_requests: usize,
    pub url_patterns: usize,
    pub enabled_patterns: usize,
    pub recent_requests: Vec<RecentRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_captured_request_wire_field_names() {
        let mut req = CapturedRequest::new(
            "https://h/api/users",
            "https://h/api/users",
            "users",
            "GET",
            1000,
        );
        req.is_overridden = true;
        req.response_status = Some(200);
        req.override_updated_at = Some(2000);

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""isOverridden":true"#));
        assert!(json.contains(r#""responseStatus":200"#));
        assert!(json.contains(r#""overrideUpdatedAt":2000"#));
        // Absent optional fields stay off the wire entirely
        assert!(!json.contains("originalResponseData"));
        assert!(!json.contains("overrideData"));
    }

    #[test]
    fn test_captured_request_roundtrip() {
        let mut req = CapturedRequest::new("id", "https://h/a", "a", "POST", 42);
        req.request_body = Some(json!({"q": 1}));
        req.request_headers = Some(vec![HttpHeader::new("content-type", "application/json")]);
        req.completed = true;
        req.completed_at = Some(99);

        let json = serde_json::to_string(&req).unwrap();
        let parsed: CapturedRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn test_captured_request_tolerates_missing_completed() {
        // Records written before the completion fields existed
        let json = r#"{
            "id": "https://h/a",
            "url": "https://h/a",
            "endpoint": "a",
            "method": "GET",
            "timestamp": 1,
            "isOverridden": false
        }"#;
        let parsed: CapturedRequest = serde_json::from_str(json).unwrap();
        assert!(!parsed.completed);
        assert!(parsed.completed_at.is_none());
    }

    #[test]
    fn test_url_pattern_wire_shape() {
        let pattern = UrlPattern {
            id: "pattern-1-0".to_string(),
            pattern: "/rest/reports".to_string(),
            enabled: true,
            created_at: 123,
        };
        let json = serde_json::to_string(&pattern).unwrap();
        assert_eq!(
            json,
            r#"{"id":"pattern-1-0","pattern":"/rest/reports","enabled":true,"createdAt":123}"#
        );
    }
}

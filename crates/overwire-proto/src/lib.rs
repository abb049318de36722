//! Overwire Protocol Definitions
//!
//! This crate defines the captured-request data model, the command catalogue
//! spoken by UI clients, and the network-event feed delivered by host
//! adapters. Every persisted record and every wire message in the system is
//! built from these types.

pub mod command;
pub mod events;
pub mod model;

pub use command::{Command, CommandResponse};
pub use events::{BeforeRequest, NetworkEvent, Notification, RawBody, RequestFinished};
pub use model::{CapturedRequest, DebugInfo, HttpHeader, RecentRequest, UrlPattern};

/// Storage record holding the captured-request ledger.
pub const REQUESTS_RECORD: &str = "captured_requests";

/// Storage record holding the URL pattern list.
pub const PATTERNS_RECORD: &str = "url_patterns";

/// Storage record holding the active-override and rule-id index pair.
pub const OVERRIDES_RECORD: &str = "override_index";

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

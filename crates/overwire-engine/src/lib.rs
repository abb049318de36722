//! Overwire capture-and-override engine.
//!
//! Correlates network-observation events into a persisted ledger of
//! captured requests and materializes user overrides as redirect rules, so
//! a stored payload transparently replaces the real response on subsequent
//! requests to the same endpoint.

pub mod capture;
pub mod engine;
pub mod identity;
pub mod relay;
pub mod router;
pub mod rules;

pub use engine::Engine;
pub use identity::MatchResult;
pub use router::CommandRouter;
pub use rules::{
    rule_id_for_key, MemoryRuleHost, RedirectRule, ResourceType, RuleHost, RuleHostError,
    RuleManager, MAX_RULE_ID,
};

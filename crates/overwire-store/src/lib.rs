//! Persistence layer for the capture-and-override engine.
//!
//! Three independent namespaced records back the whole system: the URL
//! pattern list, the request ledger, and the override/rule-id index pair.
//! Each record is read and written wholesale as one JSON document; an absent
//! record is treated as an empty collection.

pub mod backend;
pub mod indexes;
pub mod ledger;
pub mod patterns;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, StoreError};
pub use indexes::OverrideIndexes;
pub use ledger::RequestLedger;
pub use patterns::PatternStore;

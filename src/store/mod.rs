//! Persistent store: trait abstraction, record types, and the SQLite and
//! in-memory implementations.

pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{GateStore, StoreError, StoreResult};
pub use types::{
    AltFlag, AuditQuery, AuditRecord, ThreatRecord, ThreatSeverity, TrustRecord, WhitelistEntry,
    WhitelistSubject, NEUTRAL_TRUST_SCORE,
};

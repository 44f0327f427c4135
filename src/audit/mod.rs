//! Audit trail, throttling and idempotency
//!
//! Everything here is keyed state in a [`KeyValueStore`](crate::store::KeyValueStore):
//! per-loan audit lists, windowed and lifetime attempt counters, and cached
//! decisions.

mod idempotency;
mod limits;
mod trail;

pub use idempotency::IdempotencyCache;
pub use limits::{hash_identity, Admission, AttemptCounter, WindowLimiter};
pub use trail::{AuditEntry, AuditTrail, MAX_AUDIT_ENTRIES};

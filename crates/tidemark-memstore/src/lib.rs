//! In-memory event store backend.
//!
//! Reference implementation of the Tidemark store contracts: per-stream
//! optimistic concurrency checked at commit, staged sub-transaction writes,
//! and drop-discards-staged semantics. Suitable for tests and embedded use.

mod store;

pub use store::InMemoryEventStore;

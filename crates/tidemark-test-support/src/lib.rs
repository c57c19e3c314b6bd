//! Shared test doubles for the Tidemark runtime.

mod call_log;
mod clock;
mod store;

pub use call_log::CallLog;
pub use clock::FixedClock;
pub use store::{ConflictingEventStore, FailingEventStore, RecordingEventStore};

//! Call-order log for cross-component ordering assertions.

use std::sync::{Arc, Mutex, PoisonError};

/// A shared, append-only log of labeled calls.
///
/// Test doubles push a label for each interesting call (e.g. `commit`,
/// `dispatch:board-created`); tests then assert on the recorded order to
/// verify contracts like "dispatch happens strictly after commit".
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one labeled call.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Returns a snapshot of the recorded calls, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Position of the first entry equal to `label`, if any.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry == label)
    }
}

//! Transaction configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a transaction hierarchy.
///
/// Root transactions take a `Config` when they are created; sub-transactions
/// inherit the configuration of their parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Whether root transactions install the built-in
    /// [`crate::CommitValidationExtension`].
    pub commit_validation: bool,

    /// Whether every transaction installs a [`crate::LoggingListener`].
    pub trace_events: bool,

    /// Maximum number of ids per load round-trip (0 = unlimited).
    pub load_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commit_validation: true,
            trace_events: false,
            load_batch_size: 100,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether mandatory relations are validated on commit.
    #[must_use]
    pub const fn commit_validation(mut self, value: bool) -> Self {
        self.commit_validation = value;
        self
    }

    /// Sets whether lifecycle events are traced.
    #[must_use]
    pub const fn trace_events(mut self, value: bool) -> Self {
        self.trace_events = value;
        self
    }

    /// Sets the load batch size.
    #[must_use]
    pub const fn load_batch_size(mut self, value: usize) -> Self {
        self.load_batch_size = value;
        self
    }

    /// Splits `len` items into load batches of at most `load_batch_size`.
    pub(crate) fn batch_len(&self, len: usize) -> usize {
        if self.load_batch_size == 0 {
            len.max(1)
        } else {
            self.load_batch_size
        }
    }
}

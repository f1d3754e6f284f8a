//! Scheduler configuration types.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `mailbox_capacity` | 16 |
//! | `unhandled_failure_response` | `Log` |

use core::fmt;

/// Response policy when a failure unwinds past an empty continuation stack.
///
/// The original design drops such failures silently at the process boundary;
/// a driver that must observe failures wraps its root task in a catch-all
/// `on_error`. `Silent` reproduces that behavior exactly. `Log` (the default)
/// keeps the drop semantics but emits a `tracing::warn!` so the drop is at
/// least visible. `Panic` turns it into a crash for hosts that consider an
/// unhandled failure a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledFailureResponse {
    /// Panic immediately, naming the process.
    Panic,
    /// Log the dropped failure and continue.
    #[default]
    Log,
    /// Drop the failure without logging.
    Silent,
}

impl fmt::Display for UnhandledFailureResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panic => write!(f, "Panic"),
            Self::Log => write!(f, "Log"),
            Self::Silent => write!(f, "Silent"),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Initial capacity reserved for each process mailbox.
    pub mailbox_capacity: usize,
    /// Policy for failures that unwind past an empty continuation stack.
    pub unhandled_failure_response: UnhandledFailureResponse,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.mailbox_capacity == 0 {
            self.mailbox_capacity = 1;
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 16,
            unhandled_failure_response: UnhandledFailureResponse::default(),
        }
    }
}

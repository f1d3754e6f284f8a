//! Error types for the runtime.
//!
//! The runtime has a narrow error surface by design: failures inside tasks are
//! values carried by `Task::fail` and never surface as Rust errors, and
//! runtime misuse (double resolve, double kill, sending to a terminated
//! process) is defined as a traced no-op. What remains is configuration-time
//! error: capability registration.

use thiserror::Error;

/// Errors that can occur while registering a capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A capability with this name is already registered.
    ///
    /// Capability names are unique by invariant; hitting this is a programmer
    /// error, and [`Scheduler::register_capability`] treats it as fatal.
    ///
    /// [`Scheduler::register_capability`]: crate::scheduler::Scheduler::register_capability
    #[error("capability '{name}' is already registered")]
    DuplicateCapability {
        /// The name that collided.
        name: String,
    },
}

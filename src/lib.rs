//! Plait: a miniature cooperative task runtime with capability-addressed
//! effect dispatch.
//!
//! # Overview
//!
//! Plait is a single-logical-thread runtime built around an explicit
//! continuation-stack interpreter. Application code describes work as inert
//! [`Task`] values; a [`Scheduler`] spawns them onto processes and trampolines
//! them to completion, suspending at exactly three points: a [`Task::binding`]
//! awaiting an external resolve, a [`Task::receive`] on an empty mailbox, and
//! the boundary between runnable-queue iterations.
//!
//! Side effects flow through the same machinery: application updates produce
//! command/subscription [`EffectTree`] batches, a serialized dispatcher
//! flattens them, and every registered capability manager receives exactly one
//! effects message per batch through its own mailbox.
//!
//! # Core Guarantees
//!
//! - **Failures are values**: a `fail` unwinds the continuation stack to the
//!   nearest failure frame; there are no host exceptions in the control path.
//! - **Cancellation runs at most once**: killing a process suspended on a
//!   binding invokes its cancellation thunk exactly once; late resolves and
//!   repeated kills are defined no-ops.
//! - **Mailboxes are FIFO**: a process reading via `receive` observes sends in
//!   order.
//! - **Batches never interleave**: effects enqueued while a batch is
//!   dispatching wait until that batch has been delivered to every
//!   capability.
//!
//! # Module Structure
//!
//! - [`types`]: opaque values and identifiers
//! - [`task`]: the task constructors
//! - [`process`]: process handles and scheduler-internal process state
//! - [`scheduler`]: the runnable queue, drain loop, and step interpreter
//! - [`router`]: self- and application-addressed delivery for capabilities
//! - [`capability`]: capability registration and the manager loop
//! - [`effects`]: effect batch trees, flattening, and the dispatcher
//! - [`config`]: scheduler configuration
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod capability;
pub mod config;
pub mod effects;
pub mod error;
pub mod process;
pub mod router;
pub mod scheduler;
pub mod task;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use capability::{CapabilitySpec, OnEffects, OnSelfMsg, TaggerCompose};
pub use config::{RuntimeConfig, UnhandledFailureResponse};
pub use effects::{EffectTree, Tagger};
pub use error::RegistrationError;
pub use process::ProcessHandle;
pub use router::Router;
pub use scheduler::Scheduler;
pub use task::{noop_cancel, Cancel, Resolve, Task};
pub use types::{value, ProcessId, Value};

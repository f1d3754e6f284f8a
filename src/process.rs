//! Process: a scheduled unit owning one task, a continuation stack, and a
//! FIFO mailbox.
//!
//! Processes live in the scheduler's process table and are mutated only by the
//! scheduler (task pointer, continuation stack, pending binding) and by
//! message delivery (mailbox). A terminated process is removed from the table;
//! its id is never reused, so stale handles simply stop addressing anything.
//!
//! # State invariants
//!
//! - `task: Some(_)` — runnable or suspended on a non-empty-mailbox receive.
//! - `task: None, pending: Some(_)` — suspended on a binding awaiting its
//!   external resolve.
//! - `task: None, pending: None` — transient, only while the scheduler is
//!   mid-step with the task checked out.
//! - Continuation frames are pushed by `and_then`/`on_error` steps and popped
//!   strictly in LIFO order.

use crate::scheduler::Shared;
use crate::task::{Cancel, Cont, Task};
use crate::types::{ProcessId, Value};
use core::fmt;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

/// A continuation-stack frame, pushed when stepping `and_then`/`on_error`.
///
/// Terminal values unwind the stack by popping frames until the kind matches:
/// a success pops to the nearest `OnSuccess`, a failure to the nearest
/// `OnFailure`. Non-matching frames are discarded, which is exception-style
/// unwinding without host exceptions.
pub(crate) enum Frame {
    OnSuccess(Cont),
    OnFailure(Cont),
}

impl Frame {
    /// Returns true if this frame handles the given terminal kind.
    pub(crate) fn matches(&self, failed: bool) -> bool {
        match self {
            Self::OnSuccess(_) => !failed,
            Self::OnFailure(_) => failed,
        }
    }

    pub(crate) fn into_cont(self) -> Cont {
        match self {
            Self::OnSuccess(cont) | Self::OnFailure(cont) => cont,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnSuccess(_) => write!(f, "OnSuccess"),
            Self::OnFailure(_) => write!(f, "OnFailure"),
        }
    }
}

/// Bookkeeping for a binding that has been registered but not yet resolved.
///
/// `resolved` is shared with the resolve callback handed to the register
/// function. Kill sets it before invoking `cancel`, which makes any late
/// resolve a no-op; the resolve callback sets it first, which makes a second
/// resolve (or a subsequent kill's cancel) a no-op. Either way the thunk runs
/// at most once.
pub(crate) struct PendingBinding {
    pub(crate) cancel: Cancel,
    pub(crate) resolved: Arc<AtomicBool>,
}

impl fmt::Debug for PendingBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBinding").finish_non_exhaustive()
    }
}

/// Scheduler-internal state of one process.
pub(crate) struct ProcessState {
    pub(crate) id: ProcessId,
    /// The current task; `None` while suspended on a binding or while the
    /// scheduler has it checked out mid-step.
    pub(crate) task: Option<Task>,
    pub(crate) stack: Vec<Frame>,
    pub(crate) mailbox: VecDeque<Value>,
    pub(crate) pending: Option<PendingBinding>,
}

impl ProcessState {
    pub(crate) fn new(id: ProcessId, task: Task, mailbox_capacity: usize) -> Self {
        Self {
            id,
            task: Some(task),
            stack: Vec::new(),
            mailbox: VecDeque::with_capacity(mailbox_capacity),
            pending: None,
        }
    }

    /// A process with no task installed yet; see `Scheduler::spawn_suspended`.
    pub(crate) fn suspended(id: ProcessId, mailbox_capacity: usize) -> Self {
        Self {
            id,
            task: None,
            stack: Vec::new(),
            mailbox: VecDeque::with_capacity(mailbox_capacity),
            pending: None,
        }
    }
}

/// A handle addressing a spawned process.
///
/// Handles are cheap to clone and do not keep the process (or the scheduler)
/// alive: once the process terminates or the scheduler is dropped, operations
/// through the handle become traced no-ops.
#[derive(Clone)]
pub struct ProcessHandle {
    pub(crate) id: ProcessId,
    pub(crate) shared: Weak<Shared>,
}

impl ProcessHandle {
    /// Returns the process id this handle addresses.
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Returns true if the process has neither terminated nor been killed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.state.lock().processes.contains_key(&self.id))
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle").field("id", &self.id).finish()
    }
}

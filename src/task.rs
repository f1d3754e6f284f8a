//! Task: an immutable description of a possibly-deferred computation.
//!
//! A [`Task`] is built from six pure constructors and has no effect until a
//! [`Scheduler`](crate::scheduler::Scheduler) steps the process that owns it:
//!
//! - [`Task::succeed`] / [`Task::fail`]: terminal values.
//! - [`Task::binding`]: the sole suspension point that reaches outside the
//!   runtime. The register function receives a resolve callback and returns a
//!   cancellation thunk.
//! - [`Task::and_then`] / [`Task::on_error`]: sequencing, realized as
//!   continuation-stack frames when stepped.
//! - [`Task::receive`]: suspend until the owning process's mailbox is
//!   non-empty.
//!
//! # Resolve contract
//!
//! A binding's resolve callback is expected to be invoked exactly once. The
//! scheduler guards against a second invocation (it is a traced no-op), but
//! callers must not rely on that as a signaling mechanism. The cancellation
//! thunk is invoked at most once, on kill, and only while the binding is still
//! pending.

use crate::types::Value;
use core::fmt;
use std::any::Any;

/// Callback handed to a binding's register function; completes the suspended
/// process with the given task (typically `Task::succeed(..)` or
/// `Task::fail(..)`). Invoking it a second time is a traced no-op.
pub type Resolve = Box<dyn Fn(Task) + Send>;

/// Cancellation thunk returned by a binding's register function.
///
/// Invoked at most once, when the owning process is killed while the binding
/// is still pending. Return [`noop_cancel`] when there is nothing to undo.
pub type Cancel = Box<dyn FnOnce() + Send>;

/// A continuation: consumes a value, produces the next task.
pub(crate) type Cont = Box<dyn FnOnce(Value) -> Task + Send>;

/// A binding's register function.
pub(crate) type Register = Box<dyn FnOnce(Resolve) -> Cancel + Send>;

/// Returns a cancellation thunk that does nothing.
#[must_use]
pub fn noop_cancel() -> Cancel {
    Box::new(|| {})
}

/// An immutable description of a possibly-deferred computation.
///
/// Tasks are inert data; spawning one on a scheduler drives it. A task is
/// consumed as it is stepped and a subtree is discarded once the owning
/// process has moved past it.
pub struct Task(pub(crate) TaskKind);

pub(crate) enum TaskKind {
    Succeed(Value),
    Fail(Value),
    Binding(Register),
    AndThen { cont: Cont, inner: Box<Task> },
    OnError { cont: Cont, inner: Box<Task> },
    Receive(Cont),
}

impl Task {
    /// A task that immediately completes with `value`.
    #[must_use]
    pub fn succeed<T: Any + Send>(value: T) -> Self {
        Self(TaskKind::Succeed(Box::new(value)))
    }

    /// A task that immediately fails with `error`.
    #[must_use]
    pub fn fail<E: Any + Send>(error: E) -> Self {
        Self(TaskKind::Fail(Box::new(error)))
    }

    /// Like [`Task::succeed`] for an already-boxed [`Value`], without
    /// re-boxing it. Continuations threading opaque state forward want this.
    #[must_use]
    pub fn succeed_value(value: Value) -> Self {
        Self(TaskKind::Succeed(value))
    }

    /// Like [`Task::fail`] for an already-boxed [`Value`].
    #[must_use]
    pub fn fail_value(error: Value) -> Self {
        Self(TaskKind::Fail(error))
    }

    /// A task that completes with the unit value.
    #[must_use]
    pub fn unit() -> Self {
        Self::succeed(())
    }

    /// A task that suspends its process until an external callback resolves it.
    ///
    /// `register` runs when the task is stepped. It receives the resolve
    /// callback and must return a cancellation thunk (possibly
    /// [`noop_cancel`]). The resolve callback may be invoked from any thread,
    /// including synchronously from inside `register` itself.
    #[must_use]
    pub fn binding<F>(register: F) -> Self
    where
        F: FnOnce(Resolve) -> Cancel + Send + 'static,
    {
        Self(TaskKind::Binding(Box::new(register)))
    }

    /// Runs `self`, then feeds its success value to `cont`.
    ///
    /// If `self` fails, `cont` is skipped and the failure keeps unwinding.
    #[must_use]
    pub fn and_then<F>(self, cont: F) -> Self
    where
        F: FnOnce(Value) -> Self + Send + 'static,
    {
        Self(TaskKind::AndThen {
            cont: Box::new(cont),
            inner: Box::new(self),
        })
    }

    /// Runs `self`, recovering from failure by feeding the error to `cont`.
    ///
    /// If `self` succeeds, `cont` is skipped.
    #[must_use]
    pub fn on_error<F>(self, cont: F) -> Self
    where
        F: FnOnce(Value) -> Self + Send + 'static,
    {
        Self(TaskKind::OnError {
            cont: Box::new(cont),
            inner: Box::new(self),
        })
    }

    /// A task that suspends until the owning process's mailbox is non-empty,
    /// then feeds the next message to `cont`.
    #[must_use]
    pub fn receive<F>(cont: F) -> Self
    where
        F: FnOnce(Value) -> Self + Send + 'static,
    {
        Self(TaskKind::Receive(Box::new(cont)))
    }

    /// The tag name of the current variant, for tracing.
    #[must_use]
    pub(crate) fn tag(&self) -> &'static str {
        match self.0 {
            TaskKind::Succeed(_) => "succeed",
            TaskKind::Fail(_) => "fail",
            TaskKind::Binding(_) => "binding",
            TaskKind::AndThen { .. } => "and_then",
            TaskKind::OnError { .. } => "on_error",
            TaskKind::Receive(_) => "receive",
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Task").field(&self.tag()).finish()
    }
}

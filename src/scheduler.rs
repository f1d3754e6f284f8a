//! The scheduler: one runnable queue, a non-reentrant drain loop, and the
//! process table.
//!
//! All shared state lives behind one `Shared` allocation: the process table
//! and runnable queue, the capability registry, the effect dispatch queue, and
//! the application callback. There are no module-level globals; everything is
//! reached through a [`Scheduler`] handle.
//!
//! # Drain discipline
//!
//! `enqueue` appends to the runnable queue. Only the outermost caller (the one
//! that flipped `draining` from false to true) drains the queue; enqueues made
//! while a drain is active, including from user continuations running inside
//! `step`, are picked up by the active drain. This serializes all stepping
//! onto one logical thread even when resolve callbacks arrive from elsewhere.
//!
//! # Lock discipline
//!
//! User closures (continuations, register functions, the cancellation thunk)
//! are never invoked with the state lock held, so they may re-enter any public
//! scheduler operation.

use crate::config::{RuntimeConfig, UnhandledFailureResponse};
use crate::process::{Frame, PendingBinding, ProcessHandle, ProcessState};
use crate::task::{noop_cancel, Register, Resolve, Task, TaskKind};
use crate::types::{ProcessId, Value};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Callback that delivers a message to the hosting application.
pub(crate) type AppCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Everything a scheduler owns, behind a single allocation so handles,
/// routers, and pending resolve callbacks can hold weak references.
pub(crate) struct Shared {
    pub(crate) state: Mutex<SchedulerState>,
    pub(crate) registry: Mutex<crate::capability::CapabilityRegistry>,
    pub(crate) effects: Mutex<crate::effects::EffectQueue>,
    pub(crate) app: Mutex<Option<AppCallback>>,
    pub(crate) config: RuntimeConfig,
}

/// The runnable queue, re-entrancy flag, and process table.
pub(crate) struct SchedulerState {
    pub(crate) processes: HashMap<ProcessId, ProcessState>,
    queue: VecDeque<ProcessId>,
    /// True while a drain is in progress; the flag makes `enqueue` non-reentrant.
    draining: bool,
    next_id: u64,
}

/// A cooperative task scheduler with capability-addressed effect dispatch.
///
/// Cloning is cheap and clones address the same runnable queue, process
/// table, and capability registry.
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) shared: Arc<Shared>,
}

impl Scheduler {
    /// Creates a scheduler with the given configuration.
    #[must_use]
    pub fn new(mut config: RuntimeConfig) -> Self {
        config.normalize();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    processes: HashMap::new(),
                    queue: VecDeque::new(),
                    draining: false,
                    next_id: 0,
                }),
                registry: Mutex::new(crate::capability::CapabilityRegistry::new()),
                effects: Mutex::new(crate::effects::EffectQueue::new()),
                app: Mutex::new(None),
                config,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Connects the hosting application's message callback.
    ///
    /// [`Router::send_to_app`](crate::router::Router::send_to_app) delivers
    /// through this callback. Connecting replaces any previous callback.
    pub fn connect_app(&self, callback: AppCallback) {
        *self.shared.app.lock() = Some(callback);
    }

    /// Returns the number of live (running or suspended) processes.
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.shared.state.lock().processes.len()
    }

    /// Allocates a process for `task`, enqueues it, and returns immediately.
    ///
    /// If no drain is active the task runs (to completion or suspension)
    /// before this returns; otherwise the active drain picks it up.
    pub fn spawn(&self, task: Task) -> ProcessHandle {
        let id = {
            let mut st = self.shared.state.lock();
            let id = ProcessId(st.next_id);
            st.next_id += 1;
            let process = ProcessState::new(id, task, self.shared.config.mailbox_capacity);
            st.processes.insert(id, process);
            id
        };
        debug!(process = %id, "process spawned");
        self.enqueue(id);
        ProcessHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Returns a task that appends `msg` to the target mailbox and re-enqueues
    /// the target.
    ///
    /// Delivery happens when the returned task is stepped, so sends
    /// participate in the same ordering machinery as everything else. Sending
    /// to a terminated process is a traced no-op.
    #[must_use]
    pub fn send(&self, handle: &ProcessHandle, msg: Value) -> Task {
        let id = handle.id;
        let weak = Arc::downgrade(&self.shared);
        Task::binding(move |resolve| {
            if let Some(shared) = weak.upgrade() {
                Self::from_shared(shared).raw_send(id, msg);
            }
            resolve(Task::unit());
            noop_cancel()
        })
    }

    /// Returns a task that kills the target process.
    ///
    /// If the target is suspended on a pending binding, its cancellation thunk
    /// runs exactly once; the process is then dropped and never resumes.
    /// Killing an already-dead process is a traced no-op.
    #[must_use]
    pub fn kill(&self, handle: &ProcessHandle) -> Task {
        let id = handle.id;
        let weak = Arc::downgrade(&self.shared);
        Task::binding(move |resolve| {
            if let Some(shared) = weak.upgrade() {
                Self::from_shared(shared).kill_now(id);
            }
            resolve(Task::unit());
            noop_cancel()
        })
    }

    /// Allocates a process with no task yet, so its handle can be threaded
    /// into the task that will run on it (capability managers need their own
    /// handle inside their loop). Pair with [`Self::resume_with`].
    pub(crate) fn spawn_suspended(&self) -> ProcessHandle {
        let id = {
            let mut st = self.shared.state.lock();
            let id = ProcessId(st.next_id);
            st.next_id += 1;
            st.processes
                .insert(id, ProcessState::suspended(id, self.shared.config.mailbox_capacity));
            id
        };
        ProcessHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Installs the task of a process created by [`Self::spawn_suspended`]
    /// and enqueues it.
    pub(crate) fn resume_with(&self, id: ProcessId, task: Task) {
        {
            let mut st = self.shared.state.lock();
            let Some(process) = st.processes.get_mut(&id) else {
                return;
            };
            process.task = Some(task);
        }
        self.enqueue(id);
    }

    /// Appends a message to a mailbox and re-enqueues the target immediately,
    /// bypassing the task machinery. Used by the effect dispatcher.
    pub(crate) fn raw_send(&self, id: ProcessId, msg: Value) {
        {
            let mut st = self.shared.state.lock();
            let Some(process) = st.processes.get_mut(&id) else {
                debug!(process = %id, "dropping message to terminated process");
                return;
            };
            process.mailbox.push_back(msg);
        }
        self.enqueue(id);
    }

    /// Kills a process immediately (outside the task machinery).
    pub(crate) fn kill_now(&self, id: ProcessId) {
        let pending = {
            let mut st = self.shared.state.lock();
            match st.processes.remove(&id) {
                Some(process) => {
                    debug!(process = %id, "process killed");
                    process.pending
                }
                None => {
                    trace!(process = %id, "kill of dead process is a no-op");
                    None
                }
            }
        };
        if let Some(binding) = pending {
            // A resolve that raced us and won the flag owns the outcome; the
            // thunk must not run after resolution.
            if !binding.resolved.swap(true, Ordering::AcqRel) {
                trace!(process = %id, "invoking cancellation thunk");
                (binding.cancel)();
            }
        }
    }

    /// Appends to the runnable queue; the outermost caller drains.
    pub(crate) fn enqueue(&self, id: ProcessId) {
        let is_outermost = {
            let mut st = self.shared.state.lock();
            st.queue.push_back(id);
            if st.draining {
                false
            } else {
                st.draining = true;
                true
            }
        };
        if is_outermost {
            self.drain();
        }
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut st = self.shared.state.lock();
                match st.queue.pop_front() {
                    Some(id) => id,
                    None => {
                        st.draining = false;
                        return;
                    }
                }
            };
            self.step(next);
        }
    }

    /// Steps one process until it terminates or suspends.
    ///
    /// A synchronous chain of `and_then`/`on_error` runs to completion without
    /// preemption; suspension points (`binding`, `receive` on an empty
    /// mailbox) are the only yields.
    fn step(&self, id: ProcessId) {
        let mut task = {
            let mut st = self.shared.state.lock();
            let Some(process) = st.processes.get_mut(&id) else {
                return;
            };
            match process.task.take() {
                Some(task) => task,
                // Suspended on a binding (or stale queue entry); nothing to do.
                None => return,
            }
        };
        loop {
            trace!(process = %id, task = task.tag(), "step");
            task = match task.0 {
                TaskKind::Succeed(value) => match self.unwind(id, false, value) {
                    Some(next) => next,
                    None => return,
                },
                TaskKind::Fail(error) => match self.unwind(id, true, error) {
                    Some(next) => next,
                    None => return,
                },
                TaskKind::AndThen { cont, inner } => {
                    let mut st = self.shared.state.lock();
                    let Some(process) = st.processes.get_mut(&id) else {
                        return;
                    };
                    process.stack.push(Frame::OnSuccess(cont));
                    *inner
                }
                TaskKind::OnError { cont, inner } => {
                    let mut st = self.shared.state.lock();
                    let Some(process) = st.processes.get_mut(&id) else {
                        return;
                    };
                    process.stack.push(Frame::OnFailure(cont));
                    *inner
                }
                TaskKind::Receive(cont) => {
                    let msg = {
                        let mut st = self.shared.state.lock();
                        let Some(process) = st.processes.get_mut(&id) else {
                            return;
                        };
                        match process.mailbox.pop_front() {
                            Some(msg) => msg,
                            None => {
                                trace!(process = %id, "suspended on empty mailbox");
                                process.task = Some(Task(TaskKind::Receive(cont)));
                                return;
                            }
                        }
                    };
                    cont(msg)
                }
                TaskKind::Binding(register) => {
                    self.suspend_on_binding(id, register);
                    return;
                }
            };
        }
    }

    /// Pops frames until one matches the terminal kind and returns the next
    /// task from its continuation, or halts the process if the stack empties.
    fn unwind(&self, id: ProcessId, failed: bool, value: Value) -> Option<Task> {
        let cont = {
            let mut st = self.shared.state.lock();
            let process = st.processes.get_mut(&id)?;
            loop {
                match process.stack.pop() {
                    Some(frame) if frame.matches(failed) => break Some(frame.into_cont()),
                    Some(frame) => {
                        trace!(process = %id, frame = ?frame, "discarding non-matching frame");
                    }
                    None => break None,
                }
            }
        };
        match cont {
            Some(cont) => Some(cont(value)),
            None => {
                self.halt(id, failed);
                None
            }
        }
    }

    /// Removes a process that ran out of frames with a terminal value.
    fn halt(&self, id: ProcessId, failed: bool) {
        {
            let mut st = self.shared.state.lock();
            st.processes.remove(&id);
        }
        if failed {
            match self.shared.config.unhandled_failure_response {
                UnhandledFailureResponse::Panic => {
                    panic!("process {id} failed with no failure frame on its stack")
                }
                UnhandledFailureResponse::Log => {
                    warn!(process = %id, "dropping failure with no failure frame");
                }
                UnhandledFailureResponse::Silent => {}
            }
        } else {
            debug!(process = %id, "process completed");
        }
    }

    /// Invokes a binding's register function and records the suspension.
    fn suspend_on_binding(&self, id: ProcessId, register: Register) {
        let resolved = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&resolved);
        let weak = Arc::downgrade(&self.shared);
        let resolve: Resolve = Box::new(move |next: Task| {
            if flag.swap(true, Ordering::AcqRel) {
                trace!(process = %id, "ignoring duplicate resolve");
                return;
            }
            let Some(shared) = weak.upgrade() else { return };
            {
                let mut st = shared.state.lock();
                let Some(process) = st.processes.get_mut(&id) else {
                    trace!(process = %id, "resolve of dead process is a no-op");
                    return;
                };
                process.pending = None;
                process.task = Some(next);
            }
            Self::from_shared(shared).enqueue(id);
        });

        let cancel = register(resolve);

        let mut st = self.shared.state.lock();
        match st.processes.get_mut(&id) {
            // Still suspended: keep the thunk so kill can run it.
            Some(process) if !resolved.load(Ordering::Acquire) => {
                trace!(process = %id, "suspended on binding");
                process.pending = Some(PendingBinding { cancel, resolved });
            }
            // Resolved synchronously (or killed during register): the
            // operation already finished, so there is nothing to cancel.
            _ => drop(cancel),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

//! Conformance tests for the process scheduler: pure task semantics, mailbox
//! ordering, and kill/resolve interactions through the public API.

mod common;

use common::*;
use plait::{noop_cancel, value, Resolve, Scheduler, Task, Value};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Slot<T> = Arc<Mutex<Option<T>>>;

fn slot<T>() -> Slot<T> {
    Arc::new(Mutex::new(None))
}

/// Runs a task on a fresh scheduler and captures its terminal value or error
/// as `Ok`/`Err` of `i32`.
fn run_to_outcome(task: Task) -> Option<Result<i32, i32>> {
    let sched = Scheduler::default();
    let outcome: Slot<Result<i32, i32>> = slot();
    let ok_slot = Arc::clone(&outcome);
    let err_slot = Arc::clone(&outcome);
    sched.spawn(
        task.and_then(move |v| {
            *ok_slot.lock().unwrap() = Some(Ok(*v.downcast::<i32>().unwrap()));
            Task::unit()
        })
        .on_error(move |e| {
            *err_slot.lock().unwrap() = Some(Err(*e.downcast::<i32>().unwrap()));
            Task::unit()
        }),
    );
    let result = *outcome.lock().unwrap();
    result
}

#[test]
fn succeed_and_then_terminates_with_incremented_value() {
    init_test_logging();
    let task = Task::succeed(1_i32).and_then(|v| Task::succeed(*v.downcast::<i32>().unwrap() + 1));
    assert_eq!(run_to_outcome(task), Some(Ok(2)));
}

#[test]
fn on_error_recovery_feeds_following_and_then() {
    init_test_logging();
    let task = Task::fail(0_i32)
        .on_error(|_| Task::succeed(0_i32))
        .and_then(|v| Task::succeed(*v.downcast::<i32>().unwrap() + 1));
    assert_eq!(run_to_outcome(task), Some(Ok(1)));
}

#[test]
fn failure_without_failure_frame_invokes_no_continuation() {
    init_test_logging();
    let sched = Scheduler::default();
    let ran = Arc::new(AtomicUsize::new(0));
    let witness = Arc::clone(&ran);
    let handle = sched.spawn(Task::fail("e").and_then(move |_| {
        witness.fetch_add(1, Ordering::SeqCst);
        Task::succeed(999_i32)
    }));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(!handle.is_live());
}

#[test]
fn kill_before_resolve_cancels_once_and_blocks_resumption() {
    init_test_logging();
    let sched = Scheduler::default();
    let cancels = Arc::new(AtomicUsize::new(0));
    let resumed = Arc::new(AtomicUsize::new(0));
    let resolve_slot: Slot<Resolve> = slot();

    let counter = Arc::clone(&cancels);
    let pending_slot = Arc::clone(&resolve_slot);
    let witness = Arc::clone(&resumed);
    let handle = sched.spawn(
        Task::binding(move |resolve| -> plait::Cancel {
            *pending_slot.lock().unwrap() = Some(resolve);
            let counter = Arc::clone(&counter);
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .and_then(move |_| {
            witness.fetch_add(1, Ordering::SeqCst);
            Task::unit()
        }),
    );

    sched.spawn(sched.kill(&handle));
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
    assert!(!handle.is_live());

    sched.spawn(sched.kill(&handle));
    assert_eq!(cancels.load(Ordering::SeqCst), 1, "second kill must be a no-op");

    let resolve = resolve_slot.lock().unwrap().take().unwrap();
    resolve(Task::unit());
    assert_eq!(resumed.load(Ordering::SeqCst), 0, "killed process must not resume");
}

/// Builds a chain of `receive`s that records `n` messages.
fn reader(n: usize, log: Log) -> Task {
    if n == 0 {
        return Task::unit();
    }
    Task::receive(move |m| {
        push(&log, m.downcast::<i32>().unwrap().to_string());
        reader(n - 1, log)
    })
}

#[test]
fn mailbox_delivers_in_send_order() {
    init_test_logging();
    let sched = Scheduler::default();
    let log = new_log();
    let handle = sched.spawn(reader(4, Arc::clone(&log)));
    for n in [3_i32, 1, 4, 1] {
        sched.spawn(sched.send(&handle, value(n)));
    }
    assert_eq!(entries(&log), vec!["3", "1", "4", "1"]);
    assert!(!handle.is_live());
}

/// A task expression built only from the four pure constructors.
#[derive(Debug, Clone)]
enum Expr {
    Succeed(i32),
    Fail(i32),
    AndThen(Box<Expr>, i32),
    OnError(Box<Expr>, i32),
}

impl Expr {
    /// Direct evaluation of the expression's semantics.
    fn eval(&self) -> Result<i32, i32> {
        match self {
            Self::Succeed(v) => Ok(*v),
            Self::Fail(e) => Err(*e),
            Self::AndThen(inner, delta) => inner.eval().map(|v| v.wrapping_add(*delta)),
            Self::OnError(inner, delta) => match inner.eval() {
                Ok(v) => Ok(v),
                Err(e) => Ok(e.wrapping_add(*delta)),
            },
        }
    }

    fn to_task(&self) -> Task {
        match self {
            Self::Succeed(v) => Task::succeed(*v),
            Self::Fail(e) => Task::fail(*e),
            Self::AndThen(inner, delta) => {
                let delta = *delta;
                inner.to_task().and_then(move |v: Value| {
                    Task::succeed(v.downcast::<i32>().unwrap().wrapping_add(delta))
                })
            }
            Self::OnError(inner, delta) => {
                let delta = *delta;
                inner.to_task().on_error(move |e: Value| {
                    Task::succeed(e.downcast::<i32>().unwrap().wrapping_add(delta))
                })
            }
        }
    }
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        any::<i32>().prop_map(Expr::Succeed),
        any::<i32>().prop_map(Expr::Fail),
    ];
    leaf.prop_recursive(6, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), any::<i32>())
                .prop_map(|(e, d)| Expr::AndThen(Box::new(e), d)),
            (inner, any::<i32>()).prop_map(|(e, d)| Expr::OnError(Box::new(e), d)),
        ]
    })
}

proptest! {
    /// Running a pure task to completion yields the same terminal outcome as
    /// evaluating the expression directly.
    #[test]
    fn pure_tasks_match_direct_evaluation(expr in expr_strategy()) {
        init_test_logging();
        prop_assert_eq!(run_to_outcome(expr.to_task()), Some(expr.eval()));
    }

    /// Mailbox FIFO holds for arbitrary message sequences.
    #[test]
    fn mailbox_fifo_for_arbitrary_sequences(msgs in proptest::collection::vec(any::<i32>(), 0..16)) {
        init_test_logging();
        let sched = Scheduler::default();
        let log = new_log();
        let handle = sched.spawn(reader(msgs.len(), Arc::clone(&log)));
        for &n in &msgs {
            sched.spawn(sched.send(&handle, value(n)));
        }
        let expected: Vec<String> = msgs.iter().map(ToString::to_string).collect();
        prop_assert_eq!(entries(&log), expected);
    }
}

#[test]
fn binding_resolved_from_another_thread_resumes_the_process() {
    init_test_logging();
    let sched = Scheduler::default();
    let log = new_log();
    let resolve_slot: Slot<Resolve> = slot();

    let pending_slot = Arc::clone(&resolve_slot);
    let sink = Arc::clone(&log);
    let handle = sched.spawn(
        Task::binding(move |resolve| {
            *pending_slot.lock().unwrap() = Some(resolve);
            noop_cancel()
        })
        .and_then(move |v| {
            push(&sink, format!("resumed:{}", v.downcast::<i32>().unwrap()));
            Task::unit()
        }),
    );
    assert!(handle.is_live());

    let resolve = resolve_slot.lock().unwrap().take().unwrap();
    let worker = std::thread::spawn(move || {
        resolve(Task::succeed(9_i32));
    });
    worker.join().unwrap();

    assert_eq!(entries(&log), vec!["resumed:9"]);
    assert!(!handle.is_live());
}

//! Router: the addressable handle binding a capability manager to its own
//! mailbox and to the hosting application.
//!
//! A router is handed to a capability's handlers. It supports two kinds of
//! delivery, both expressed as tasks so they flow through the same ordering
//! machinery as everything else:
//!
//! - [`Router::send_to_self`]: a self-tagged message to the owning manager's
//!   mailbox, handled by `on_self_msg` on a later loop iteration.
//! - [`Router::send_to_app`]: a message to the hosting application's update
//!   function, via the callback connected with
//!   [`Scheduler::connect_app`](crate::scheduler::Scheduler::connect_app).

use crate::capability::HomeMsg;
use crate::process::ProcessHandle;
use crate::scheduler::{Scheduler, Shared};
use crate::task::{noop_cancel, Task};
use crate::types::Value;
use core::fmt;
use std::sync::Weak;
use tracing::warn;

/// Handle letting a capability manager message itself or the hosting
/// application.
#[derive(Clone)]
pub struct Router {
    pub(crate) name: String,
    pub(crate) process: ProcessHandle,
    pub(crate) shared: Weak<Shared>,
}

impl Router {
    /// The name of the capability this router belongs to.
    #[must_use]
    pub fn capability(&self) -> &str {
        &self.name
    }

    /// The owning manager's process handle.
    #[must_use]
    pub fn process_handle(&self) -> ProcessHandle {
        self.process.clone()
    }

    /// Returns a task delivering `msg` to the owning manager as a self
    /// message.
    #[must_use]
    pub fn send_to_self(&self, msg: Value) -> Task {
        let weak = self.shared.clone();
        let id = self.process.id();
        Task::binding(move |resolve| {
            if let Some(shared) = weak.upgrade() {
                Scheduler::from_shared(shared).raw_send(id, Box::new(HomeMsg::SelfMsg(msg)));
            }
            resolve(Task::unit());
            noop_cancel()
        })
    }

    /// Returns a task delivering `msg` to the hosting application.
    ///
    /// The application callback runs synchronously inside the drain, so an
    /// update that enqueues further effects is subject to the dispatcher's
    /// batch ordering like any other. With no application connected the
    /// message is dropped with a warning.
    #[must_use]
    pub fn send_to_app(&self, msg: Value) -> Task {
        let weak = self.shared.clone();
        let capability = self.name.clone();
        Task::binding(move |resolve| {
            if let Some(shared) = weak.upgrade() {
                let callback = shared.app.lock().clone();
                match callback {
                    Some(callback) => callback(msg),
                    None => {
                        warn!(capability = %capability, "no application connected; dropping message");
                    }
                }
            }
            resolve(Task::unit());
            noop_cancel()
        })
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("capability", &self.name)
            .field("process", &self.process.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilitySpec;
    use std::sync::{Arc, Mutex as StdMutex};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn passthrough_spec(name: &str) -> CapabilitySpec {
        CapabilitySpec::new(
            name,
            Task::unit(),
            |router, commands, _subscriptions, state| {
                // Forward every command payload to the application.
                let mut task = Task::unit();
                for payload in commands {
                    let forward = router.send_to_app(payload);
                    task = task.and_then(move |_| forward);
                }
                task.and_then(move |_| Task::succeed_value(state))
            },
            |_router, _msg, state| Task::succeed_value(state),
        )
    }

    #[test]
    fn send_to_app_reaches_connected_application() {
        init_test("send_to_app_reaches_connected_application");
        let sched = Scheduler::default();
        let received: Arc<StdMutex<Vec<i32>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        sched.connect_app(Arc::new(move |msg: Value| {
            sink.lock().unwrap().push(*msg.downcast::<i32>().unwrap());
        }));

        sched.register_capability(passthrough_spec("fwd"));
        sched.enqueue_effects(
            crate::effects::EffectTree::batch(vec![
                crate::effects::EffectTree::leaf("fwd", 1_i32),
                crate::effects::EffectTree::leaf("fwd", 2_i32),
            ]),
            crate::effects::EffectTree::none(),
        );
        assert_eq!(*received.lock().unwrap(), vec![1, 2]);
        crate::test_complete!("send_to_app_reaches_connected_application");
    }

    #[test]
    fn send_to_app_without_application_is_a_noop() {
        init_test("send_to_app_without_application_is_a_noop");
        let sched = Scheduler::default();
        sched.register_capability(passthrough_spec("fwd"));
        // Must not panic or wedge the manager.
        sched.enqueue_effects(
            crate::effects::EffectTree::leaf("fwd", 1_i32),
            crate::effects::EffectTree::none(),
        );
        assert_eq!(sched.process_count(), 1);
        crate::test_complete!("send_to_app_without_application_is_a_noop");
    }

    #[test]
    fn router_debug_names_capability_and_process() {
        init_test("router_debug_names_capability_and_process");
        let sched = Scheduler::default();
        let router = sched.register_capability(passthrough_spec("fwd"));
        let rendered = format!("{router:?}");
        assert!(rendered.contains("fwd"));
        crate::test_complete!("router_debug_names_capability_and_process");
    }
}

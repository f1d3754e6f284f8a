//! Capability managers: persistent processes owning command/subscription
//! handling for one named capability.
//!
//! A registered capability owns one process that never naturally terminates.
//! The process runs an explicit receive → dispatch-on-tag → recurse loop:
//!
//! 1. Receive one [`HomeMsg`] from the mailbox.
//! 2. A *self* message invokes `on_self_msg(router, value, state)`; an
//!    *effects* message (one freshly dispatched command/subscription pair)
//!    invokes `on_effects(router, commands, subscriptions, state)`.
//! 3. Chain the handler's `Task<new state>` back into the loop with
//!    `and_then`.
//!
//! Each iteration returns the continuation stack to empty, so the loop runs
//! in constant stack space on the trampolined interpreter.
//!
//! # Registration
//!
//! Capability names are unique. Registering a name twice is a fatal
//! configuration error: [`Scheduler::register_capability`] panics, and
//! [`Scheduler::try_register_capability`] returns
//! [`RegistrationError::DuplicateCapability`] for hosts that prefer to abort
//! on their own terms.

use crate::effects::Tagger;
use crate::error::RegistrationError;
use crate::process::ProcessHandle;
use crate::router::Router;
use crate::scheduler::Scheduler;
use crate::task::Task;
use crate::types::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, debug_span, error};

/// Handler for one freshly dispatched command/subscription pair.
///
/// Receives the router, the capability's commands and subscriptions from the
/// current batch (either may be empty), and the manager state; returns a task
/// producing the new state.
pub type OnEffects = Arc<dyn Fn(&Router, Vec<Value>, Vec<Value>, Value) -> Task + Send + Sync>;

/// Handler for a message the capability sent to itself via
/// [`Router::send_to_self`].
pub type OnSelfMsg = Arc<dyn Fn(&Router, Value, Value) -> Task + Send + Sync>;

/// Composes a map tagger onto one effect payload.
///
/// A capability whose commands (or subscriptions) carry application messages
/// supplies one of these so that `EffectTree::map` taggers can reach the
/// message slots inside the payload.
pub type TaggerCompose = Arc<dyn Fn(&Tagger, Value) -> Value + Send + Sync>;

/// Everything needed to register one capability.
pub struct CapabilitySpec {
    /// Unique capability name; leaves address capabilities by this name.
    pub name: String,
    /// Task producing the manager's initial state.
    pub init: Task,
    /// Effects handler.
    pub on_effects: OnEffects,
    /// Self-message handler.
    pub on_self_msg: OnSelfMsg,
    /// Tagger composition for command payloads, if commands are mappable.
    pub command_tagger: Option<TaggerCompose>,
    /// Tagger composition for subscription payloads, if subscriptions are
    /// mappable.
    pub subscription_tagger: Option<TaggerCompose>,
}

impl CapabilitySpec {
    /// Creates a spec with no tagger composition functions.
    pub fn new<E, S>(name: impl Into<String>, init: Task, on_effects: E, on_self_msg: S) -> Self
    where
        E: Fn(&Router, Vec<Value>, Vec<Value>, Value) -> Task + Send + Sync + 'static,
        S: Fn(&Router, Value, Value) -> Task + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            init,
            on_effects: Arc::new(on_effects),
            on_self_msg: Arc::new(on_self_msg),
            command_tagger: None,
            subscription_tagger: None,
        }
    }

    /// Sets the command tagger-composition function.
    #[must_use]
    pub fn with_command_tagger<F>(mut self, compose: F) -> Self
    where
        F: Fn(&Tagger, Value) -> Value + Send + Sync + 'static,
    {
        self.command_tagger = Some(Arc::new(compose));
        self
    }

    /// Sets the subscription tagger-composition function.
    #[must_use]
    pub fn with_subscription_tagger<F>(mut self, compose: F) -> Self
    where
        F: Fn(&Tagger, Value) -> Value + Send + Sync + 'static,
    {
        self.subscription_tagger = Some(Arc::new(compose));
        self
    }
}

/// Envelope for everything that lands in a manager's mailbox.
pub(crate) enum HomeMsg {
    /// Sent by the capability to itself via `Router::send_to_self`.
    SelfMsg(Value),
    /// One flattened command/subscription pair from a dispatched batch.
    Effects {
        commands: Vec<Value>,
        subscriptions: Vec<Value>,
    },
}

/// One registered capability.
#[derive(Clone)]
pub(crate) struct CapabilityEntry {
    pub(crate) name: String,
    pub(crate) handle: ProcessHandle,
    pub(crate) command_tagger: Option<TaggerCompose>,
    pub(crate) subscription_tagger: Option<TaggerCompose>,
}

/// The capability registry: name → manager, in registration order.
///
/// Dispatch iterates entries in registration order so effects-message
/// delivery is deterministic.
pub(crate) struct CapabilityRegistry {
    entries: Vec<CapabilityEntry>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn insert(&mut self, entry: CapabilityEntry) {
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub(crate) fn snapshot(&self) -> Vec<CapabilityEntry> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Handlers {
    on_effects: OnEffects,
    on_self_msg: OnSelfMsg,
}

/// One iteration of the manager loop: receive, dispatch on tag, recurse.
fn manager_loop(router: Router, handlers: Arc<Handlers>, state: Value) -> Task {
    Task::receive(move |msg| match msg.downcast::<HomeMsg>() {
        Ok(home) => {
            let next = match *home {
                HomeMsg::SelfMsg(value) => (handlers.on_self_msg)(&router, value, state),
                HomeMsg::Effects {
                    commands,
                    subscriptions,
                } => (handlers.on_effects)(&router, commands, subscriptions, state),
            };
            let router = router.clone();
            let handlers = Arc::clone(&handlers);
            next.and_then(move |new_state| manager_loop(router, handlers, new_state))
        }
        Err(_other) => {
            // Only the runtime and the router feed this mailbox; anything
            // else is a stray raw send.
            error!(capability = %router.capability(), "discarding non-protocol message in manager mailbox");
            manager_loop(router, handlers, state)
        }
    })
}

// Capability registration entry points for the scheduler.
impl Scheduler {
    /// Registers a capability, spawning its persistent manager process.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered; duplicate names are a fatal
    /// configuration error.
    pub fn register_capability(&self, spec: CapabilitySpec) -> Router {
        match self.try_register_capability(spec) {
            Ok(router) => router,
            Err(err) => panic!("capability registration failed: {err}"),
        }
    }

    /// Registers a capability, returning an error on a duplicate name.
    pub fn try_register_capability(
        &self,
        spec: CapabilitySpec,
    ) -> Result<Router, RegistrationError> {
        let _span = debug_span!("register_capability", capability = %spec.name).entered();

        let handle = {
            let mut registry = self.shared.registry.lock();
            if registry.contains(&spec.name) {
                return Err(RegistrationError::DuplicateCapability { name: spec.name });
            }
            let handle = self.spawn_suspended();
            registry.insert(CapabilityEntry {
                name: spec.name.clone(),
                handle: handle.clone(),
                command_tagger: spec.command_tagger,
                subscription_tagger: spec.subscription_tagger,
            });
            handle
        };

        let router = Router {
            name: spec.name.clone(),
            process: handle.clone(),
            shared: Arc::downgrade(&self.shared),
        };
        debug!(capability = %spec.name, process = %handle.id(), "capability manager spawned");

        let handlers = Arc::new(Handlers {
            on_effects: spec.on_effects,
            on_self_msg: spec.on_self_msg,
        });
        let loop_router = router.clone();
        let task = spec
            .init
            .and_then(move |state| manager_loop(loop_router, handlers, state));
        self.resume_with(handle.id(), task);

        Ok(router)
    }

    /// Returns the number of registered capabilities.
    #[must_use]
    pub fn capability_count(&self) -> usize {
        self.shared.registry.lock().len()
    }
}

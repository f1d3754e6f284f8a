//! Effect batch trees and the serialized effect dispatcher.
//!
//! Commands and subscriptions arrive from the application as [`EffectTree`]s:
//! leaves address a capability by name, batches group subtrees, and map nodes
//! wrap the leaves below them in a message tagger. Dispatching a batch
//! flattens each tree into a capability → ordered-payload map and delivers
//! exactly one effects message to every registered capability, including
//! capabilities absent from the batch (they receive empty lists).
//!
//! # Ordering invariant
//!
//! [`Scheduler::enqueue_effects`] is serialized by a `dispatching` flag: a
//! batch enqueued while another is dispatching (for example from inside an
//! `on_effects` handler) waits in a FIFO backlog until the active batch
//! finishes. Every capability therefore processes all of an earlier batch's
//! effects before any of a later batch's.

use crate::capability::{CapabilityEntry, HomeMsg, TaggerCompose};
use crate::scheduler::Scheduler;
use crate::types::Value;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{trace, warn};

/// A message tagger composed onto effect payloads by map nodes.
pub type Tagger = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A nested tree describing grouped outbound commands or inbound
/// subscriptions, consumed when its batch is dispatched.
pub struct EffectTree(pub(crate) EffectKind);

pub(crate) enum EffectKind {
    Leaf { home: String, payload: Value },
    Batch(Vec<EffectTree>),
    Map { tagger: Tagger, tree: Box<EffectTree> },
}

impl EffectTree {
    /// A single effect addressed to the named capability.
    #[must_use]
    pub fn leaf<T: Any + Send>(home: impl Into<String>, payload: T) -> Self {
        Self(EffectKind::Leaf {
            home: home.into(),
            payload: Box::new(payload),
        })
    }

    /// Groups subtrees; flattening preserves their order.
    #[must_use]
    pub fn batch(trees: Vec<Self>) -> Self {
        Self(EffectKind::Batch(trees))
    }

    /// An empty batch, for cycles that produce no effects.
    #[must_use]
    pub fn none() -> Self {
        Self(EffectKind::Batch(Vec::new()))
    }

    /// Wraps every leaf below `self` in a message tagger.
    ///
    /// Taggers are composed onto leaf payloads innermost-first via the owning
    /// capability's registered tagger-composition function.
    #[must_use]
    pub fn map<F>(self, tagger: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self(EffectKind::Map {
            tagger: Arc::new(tagger),
            tree: Box::new(self),
        })
    }
}

impl core::fmt::Debug for EffectTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.0 {
            EffectKind::Leaf { home, .. } => f.debug_struct("Leaf").field("home", home).finish(),
            EffectKind::Batch(trees) => f.debug_tuple("Batch").field(&trees.len()).finish(),
            EffectKind::Map { tree, .. } => f.debug_tuple("Map").field(tree).finish(),
        }
    }
}

/// Flattens a tree into per-capability payload lists in structural order.
///
/// `taggers` is the chain of enclosing map taggers, outermost first; at each
/// leaf they are applied innermost-first through `compose_for`'s composition
/// function for the leaf's capability.
pub(crate) fn flatten<F>(
    tree: EffectTree,
    taggers: &mut SmallVec<[Tagger; 4]>,
    compose_for: &F,
    out: &mut HashMap<String, Vec<Value>>,
) where
    F: Fn(&str) -> Option<TaggerCompose>,
{
    match tree.0 {
        EffectKind::Leaf { home, mut payload } => {
            if !taggers.is_empty() {
                if let Some(compose) = compose_for(&home) {
                    for tagger in taggers.iter().rev() {
                        payload = compose(tagger, payload);
                    }
                } else {
                    warn!(
                        capability = %home,
                        "capability has no tagger composer; enclosing map taggers ignored"
                    );
                }
            }
            out.entry(home).or_default().push(payload);
        }
        EffectKind::Batch(subtrees) => {
            for subtree in subtrees {
                flatten(subtree, taggers, compose_for, out);
            }
        }
        EffectKind::Map { tagger, tree } => {
            taggers.push(tagger);
            flatten(*tree, taggers, compose_for, out);
            taggers.pop();
        }
    }
}

/// The dispatch-in-progress flag and batch backlog.
pub(crate) struct EffectQueue {
    dispatching: bool,
    backlog: VecDeque<EffectBatch>,
}

impl EffectQueue {
    pub(crate) fn new() -> Self {
        Self {
            dispatching: false,
            backlog: VecDeque::new(),
        }
    }
}

struct EffectBatch {
    commands: EffectTree,
    subscriptions: EffectTree,
}

// Effect dispatch entry points for the scheduler.
impl Scheduler {
    /// Queues one command/subscription batch for dispatch.
    ///
    /// Called by the host application driver after initialization and after
    /// every update. If a dispatch is already in progress the batch waits in
    /// the backlog; the active dispatch drains it in FIFO order, so batches
    /// are never interleaved.
    pub fn enqueue_effects(&self, commands: EffectTree, subscriptions: EffectTree) {
        {
            let mut queue = self.shared.effects.lock();
            queue.backlog.push_back(EffectBatch {
                commands,
                subscriptions,
            });
            if queue.dispatching {
                trace!("dispatch in progress; batch added to backlog");
                return;
            }
            queue.dispatching = true;
        }
        loop {
            let batch = {
                let mut queue = self.shared.effects.lock();
                match queue.backlog.pop_front() {
                    Some(batch) => batch,
                    None => {
                        queue.dispatching = false;
                        return;
                    }
                }
            };
            self.dispatch_batch(batch);
        }
    }

    /// Flattens one batch and delivers exactly one effects message per
    /// registered capability.
    fn dispatch_batch(&self, batch: EffectBatch) {
        let capabilities: Vec<CapabilityEntry> = self.shared.registry.lock().snapshot();

        let compose_command = |home: &str| {
            capabilities
                .iter()
                .find(|entry| entry.name == home)
                .and_then(|entry| entry.command_tagger.clone())
        };
        let compose_subscription = |home: &str| {
            capabilities
                .iter()
                .find(|entry| entry.name == home)
                .and_then(|entry| entry.subscription_tagger.clone())
        };

        let mut commands = HashMap::new();
        let mut subscriptions = HashMap::new();
        flatten(
            batch.commands,
            &mut SmallVec::new(),
            &compose_command,
            &mut commands,
        );
        flatten(
            batch.subscriptions,
            &mut SmallVec::new(),
            &compose_subscription,
            &mut subscriptions,
        );

        for entry in &capabilities {
            let commands = commands.remove(&entry.name).unwrap_or_default();
            let subscriptions = subscriptions.remove(&entry.name).unwrap_or_default();
            trace!(
                capability = %entry.name,
                commands = commands.len(),
                subscriptions = subscriptions.len(),
                "delivering effects message"
            );
            self.raw_send(
                entry.handle.id,
                Box::new(HomeMsg::Effects {
                    commands,
                    subscriptions,
                }),
            );
        }

        for home in commands.keys().chain(subscriptions.keys()) {
            warn!(capability = %home, "dropping effects addressed to unregistered capability");
        }
    }
}

//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects tracked values and
//! effects. It owns the dependency graph and dispatches notifications when
//! a tracked value changes.
//!
//! # How It Works
//!
//! 1. When an effect is created, it registers with the runtime.
//!
//! 2. When a tracked value is read while an effect is running, the runtime
//!    records the effect as a dependent of that (target, key) pair
//!    ([`Runtime::track`]).
//!
//! 3. When a tracked value changes, the runtime ([`Runtime::trigger`]):
//!    a. Snapshots the dependents of the written (target, key) pair
//!    b. Skips any dependent that is itself currently running
//!    c. Notifies the rest; each effect either re-runs or hands off to its
//!       scheduler
//!
//! # Thread Safety
//!
//! The active-effect stack is thread-local, so tracking is per thread. The
//! graph and registry are global and use concurrent maps; no map guard is
//! held while user code runs.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;
use crate::graph::{Dependency, DependencyGraph, TargetId, TrackKey};

/// A trait for computations that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// One of the computation's dependencies was written.
    fn notify(self: Arc<Self>);
}

/// Handle to a registered computation.
///
/// Dropping this handle unregisters the computation from the runtime.
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl ReactiveHandle {
    /// The subscriber this handle keeps registered.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// Ownership of a tracked object's entries in the dependency graph.
///
/// Every tracked object holds exactly one of these. Dropping it removes all
/// dependents recorded against the target.
#[derive(Debug)]
pub struct TargetHandle {
    id: TargetId,
}

impl TargetHandle {
    /// Allocate a fresh target.
    pub fn new() -> Self {
        Self { id: TargetId::new() }
    }

    /// The target's identity.
    pub fn id(&self) -> TargetId {
        self.id
    }
}

impl Default for TargetHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TargetHandle {
    fn drop(&mut self) {
        Runtime::release_target(self.id);
    }
}

/// Implemented by every value the dependency graph can track.
pub trait Tracked {
    /// The identity the graph records dependents against.
    fn target_id(&self) -> TargetId;
}

/// The global reactive runtime.
pub struct Runtime;

// Registry of live computations.
// Maps subscriber IDs to weak references so the runtime never keeps an
// effect alive on its own.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
static GRAPH: OnceLock<DependencyGraph<SubscriberId>> = OnceLock::new();

fn registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn graph() -> &'static DependencyGraph<SubscriberId> {
    GRAPH.get_or_init(DependencyGraph::new)
}

impl Runtime {
    /// Register a computation with the runtime.
    ///
    /// Returns a handle that unregisters the computation when dropped.
    pub fn register(subscriber_id: SubscriberId, reactive: Weak<dyn Reactive>) -> ReactiveHandle {
        registry().insert(subscriber_id, reactive);
        ReactiveHandle { subscriber_id }
    }

    fn unregister(subscriber_id: SubscriberId) {
        registry().remove(&subscriber_id);
        debug!(subscriber = %subscriber_id, "unregistered subscriber");
    }

    /// Record that the running effect depends on `(target, key)`.
    ///
    /// No-op when no effect is running.
    pub fn track(target: TargetId, key: TrackKey) {
        let Some(subscriber_id) = ReactiveContext::current_subscriber() else {
            return;
        };

        if graph().add(target, key.clone(), subscriber_id) {
            trace!(%target, %key, subscriber = %subscriber_id, "tracked dependency");
            ReactiveContext::track_dependency((target, key));
        }
    }

    /// Notify every dependent of `(target, key)`.
    ///
    /// Writing to a pair nobody depends on is a silent no-op. All current
    /// dependents are notified before this returns.
    ///
    /// Dependents that are already running on this thread are skipped. An
    /// effect that writes a value it read earlier in the same run is not
    /// re-run for that write, so it must not rely on seeing its own update.
    pub fn trigger(target: TargetId, key: TrackKey) {
        let subscriber_ids = graph().dependents(target, &key);
        if subscriber_ids.is_empty() {
            return;
        }

        trace!(%target, %key, dependents = subscriber_ids.len(), "triggering dependents");

        let mut to_notify = Vec::with_capacity(subscriber_ids.len());
        for subscriber_id in subscriber_ids {
            if ReactiveContext::is_running(subscriber_id) {
                continue;
            }

            let reactive = registry()
                .get(&subscriber_id)
                .and_then(|weak| weak.upgrade());

            match reactive {
                Some(reactive) => to_notify.push(reactive),
                // The subscriber is gone; prune the stale edge.
                None => graph().remove(target, &key, subscriber_id),
            }
        }

        for reactive in to_notify {
            reactive.notify();
        }
    }

    /// Remove a subscriber from the given dependency pairs.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies<I>(subscriber_id: SubscriberId, dependencies: I)
    where
        I: IntoIterator<Item = Dependency>,
    {
        for (target, key) in dependencies {
            graph().remove(target, &key, subscriber_id);
        }
    }

    /// Drop every graph entry recorded against `target`.
    pub fn release_target(target: TargetId) {
        if graph().remove_target(target) {
            debug!(%target, "released target with live dependents");
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Number of dependents recorded for `(target, key)`.
    pub fn dependent_count(target: TargetId, key: &TrackKey) -> usize {
        graph().dependent_count(target, key)
    }

    /// Number of targets that currently have dependents.
    pub fn target_count() -> usize {
        graph().target_count()
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untrack<T, F>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

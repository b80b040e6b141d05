//! Effect Implementation
//!
//! An Effect is a re-executable computation that re-registers its
//! dependencies every time it runs.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazy).
//!
//! 2. When any dependency changes, the effect is notified. Without a
//!    scheduler it simply re-runs; with one, the scheduler decides what to
//!    do and may call [`Effect::run`] itself.
//!
//! 3. Before re-running, the effect removes itself from the dependencies
//!    of its previous run and tracks new ones during execution.
//!
//! # Lifetime
//!
//! The runtime only holds effects weakly. An effect keeps reacting while at
//! least one [`Effect`] handle to it is alive; dropping the last handle
//! unregisters it and removes it from the dependency graph.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::context::{Dependencies, ReactiveContext};
use super::runtime::{untrack, Reactive, ReactiveHandle, Runtime};
use super::subscriber::SubscriberId;

/// Replacement invocation strategy for an effect.
///
/// Called with the notified effect instead of re-running it directly.
pub type Scheduler<T> = Arc<dyn Fn(&Effect<T>) + Send + Sync>;

/// Options for [`Effect::with_options`].
pub struct EffectOptions<T> {
    /// Skip the first automatic run.
    pub lazy: bool,

    /// Invoked instead of re-running the effect when a dependency changes.
    pub scheduler: Option<Scheduler<T>>,
}

impl<T> EffectOptions<T> {
    /// Options for an effect that does not run on creation.
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    /// Set the scheduler.
    pub fn with_scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect<T>) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }
}

impl<T> Default for EffectOptions<T> {
    fn default() -> Self {
        Self {
            lazy: false,
            scheduler: None,
        }
    }
}

struct EffectInner<T> {
    id: SubscriberId,
    run: Box<dyn Fn() -> T + Send + Sync>,
    scheduler: Option<Scheduler<T>>,

    /// Dependencies recorded during the last run.
    dependencies: Mutex<Dependencies>,

    stopped: AtomicBool,
    run_count: AtomicUsize,

    _registration: ReactiveHandle,
}

impl<T: 'static> Reactive for EffectInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn notify(self: Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let effect = Effect { inner: self };
        match &effect.inner.scheduler {
            Some(scheduler) => scheduler(&effect),
            None => {
                effect.run();
            }
        }
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        let dependencies = std::mem::take(self.dependencies.get_mut());
        Runtime::clear_dependencies(self.id, dependencies);
    }
}

/// Saves the dependencies of a run, even if the run unwinds.
struct RunGuard<'a> {
    dependencies: &'a Mutex<Dependencies>,
    context: Option<ReactiveContext>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            *self.dependencies.lock() = context.exit();
        }
    }
}

/// A re-executable computation that re-runs when its dependencies change.
///
/// `T` is the value returned by the effect function; [`Effect::run`] hands
/// it back to the caller. Plain side-effecting effects use `()`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let c = count.clone();
/// let effect = Effect::new(move || {
///     println!("Count is: {}", c.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
#[must_use = "an effect stops reacting once every handle to it is dropped"]
pub struct Effect<T = ()> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new effect without running it immediately.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::lazy())
    }

    /// Create a new effect with explicit options.
    pub fn with_options<F>(run: F, options: EffectOptions<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let EffectOptions { lazy, scheduler } = options;

        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner<T>>| {
            let id = SubscriberId::new();
            let reactive: Weak<dyn Reactive> = weak.clone();

            EffectInner {
                id,
                run: Box::new(run),
                scheduler,
                dependencies: Mutex::new(Dependencies::new()),
                stopped: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
                _registration: Runtime::register(id, reactive),
            }
        });

        let effect = Self { inner };
        if !lazy {
            effect.run();
        }
        effect
    }

    /// Run the effect function and return its value.
    ///
    /// This runs the function within a reactive context to track
    /// dependencies. A stopped effect still runs, but tracks nothing.
    pub fn run(&self) -> T {
        let inner = &self.inner;

        if inner.stopped.load(Ordering::Acquire) {
            return untrack(|| (inner.run)());
        }

        // Clear old dependencies
        let stale = std::mem::take(&mut *inner.dependencies.lock());
        Runtime::clear_dependencies(inner.id, stale);

        let _guard = RunGuard {
            dependencies: &inner.dependencies,
            context: Some(ReactiveContext::enter(inner.id)),
        };

        inner.run_count.fetch_add(1, Ordering::Relaxed);
        (inner.run)()
    }

    /// Stop the effect.
    ///
    /// After stopping, the effect is removed from the dependency graph and
    /// no longer reacts to changes. Stopping twice is a no-op.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let dependencies = std::mem::take(&mut *self.inner.dependencies.lock());
        Runtime::clear_dependencies(self.inner.id, dependencies);
        debug!(effect = %self.inner.id, "stopped effect");
    }
}

impl<T> Effect<T> {
    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Check if the effect has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Check if the effect has a scheduler.
    pub fn has_scheduler(&self) -> bool {
        self.inner.scheduler.is_some()
    }

    /// Get the number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of dependencies recorded in the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when it is
//! read after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. Construction does not run the derivation. The value starts dirty.
//!
//! 2. On first read, the derivation runs inside an internal lazy effect,
//!    which records its dependencies, and the result is cached.
//!
//! 3. When a dependency changes, the internal effect's scheduler marks the
//!    value dirty and notifies anything that read the computed value. It
//!    does not recompute.
//!
//! 4. The next read recomputes. Reads while clean return the cache.
//!
//! # Why This Matters
//!
//! A computed value that is invalidated several times before anyone reads
//! it derives once, not once per upstream change.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, TargetHandle, Tracked};
use crate::error::{ReactiveError, Result};
use crate::graph::{TargetId, TrackKey};

struct ComputedInner<T> {
    target: TargetHandle,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,

    dirty: Arc<AtomicBool>,

    /// Runs the derivation and listens to its dependencies.
    effect: Effect<T>,
}

/// Re-marks the value dirty if the derivation unwinds.
struct DirtyOnUnwind<'a>(&'a AtomicBool);

impl Drop for DirtyOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.store(true, Ordering::Release);
        }
    }
}

/// A cached derived value that recomputes only when read after a change.
///
/// # Example
///
/// ```rust,ignore
/// let a = Ref::new(1);
/// let b = Ref::new(2);
///
/// let (ra, rb) = (a.clone(), b.clone());
/// let sum = Computed::new(move || ra.get() + rb.get());
///
/// assert_eq!(sum.get(), 3);
/// a.set(10);
/// assert_eq!(sum.get(), 12);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new computed value with the given derivation.
    ///
    /// The derivation is not run immediately. It runs on first access.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let target = TargetHandle::new();
        let target_id = target.id();
        let dirty = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&dirty);
        let effect = Effect::with_options(
            derive,
            EffectOptions::lazy().with_scheduler(move |_: &Effect<T>| {
                flag.store(true, Ordering::Release);
                Runtime::trigger(target_id, TrackKey::Value);
            }),
        );

        Self {
            inner: Arc::new(ComputedInner {
                target,
                value: RwLock::new(None),
                dirty,
                effect,
            }),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If called within a running effect, this also registers the effect
    /// as a dependent of the computed value.
    pub fn get(&self) -> T {
        let value = self.current();
        Runtime::track(self.inner.target.id(), TrackKey::Value);
        value
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Still recomputes if the cache is stale.
    pub fn get_untracked(&self) -> T {
        self.current()
    }

    /// Writing a computed value is rejected.
    ///
    /// The cached value is left unchanged.
    pub fn set(&self, _value: T) -> Result<()> {
        warn!(target_id = %self.target_id(), "attempted to write a computed value");
        Err(ReactiveError::ComputedWrite)
    }

    /// Check if the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    fn current(&self) -> T {
        let cached = if self.is_dirty() {
            None
        } else {
            self.inner.value.read().clone()
        };

        match cached {
            Some(value) => value,
            None => self.recompute(),
        }
    }

    fn recompute(&self) -> T {
        // Cleared before running so an invalidation during the derivation
        // is not lost.
        self.inner.dirty.store(false, Ordering::Release);
        let _unwind = DirtyOnUnwind(&self.inner.dirty);

        let value = self.inner.effect.run();
        *self.inner.value.write() = Some(value.clone());
        value
    }
}

impl<T> Tracked for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn target_id(&self) -> TargetId {
        self.inner.target.id()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.target_id())
            .field("dirty", &self.is_dirty())
            .field("cached", &*self.inner.value.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

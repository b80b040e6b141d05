//! Ref Implementation
//!
//! A Ref is the scalar reactive primitive. It holds a single value and
//! tracks which effects depend on it.
//!
//! # How Refs Work
//!
//! 1. When a ref is read within a running effect, the ref registers that
//!    effect as a dependent of its `value` slot.
//!
//! 2. When a ref is written with a value that differs from the stored one,
//!    all dependents are notified. Writing the same value back is silent.
//!
//! # Thread Safety
//!
//! The value is protected by a RwLock. The lock is never held while
//! dependents run, so an effect may freely read or write the ref it was
//! notified by.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::{Runtime, TargetHandle, Tracked};
use crate::graph::{TargetId, TrackKey};

struct RefInner<T> {
    target: TargetHandle,
    value: RwLock<T>,
}

/// A reactive cell holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The stored value. `PartialEq` decides whether a write is a change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// ```
pub struct Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<RefInner<T>>,
}

impl<T> Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RefInner {
                target: TargetHandle::new(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Get the current value.
    ///
    /// If called within a running effect, this also registers the effect
    /// as a dependent.
    pub fn get(&self) -> T {
        let value = self.inner.value.read().clone();
        Runtime::track(self.inner.target.id(), TrackKey::Value);
        value
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Call `f` with the current value, tracking the read.
    ///
    /// `f` sees a snapshot, so it may write this ref.
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let value = self.get();
        f(&value)
    }

    /// Set a new value and notify dependents if it changed.
    ///
    /// Returns `true` if the stored value changed.
    pub fn set(&self, value: T) -> bool {
        let changed = {
            let mut guard = self.inner.value.write();
            if *guard != value {
                *guard = value;
                true
            } else {
                false
            }
        };

        if changed {
            Runtime::trigger(self.inner.target.id(), TrackKey::Value);
        }
        changed
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked();
        self.set(f(&current))
    }
}

impl<T> Tracked for Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn target_id(&self) -> TargetId {
        self.inner.target.id()
    }
}

impl<T> Clone for Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Ref<T>
where
    T: Clone + PartialEq + Send + Sync + Default + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Ref<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("target", &self.target_id())
            .field("value", &self.get_untracked())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn closures_may_write_the_same_ref() {
        let cell = Ref::new(1);

        let changed = cell.with(|v| cell.set(v + 1));
        assert!(changed);
        assert_eq!(cell.get_untracked(), 2);

        assert!(cell.update(|v| {
            cell.set(*v * 10);
            *v + 1
        }));
        assert_eq!(cell.get_untracked(), 3);
    }

    #[test]
    fn ref_get_and_set() {
        let cell = Ref::new(0);
        assert_eq!(cell.get(), 0);

        assert!(cell.set(42));
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn ref_update() {
        let cell = Ref::new(10);
        cell.update(|v| v + 5);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn ref_notifies_dependents_on_change() {
        let cell = Ref::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let (c, count) = (cell.clone(), call_count.clone());

        let _effect = Effect::new(move || {
            c.get();
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        cell.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        cell.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn writing_same_value_is_silent() {
        let cell = Ref::new("idle".to_string());
        let call_count = Arc::new(AtomicI32::new(0));
        let (c, count) = (cell.clone(), call_count.clone());

        let _effect = Effect::new(move || {
            c.with(|s| s.len());
            count.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!cell.set("idle".to_string()));
        assert!(!cell.update(|s| s.clone()));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn untracked_read_registers_nothing() {
        let cell = Ref::new(1);
        let c = cell.clone();

        let effect = Effect::new(move || {
            c.get_untracked();
        });

        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(Runtime::dependent_count(cell.target_id(), &TrackKey::Value), 0);
    }

    #[test]
    fn ref_clone_shares_state() {
        let cell1 = Ref::new(0);
        let cell2 = cell1.clone();

        cell1.set(42);
        assert_eq!(cell2.get(), 42);

        cell2.set(100);
        assert_eq!(cell1.get(), 100);
        assert_eq!(cell1.target_id(), cell2.target_id());
    }

    #[test]
    fn ref_ids_are_unique() {
        let a = Ref::new(0);
        let b = Ref::new(0);
        assert_ne!(a.target_id(), b.target_id());
    }
}

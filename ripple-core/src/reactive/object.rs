//! Reactive Objects
//!
//! A reactive object is a keyed record whose fields are tracked one by one:
//! reading a field records a dependency on that field only, and writing a
//! field notifies only the effects that read it.
//!
//! Fields are copied in at construction, so the object never aliases the
//! caller's data. Adding or removing a field also notifies readers of the
//! object's shape ([`ReactiveObject::keys`], [`ReactiveObject::len`]).
//!
//! A readonly object rejects every write and deletion with an error and a
//! warning, and leaves its fields untouched. Since it can never change,
//! reading it records no dependencies.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use super::runtime::{Runtime, TargetHandle, Tracked};
use crate::error::{ReactiveError, Result};
use crate::graph::{TargetId, TrackKey};

struct ObjectInner<V> {
    target: TargetHandle,
    fields: RwLock<IndexMap<Arc<str>, V>>,
    readonly: bool,
}

/// A record with per-field dependency tracking.
///
/// # Example
///
/// ```rust,ignore
/// let state = ReactiveObject::new([("scene", "loading".to_string())]);
///
/// let s = state.clone();
/// let _effect = Effect::new(move || println!("{:?}", s.get("scene")));
///
/// state.set("scene", "ready".to_string())?;  // Prints: Some("ready")
/// ```
pub struct ReactiveObject<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ObjectInner<V>>,
}

impl<V> ReactiveObject<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a reactive object from the given fields.
    pub fn new<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arc<str>>,
    {
        Self::build(fields, false)
    }

    /// Create a readonly object from the given fields.
    pub fn readonly<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arc<str>>,
    {
        Self::build(fields, true)
    }

    fn build<I, K>(fields: I, readonly: bool) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arc<str>>,
    {
        let fields = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();

        Self {
            inner: Arc::new(ObjectInner {
                target: TargetHandle::new(),
                fields: RwLock::new(fields),
                readonly,
            }),
        }
    }

    /// Check if this object rejects writes.
    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    /// Get a field's value, tracking the field.
    pub fn get(&self, key: &str) -> Option<V> {
        let (track_key, value) = {
            let fields = self.inner.fields.read();
            match fields.get_key_value(key) {
                Some((name, value)) => (TrackKey::Field(Arc::clone(name)), Some(value.clone())),
                None => (TrackKey::field(key), None),
            }
        };

        self.track(track_key);
        value
    }

    /// Check if a field exists, tracking the field.
    pub fn contains_key(&self, key: &str) -> bool {
        let present = self.inner.fields.read().contains_key(key);
        self.track(TrackKey::field(key));
        present
    }

    /// Set a field, notifying its readers if the value changed.
    ///
    /// Returns `Ok(true)` if the field changed. A new field counts as a
    /// change and also notifies readers of the object's shape.
    pub fn set(&self, key: impl Into<Arc<str>>, value: V) -> Result<bool> {
        let key = key.into();
        if self.inner.readonly {
            warn!(target_id = %self.target_id(), key = %key, "set on readonly object ignored");
            return Err(ReactiveError::ReadonlyWrite {
                key: key.to_string(),
            });
        }

        let (changed, added) = {
            let mut fields = self.inner.fields.write();
            match fields.get_mut(&key) {
                Some(current) if *current == value => (false, false),
                Some(current) => {
                    *current = value;
                    (true, false)
                }
                None => {
                    fields.insert(Arc::clone(&key), value);
                    (true, true)
                }
            }
        };

        if changed {
            Runtime::trigger(self.target_id(), TrackKey::Field(key));
        }
        if added {
            Runtime::trigger(self.target_id(), TrackKey::Size);
        }
        Ok(changed)
    }

    /// Remove a field, notifying its readers if it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        if self.inner.readonly {
            warn!(target_id = %self.target_id(), key, "delete on readonly object ignored");
            return Err(ReactiveError::ReadonlyDelete {
                key: key.to_string(),
            });
        }

        let removed = self.inner.fields.write().shift_remove_entry(key);
        match removed {
            Some((name, _)) => {
                Runtime::trigger(self.target_id(), TrackKey::Field(name));
                Runtime::trigger(self.target_id(), TrackKey::Size);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Field names in insertion order, tracking the object's shape.
    pub fn keys(&self) -> Vec<Arc<str>> {
        let keys = self.inner.fields.read().keys().cloned().collect();
        self.track(TrackKey::Size);
        keys
    }

    /// Number of fields, tracking the object's shape.
    pub fn len(&self) -> usize {
        let len = self.inner.fields.read().len();
        self.track(TrackKey::Size);
        len
    }

    /// Check if the object has no fields, tracking the object's shape.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy all fields out without tracking anything.
    pub fn snapshot(&self) -> IndexMap<Arc<str>, V> {
        self.inner.fields.read().clone()
    }

    fn track(&self, key: TrackKey) {
        if !self.inner.readonly {
            Runtime::track(self.target_id(), key);
        }
    }
}

impl<V> Tracked for ReactiveObject<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn target_id(&self) -> TargetId {
        self.inner.target.id()
    }
}

impl<V> Clone for ReactiveObject<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Debug for ReactiveObject<V>
where
    V: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("target", &self.target_id())
            .field("readonly", &self.inner.readonly)
            .field("fields", &*self.inner.fields.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn scene_state() -> ReactiveObject<String> {
        ReactiveObject::new([
            ("scene", "loading".to_string()),
            ("camera", "orbit".to_string()),
        ])
    }

    fn count_runs<F>(f: F) -> (Effect, Arc<AtomicI32>)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runs = Arc::new(AtomicI32::new(0));
        let r = runs.clone();
        let effect = Effect::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
            f();
        });
        (effect, runs)
    }

    #[test]
    fn fields_are_copied_at_construction() {
        let mut source = IndexMap::new();
        source.insert("a", 1);

        let object = ReactiveObject::new(source.clone());
        source.insert("a", 2);

        assert_eq!(object.get("a"), Some(1));
        assert_eq!(object.get("missing"), None);
    }

    #[test]
    fn writes_notify_only_readers_of_that_field() {
        let state = scene_state();
        let s = state.clone();
        let (_effect, runs) = count_runs(move || {
            s.get("scene");
        });

        state.set("camera", "fly".to_string()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(state.set("scene", "ready".to_string()).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn writing_same_value_is_silent() {
        let state = scene_state();
        let s = state.clone();
        let (_effect, runs) = count_runs(move || {
            s.get("scene");
        });

        assert!(!state.set("scene", "loading".to_string()).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adding_and_deleting_fields_notify_shape_readers() {
        let state = scene_state();
        let s = state.clone();
        let (_effect, runs) = count_runs(move || {
            s.keys();
        });

        state.set("fog", "on".to_string()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        assert!(state.delete("fog").unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        assert!(!state.delete("fog").unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn deleting_a_field_notifies_its_readers() {
        let state = scene_state();
        let s = state.clone();
        let (_effect, runs) = count_runs(move || {
            s.contains_key("camera");
        });

        state.delete("camera").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!state.contains_key("camera"));
    }

    #[test]
    fn readonly_rejects_writes() {
        let frozen = ReactiveObject::readonly([("version", 3)]);
        assert!(frozen.is_readonly());

        let err = frozen.set("version", 4).unwrap_err();
        assert_eq!(err, ReactiveError::ReadonlyWrite { key: "version".into() });

        let err = frozen.delete("version").unwrap_err();
        assert!(err.is_readonly_violation());

        assert_eq!(frozen.get("version"), Some(3));
    }

    #[test]
    fn readonly_reads_are_not_tracked() {
        let frozen = ReactiveObject::readonly([("version", 3)]);
        let f = frozen.clone();
        let (effect, _runs) = count_runs(move || {
            f.get("version");
        });

        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let state = scene_state();
        state.set("light", "sun".to_string()).unwrap();

        let keys: Vec<_> = state.snapshot().keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["scene", "camera", "light"]);
        assert_eq!(state.len(), 3);
        assert!(!state.is_empty());
    }
}

//! Reactive Map
//!
//! A keyed container with fine-grained reactivity.
//!
//! Two levels of tracking:
//! 1. Per-key: `get` and `has` only track the key they look up
//! 2. Size: `len`, `is_empty` and `keys` track the entry count
//!
//! A key is assigned a slot the first time it is read inside an effect.
//! Writes to keys without a slot notify nobody. A deleted key keeps its slot
//! while something still depends on it, so a watcher on a deleted key still
//! fires when the key comes back.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::object::ReactiveObject;
use super::runtime::{Runtime, TargetHandle, Tracked};
use super::watch::{from_fn, watch, IntoCleanup, WatchHandle, WatchOptions};
use crate::graph::{TargetId, TrackKey};

struct MapInner<K, V> {
    target: TargetHandle,
    entries: RwLock<IndexMap<K, V>>,
    slots: Mutex<HashMap<K, u64>>,
    next_slot: AtomicU64,
}

/// A reactive keyed container.
///
/// # Example
///
/// ```rust,ignore
/// let instances = ReactiveMap::new();
///
/// let _size = instances.watch_size(|len, _| println!("{len} instances"), WatchOptions::default());
///
/// instances.set("cube", 1);   // Prints: "1 instances"
/// instances.set("cube", 2);   // Size unchanged, nothing printed
/// ```
pub struct ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<MapInner<K, V>>,
}

impl<K, V> ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self::from_entries(std::iter::empty())
    }

    /// Create a map from initial entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            inner: Arc::new(MapInner {
                target: TargetHandle::new(),
                entries: RwLock::new(entries.into_iter().collect()),
                slots: Mutex::new(HashMap::new()),
                next_slot: AtomicU64::new(0),
            }),
        }
    }

    fn track_key(&self, key: &K) {
        if !Runtime::is_tracking() {
            return;
        }

        let slot = *self
            .inner
            .slots
            .lock()
            .entry(key.clone())
            .or_insert_with(|| self.inner.next_slot.fetch_add(1, Ordering::Relaxed));
        Runtime::track(self.target_id(), TrackKey::Entry(slot));
    }

    fn trigger_key(&self, key: &K) {
        let slot = self.inner.slots.lock().get(key).copied();
        if let Some(slot) = slot {
            Runtime::trigger(self.target_id(), TrackKey::Entry(slot));
        }
    }

    /// Forget the slot of a removed key once nothing depends on it.
    fn release_slot(&self, key: &K) {
        let mut slots = self.inner.slots.lock();
        if let Some(&slot) = slots.get(key) {
            if Runtime::dependent_count(self.target_id(), &TrackKey::Entry(slot)) == 0 {
                slots.remove(key);
            }
        }
    }

    /// Get the value for `key`, tracking the key.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.inner.entries.read().get(key).cloned();
        self.track_key(key);
        value
    }

    /// Get the value for `key` without tracking.
    pub fn get_untracked(&self, key: &K) -> Option<V> {
        self.inner.entries.read().get(key).cloned()
    }

    /// Check if `key` is present, tracking the key.
    pub fn has(&self, key: &K) -> bool {
        let present = self.inner.entries.read().contains_key(key);
        self.track_key(key);
        present
    }

    /// Insert or replace the value for `key`.
    ///
    /// Readers of the key and of the size are notified only if the key is
    /// new or the value differs. Returns the map for chaining.
    pub fn set(&self, key: K, value: V) -> &Self {
        let changed = {
            let mut entries = self.inner.entries.write();
            match entries.get_mut(&key) {
                Some(current) if *current == value => false,
                Some(current) => {
                    *current = value;
                    true
                }
                None => {
                    entries.insert(key.clone(), value);
                    true
                }
            }
        };

        if changed {
            self.trigger_key(&key);
            Runtime::trigger(self.target_id(), TrackKey::Size);
        }
        self
    }

    /// Remove `key`, notifying its readers and the size if it existed.
    pub fn delete(&self, key: &K) -> bool {
        let removed = self.inner.entries.write().shift_remove(key).is_some();
        if removed {
            self.trigger_key(key);
            Runtime::trigger(self.target_id(), TrackKey::Size);
            self.release_slot(key);
        }
        removed
    }

    /// Remove every entry, notifying readers of each removed key and the size.
    pub fn clear(&self) {
        let removed: Vec<K> = {
            let mut entries = self.inner.entries.write();
            entries.drain(..).map(|(key, _)| key).collect()
        };

        if removed.is_empty() {
            return;
        }

        for key in &removed {
            self.trigger_key(key);
        }
        Runtime::trigger(self.target_id(), TrackKey::Size);

        for key in &removed {
            self.release_slot(key);
        }
    }

    /// Number of entries, tracking the size.
    pub fn len(&self) -> usize {
        let len = self.inner.entries.read().len();
        Runtime::track(self.target_id(), TrackKey::Size);
        len
    }

    /// Check if the map is empty, tracking the size.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order, tracking the size.
    pub fn keys(&self) -> Vec<K> {
        let keys = self.inner.entries.read().keys().cloned().collect();
        Runtime::track(self.target_id(), TrackKey::Size);
        keys
    }

    /// Watch the value stored under `key`.
    pub fn watch_key<F, C>(&self, key: K, callback: F, options: WatchOptions) -> WatchHandle
    where
        F: FnMut(&Option<V>, Option<&Option<V>>) -> C + Send + 'static,
        C: IntoCleanup,
    {
        let map = self.clone();
        watch(from_fn(move || map.get(&key)), callback, options)
    }

    /// Watch the values stored under several keys at once.
    pub fn watch_keys<F, C>(&self, keys: Vec<K>, callback: F, options: WatchOptions) -> WatchHandle
    where
        F: FnMut(&Vec<Option<V>>, Option<&Vec<Option<V>>>) -> C + Send + 'static,
        C: IntoCleanup,
    {
        let map = self.clone();
        watch(
            from_fn(move || keys.iter().map(|key| map.get(key)).collect::<Vec<_>>()),
            callback,
            options,
        )
    }

    /// Watch the number of entries.
    pub fn watch_size<F, C>(&self, callback: F, options: WatchOptions) -> WatchHandle
    where
        F: FnMut(&usize, Option<&usize>) -> C + Send + 'static,
        C: IntoCleanup,
    {
        let map = self.clone();
        watch(from_fn(move || map.len()), callback, options)
    }

    /// Copy the entries out without tracking anything.
    pub fn to_object(&self) -> IndexMap<K, V> {
        self.inner.entries.read().clone()
    }

    /// Copy the entries into a new reactive object keyed by the keys'
    /// string form.
    pub fn to_reactive_object(&self) -> ReactiveObject<V>
    where
        K: ToString,
    {
        let entries = self.to_object();
        ReactiveObject::new(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value)),
        )
    }
}

impl<K, V> Tracked for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn target_id(&self) -> TargetId {
        self.inner.target.id()
    }
}

impl<K, V> Clone for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<K, V> Debug for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + Debug + 'static,
    V: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("target", &self.target_id())
            .field("entries", &*self.inner.entries.read())
            .finish()
    }
}

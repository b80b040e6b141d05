//! Dependency Storage
//!
//! The two-level association `target -> key -> dependents`.
//!
//! Entries are pruned as soon as their dependent set becomes empty, and a
//! target with no keys left is removed entirely, so the store only grows
//! with live dependencies.

use std::collections::HashMap;
use std::hash::Hash;

use dashmap::DashMap;
use indexmap::IndexSet;

use super::target::{TargetId, TrackKey};

type KeyTable<S> = HashMap<TrackKey, IndexSet<S>>;

/// Storage for the dependency graph.
///
/// `S` is the subscriber identity. Dependent sets are true sets: adding the
/// same subscriber twice for one pair is a no-op. Iteration follows
/// registration order, though callers must not rely on it.
pub struct DependencyGraph<S>
where
    S: Copy + Eq + Hash,
{
    targets: DashMap<TargetId, KeyTable<S>>,
}

impl<S> DependencyGraph<S>
where
    S: Copy + Eq + Hash,
{
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            targets: DashMap::new(),
        }
    }

    /// Record `subscriber` as a dependent of `(target, key)`.
    ///
    /// Returns `true` if the subscriber was not already recorded.
    pub fn add(&self, target: TargetId, key: TrackKey, subscriber: S) -> bool {
        self.targets
            .entry(target)
            .or_default()
            .entry(key)
            .or_default()
            .insert(subscriber)
    }

    /// Remove `subscriber` from the dependents of `(target, key)`.
    pub fn remove(&self, target: TargetId, key: &TrackKey, subscriber: S) {
        let now_empty = match self.targets.get_mut(&target) {
            Some(mut keys) => {
                if let Some(set) = keys.get_mut(key) {
                    set.shift_remove(&subscriber);
                    if set.is_empty() {
                        keys.remove(key);
                    }
                }
                keys.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.targets.remove_if(&target, |_, keys| keys.is_empty());
        }
    }

    /// Snapshot the dependents of `(target, key)`.
    ///
    /// The snapshot is detached from the graph so dependents may be added
    /// or removed while it is being walked.
    pub fn dependents(&self, target: TargetId, key: &TrackKey) -> Vec<S> {
        self.targets
            .get(&target)
            .and_then(|keys| keys.get(key).map(|set| set.iter().copied().collect()))
            .unwrap_or_default()
    }

    /// Number of dependents recorded for `(target, key)`.
    pub fn dependent_count(&self, target: TargetId, key: &TrackKey) -> usize {
        self.targets
            .get(&target)
            .and_then(|keys| keys.get(key).map(|set| set.len()))
            .unwrap_or(0)
    }

    /// Drop every entry recorded against `target`.
    pub fn remove_target(&self, target: TargetId) -> bool {
        self.targets.remove(&target).is_some()
    }

    /// Number of targets with at least one dependent.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Check if the graph holds no entries.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl<S> Default for DependencyGraph<S>
where
    S: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let graph = DependencyGraph::new();
        let target = TargetId::new();

        assert!(graph.add(target, TrackKey::Value, 1u64));
        assert!(!graph.add(target, TrackKey::Value, 1u64));
        assert_eq!(graph.dependent_count(target, &TrackKey::Value), 1);
    }

    #[test]
    fn keys_are_tracked_independently() {
        let graph = DependencyGraph::new();
        let target = TargetId::new();

        graph.add(target, TrackKey::field("a"), 1u64);
        graph.add(target, TrackKey::field("b"), 2u64);

        assert_eq!(graph.dependents(target, &TrackKey::field("a")), vec![1]);
        assert_eq!(graph.dependents(target, &TrackKey::field("b")), vec![2]);
        assert!(graph.dependents(target, &TrackKey::Size).is_empty());
    }

    #[test]
    fn missing_entries_are_empty() {
        let graph: DependencyGraph<u64> = DependencyGraph::new();
        assert!(graph.dependents(TargetId::new(), &TrackKey::Value).is_empty());
        assert_eq!(graph.dependent_count(TargetId::new(), &TrackKey::Value), 0);
    }

    #[test]
    fn removing_last_dependent_prunes_target() {
        let graph = DependencyGraph::new();
        let target = TargetId::new();

        graph.add(target, TrackKey::Value, 7u64);
        graph.add(target, TrackKey::Size, 7u64);
        assert_eq!(graph.target_count(), 1);

        graph.remove(target, &TrackKey::Value, 7);
        assert_eq!(graph.target_count(), 1);

        graph.remove(target, &TrackKey::Size, 7);
        assert!(graph.is_empty());
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let graph = DependencyGraph::new();
        let target = TargetId::new();

        for id in [3u64, 1, 2] {
            graph.add(target, TrackKey::Value, id);
        }

        assert_eq!(graph.dependents(target, &TrackKey::Value), vec![3, 1, 2]);
    }

    #[test]
    fn remove_target_drops_all_keys() {
        let graph = DependencyGraph::new();
        let target = TargetId::new();
        let other = TargetId::new();

        graph.add(target, TrackKey::Value, 1u64);
        graph.add(target, TrackKey::Size, 2u64);
        graph.add(other, TrackKey::Value, 1u64);

        assert!(graph.remove_target(target));
        assert!(!graph.remove_target(target));
        assert_eq!(graph.target_count(), 1);
        assert_eq!(graph.dependent_count(other, &TrackKey::Value), 1);
    }
}

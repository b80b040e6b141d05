//! Tracked Targets
//!
//! Identifiers for the objects and keys that dependencies are recorded
//! against.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque identity of a tracked object.
///
/// Refs, computed values, reactive objects and reactive maps each allocate
/// one of these when they are created. The dependency graph keys on this
/// identity, never on the value the object holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// The key under which dependents of a target are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// The single slot of a ref or computed value.
    Value,

    /// The entry count of a keyed container.
    Size,

    /// A named property of a reactive object.
    Field(Arc<str>),

    /// A map entry, identified by the slot the map assigned to its key.
    Entry(u64),
}

impl TrackKey {
    /// Build a field key from a property name.
    pub fn field(name: impl Into<Arc<str>>) -> Self {
        TrackKey::Field(name.into())
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Value => f.write_str("value"),
            TrackKey::Size => f.write_str("size"),
            TrackKey::Field(name) => write!(f, "field:{name}"),
            TrackKey::Entry(slot) => write!(f, "entry:{slot}"),
        }
    }
}

/// A single (target, key) pair an effect depends on.
pub type Dependency = (TargetId, TrackKey);

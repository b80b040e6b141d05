//! Dependency Graph
//!
//! This module stores which computations depend on which tracked values.
//!
//! # Overview
//!
//! The graph is a two-level association:
//!
//! - A tracked object (ref, computed value, reactive object, reactive map) is
//!   identified by a [`TargetId`]
//! - Within a target, a [`TrackKey`] names the slot that was read (`value`,
//!   `size`, a field name, or a map entry)
//! - Each (target, key) pair maps to the set of subscribers that read it
//!
//! The graph has no behavior of its own. The reactive runtime writes to it
//! when a value is read inside a running effect, and reads from it when a
//! value is written.
//!
//! # Design Decisions
//!
//! 1. Targets are keyed by an incrementing identifier rather than by
//!    address. The component that owns a target removes its entries when it
//!    is dropped.
//!
//! 2. The store is generic over the subscriber identity so it does not need
//!    to know what an effect is.

mod store;
mod target;

pub use store::DependencyGraph;
pub use target::{Dependency, TargetId, TrackKey};

//! Reactive Primitives
//!
//! This module implements the reactive system: refs, computed values,
//! effects, watchers and reactive containers.
//!
//! # Concepts
//!
//! ## Refs
//!
//! A Ref is a container for a single mutable value. When a ref is read
//! within a running effect, the ref registers that effect as a dependent.
//! When the ref's value changes, all dependents are notified.
//!
//! ## Computed Values
//!
//! A Computed is a derived value that caches its result. It is marked dirty
//! when one of its dependencies changes and re-evaluates on the next read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change, or hands the re-run to its scheduler if it has one.
//!
//! ## Watchers
//!
//! A watcher compares the value of a source before and after each change
//! and calls back with both.
//!
//! ## Reactive Containers
//!
//! [`ReactiveObject`] tracks each field separately, and [`ReactiveMap`]
//! tracks each key plus the entry count.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local stack of running effects to
//! detect dependencies automatically. When a ref is read, we check the top
//! of the stack and, if an effect is running, record the dependency in the
//! global graph.

mod computed;
mod context;
mod effect;
mod map;
mod object;
mod reference;
mod runtime;
mod subscriber;
mod watch;

pub use computed::Computed;
pub use context::{Dependencies, ReactiveContext};
pub use effect::{Effect, EffectOptions, Scheduler};
pub use map::ReactiveMap;
pub use object::ReactiveObject;
pub use reference::Ref;
pub use runtime::{untrack, Reactive, ReactiveHandle, Runtime, TargetHandle, Tracked};
pub use subscriber::SubscriberId;
pub use watch::{
    from_fn, watch, Cleanup, Getter, IntoCleanup, WatchHandle, WatchOptions, WatchSource,
};

//! Ripple Core
//!
//! This crate provides a fine-grained reactivity engine. It implements:
//!
//! - Reactive primitives (refs, computed values, effects)
//! - Watchers with old/new value comparison and cleanup
//! - Reactive objects and maps with per-key tracking
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: The dependency graph from (target, key) to subscribers
//! - `reactive`: Reactive primitives and the tracking runtime
//! - `error`: Errors for rejected writes
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::reactive::{Computed, Effect, Ref};
//!
//! // Create a ref
//! let count = Ref::new(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Computed::new(move || c.get() * 2);
//!
//! // Create an effect
//! let (c, d) = (count.clone(), doubled.clone());
//! let _effect = Effect::new(move || {
//!     println!("Count: {}, Doubled: {}", c.get(), d.get());
//! });
//!
//! // Update the ref
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactiveError, Result};
pub use reactive::{
    untrack, watch, Computed, Effect, EffectOptions, ReactiveMap, ReactiveObject, Ref,
    WatchHandle, WatchOptions,
};

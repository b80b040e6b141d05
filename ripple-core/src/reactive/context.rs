//! Reactive Context
//!
//! The reactive context tracks which effect is currently running.
//! This enables automatic dependency tracking: when a reactive value is
//! read, the runtime registers the current effect as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing effect.
//! When an effect runs, we push its subscriber onto the stack. When it
//! completes, we pop it.
//!
//! This design supports nested effects (e.g., an effect that reads a
//! computed value, which recomputes inside its own effect). Reads are
//! attributed to the innermost frame, and the outer frame becomes current
//! again when the inner one exits.
//!
//! A frame may also be *untracked*: reads made while it is on top are not
//! recorded against anything. Watch callbacks run in such a frame.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::SubscriberId;
use crate::graph::Dependency;

/// Dependencies collected during one run of an effect.
pub type Dependencies = SmallVec<[Dependency; 4]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The running effect, or `None` for an untracked frame.
    subscriber_id: Option<SubscriberId>,
    /// Dependencies newly recorded during this frame.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    exited: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any reactive value that is read will
    /// register the subscriber as a dependent.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a frame in which reads are not tracked.
    pub fn enter_untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: Dependencies::new(),
            });
        });

        Self {
            subscriber_id,
            exited: false,
        }
    }

    /// Exit the context, returning the dependencies recorded in it.
    pub fn exit(mut self) -> Dependencies {
        self.exited = true;
        self.pop().map(|entry| entry.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.subscriber_id, self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id, entry.subscriber_id
            );
        }

        popped
    }

    /// Check if a tracking frame is on top of the stack.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the subscriber that reads are currently attributed to, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.subscriber_id)
        })
    }

    /// Check if the given subscriber is anywhere on the stack.
    ///
    /// A subscriber that is already running is not re-entered by a write
    /// it performs on its own dependencies.
    pub fn is_running(subscriber_id: SubscriberId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.subscriber_id == Some(subscriber_id))
        })
    }

    /// Record a dependency in the current frame.
    pub fn track_dependency(dependency: Dependency) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber_id.is_some() {
                    entry.dependencies.push(dependency);
                }
            }
        });
    }

    /// Get the dependencies collected in the current frame.
    pub fn get_dependencies() -> Dependencies {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.clone())
                .unwrap_or_default()
        })
    }

    /// Depth of the context stack on this thread.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.exited {
            self.pop();
        }
    }
}

//! Watchers
//!
//! A watcher observes one or more reactive sources and calls back when
//! their combined value changes.
//!
//! # How Watchers Work
//!
//! 1. The source is turned into a single getter ([`WatchSource::read`]).
//!
//! 2. A lazy effect runs the getter, so every read it performs is tracked.
//!    The effect's scheduler is the watcher's *job*.
//!
//! 3. When a dependency changes, the job re-runs the effect to get the new
//!    value and compares it with the last observed one. Only a real change
//!    invokes the callback with `(new, old)`.
//!
//! 4. With `immediate`, the job runs once at creation and the callback
//!    sees `old == None`. Otherwise the effect runs once to capture the
//!    initial value and the callback waits for the first change.
//!
//! A callback may return a [`Cleanup`]. It runs before the next callback
//! invocation and when the watcher stops.
//!
//! # Sources
//!
//! Anything implementing [`WatchSource`]: a [`Ref`], a [`Computed`], a
//! getter wrapped with [`from_fn`], a `Vec` of sources, or a tuple of up to
//! four sources. Sequence sources yield owned snapshots, so the old value
//! handed to a callback never changes behind its back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::computed::Computed;
use super::effect::{Effect, EffectOptions};
use super::reference::Ref;
use super::runtime::untrack;

/// Something a watcher can observe.
pub trait WatchSource: Send + Sync + 'static {
    /// The observed value. `PartialEq` decides whether it changed.
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Read the current value, tracking every reactive read.
    fn read(&self) -> Self::Value;
}

impl<T> WatchSource for Ref<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        self.get()
    }
}

impl<T> WatchSource for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        self.get()
    }
}

/// A getter function used as a watch source.
pub struct Getter<F>(F);

/// Wrap a getter function as a watch source.
pub fn from_fn<F, T>(getter: F) -> Getter<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Getter(getter)
}

impl<F, T> WatchSource for Getter<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        (self.0)()
    }
}

impl<S> WatchSource for Vec<S>
where
    S: WatchSource,
{
    type Value = Vec<S::Value>;

    fn read(&self) -> Self::Value {
        self.iter().map(|source| source.read()).collect()
    }
}

impl<T> WatchSource for Box<dyn WatchSource<Value = T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        (**self).read()
    }
}

macro_rules! impl_tuple_source {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name),+> WatchSource for ($($name,)+)
        where
            $($name: WatchSource,)+
        {
            type Value = ($($name::Value,)+);

            fn read(&self) -> Self::Value {
                ($(self.$idx.read(),)+)
            }
        }
    };
}

impl_tuple_source!(A: 0, B: 1);
impl_tuple_source!(A: 0, B: 1, C: 2);
impl_tuple_source!(A: 0, B: 1, C: 2, D: 3);

/// Work to undo whatever a watch callback set up.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    /// Wrap a cleanup function.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values a watch callback may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// Watcher configuration.
///
/// Deserializable so hosts can keep watcher settings in their own config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Run the callback once at creation, with no old value.
    pub immediate: bool,

    /// Stop after the first callback invocation.
    pub once: bool,
}

impl WatchOptions {
    /// Options with `immediate` set.
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            once: false,
        }
    }

    /// Options with `once` set.
    pub fn once() -> Self {
        Self {
            immediate: false,
            once: true,
        }
    }

    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }
}

type Callback<T> = Box<dyn FnMut(&T, Option<&T>) -> Option<Cleanup> + Send>;

struct WatchState<T> {
    /// Last observed value.
    old: Mutex<Option<T>>,

    /// Taken out while the callback runs.
    callback: Mutex<Option<Callback<T>>>,

    cleanup: Mutex<Option<Cleanup>>,
    stopped: AtomicBool,

    /// Set when the job fires while the callback is already running.
    pending: AtomicBool,

    once: bool,
}

/// Puts the callback back in its slot, even if it unwinds.
struct CallbackSlot<'a, T> {
    slot: &'a Mutex<Option<Callback<T>>>,
    callback: Option<Callback<T>>,
}

impl<T> Drop for CallbackSlot<'_, T> {
    fn drop(&mut self) {
        *self.slot.lock() = self.callback.take();
    }
}

fn has_changed<T: PartialEq>(new: &T, old: Option<&T>) -> bool {
    old.map_or(true, |old| old != new)
}

impl<T> WatchState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Capture the initial value without invoking the callback.
    fn prime(&self, effect: &Effect<T>) {
        let initial = effect.run();
        *self.old.lock() = Some(initial);
    }

    fn job(&self, effect: &Effect<T>) {
        if self.is_stopped() {
            return;
        }

        let Some(callback) = self.callback.lock().take() else {
            // The callback is running further up the stack and wrote to its
            // own source; it re-checks once it returns.
            self.pending.store(true, Ordering::Release);
            debug!(effect = %effect.id(), "coalesced re-entrant watch notification");
            return;
        };
        let mut slot = CallbackSlot {
            slot: &self.callback,
            callback: Some(callback),
        };

        loop {
            let new_value = effect.run();
            let old_value = self.old.lock().replace(new_value.clone());

            if has_changed(&new_value, old_value.as_ref()) {
                let previous = self.cleanup.lock().take();
                let cleanup = untrack(|| {
                    if let Some(previous) = previous {
                        previous.run();
                    }
                    slot.callback
                        .as_mut()
                        .and_then(|callback| callback(&new_value, old_value.as_ref()))
                });
                *self.cleanup.lock() = cleanup;

                if self.once {
                    self.stopped.store(true, Ordering::Release);
                    effect.stop();
                }
            }

            if self.is_stopped() || !self.pending.swap(false, Ordering::AcqRel) {
                break;
            }
        }
    }

    fn stop(&self, effect: &Effect<T>) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!(effect = %effect.id(), "stopped watcher");
        }
        effect.stop();

        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            untrack(|| cleanup.run());
        }
    }
}

trait Stoppable: Send + Sync {
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

struct Watcher<T> {
    effect: Effect<T>,
    state: Arc<WatchState<T>>,
}

impl<T> Stoppable for Watcher<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn stop(&self) {
        self.state.stop(&self.effect);
    }

    fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }
}

/// Handle to a running watcher.
///
/// [`WatchHandle::stop`] is the stop function: it ends the watch and runs
/// the last cleanup. Dropping the handle stops the watcher too.
#[must_use = "the watcher stops when its handle is dropped"]
pub struct WatchHandle {
    watcher: Box<dyn Stoppable>,
}

impl WatchHandle {
    /// Stop watching. Calling this more than once is a no-op.
    pub fn stop(&self) {
        self.watcher.stop();
    }

    /// Check if the watcher has stopped, by request or after a `once` fire.
    pub fn is_stopped(&self) -> bool {
        self.watcher.is_stopped()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watcher.stop();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Watch `source` and call `callback(new, old)` whenever its value changes.
///
/// # Example
///
/// ```rust,ignore
/// let loaded = Ref::new(false);
///
/// let handle = watch(loaded.clone(), |now, _before| {
///     println!("loaded: {now}");
/// }, WatchOptions::default());
///
/// loaded.set(true);  // Prints: "loaded: true"
/// handle.stop();
/// ```
pub fn watch<S, F, C>(source: S, mut callback: F, options: WatchOptions) -> WatchHandle
where
    S: WatchSource,
    F: FnMut(&S::Value, Option<&S::Value>) -> C + Send + 'static,
    C: IntoCleanup,
{
    let callback: Callback<S::Value> =
        Box::new(move |new: &S::Value, old: Option<&S::Value>| callback(new, old).into_cleanup());

    let state = Arc::new(WatchState {
        old: Mutex::new(None),
        callback: Mutex::new(Some(callback)),
        cleanup: Mutex::new(None),
        stopped: AtomicBool::new(false),
        pending: AtomicBool::new(false),
        once: options.once,
    });

    let job_state = Arc::clone(&state);
    let effect = Effect::with_options(
        move || source.read(),
        EffectOptions::lazy().with_scheduler(move |effect: &Effect<S::Value>| job_state.job(effect)),
    );

    if options.immediate {
        state.job(&effect);
    } else {
        state.prime(&effect);
    }

    WatchHandle {
        watcher: Box::new(Watcher { effect, state }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize};

    #[test]
    fn deferred_watch_waits_for_change() {
        let count = Ref::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let _handle = watch(
            count.clone(),
            move |_: &i32, _| {
                c.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        count.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_receives_new_and_old() {
        let count = Ref::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();

        let _handle = watch(
            count.clone(),
            move |new: &i32, old: Option<&i32>| s.lock().push((*new, old.copied())),
            WatchOptions::immediate(),
        );

        count.set(5);
        assert_eq!(*seen.lock(), vec![(1, None), (5, Some(1))]);
    }

    #[test]
    fn getter_source_only_fires_on_derived_change() {
        let count = Ref::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let (src, c) = (count.clone(), calls.clone());

        let _handle = watch(
            from_fn(move || src.get() % 2 == 0),
            move |_: &bool, _| {
                c.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        count.set(3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        count.set(4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tuple_source_mixes_types() {
        let name = Ref::new("cube".to_string());
        let visible = Ref::new(true);
        let last = Arc::new(Mutex::new(None));
        let l = last.clone();

        let _handle = watch(
            (name.clone(), visible.clone()),
            move |new: &(String, bool), _| *l.lock() = Some(new.clone()),
            WatchOptions::default(),
        );

        visible.set(false);
        assert_eq!(*last.lock(), Some(("cube".to_string(), false)));
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let count = Ref::new(0);
        let cleanups = Arc::new(AtomicI32::new(0));
        let c = cleanups.clone();

        let handle = watch(
            count.clone(),
            move |_: &i32, _| {
                let c = c.clone();
                Cleanup::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            },
            WatchOptions::default(),
        );

        count.set(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        count.set(2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        handle.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);

        handle.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_handle_stops_watcher() {
        let count = Ref::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let handle = watch(
            count.clone(),
            move |_: &i32, _| {
                c.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );
        drop(handle);

        count.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_writing_its_source_is_coalesced() {
        let count = Ref::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (src, s) = (count.clone(), seen.clone());

        // Clamp the value to 10 from inside the callback.
        let _handle = watch(
            count.clone(),
            move |new: &i32, _| {
                s.lock().push(*new);
                if *new > 10 {
                    src.set(10);
                }
            },
            WatchOptions::default(),
        );

        count.set(15);
        assert_eq!(*seen.lock(), vec![15, 10]);
        assert_eq!(count.get(), 10);
    }

    #[test]
    fn callback_reads_are_not_tracked() {
        let watched = Ref::new(0);
        let other = Ref::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let (o, c) = (other.clone(), calls.clone());

        let _handle = watch(
            watched.clone(),
            move |_: &i32, _| {
                o.get();
                c.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::immediate(),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        other.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: WatchOptions = serde_json::from_str(r#"{"once": true}"#).unwrap();
        assert_eq!(options, WatchOptions::once());

        let options: WatchOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, WatchOptions::default());

        assert_eq!(
            WatchOptions::default().with_immediate(true).with_once(true),
            WatchOptions { immediate: true, once: true }
        );
    }
}

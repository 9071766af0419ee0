//! `Removable` — the gc-timer base named in spec.md §2 / §9.
//!
//! Re-expressed as composition rather than inheritance: `GcTimer` is a
//! standalone countdown (grounded on the gaucho-labs sibling's
//! `GarbageCollector`, translated from a `wasm` `set_timeout` handle to a
//! `tokio::task::JoinHandle`), and `LifecycleResource` is the trait spec.md
//! §9 asks for, giving `Query`/`Mutation` a uniform `{scheduleGc, cancelGc,
//! onFocus, onOnline}` surface without a shared base type.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// `gcTime = Infinity` disables the timer entirely (spec.md §3 invariant 5).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GcTime {
    After(Duration),
    Infinite,
}

impl GcTime {
    pub fn from_duration(duration: Option<Duration>) -> Self {
        match duration {
            Some(d) => GcTime::After(d),
            None => GcTime::Infinite,
        }
    }

    fn max(self, other: GcTime) -> GcTime {
        match (self, other) {
            (GcTime::Infinite, _) | (_, GcTime::Infinite) => GcTime::Infinite,
            (GcTime::After(a), GcTime::After(b)) => GcTime::After(a.max(b)),
        }
    }
}

impl Default for GcTime {
    fn default() -> Self {
        GcTime::After(Duration::from_secs(5 * 60))
    }
}

/// A cancellable gc countdown. One per `Query`/`Mutation` cache entry.
pub struct GcTimer {
    gc_time: Mutex<GcTime>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for GcTimer {
    fn default() -> Self {
        Self {
            gc_time: Mutex::new(GcTime::default()),
            handle: Mutex::new(None),
        }
    }
}

impl GcTimer {
    pub fn new(initial: GcTime) -> Self {
        Self {
            gc_time: Mutex::new(initial),
            handle: Mutex::new(None),
        }
    }

    /// Widen the effective gc time to the max of the current value and
    /// `gc_time` — an observer with a longer `gcTime` should win, mirroring
    /// the teacher's `update_gc_time` "keep max gc time" comment.
    pub fn widen(&self, gc_time: GcTime) {
        let mut current = self.gc_time.lock();
        *current = current.max(gc_time);
    }

    pub fn current(&self) -> GcTime {
        *self.gc_time.lock()
    }

    /// Start (or restart) the countdown. Only fires `on_evict` if the timer
    /// is not cancelled first. A no-op under `GcTime::Infinite`.
    pub fn schedule(&self, on_evict: impl FnOnce() + Send + 'static) {
        self.cancel();
        if let GcTime::After(duration) = self.current() {
            let handle = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                on_evict();
            });
            *self.handle.lock() = Some(handle);
        }
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle.lock().is_some()
    }
}

impl Drop for GcTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The capability set spec.md §9 asks for in place of a `Removable` base
/// class: schedule/cancel garbage collection, and react to focus/online
/// transitions. `Query` and `Mutation` both implement this.
pub trait LifecycleResource {
    fn schedule_gc(&self);
    fn cancel_gc(&self);
    fn on_focus(&self);
    fn on_online(&self);
}

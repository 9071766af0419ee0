//! `FocusManager` — tracks the ambient "focused" signal (spec.md §2, §4.3,
//! §9). Modeled as process-wide state behind an injected handle rather than
//! a bare global, per spec.md §9's re-architecture note, so tests can build
//! independent instances instead of sharing one process-wide singleton.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::subscribable::Listeners;

/// A pluggable source of focus-change events, e.g. a window's
/// `visibilitychange` listener in a host environment. Tests use
/// `ManualEventSource`.
pub trait FocusEventSource: Send + Sync {
    /// Install `on_change`, to be called with the new focused state whenever
    /// the environment reports a transition.
    fn listen(&self, on_change: Arc<dyn Fn(bool) + Send + Sync>);
}

/// Tracks whether the process currently considers itself "focused" and
/// broadcasts on transitions (spec.md §2: "broadcasts on transitions").
pub struct FocusManager {
    focused: AtomicBool,
    event_source: RwLock<Option<Box<dyn FocusEventSource>>>,
    listeners: Listeners<bool>,
}

impl Default for FocusManager {
    fn default() -> Self {
        Self {
            focused: AtomicBool::new(true),
            event_source: RwLock::new(None),
            listeners: Listeners::new(),
        }
    }
}

impl FocusManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The single ambient instance shared by all clients in a process
    /// (spec.md §5: "shared-resource policy").
    pub fn ambient() -> Arc<Self> {
        static AMBIENT: OnceLock<Arc<FocusManager>> = OnceLock::new();
        AMBIENT.get_or_init(Self::new).clone()
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    /// Plug in an environment-specific event source (spec.md §5).
    pub fn set_event_listener(self: &Arc<Self>, source: impl FocusEventSource + 'static) {
        *self.event_source.write() = Some(Box::new(source));
        let this = self.clone();
        if let Some(source) = self.event_source.read().as_ref() {
            source.listen(Arc::new(move |focused| this.set_focused(focused)));
        }
    }

    /// Directly set the focused state, e.g. from a test or a manual trigger.
    /// Broadcasts only on an actual transition.
    pub fn set_focused(&self, focused: bool) {
        let previous = self.focused.swap(focused, Ordering::SeqCst);
        if previous != focused {
            self.listeners.notify(&focused);
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&bool) + Send + Sync + 'static) -> crate::subscribable::ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: crate::subscribable::ListenerId) {
        self.listeners.unsubscribe(id);
    }
}

/// An event source a test can drive by hand.
#[derive(Default)]
pub struct ManualEventSource;

impl FocusEventSource for ManualEventSource {
    fn listen(&self, _on_change: Arc<dyn Fn(bool) + Send + Sync>) {
        // Nothing to wire up; the test calls `set_focused` directly.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn broadcasts_only_on_transition() {
        let manager = FocusManager::new();
        let transitions = Arc::new(AtomicUsize::new(0));
        {
            let transitions = transitions.clone();
            manager.subscribe(move |_| {
                transitions.fetch_add(1, Ordering::SeqCst);
            });
        }

        manager.set_focused(true); // already true by default: no transition
        assert_eq!(transitions.load(Ordering::SeqCst), 0);

        manager.set_focused(false);
        assert_eq!(transitions.load(Ordering::SeqCst), 1);

        manager.set_focused(false); // no-op
        assert_eq!(transitions.load(Ordering::SeqCst), 1);

        manager.set_focused(true);
        assert_eq!(transitions.load(Ordering::SeqCst), 2);
    }
}

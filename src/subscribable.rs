//! `Subscribable` — the minimal observable base named in spec.md §2 / §9.
//!
//! The teacher's prototype chain (`Subscribable` → `Removable` → `Query` /
//! `Mutation`) doesn't translate to Rust inheritance; spec.md §9 asks for a
//! trait/interface instead. `Subscribable<E>` is that trait: add/remove a
//! listener, with hooks fired on the first listener arriving and the last
//! one leaving (used by `Query`/`Mutation` to drive gc timers).

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by `Subscribable::subscribe`; dropping it does **not**
/// unsubscribe (matching spec.md's `subscribed` flag being explicit) — call
/// `unsubscribe` with it instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

fn next_listener_id() -> ListenerId {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    ListenerId(COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A generic broadcaster of events of type `E`, with first/last-listener
/// lifecycle hooks. `Query`, `Mutation`, `FocusManager` and `OnlineManager`
/// all compose this rather than inheriting from it.
pub struct Listeners<E> {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn Fn(&E) + Send + Sync>)>>,
    on_first: RwLock<Option<Box<dyn Fn() + Send + Sync>>>,
    on_last: RwLock<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            on_first: RwLock::new(None),
            on_last: RwLock::new(None),
        }
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the hook run when the listener count transitions 0 → 1.
    pub fn on_first_listener(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_first.write() = Some(Box::new(hook));
    }

    /// Install the hook run when the listener count transitions 1 → 0.
    pub fn on_last_listener(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_last.write() = Some(Box::new(hook));
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = next_listener_id();
        let became_first = {
            let mut listeners = self.listeners.write();
            let was_empty = listeners.is_empty();
            listeners.push((id, Arc::new(listener)));
            was_empty
        };
        if became_first {
            if let Some(hook) = self.on_first.read().as_ref() {
                hook();
            }
        }
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        let became_empty = {
            let mut listeners = self.listeners.write();
            listeners.retain(|(listener_id, _)| *listener_id != id);
            listeners.is_empty()
        };
        if became_empty {
            if let Some(hook) = self.on_last.read().as_ref() {
                hook();
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn notify(&self, event: &E) {
        let listeners: Vec<_> = self.listeners.read().iter().map(|(_, f)| f.clone()).collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// As `notify`, but runs through a `NotifyManager` so a caller wrapping
    /// several writes in `NotifyManager::batch` gets one coalesced
    /// notification pass at its exit instead of one per write (spec.md §5).
    pub fn notify_via(&self, manager: &crate::notify_manager::NotifyManager, event: E)
    where
        E: Send + 'static,
    {
        let listeners: Vec<_> = self.listeners.read().iter().map(|(_, f)| f.clone()).collect();
        manager.schedule(move || {
            for listener in &listeners {
                listener(&event);
            }
        });
    }
}

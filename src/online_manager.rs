//! `OnlineManager` — tracks the ambient "online" signal (spec.md §2, §4.1,
//! §9). Mirrors `FocusManager`'s shape; kept as a separate type because the
//! two signals have different default values and different downstream
//! consumers (networkMode vs. `refetchOnWindowFocus`).

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::subscribable::{ListenerId, Listeners};

pub trait OnlineEventSource: Send + Sync {
    fn listen(&self, on_change: Arc<dyn Fn(bool) + Send + Sync>);
}

pub struct OnlineManager {
    online: AtomicBool,
    event_source: RwLock<Option<Box<dyn OnlineEventSource>>>,
    listeners: Listeners<bool>,
}

impl Default for OnlineManager {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            event_source: RwLock::new(None),
            listeners: Listeners::new(),
        }
    }
}

impl OnlineManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ambient() -> Arc<Self> {
        static AMBIENT: OnceLock<Arc<OnlineManager>> = OnceLock::new();
        AMBIENT.get_or_init(Self::new).clone()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_event_listener(self: &Arc<Self>, source: impl OnlineEventSource + 'static) {
        *self.event_source.write() = Some(Box::new(source));
        let this = self.clone();
        if let Some(source) = self.event_source.read().as_ref() {
            source.listen(Arc::new(move |online| this.set_online(online)));
        }
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            self.listeners.notify(&online);
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&bool) + Send + Sync + 'static) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }
}

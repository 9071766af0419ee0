//! `NotifyManager` — batches observer notifications within a `batch`
//! region (spec.md §2, §5). The real library defers to a framework's
//! microtask scheduler (`notifyManager`'s batching is explicitly an
//! injected scheduler per spec.md §1's out-of-scope list); this crate
//! models the same contract with an explicit reentrancy counter and a
//! pending queue flushed when the outermost `batch` call returns.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

type Job = Box<dyn FnOnce() + Send>;

pub struct NotifyManager {
    depth: AtomicUsize,
    pending: Mutex<Vec<Job>>,
}

impl Default for NotifyManager {
    fn default() -> Self {
        Self {
            depth: AtomicUsize::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl NotifyManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ambient() -> Arc<Self> {
        static AMBIENT: OnceLock<Arc<NotifyManager>> = OnceLock::new();
        AMBIENT.get_or_init(Self::new).clone()
    }

    /// Run `f`; any `schedule`d job raised while `f` runs (directly, or
    /// transitively through a nested `batch` call) is coalesced and run
    /// once, after `f` returns, in the order it was scheduled.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let result = f();
        let outer = self.depth.fetch_sub(1, Ordering::SeqCst) == 1;
        if outer {
            self.flush();
        }
        result
    }

    /// Run `job` now if no `batch` is active, otherwise defer it.
    pub fn schedule(&self, job: impl FnOnce() + Send + 'static) {
        if self.depth.load(Ordering::SeqCst) > 0 {
            self.pending.lock().push(Box::new(job));
        } else {
            job();
        }
    }

    fn flush(&self) {
        loop {
            let batch: Vec<Job> = std::mem::take(&mut *self.pending.lock());
            if batch.is_empty() {
                break;
            }
            for job in batch {
                job();
            }
        }
    }
}

//! Query option types (spec.md §4.2, §4.4).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::removable::GcTime;
use crate::retryer::{NetworkMode, RetryDelay, RetryPolicy};

/// `staleTime: ms | 'static' | fn` (spec.md §3 Query entry).
#[derive(Clone)]
pub enum StaleTime {
    Millis(Duration),
    /// Data is never considered stale once fetched.
    Static,
    Dynamic(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl Default for StaleTime {
    fn default() -> Self {
        StaleTime::Millis(Duration::ZERO)
    }
}

impl StaleTime {
    pub(crate) fn duration(&self) -> Option<Duration> {
        match self {
            StaleTime::Millis(d) => Some(*d),
            StaleTime::Static => None,
            StaleTime::Dynamic(f) => Some(f()),
        }
    }
}

/// `refetchOnWindowFocus` / `refetchOnReconnect`: `true | false | 'always'`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefetchTrigger {
    Never,
    IfStale,
    Always,
}

impl Default for RefetchTrigger {
    fn default() -> Self {
        RefetchTrigger::IfStale
    }
}

/// `refetchInterval: ms | fn`.
#[derive(Clone)]
pub enum RefetchInterval {
    Millis(Duration),
    Dynamic(Arc<dyn Fn() -> Option<Duration> + Send + Sync>),
}

/// Per-query options (spec.md §3 Query entry, §4.2).
#[derive(Clone)]
pub struct QueryOptions<T> {
    pub stale_time: StaleTime,
    pub gc_time: GcTime,
    pub retry: RetryPolicy,
    pub retry_delay: RetryDelay,
    pub network_mode: NetworkMode,
    pub refetch_interval: Option<RefetchInterval>,
    pub refetch_on_window_focus: RefetchTrigger,
    pub refetch_on_reconnect: RefetchTrigger,
    pub initial_data: Option<Arc<dyn Fn() -> Option<T> + Send + Sync>>,
    /// `initialDataUpdatedAt` (spec.md §3/§4.2): the timestamp `initialData`
    /// was produced at, if known. Seeded data gets `dataUpdatedAt` from this
    /// (defaulting to the epoch, i.e. immediately stale) rather than the
    /// moment the query was constructed.
    pub initial_data_updated_at: Option<DateTime<Utc>>,
    /// Whether to keep the previous `data`/subtree identity when a refetch's
    /// result is `PartialEq`-equal to it (spec.md §9 REDESIGN FLAG:
    /// structural sharing re-expressed as value equality, since Rust has no
    /// JS-style object identity to preserve).
    pub structural_sharing: bool,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            stale_time: StaleTime::default(),
            gc_time: GcTime::default(),
            retry: RetryPolicy::default(),
            retry_delay: RetryDelay::default(),
            network_mode: NetworkMode::default(),
            refetch_interval: None,
            refetch_on_window_focus: RefetchTrigger::default(),
            refetch_on_reconnect: RefetchTrigger::default(),
            initial_data: None,
            initial_data_updated_at: None,
            structural_sharing: true,
        }
    }
}

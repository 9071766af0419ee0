//! `Query` — a single cache entry plus its state machine (spec.md §3 Query
//! entry, §4.2). Grounded on the teacher's `CacheEntry`/`QueryMeta`
//! (`src/client/mod.rs`, `src/types/mod.rs`), generalized from a
//! bincode-serialized blob into a typed entry so structural-sharing
//! comparisons and `select()` memoization can use `T: PartialEq` directly,
//! plus an `AnyQuery` trait object so `QueryCache` can hold heterogeneously
//! typed queries in one map (the Rust analogue of the original's
//! `unknown`-typed cache).

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::Shared;
use parking_lot::{Mutex, RwLock};

use crate::error::QueryError;
use crate::key::{QueryHash, QueryKey};
use crate::removable::{GcTimer, LifecycleResource};
use crate::retryer::{AbortSignal, CancelOptions, Retryer, RetryerHooks};
use crate::status::{FetchStatus, QueryStatus};
use crate::subscribable::{ListenerId, Listeners};

use super::options::QueryOptions;

/// A snapshot of a query's data/error/status fields (spec.md §3 Query
/// entry). Cloned out to observers on every change.
#[derive(Clone)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub data_update_count: u32,
    pub data_updated_at: Option<DateTime<Utc>>,
    pub error: Option<QueryError>,
    pub error_update_count: u32,
    pub error_updated_at: Option<DateTime<Utc>>,
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
    pub fetch_failure_count: u32,
    pub fetch_failure_reason: Option<QueryError>,
    pub is_invalidated: bool,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            data_update_count: 0,
            data_updated_at: None,
            error: None,
            error_update_count: 0,
            error_updated_at: None,
            status: QueryStatus::Pending,
            fetch_status: FetchStatus::Idle,
            fetch_failure_count: 0,
            fetch_failure_reason: None,
            is_invalidated: false,
        }
    }
}

/// Object-safe surface `QueryCache` operates on without knowing a query's
/// concrete data type (spec.md §4.3 `find`/`findAll`/`clear`/`onFocus`).
pub trait AnyQuery: Send + Sync {
    fn query_hash(&self) -> &QueryHash;
    fn query_key(&self) -> &QueryKey;
    fn is_stale(&self) -> bool;
    fn is_fetching(&self) -> bool;
    fn fetch_status(&self) -> FetchStatus;
    fn is_active(&self) -> bool;
    fn observer_count(&self) -> usize;
    fn invalidate(&self);
    /// Mark invalidated without notifying listeners (spec.md §4.6
    /// `invalidateQueries({refetchType: 'none'})`): the query becomes stale
    /// but no attached `QueryObserver` is nudged into an immediate refetch.
    fn invalidate_quiet(&self);
    fn cancel(&self, options: CancelOptions);
    fn reset_gc(&self);
    /// Broadcast a focus transition to this query (spec.md §5). Refetching
    /// active queries is handled per-observer (`QueryObserver::on_focus`);
    /// this only forwards the signal to anything the query itself tracks.
    fn on_focus(&self);
    /// Broadcast an online transition: resumes this query's paused retryer,
    /// if any (spec.md §4.1 `onOnline`).
    fn on_online(&self);
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) type QueryFn<T> = Arc<dyn Fn(AbortSignal) -> Pin<Box<dyn Future<Output = Result<T, QueryError>> + Send>> + Send + Sync>;

/// A keyed cache entry and its state machine.
pub struct Query<T: Clone + Send + Sync + PartialEq + 'static> {
    hash: QueryHash,
    key: QueryKey,
    state: RwLock<QueryState<T>>,
    options: RwLock<QueryOptions<T>>,
    retryer: Mutex<Option<Retryer<T>>>,
    gc: GcTimer,
    listeners: Listeners<QueryState<T>>,
    can_run: Arc<dyn Fn() -> bool + Send + Sync>,
    on_evicted: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl<T: Clone + Send + Sync + PartialEq + 'static> Query<T> {
    pub fn new(
        hash: QueryHash,
        key: QueryKey,
        options: QueryOptions<T>,
        can_run: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Arc<Self> {
        let mut state = QueryState::default();
        if let Some(initial) = options.initial_data.as_ref().and_then(|f| f()) {
            state.data = Some(initial);
            state.data_update_count = 1;
            state.data_updated_at =
                Some(options.initial_data_updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH));
            state.status = QueryStatus::Success;
        }
        let gc = GcTimer::new(options.gc_time);
        Arc::new(Self {
            hash,
            key,
            state: RwLock::new(state),
            options: RwLock::new(options),
            retryer: Mutex::new(None),
            gc,
            listeners: Listeners::new(),
            can_run,
            on_evicted: Mutex::new(None),
        })
    }

    pub fn set_on_evicted(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_evicted.lock() = Some(Arc::new(f));
    }

    pub fn state(&self) -> QueryState<T> {
        self.state.read().clone()
    }

    pub fn set_options(&self, options: QueryOptions<T>) {
        self.gc.widen(options.gc_time);
        *self.options.write() = options;
    }

    pub fn stale_time(&self) -> Option<std::time::Duration> {
        self.options.read().stale_time.duration()
    }

    pub fn refetch_interval(&self) -> Option<super::options::RefetchInterval> {
        self.options.read().refetch_interval.clone()
    }

    pub fn refetch_on_window_focus(&self) -> super::options::RefetchTrigger {
        self.options.read().refetch_on_window_focus
    }

    pub fn refetch_on_reconnect(&self) -> super::options::RefetchTrigger {
        self.options.read().refetch_on_reconnect
    }

    /// spec.md §3 invariant: data is considered stale when
    /// `now - dataUpdatedAt >= staleTime`, or immediately if `isInvalidated`.
    pub fn is_stale_inner(state: &QueryState<T>, stale_time: &super::options::StaleTime) -> bool {
        if state.is_invalidated {
            return true;
        }
        match stale_time {
            super::options::StaleTime::Static => state.data.is_none(),
            super::options::StaleTime::Millis(d) => match state.data_updated_at {
                None => true,
                Some(updated_at) => {
                    Utc::now().signed_duration_since(updated_at)
                        >= chrono::Duration::from_std(*d).unwrap_or(chrono::Duration::zero())
                }
            },
            super::options::StaleTime::Dynamic(f) => match state.data_updated_at {
                None => true,
                Some(updated_at) => {
                    Utc::now().signed_duration_since(updated_at)
                        >= chrono::Duration::from_std(f()).unwrap_or(chrono::Duration::zero())
                }
            },
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&QueryState<T>) + Send + Sync + 'static) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// spec.md §4.2: "removeObserver (schedules gc on last removal)." If
    /// that was the last observer and the in-flight fetch's query function
    /// has consumed its `AbortSignal`, the orphaned fetch is cancelled
    /// rather than left to run to completion (spec.md §4.2/§5).
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
        if !self.is_active() {
            if let Some(retryer) = self.retryer.lock().as_ref() {
                if retryer.is_transport_cancelable() {
                    retryer.cancel(CancelOptions::default());
                }
            }
        }
        self.reset_gc();
    }

    /// Abort the in-flight fetch, if any (spec.md §4.2 `cancel`).
    pub fn cancel(&self, options: CancelOptions) {
        if let Some(retryer) = self.retryer.lock().as_ref() {
            retryer.cancel(options);
        }
    }

    fn notify(&self) {
        let snapshot = self.state.read().clone();
        self.listeners.notify_via(&crate::notify_manager::NotifyManager::ambient(), snapshot);
    }

    /// Set data directly (spec.md §4.6 `setQueryData`). Applies the same
    /// structural-sharing comparison a fetch success does.
    pub fn set_data(&self, data: T) {
        self.apply_success(data);
        self.notify();
        self.reset_gc();
    }

    pub fn invalidate(&self) {
        self.state.write().is_invalidated = true;
        self.notify();
    }

    /// See `AnyQuery::invalidate_quiet`.
    pub fn invalidate_quiet(&self) {
        self.state.write().is_invalidated = true;
    }

    /// spec.md §4.6 `resetQueries`: restore the query to its pre-fetch
    /// state (re-seeding `initialData` if configured), then mark it
    /// invalidated so any active `QueryObserver` refetches it the same way
    /// an `invalidateQueries` call would (see
    /// `QueryObserver::on_query_state_change`).
    pub fn reset(&self) {
        let options = self.options.read();
        let initial = options.initial_data.as_ref().and_then(|f| f());
        let initial_data_updated_at = options.initial_data_updated_at;
        drop(options);
        {
            let mut state = self.state.write();
            *state = QueryState::default();
            if let Some(initial) = initial {
                state.data = Some(initial);
                state.data_update_count = 1;
                state.data_updated_at =
                    Some(initial_data_updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH));
                state.status = QueryStatus::Success;
            }
            state.is_invalidated = true;
        }
        self.notify();
        self.reset_gc();
    }

    /// spec.md §4.2: "exactly one active fetch per Query at a time;
    /// concurrent requests share the same promise." Returns the (possibly
    /// pre-existing) shared promise.
    pub fn fetch(self: &Arc<Self>, query_fn: QueryFn<T>) -> Shared<Pin<Box<dyn Future<Output = Result<T, QueryError>> + Send>>> {
        {
            let existing = self.retryer.lock();
            if let Some(retryer) = existing.as_ref() {
                if !retryer.is_resolved() {
                    return retryer.promise();
                }
            }
        }

        // spec.md §7 "CancellationRevert": captured before this fetch
        // touches any state, so a `{revert:true}` cancel can restore it
        // verbatim instead of running the cancellation through `apply_error`.
        let pre_fetch_snapshot = self.state.read().clone();

        self.cancel_gc();
        {
            let mut state = self.state.write();
            state.fetch_status = FetchStatus::Fetching;
            if state.data.is_none() {
                state.status = QueryStatus::Pending;
            }
        }
        self.notify();

        let options = self.options.read().clone_for_retry();
        let this = self.clone();
        let this_fail = self.clone();
        let this_pause = self.clone();
        let this_continue = self.clone();
        let this_success = self.clone();
        let this_error = self.clone();

        let hooks = RetryerHooks {
            on_fail: Some(Arc::new(move |count, error: &QueryError| {
                let mut state = this_fail.state.write();
                state.fetch_failure_count = count;
                state.fetch_failure_reason = Some(error.clone());
                drop(state);
                this_fail.notify();
            })),
            on_pause: Some(Arc::new(move || {
                this_pause.state.write().fetch_status = FetchStatus::Paused;
                this_pause.notify();
            })),
            on_continue: Some(Arc::new(move || {
                this_continue.state.write().fetch_status = FetchStatus::Fetching;
                this_continue.notify();
            })),
            on_success: Some(Arc::new(move |value: &T| {
                this_success.apply_success(value.clone());
                this_success.notify();
                this_success.reset_gc();
            })),
            on_error: Some(Arc::new(move |error: &QueryError| {
                // spec.md §7: a reverted cancellation "is not an error
                // surfaced to the user; restores prior state" — it must not
                // flip a `Success` query to `Error`.
                if matches!(error, QueryError::CancelledRevert) {
                    this_error.restore_snapshot(pre_fetch_snapshot.clone());
                } else {
                    this_error.apply_error(error.clone());
                }
                this_error.notify();
                this_error.reset_gc();
            })),
        };

        let retryer = Retryer::start(
            move |abort| query_fn(abort),
            options.retry,
            options.retry_delay,
            options.network_mode,
            this.can_run.clone(),
            hooks,
        );
        let promise = retryer.promise();
        *self.retryer.lock() = Some(retryer);
        // `Shared` futures are lazy: nothing runs until something polls
        // them. Callers that only want to *trigger* a fetch (focus/online/
        // interval/mount-driven refetches in `QueryObserver`) drop the
        // returned promise without awaiting it, so drive it here
        // unconditionally; awaiting callers still get the same promise.
        tokio::spawn({
            let promise = promise.clone();
            async move {
                let _ = promise.await;
            }
        });
        promise
    }

    fn apply_success(&self, value: T) {
        let mut state = self.state.write();
        let structurally_shared = self.options.read().structural_sharing
            && state.data.as_ref().is_some_and(|old| old == &value);
        if !structurally_shared {
            state.data = Some(value);
        }
        state.data_update_count += 1;
        state.data_updated_at = Some(Utc::now());
        state.status = QueryStatus::Success;
        state.error = None;
        state.fetch_status = FetchStatus::Idle;
        state.fetch_failure_count = 0;
        state.fetch_failure_reason = None;
        state.is_invalidated = false;
    }

    fn apply_error(&self, error: QueryError) {
        let mut state = self.state.write();
        state.status = QueryStatus::Error;
        state.error = Some(error);
        state.error_update_count += 1;
        state.error_updated_at = Some(Utc::now());
        state.fetch_status = FetchStatus::Idle;
    }

    /// spec.md §7 "CancellationRevert": roll back to the snapshot captured
    /// before the reverted fetch started, verbatim.
    fn restore_snapshot(&self, snapshot: QueryState<T>) {
        *self.state.write() = snapshot;
    }
}

impl<T: Clone + Send + Sync + PartialEq + 'static> AnyQuery for Query<T> {
    fn query_hash(&self) -> &QueryHash {
        &self.hash
    }

    fn query_key(&self) -> &QueryKey {
        &self.key
    }

    fn is_stale(&self) -> bool {
        Self::is_stale_inner(&self.state.read(), &self.options.read().stale_time)
    }

    fn is_fetching(&self) -> bool {
        self.state.read().fetch_status == FetchStatus::Fetching
    }

    fn fetch_status(&self) -> FetchStatus {
        self.state.read().fetch_status
    }

    fn is_active(&self) -> bool {
        self.listeners.listener_count() > 0
    }

    fn observer_count(&self) -> usize {
        self.listeners.listener_count()
    }

    fn invalidate(&self) {
        Query::invalidate(self);
    }

    fn invalidate_quiet(&self) {
        Query::invalidate_quiet(self);
    }

    fn cancel(&self, options: CancelOptions) {
        Query::cancel(self, options);
    }

    fn reset_gc(&self) {
        Query::reset_gc(self);
    }

    fn on_focus(&self) {
        LifecycleResource::on_focus(self);
    }

    fn on_online(&self) {
        LifecycleResource::on_online(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: Clone + Send + Sync + PartialEq + 'static> LifecycleResource for Query<T> {
    fn schedule_gc(&self) {
        self.reset_gc();
    }

    fn cancel_gc(&self) {
        self.gc.cancel();
    }

    fn on_focus(&self) {
        // Handled by `QueryCache::on_focus`, which has the fetch closure.
    }

    fn on_online(&self) {
        if let Some(retryer) = self.retryer.lock().as_ref() {
            retryer.continue_retry();
        }
    }
}

impl<T: Clone + Send + Sync + PartialEq + 'static> Query<T> {
    /// Reschedule garbage collection; only meaningful once there are no
    /// active observers (`Query::is_active` is false).
    pub fn reset_gc(&self) {
        if self.is_active() {
            self.gc.cancel();
            return;
        }
        let on_evicted = self.on_evicted.lock().clone();
        if let Some(on_evicted) = on_evicted {
            self.gc.schedule(move || on_evicted());
        }
    }
}

trait CloneForRetry<T> {
    fn clone_for_retry(&self) -> RetryParams<T>;
}

pub(super) struct RetryParams<T> {
    pub retry: crate::retryer::RetryPolicy,
    pub retry_delay: crate::retryer::RetryDelay,
    pub network_mode: crate::retryer::NetworkMode,
    _marker: std::marker::PhantomData<T>,
}

impl<T> CloneForRetry<T> for QueryOptions<T> {
    fn clone_for_retry(&self) -> RetryParams<T> {
        RetryParams {
            retry: self.retry.clone(),
            retry_delay: self.retry_delay.clone(),
            network_mode: self.network_mode,
            _marker: std::marker::PhantomData,
        }
    }
}

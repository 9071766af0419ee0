//! `QueryClient` (spec.md §4.6): the façade composing `QueryCache` and
//! `MutationCache`, key-matched defaults resolution, and cache-wide sweeps
//! (invalidate/refetch/reset/cancel). Grounded on the teacher's
//! `QueryClient` (`src/client/mod.rs`), generalized from its single
//! bincode-serialized `HashMap` into a thin composition over the two typed
//! caches the rest of this crate builds, plus `mount`/`unmount`
//! reference-counted subscriptions to the ambient focus/online signals.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{default_logger, LogRecord, Logger, QueryError};
use crate::focus_manager::FocusManager;
use crate::key::{default_hash_fn, QueryKey};
use crate::mutation::{MutationCache, MutationCacheConfig, MutationFn};
use crate::online_manager::OnlineManager;
use crate::query::cache::{QueryCache, QueryFilter};
use crate::query::entity::{AnyQuery, Query, QueryFn, QueryState};
use crate::query::options::QueryOptions;
use crate::retryer::CancelOptions;
use crate::subscribable::ListenerId;

/// `refetchType` for `invalidateQueries` (spec.md §4.6): which matched
/// queries are nudged into an immediate refetch. Every matched query is
/// marked invalidated regardless of this choice — it only gates whether an
/// attached, enabled `QueryObserver` is allowed to react to that by
/// refetching right away (see `QueryObserver::on_query_state_change`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RefetchType {
    #[default]
    Active,
    Inactive,
    All,
    None,
}

pub mod dehydrate;

pub use dehydrate::{dehydrate_mutation, DehydratedMutation, DehydratedQuery, DehydratedState};

/// Construction knobs for a `QueryClient` (spec.md §4.6, §7).
pub struct QueryClientConfig {
    pub logger: Arc<dyn Logger>,
    /// Cache-wide mutation callbacks (spec.md §4.5), forwarded verbatim to
    /// the `MutationCache` this client builds.
    pub mutation_cache_config: MutationCacheConfig,
}

impl Default for QueryClientConfig {
    fn default() -> Self {
        Self {
            logger: default_logger(),
            mutation_cache_config: MutationCacheConfig::default(),
        }
    }
}

/// The top-level façade (spec.md §4.6). Cheap to clone (everything it holds
/// is already `Arc`-backed); typically constructed once per application and
/// shared behind a single `Arc<QueryClient>`.
pub struct QueryClient {
    query_cache: Arc<QueryCache>,
    mutation_cache: Arc<MutationCache>,
    query_defaults: RwLock<Vec<(QueryKey, Arc<dyn Any + Send + Sync>)>>,
    mutation_defaults: RwLock<Vec<(String, Arc<dyn Any + Send + Sync>)>>,
    focus: Arc<FocusManager>,
    online: Arc<OnlineManager>,
    logger: Arc<dyn Logger>,
    mount_count: AtomicUsize,
    focus_listener: Mutex<Option<ListenerId>>,
    online_listener: Mutex<Option<ListenerId>>,
}

impl QueryClient {
    pub fn new() -> Arc<Self> {
        Self::with_config(QueryClientConfig::default())
    }

    pub fn with_config(config: QueryClientConfig) -> Arc<Self> {
        let focus = FocusManager::ambient();
        let online = OnlineManager::ambient();
        let can_run: Arc<dyn Fn() -> bool + Send + Sync> = {
            let online = online.clone();
            Arc::new(move || online.is_online())
        };
        Arc::new(Self {
            query_cache: QueryCache::new(default_hash_fn(), can_run.clone()),
            mutation_cache: MutationCache::new(can_run, config.mutation_cache_config),
            query_defaults: RwLock::new(Vec::new()),
            mutation_defaults: RwLock::new(Vec::new()),
            focus,
            online,
            logger: config.logger,
            mount_count: AtomicUsize::new(0),
            focus_listener: Mutex::new(None),
            online_listener: Mutex::new(None),
        })
    }

    pub fn query_cache(&self) -> &Arc<QueryCache> {
        &self.query_cache
    }

    pub fn mutation_cache(&self) -> &Arc<MutationCache> {
        &self.mutation_cache
    }

    pub(crate) fn log(&self, scope: &str, error: &QueryError) {
        self.logger.log(LogRecord {
            severity: error.severity(),
            scope,
            error,
        });
    }

    // -- defaults resolution (spec.md §3: "key-matched defaults; longest
    // matching prefix wins; ties resolved by registration order") ---------

    /// `setQueryDefaults`: register `options` for every query whose key
    /// starts with `prefix`. Re-registering the same prefix replaces the
    /// earlier entry outright (last write wins), matching the teacher's map
    /// semantics for its own defaults table.
    pub fn set_query_defaults<T: Clone + Send + Sync + PartialEq + 'static>(
        &self,
        prefix: QueryKey,
        options: QueryOptions<T>,
    ) {
        let mut defaults = self.query_defaults.write();
        defaults.retain(|(key, _)| key != &prefix);
        defaults.push((prefix, Arc::new(options)));
    }

    /// `getQueryDefaults`: resolve the longest registered prefix matching
    /// `key`. Among equal-length prefixes the most recently registered wins
    /// (iteration order follows registration order, and `max_by_key` keeps
    /// the last maximum). Falls back to `QueryOptions::default()` if
    /// nothing matches, or if the longest match was registered for a
    /// different `T`.
    pub fn get_query_defaults<T: Clone + Send + Sync + PartialEq + 'static>(&self, key: &QueryKey) -> QueryOptions<T> {
        let defaults = self.query_defaults.read();
        defaults
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .and_then(|(_, options)| options.downcast_ref::<QueryOptions<T>>())
            .cloned()
            .unwrap_or_default()
    }

    /// `setMutationDefaults`: register the `mutationFn` resolved for a given
    /// `mutationKey` (spec.md §3, §9 paused-mutation resumption bullet).
    /// Re-registering the same key replaces the earlier entry, matching
    /// [`set_query_defaults`](Self::set_query_defaults)'s last-write-wins
    /// rule.
    pub fn set_mutation_defaults<TData: Send + Sync + 'static, TVariables: Send + Sync + 'static>(
        &self,
        mutation_key: impl Into<String>,
        mutation_fn: MutationFn<TData, TVariables>,
    ) {
        let mutation_key = mutation_key.into();
        let mut defaults = self.mutation_defaults.write();
        defaults.retain(|(key, _)| key != &mutation_key);
        defaults.push((mutation_key, Arc::new(mutation_fn)));
    }

    /// `getMutationDefaults`: resolve the `mutationFn` registered for
    /// `mutation_key`, used to re-bind a `Mutation` on dehydration replay
    /// (spec.md §9) without the caller having to carry the function across
    /// the process boundary itself.
    pub fn get_mutation_fn_default<TData: Send + Sync + 'static, TVariables: Send + Sync + 'static>(
        &self,
        mutation_key: &str,
    ) -> Option<MutationFn<TData, TVariables>> {
        let defaults = self.mutation_defaults.read();
        defaults
            .iter()
            .find(|(key, _)| key == mutation_key)
            .and_then(|(_, mutation_fn)| mutation_fn.downcast_ref::<MutationFn<TData, TVariables>>())
            .cloned()
    }

    fn resolve_query_options<T: Clone + Send + Sync + PartialEq + 'static>(
        &self,
        key: &QueryKey,
        options: Option<QueryOptions<T>>,
    ) -> QueryOptions<T> {
        options.unwrap_or_else(|| self.get_query_defaults(key))
    }

    fn build_query<T: Clone + Send + Sync + PartialEq + 'static>(
        self: &Arc<Self>,
        key: QueryKey,
        options: Option<QueryOptions<T>>,
    ) -> Result<Arc<Query<T>>, QueryError> {
        let options = self.resolve_query_options(&key, options);
        self.query_cache.build(key, options)
    }

    // -- fetch / prefetch / ensure (spec.md §4.6) ---------------------------

    /// `fetchQuery`: get-or-create the query and await its (possibly
    /// already in-flight) fetch, regardless of current staleness.
    pub async fn fetch_query<T: Clone + Send + Sync + PartialEq + 'static>(
        self: &Arc<Self>,
        key: QueryKey,
        query_fn: QueryFn<T>,
        options: Option<QueryOptions<T>>,
    ) -> Result<T, QueryError> {
        let query = self.build_query(key, options)?;
        query.fetch(query_fn).await
    }

    /// `prefetchQuery`: like `fetchQuery`, but failures are logged through
    /// the configured `Logger` rather than propagated — a prefetch is a
    /// best-effort warm-up (spec.md §7's "one record per terminal failure
    /// that is not observed").
    pub async fn prefetch_query<T: Clone + Send + Sync + PartialEq + 'static>(
        self: &Arc<Self>,
        key: QueryKey,
        query_fn: QueryFn<T>,
        options: Option<QueryOptions<T>>,
    ) {
        if let Err(error) = self.fetch_query(key, query_fn, options).await {
            self.log("prefetch_query", &error);
        }
    }

    /// `ensureQueryData`: return cached data if present (regardless of
    /// staleness), otherwise fetch and return the result.
    pub async fn ensure_query_data<T: Clone + Send + Sync + PartialEq + 'static>(
        self: &Arc<Self>,
        key: QueryKey,
        query_fn: QueryFn<T>,
        options: Option<QueryOptions<T>>,
    ) -> Result<T, QueryError> {
        let query = self.build_query(key, options)?;
        if let Some(data) = query.state().data {
            return Ok(data);
        }
        query.fetch(query_fn).await
    }

    /// `ensureQueryData` variant that also kicks off a background refetch
    /// when the cached value is stale, returning the cached value
    /// immediately without waiting on it (spec.md §4.6).
    pub fn ensure_query_data_revalidating<T: Clone + Send + Sync + PartialEq + 'static>(
        self: &Arc<Self>,
        key: QueryKey,
        query_fn: QueryFn<T>,
        options: Option<QueryOptions<T>>,
    ) -> Result<Option<T>, QueryError> {
        let query = self.build_query(key, options)?;
        let state = query.state();
        if query.is_stale() {
            query.fetch(query_fn);
        }
        Ok(state.data)
    }

    // -- direct cache reads/writes (spec.md §4.6) ---------------------------

    pub fn get_query_data<T: Clone + Send + Sync + PartialEq + 'static>(&self, key: &QueryKey) -> Option<T> {
        self.query_cache.get::<T>(key).and_then(|q| q.state().data)
    }

    pub fn get_query_state<T: Clone + Send + Sync + PartialEq + 'static>(&self, key: &QueryKey) -> Option<QueryState<T>> {
        self.query_cache.get::<T>(key).map(|q| q.state())
    }

    /// `setQueryData`: if `updater` returns `None`, the cache is left
    /// untouched; otherwise the new value is written through the same
    /// structural-sharing path a fetch success uses. Builds the query
    /// (with defaults-resolved options) if it doesn't exist yet, mirroring
    /// the teacher's "writing creates the cache slot" behavior.
    pub fn set_query_data<T: Clone + Send + Sync + PartialEq + 'static>(
        self: &Arc<Self>,
        key: QueryKey,
        updater: impl FnOnce(Option<T>) -> Option<T>,
    ) -> Result<(), QueryError> {
        let query = self.build_query::<T>(key, None)?;
        let current = query.state().data;
        if let Some(data) = updater(current) {
            query.set_data(data);
        }
        Ok(())
    }

    /// `setQueriesData`: apply `updater` to every cached, already-typed `T`
    /// query matching `filter`. Queries of a different concrete type are
    /// silently skipped — `filter` is expected to scope to one data type in
    /// practice, same as the real library's type parameter on this call.
    pub fn set_queries_data<T: Clone + Send + Sync + PartialEq + 'static>(
        &self,
        filter: &QueryFilter,
        updater: impl Fn(Option<T>) -> Option<T>,
    ) -> Vec<(QueryKey, T)> {
        let mut updated = Vec::new();
        for entry in self.query_cache.find_all(filter) {
            if let Some(query) = entry.as_any().downcast_ref::<Query<T>>() {
                let current = query.state().data;
                if let Some(data) = updater(current) {
                    query.set_data(data.clone());
                    updated.push((entry.query_key().clone(), data));
                }
            }
        }
        updated
    }

    pub fn get_queries_data<T: Clone + Send + Sync + PartialEq + 'static>(&self, filter: &QueryFilter) -> Vec<(QueryKey, Option<T>)> {
        self.query_cache
            .find_all(filter)
            .into_iter()
            .filter_map(|entry| {
                entry
                    .as_any()
                    .downcast_ref::<Query<T>>()
                    .map(|query| (entry.query_key().clone(), query.state().data))
            })
            .collect()
    }

    // -- cache-wide sweeps (spec.md §4.3, §4.6) -----------------------------

    /// `invalidateQueries`: mark every matching query invalidated. `refetch_type`
    /// (spec.md §4.6) gates which matches are allowed to act on that
    /// immediately: `Active` (the default) lets only queries with an active,
    /// enabled `QueryObserver` refetch themselves (see
    /// `QueryObserver::on_query_state_change`); `Inactive` suppresses that
    /// auto-refetch so only observer-less queries are left to pick it up
    /// lazily on next subscription; `All` lets every match notify; `None`
    /// marks everything stale without nudging anything to refetch right now.
    pub fn invalidate_queries(&self, filter: &QueryFilter, refetch_type: RefetchType) {
        for query in self.query_cache.find_all(filter) {
            let refetch_now = match refetch_type {
                RefetchType::None => false,
                RefetchType::Active => query.is_active(),
                RefetchType::Inactive => !query.is_active(),
                RefetchType::All => true,
            };
            if refetch_now {
                query.invalidate();
            } else {
                query.invalidate_quiet();
            }
        }
    }

    /// `refetchQueries`: force a fetch of every matching query of type `T`
    /// regardless of staleness. `cancel_refetch` (default `true`) cancels
    /// any fetch already in flight on a matched query before starting the
    /// new one, so a refetch sweep never just hands back a stale in-flight
    /// promise. `throw_on_error` stops the sweep at the first failure
    /// instead of awaiting every match to completion.
    pub async fn refetch_queries<T: Clone + Send + Sync + PartialEq + 'static>(
        &self,
        filter: &QueryFilter,
        query_fn: QueryFn<T>,
        cancel_refetch: bool,
        throw_on_error: bool,
    ) -> Vec<Result<T, QueryError>> {
        let matches: Vec<Arc<Query<T>>> = self
            .query_cache
            .find_all(filter)
            .into_iter()
            .filter_map(|entry| entry.into_any_arc().downcast::<Query<T>>().ok())
            .collect();

        if cancel_refetch {
            for query in &matches {
                query.cancel(CancelOptions { revert: false, silent: true });
            }
        }

        if throw_on_error {
            let mut results = Vec::with_capacity(matches.len());
            for query in &matches {
                let result = query.fetch(query_fn.clone()).await;
                let failed = result.is_err();
                results.push(result);
                if failed {
                    break;
                }
            }
            results
        } else {
            let fetches = matches.iter().map(|query| query.fetch(query_fn.clone()));
            futures::future::join_all(fetches).await
        }
    }

    /// `resetQueries`: restore every matching query of type `T` to its
    /// pre-fetch state, then let active observers refetch it (spec.md
    /// §4.6; see `Query::reset`).
    pub fn reset_queries<T: Clone + Send + Sync + PartialEq + 'static>(&self, filter: &QueryFilter) {
        for entry in self.query_cache.find_all(filter) {
            if let Some(query) = entry.as_any().downcast_ref::<Query<T>>() {
                query.reset();
            }
        }
    }

    /// `cancelQueries`.
    pub fn cancel_queries(&self, filter: &QueryFilter, options: CancelOptions) {
        self.query_cache.cancel_matching(filter, options);
    }

    /// `resumePausedMutations`, exposed directly for callers that want to
    /// trigger it outside of an online transition (e.g. right after
    /// `hydrate`).
    pub async fn resume_paused_mutations(&self) {
        self.mutation_cache.resume_paused_mutations().await;
    }

    // -- lifecycle (spec.md §4.6, §5 "shared-resource policy") -------------

    /// `mount`: subscribe this client to the ambient focus/online signals.
    /// Reference-counted so nested mount/unmount pairs (e.g. from multiple
    /// bindings sharing one `QueryClient`) compose correctly; only the
    /// outermost `mount` call installs the subscriptions.
    pub fn mount(self: &Arc<Self>) {
        if self.mount_count.fetch_add(1, Ordering::SeqCst) != 0 {
            return;
        }
        let this = self.clone();
        let focus_id = self.focus.subscribe(move |focused| {
            if *focused {
                this.query_cache.broadcast_focus();
            }
        });
        *self.focus_listener.lock() = Some(focus_id);

        let this = self.clone();
        let online_id = self.online.subscribe(move |online| {
            if *online {
                this.query_cache.broadcast_online();
                let mutation_cache = this.mutation_cache.clone();
                tokio::spawn(async move {
                    mutation_cache.resume_paused_mutations().await;
                });
            }
        });
        *self.online_listener.lock() = Some(online_id);
    }

    /// `unmount`: the matching decrement; tears down the subscriptions once
    /// the mount count returns to zero.
    pub fn unmount(&self) {
        if self.mount_count.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        if let Some(id) = self.focus_listener.lock().take() {
            self.focus.unsubscribe(id);
        }
        if let Some(id) = self.online_listener.lock().take() {
            self.online.unsubscribe(id);
        }
    }

    pub fn clear(&self) {
        self.query_cache.clear();
        self.mutation_cache.clear();
    }
}

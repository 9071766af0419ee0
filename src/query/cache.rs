//! `QueryCache` (spec.md §4.3): the keyed map of `Query` entries plus
//! focus/online broadcast. Grounded on the teacher's `QueryClient`
//! (`src/client/mod.rs`), split out from the client facade so the cache
//! itself has no notion of fetch functions or typed options beyond what
//! `AnyQuery` exposes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::key::{QueryHash, QueryKey, QueryKeyFilter, QueryKeyHashFn};
use crate::retryer::CancelOptions;
use crate::status::FetchStatus;

use super::entity::{AnyQuery, Query};
use super::options::QueryOptions;

/// Which activity bucket a `QueryFilter` restricts to (spec.md §4.3
/// filters' `type: 'all' | 'active' | 'inactive'`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QueryFilterType {
    #[default]
    All,
    Active,
    Inactive,
}

/// Composable filter over the queries in a `QueryCache` (spec.md §4.3):
/// key matching plus `predicate`/`stale`/`fetchStatus`/`type`, used by every
/// cache-wide sweep (`invalidateQueries`, `refetchQueries`, `resetQueries`,
/// `cancelQueries`, `setQueriesData`, `getQueriesData`).
#[derive(Clone, Default)]
pub struct QueryFilter {
    pub key: Option<QueryKeyFilter>,
    pub predicate: Option<Arc<dyn Fn(&dyn AnyQuery) -> bool + Send + Sync>>,
    pub stale: Option<bool>,
    pub fetch_status: Option<FetchStatus>,
    pub query_type: QueryFilterType,
}

impl QueryFilter {
    /// Match every query (spec.md §4.3 default filter).
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exact(key: QueryKey) -> Self {
        Self { key: Some(QueryKeyFilter::exact(key)), ..Default::default() }
    }

    pub fn prefix(key: QueryKey) -> Self {
        Self { key: Some(QueryKeyFilter::prefix(key)), ..Default::default() }
    }

    pub fn from_key_filter(key: QueryKeyFilter) -> Self {
        Self { key: Some(key), ..Default::default() }
    }

    pub fn active(mut self) -> Self {
        self.query_type = QueryFilterType::Active;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.query_type = QueryFilterType::Inactive;
        self
    }

    pub fn stale(mut self, stale: bool) -> Self {
        self.stale = Some(stale);
        self
    }

    pub fn fetch_status(mut self, status: FetchStatus) -> Self {
        self.fetch_status = Some(status);
        self
    }

    pub fn predicate(mut self, predicate: impl Fn(&dyn AnyQuery) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn matches(&self, query: &dyn AnyQuery) -> bool {
        if let Some(key) = &self.key {
            if !key.matches(query.query_key()) {
                return false;
            }
        }
        match self.query_type {
            QueryFilterType::All => {}
            QueryFilterType::Active => {
                if !query.is_active() {
                    return false;
                }
            }
            QueryFilterType::Inactive => {
                if query.is_active() {
                    return false;
                }
            }
        }
        if let Some(stale) = self.stale {
            if query.is_stale() != stale {
                return false;
            }
        }
        if let Some(fetch_status) = self.fetch_status {
            if query.fetch_status() != fetch_status {
                return false;
            }
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(query) {
                return false;
            }
        }
        true
    }
}

impl From<QueryKeyFilter> for QueryFilter {
    fn from(key: QueryKeyFilter) -> Self {
        Self::from_key_filter(key)
    }
}

pub struct QueryCache {
    queries: RwLock<HashMap<QueryHash, Arc<dyn AnyQuery>>>,
    hash_fn: QueryKeyHashFn,
    can_run: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl QueryCache {
    pub fn new(hash_fn: QueryKeyHashFn, can_run: Arc<dyn Fn() -> bool + Send + Sync>) -> Arc<Self> {
        Arc::new(Self {
            queries: RwLock::new(HashMap::new()),
            hash_fn,
            can_run,
        })
    }

    pub fn hash_of(&self, key: &QueryKey) -> QueryHash {
        (self.hash_fn)(key)
    }

    /// Get-or-create the typed `Query` for `key`. Returns
    /// `QueryError::Cache` if an entry already exists at this hash with a
    /// different data type — a query key must not be reused across types
    /// (spec.md §6 data-model invariant).
    pub fn build<T: Clone + Send + Sync + PartialEq + 'static>(
        self: &Arc<Self>,
        key: QueryKey,
        options: QueryOptions<T>,
    ) -> Result<Arc<Query<T>>, crate::error::QueryError> {
        let hash = self.hash_of(&key);
        let mut queries = self.queries.write();
        if let Some(existing) = queries.get(&hash) {
            return existing.clone().into_any_arc().downcast::<Query<T>>().map_err(|_| {
                crate::error::QueryError::Cache {
                    message: format!("query key {key} already cached with a different data type"),
                }
            });
        }
        let query = Query::new(hash.clone(), key, options, self.can_run.clone());
        let cache = self.clone();
        let evict_hash = hash.clone();
        query.set_on_evicted(move || cache.remove(&evict_hash));
        queries.insert(hash, query.clone());
        Ok(query)
    }

    pub fn get<T: Clone + Send + Sync + PartialEq + 'static>(&self, key: &QueryKey) -> Option<Arc<Query<T>>> {
        let hash = self.hash_of(key);
        self.get_by_hash(&hash)
    }

    pub fn get_by_hash<T: Clone + Send + Sync + PartialEq + 'static>(&self, hash: &QueryHash) -> Option<Arc<Query<T>>> {
        let entry = self.queries.read().get(hash)?.clone();
        entry.into_any_arc().downcast::<Query<T>>().ok()
    }

    pub fn get_all(&self) -> Vec<Arc<dyn AnyQuery>> {
        self.queries.read().values().cloned().collect()
    }

    pub fn find(&self, filter: &QueryFilter) -> Option<Arc<dyn AnyQuery>> {
        self.queries
            .read()
            .values()
            .find(|q| filter.matches(q.as_ref()))
            .cloned()
    }

    pub fn find_all(&self, filter: &QueryFilter) -> Vec<Arc<dyn AnyQuery>> {
        self.queries
            .read()
            .values()
            .filter(|q| filter.matches(q.as_ref()))
            .cloned()
            .collect()
    }

    pub fn remove(&self, hash: &QueryHash) {
        self.queries.write().remove(hash);
    }

    pub fn clear(&self) {
        self.queries.write().clear();
    }

    pub fn cancel_matching(&self, filter: &QueryFilter, options: CancelOptions) {
        for query in self.find_all(filter) {
            query.cancel(options);
        }
    }

    pub fn invalidate_matching(&self, filter: &QueryFilter) {
        for query in self.find_all(filter) {
            query.invalidate();
        }
    }

    /// spec.md §5: window-focus triggers a refetch sweep over active,
    /// focus-eligible queries. The actual refetch call is driven by
    /// `QueryClient`, which owns the fetch functions; this only reports
    /// which queries qualify.
    pub fn active_queries(&self) -> Vec<Arc<dyn AnyQuery>> {
        self.queries
            .read()
            .values()
            .filter(|q| q.is_active())
            .cloned()
            .collect()
    }

    /// spec.md §5: "onFocus() walks all Queries". The per-query refetch
    /// decision itself lives with each `QueryObserver`, which reacts to its
    /// own `Query`'s focus subscription independently of this sweep.
    pub fn broadcast_focus(&self) {
        for query in self.get_all() {
            query.on_focus();
        }
    }

    /// spec.md §4.1 `onOnline`: resume every paused retryer in the cache,
    /// not only those backing an active observer.
    pub fn broadcast_online(&self) {
        for query in self.get_all() {
            query.on_online();
        }
    }
}

//! `MutationCache` (spec.md §4.5): the list of mutations plus scope-id FIFO
//! serialization and `resumePausedMutations`. Grounded on the teacher's
//! `QueryClient` cache map (`src/client/mod.rs`), generalized from a single
//! keyed `HashMap` to a flat list (mutations have no stable logical key —
//! their identity is `mutationId`) plus a per-scope lock table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::QueryError;

use super::entity::{AnyMutation, Mutation, MutationFn};
use super::options::MutationOptions;

/// Cache-wide callbacks fired for every mutation regardless of whether a
/// per-mutate caller is still around to receive its own (spec.md §4.5:
/// "Cache-level (MutationCache options) callbacks fire for every
/// mutation"). Because the cache holds mutations of heterogeneous
/// `TData`/`TVariables` types in one list, these operate on a JSON
/// projection rather than the concrete types — the same type-erasure
/// `AnyQuery` uses for cache-wide `QueryCache` operations.
#[derive(Clone, Default)]
pub struct MutationCacheConfig {
    pub on_success: Option<Arc<dyn Fn(&serde_json::Value, &serde_json::Value) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&QueryError, &serde_json::Value) + Send + Sync>>,
    pub on_settled: Option<
        Arc<dyn Fn(Option<&serde_json::Value>, Option<&QueryError>, &serde_json::Value) + Send + Sync>,
    >,
}

pub struct MutationCache {
    mutations: RwLock<Vec<Arc<dyn AnyMutation>>>,
    scope_locks: RwLock<HashMap<String, Arc<AsyncMutex<()>>>>,
    can_run: Arc<dyn Fn() -> bool + Send + Sync>,
    config: MutationCacheConfig,
}

impl MutationCache {
    pub fn new(can_run: Arc<dyn Fn() -> bool + Send + Sync>, config: MutationCacheConfig) -> Arc<Self> {
        Arc::new(Self {
            mutations: RwLock::new(Vec::new()),
            scope_locks: RwLock::new(HashMap::new()),
            can_run,
            config,
        })
    }

    fn scope_lock(&self, scope_id: &str) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.scope_locks.read().get(scope_id) {
            return lock.clone();
        }
        self.scope_locks
            .write()
            .entry(scope_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Build a new `Mutation`, register it, and run it to completion,
    /// serialized within its `scope.id` if one is set (spec.md §3
    /// invariant 2, §5: mutations sharing a scope run FIFO with no
    /// temporal overlap; unscoped mutations run fully in parallel).
    pub async fn dispatch<TData, TVariables, TContext>(
        self: &Arc<Self>,
        options: MutationOptions<TData, TVariables, TContext>,
        variables: TVariables,
        mutation_fn: MutationFn<TData, TVariables>,
    ) -> (Arc<Mutation<TData, TVariables, TContext>>, Result<TData, QueryError>)
    where
        TData: Clone + Send + Sync + Serialize + 'static,
        TVariables: Clone + Send + Sync + Serialize + 'static,
        TContext: Clone + Send + Sync + 'static,
    {
        let id = crate::status::MutationId::new();
        let scope_id = options.scope.as_ref().map(|s| s.id.clone());
        let mutation = Mutation::new(id, options);
        self.mutations.write().push(mutation.clone());

        let can_run = self.can_run.clone();
        let result = match &scope_id {
            Some(scope_id) => {
                let lock = self.scope_lock(scope_id);
                let _guard = lock.lock().await;
                mutation.execute(variables.clone(), mutation_fn, can_run).await
            }
            None => mutation.execute(variables.clone(), mutation_fn, can_run).await,
        };

        self.notify_cache_level(&variables, &result);
        (mutation, result)
    }

    fn notify_cache_level<TData, TVariables>(&self, variables: &TVariables, result: &Result<TData, QueryError>)
    where
        TData: Serialize,
        TVariables: Serialize,
    {
        let variables_json = match serde_json::to_value(variables) {
            Ok(v) => v,
            Err(_) => return,
        };
        match result {
            Ok(data) => {
                let data_json = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
                if let Some(on_success) = &self.config.on_success {
                    on_success(&data_json, &variables_json);
                }
                if let Some(on_settled) = &self.config.on_settled {
                    on_settled(Some(&data_json), None, &variables_json);
                }
            }
            Err(error) => {
                if let Some(on_error) = &self.config.on_error {
                    on_error(error, &variables_json);
                }
                if let Some(on_settled) = &self.config.on_settled {
                    on_settled(None, Some(error), &variables_json);
                }
            }
        }
    }

    pub fn get_all(&self) -> Vec<Arc<dyn AnyMutation>> {
        self.mutations.read().clone()
    }

    pub fn find_by_scope(&self, scope_id: &str) -> Vec<Arc<dyn AnyMutation>> {
        self.mutations
            .read()
            .iter()
            .filter(|m| m.scope_id().as_deref() == Some(scope_id))
            .cloned()
            .collect()
    }

    pub fn remove(&self, id: crate::status::MutationId) {
        self.mutations.write().retain(|m| m.mutation_id() != id);
    }

    pub fn clear(&self) {
        self.mutations.write().clear();
    }

    /// spec.md §4.5 `resumePausedMutations`: group paused mutations by
    /// scope id; within a group await each mutation's settlement before
    /// starting the next; across scopes, run in parallel.
    pub async fn resume_paused_mutations(&self) {
        let paused: Vec<Arc<dyn AnyMutation>> =
            self.mutations.read().iter().filter(|m| m.is_paused()).cloned().collect();

        let mut by_scope: HashMap<Option<String>, Vec<Arc<dyn AnyMutation>>> = HashMap::new();
        for mutation in paused {
            by_scope.entry(mutation.scope_id()).or_default().push(mutation);
        }

        let groups: Vec<_> = by_scope.into_values().collect();
        let runs = groups.into_iter().map(|mut group| {
            group.sort_by_key(|m| m.submitted_at());
            async move {
                for mutation in group {
                    mutation.resume();
                    mutation.settled().await;
                }
            }
        });
        futures::future::join_all(runs).await;
    }
}

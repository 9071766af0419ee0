//! Mutation option types (spec.md §3 Mutation entry, §4.5).

use std::sync::Arc;

use crate::error::QueryError;
use crate::retryer::{NetworkMode, RetryDelay, RetryPolicy};

/// `scope: { id: string }` (spec.md §3, GLOSSARY "Scope (mutation)"):
/// groups mutations into a FIFO-serialized lane. Mutations without a scope
/// run with full parallelism (spec.md §3 invariant 2).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MutationScope {
    pub id: String,
}

impl MutationScope {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// `onMutate(variables) -> context` (spec.md §4.5). Its return value is
/// threaded through as `TContext` to every later callback and the
/// persisted state (spec.md §9's paused-mutation bullet).
pub type OnMutate<TVariables, TContext> = Arc<dyn Fn(&TVariables) -> Option<TContext> + Send + Sync>;

/// spec.md §4.5/§7: lifecycle callbacks may themselves fail
/// ("LifecycleCallbackFailure"); a `Result` return lets `Mutation::execute`
/// apply the "original queryFn error wins" rule precisely.
pub type OnSuccess<TData, TVariables, TContext> =
    Arc<dyn Fn(&TData, &TVariables, Option<&TContext>) -> Result<(), QueryError> + Send + Sync>;
pub type OnError<TVariables, TContext> =
    Arc<dyn Fn(&QueryError, &TVariables, Option<&TContext>) -> Result<(), QueryError> + Send + Sync>;
pub type OnSettled<TData, TVariables, TContext> =
    Arc<dyn Fn(Option<&TData>, Option<&QueryError>, &TVariables, Option<&TContext>) -> Result<(), QueryError> + Send + Sync>;

/// Per-mutation options (spec.md §3 Mutation entry).
pub struct MutationOptions<TData, TVariables, TContext> {
    /// `mutationKey?` (spec.md §3): lets a newly constructed `QueryClient`
    /// look up the `mutationFn` to rebind on dehydration replay (spec.md
    /// §9) via `QueryClient::get_mutation_fn_default`.
    pub mutation_key: Option<String>,
    pub on_mutate: Option<OnMutate<TVariables, TContext>>,
    pub on_success: Option<OnSuccess<TData, TVariables, TContext>>,
    pub on_error: Option<OnError<TVariables, TContext>>,
    pub on_settled: Option<OnSettled<TData, TVariables, TContext>>,
    pub retry: RetryPolicy,
    pub retry_delay: RetryDelay,
    pub network_mode: NetworkMode,
    pub scope: Option<MutationScope>,
    pub meta: Option<serde_json::Value>,
}

impl<TData, TVariables, TContext> Default for MutationOptions<TData, TVariables, TContext> {
    fn default() -> Self {
        Self {
            mutation_key: None,
            on_mutate: None,
            on_success: None,
            on_error: None,
            on_settled: None,
            // Mutations default to no retry (spec.md's worked scenario 2
            // sets `retry:1` explicitly); unlike queries, retrying a
            // side-effectful operation by default is unsafe.
            retry: RetryPolicy::Never,
            retry_delay: RetryDelay::default(),
            network_mode: NetworkMode::default(),
            scope: None,
            meta: None,
        }
    }
}

impl<TData, TVariables, TContext> Clone for MutationOptions<TData, TVariables, TContext> {
    fn clone(&self) -> Self {
        Self {
            mutation_key: self.mutation_key.clone(),
            on_mutate: self.on_mutate.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_settled: self.on_settled.clone(),
            retry: self.retry.clone(),
            retry_delay: self.retry_delay.clone(),
            network_mode: self.network_mode,
            scope: self.scope.clone(),
            meta: self.meta.clone(),
        }
    }
}

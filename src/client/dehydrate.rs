//! Dehydration/hydration snapshot types (spec.md §4.7, §6): a serializable
//! projection of cache state for SSR/persistence handoff. Grounded on the
//! teacher's `SerializedData`/`CacheEntry` (`src/client/mod.rs`), narrowed
//! from one process-wide bincode blob to typed, per-call snapshots —
//! `dehydrate_queries` is called once per concrete `T` the caller wants to
//! ship, since Rust has no runtime way to walk a heterogeneous cache and ask
//! "what's your data type" without the caller naming it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::key::{QueryHash, QueryKey};
use crate::mutation::{Mutation, MutationFn, MutationOptions};
use crate::query::cache::QueryFilter;
use crate::query::entity::{AnyQuery, Query};
use crate::query::options::QueryOptions;
use crate::status::{MutationStatus, QueryStatus};

/// One cached query's snapshot. spec.md §4.7: "a live promise never
/// survives dehydration" — there is no promise field at all here; a query
/// still mid-fetch simply dehydrates with whatever `data` it last held.
#[derive(Clone, Serialize, Deserialize)]
pub struct DehydratedQuery<T> {
    pub query_hash: QueryHash,
    pub query_key: QueryKey,
    pub data: Option<T>,
    pub data_update_count: u32,
    pub status: QueryStatus,
}

/// A snapshot of one mutation, built from a concrete `Mutation` the caller
/// already holds (see [`dehydrate_mutation`]). Only mutations still paused
/// are normally worth shipping — spec.md §9's "resumption re-creates a
/// Mutation bound to a newly supplied mutationFn" bullet.
#[derive(Clone, Serialize, Deserialize)]
pub struct DehydratedMutation<TData, TVariables, TContext> {
    pub status: MutationStatus,
    pub is_paused: bool,
    pub variables: Option<TVariables>,
    pub context: Option<TContext>,
    pub data: Option<TData>,
    /// Required by spec.md §9's persisted shape.
    pub submitted_at: Option<DateTime<Utc>>,
    /// `mutationKey`, carried through so resumption can resolve a fresh
    /// `mutationFn` from the new client's defaults (spec.md §9) instead of
    /// requiring the caller to keep the original closure around.
    pub mutation_key: Option<String>,
}

/// `dehydrate()`'s output for one query type (spec.md §4.7
/// `DehydratedState`). A full cross-type dump is assembled by calling
/// [`super::QueryClient::dehydrate_queries`] once per type the application
/// cares to persist and merging the results on the application side.
#[derive(Clone, Serialize, Deserialize)]
pub struct DehydratedState<T> {
    pub queries: Vec<DehydratedQuery<T>>,
}

/// Snapshot a single in-process `Mutation` (spec.md §4.7). A free function
/// rather than a cache sweep: `MutationCache` holds mutations behind the
/// object-safe `AnyMutation` trait, which (unlike `AnyQuery`) has no
/// downcast hook, since nothing else in this crate needs to recover a
/// mutation's concrete type once dispatched.
pub fn dehydrate_mutation<TData, TVariables, TContext>(
    mutation: &Mutation<TData, TVariables, TContext>,
) -> DehydratedMutation<TData, TVariables, TContext>
where
    TData: Clone + Send + Sync + 'static,
    TVariables: Clone + Send + Sync + 'static,
    TContext: Clone + Send + Sync + 'static,
{
    let state = mutation.state();
    DehydratedMutation {
        status: state.status,
        is_paused: state.is_paused,
        variables: state.variables,
        context: state.context,
        data: state.data,
        submitted_at: state.submitted_at,
        mutation_key: mutation.mutation_key().map(str::to_owned),
    }
}

impl super::QueryClient {
    /// spec.md §4.7 `dehydrate`: snapshot every cached query of type `T`
    /// matched by `filter`.
    pub fn dehydrate_queries<T>(&self, filter: &QueryFilter) -> DehydratedState<T>
    where
        T: Clone + Send + Sync + PartialEq + Serialize + 'static,
    {
        let queries = self
            .query_cache()
            .find_all(filter)
            .into_iter()
            .filter_map(|entry| entry.into_any_arc().downcast::<Query<T>>().ok())
            .map(|query| {
                let state = query.state();
                DehydratedQuery {
                    query_hash: query.query_hash().clone(),
                    query_key: query.query_key().clone(),
                    data: state.data,
                    data_update_count: state.data_update_count,
                    status: state.status,
                }
            })
            .collect();
        DehydratedState { queries }
    }

    /// spec.md §4.7 `hydrate`: seed the cache from a previously-dehydrated
    /// snapshot. A query already present with equal-or-newer data
    /// (`data_update_count`) is left untouched — the live cache always wins
    /// over a stale snapshot (spec.md §9 HydrationMismatch consideration).
    pub fn hydrate_queries<T>(&self, state: DehydratedState<T>, options: QueryOptions<T>) -> Result<(), QueryError>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        for dehydrated in state.queries {
            let query = self.query_cache().build::<T>(dehydrated.query_key, options.clone())?;
            if query.state().data_update_count >= dehydrated.data_update_count {
                continue;
            }
            if let Some(data) = dehydrated.data {
                query.set_data(data);
            }
        }
        Ok(())
    }

    /// spec.md §9: rehydrating a paused mutation doesn't resume a retryer
    /// (there isn't one — this process never started it) — it replays the
    /// mutation from scratch through the same `MutationCache::dispatch` path
    /// a live `mutate()` call uses. `mutation_fn` is used if supplied;
    /// otherwise it is resolved from this client's
    /// [`get_mutation_fn_default`](Self::get_mutation_fn_default) using the
    /// snapshot's `mutation_key`, exactly as spec.md §9 describes. Returns
    /// `None` if the snapshot wasn't paused, carries no variables to replay
    /// with, or no `mutationFn` could be resolved either way.
    pub async fn hydrate_and_resume_mutation<TData, TVariables, TContext>(
        &self,
        dehydrated: DehydratedMutation<TData, TVariables, TContext>,
        mutation_fn: Option<MutationFn<TData, TVariables>>,
        options: MutationOptions<TData, TVariables, TContext>,
    ) -> Option<Result<TData, QueryError>>
    where
        TData: Clone + Send + Sync + Serialize + 'static,
        TVariables: Clone + Send + Sync + Serialize + 'static,
        TContext: Clone + Send + Sync + 'static,
    {
        if !dehydrated.is_paused {
            return None;
        }
        let variables = dehydrated.variables?;
        let mutation_fn = match mutation_fn {
            Some(mutation_fn) => mutation_fn,
            None => self.get_mutation_fn_default(dehydrated.mutation_key.as_deref()?)?,
        };
        let (_mutation, result) = self.mutation_cache().dispatch(options, variables, mutation_fn).await;
        Some(result)
    }
}

//! `MutationObserver` (spec.md §2, §4.5): the per-subscriber view over a
//! sequence of mutation executions sharing one `mutate()`/`mutateAsync()`
//! entry point. Grounded on the teacher's `use_mutation` `MutationResult`
//! (`src/mutation/mod.rs`), generalized from a leptos `Signal`-returning
//! hook into a plain observer object a binding layer can wrap in whatever
//! reactivity primitive it has.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::QueryError;
use crate::status::MutationStatus;
use crate::subscribable::{ListenerId, Listeners};

use super::cache::MutationCache;
use super::entity::{Mutation, MutationFn, MutationState};
use super::options::MutationOptions;

/// Callbacks supplied to a single `mutate()` call (spec.md §4.5: "Per-mutate
/// callbacks"), as opposed to the `MutationOptions` callbacks configured
/// once for the observer. Each call captures its own `PerCallCallbacks`
/// locally; a later `mutate()` call on the same observer bumps a generation
/// counter, and a call whose generation has been superseded by the time it
/// settles simply never fires its callbacks — this is the real library's
/// "last mutate call's callbacks win" behavior, without reassigning an
/// earlier call's result to whatever callbacks happen to be in a shared slot
/// at settlement time.
pub struct PerCallCallbacks<TData, TVariables, TContext> {
    pub on_success: Option<Arc<dyn Fn(&TData, &TVariables, Option<&TContext>) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&QueryError, &TVariables, Option<&TContext>) + Send + Sync>>,
    pub on_settled:
        Option<Arc<dyn Fn(Option<&TData>, Option<&QueryError>, &TVariables, Option<&TContext>) + Send + Sync>>,
}

impl<TData, TVariables, TContext> Default for PerCallCallbacks<TData, TVariables, TContext> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }
}

impl<TData, TVariables, TContext> Clone for PerCallCallbacks<TData, TVariables, TContext> {
    fn clone(&self) -> Self {
        Self {
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_settled: self.on_settled.clone(),
        }
    }
}

/// The derived, observer-local view of the underlying `Mutation`'s state
/// (spec.md §4.5 / §6 observer result shape, narrowed to mutations).
#[derive(Clone)]
pub struct MutationObserverResult<TData, TVariables, TContext> {
    pub status: MutationStatus,
    pub data: Option<TData>,
    pub error: Option<QueryError>,
    pub is_idle: bool,
    pub is_pending: bool,
    pub is_success: bool,
    pub is_error: bool,
    pub is_paused: bool,
    pub failure_count: u32,
    pub failure_reason: Option<QueryError>,
    pub variables: Option<TVariables>,
    pub context: Option<TContext>,
}

impl<TData, TVariables, TContext> From<MutationState<TData, TVariables, TContext>>
    for MutationObserverResult<TData, TVariables, TContext>
{
    fn from(state: MutationState<TData, TVariables, TContext>) -> Self {
        Self {
            is_idle: state.status == MutationStatus::Idle,
            is_pending: state.status == MutationStatus::Pending,
            is_success: state.status == MutationStatus::Success,
            is_error: state.status == MutationStatus::Error,
            status: state.status,
            data: state.data,
            error: state.error,
            is_paused: state.is_paused,
            failure_count: state.failure_count,
            failure_reason: state.failure_reason,
            variables: state.variables,
            context: state.context,
        }
    }
}

impl<TData, TVariables, TContext> Default for MutationObserverResult<TData, TVariables, TContext> {
    fn default() -> Self {
        MutationState::default().into()
    }
}

pub struct MutationObserver<TData, TVariables, TContext>
where
    TData: Clone + Send + Sync + serde::Serialize + 'static,
    TVariables: Clone + Send + Sync + serde::Serialize + 'static,
    TContext: Clone + Send + Sync + 'static,
{
    cache: Arc<MutationCache>,
    options: MutationOptions<TData, TVariables, TContext>,
    mutation_fn: MutationFn<TData, TVariables>,
    current: RwLock<Option<Arc<Mutation<TData, TVariables, TContext>>>>,
    /// Bumped by every `mutate_with_callbacks` call and by `reset`; a call
    /// only fires its own per-call callbacks if its generation is still the
    /// latest once its promise settles (see `PerCallCallbacks`).
    call_generation: AtomicU64,
    listeners: Listeners<MutationObserverResult<TData, TVariables, TContext>>,
}

impl<TData, TVariables, TContext> MutationObserver<TData, TVariables, TContext>
where
    TData: Clone + Send + Sync + serde::Serialize + 'static,
    TVariables: Clone + Send + Sync + serde::Serialize + 'static,
    TContext: Clone + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<MutationCache>,
        options: MutationOptions<TData, TVariables, TContext>,
        mutation_fn: MutationFn<TData, TVariables>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            options,
            mutation_fn,
            current: RwLock::new(None),
            call_generation: AtomicU64::new(0),
            listeners: Listeners::new(),
        })
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&MutationObserverResult<TData, TVariables, TContext>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }

    pub fn result(&self) -> MutationObserverResult<TData, TVariables, TContext> {
        match self.current.read().as_ref() {
            Some(mutation) => mutation.state().into(),
            None => MutationObserverResult::default(),
        }
    }

    /// spec.md §4.5 `mutate`: run the mutation function with `variables`,
    /// without any per-call callbacks.
    pub async fn mutate(self: &Arc<Self>, variables: TVariables) -> Result<TData, QueryError> {
        self.mutate_with_callbacks(variables, None).await
    }

    /// `mutate` with per-call callbacks (spec.md §4.5). Overwrites any
    /// callbacks from a still-pending earlier call on this observer.
    pub async fn mutate_with_callbacks(
        self: &Arc<Self>,
        variables: TVariables,
        callbacks: Option<PerCallCallbacks<TData, TVariables, TContext>>,
    ) -> Result<TData, QueryError> {
        let generation = self.call_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (mutation, result) = self
            .cache
            .dispatch(self.options.clone(), variables.clone(), self.mutation_fn.clone())
            .await;
        *self.current.write() = Some(mutation.clone());
        self.listeners.notify(&mutation.state().into());

        // Fire exactly the callbacks this call captured, and only if no
        // later `mutate` call has superseded it in the meantime — never a
        // callback value re-read from shared state after the await, which
        // could by then belong to a different call entirely.
        let superseded = self.call_generation.load(Ordering::SeqCst) != generation;
        if !superseded {
            if let Some(callbacks) = &callbacks {
                let context = mutation.state().context;
                match &result {
                    Ok(data) => {
                        if let Some(on_success) = &callbacks.on_success {
                            on_success(data, &variables, context.as_ref());
                        }
                        if let Some(on_settled) = &callbacks.on_settled {
                            on_settled(Some(data), None, &variables, context.as_ref());
                        }
                    }
                    Err(error) => {
                        if let Some(on_error) = &callbacks.on_error {
                            on_error(error, &variables, context.as_ref());
                        }
                        if let Some(on_settled) = &callbacks.on_settled {
                            on_settled(None, Some(error), &variables, context.as_ref());
                        }
                    }
                }
            }
        }

        result
    }

    /// spec.md §4.5 `reset`: drop the observer's view of the last
    /// execution, returning it to `idle`. Does not touch the cache — the
    /// settled `Mutation` entry remains there until `MutationCache::clear`.
    pub fn reset(&self) {
        *self.current.write() = None;
        self.call_generation.fetch_add(1, Ordering::SeqCst);
        self.listeners.notify(&MutationObserverResult::default());
    }
}

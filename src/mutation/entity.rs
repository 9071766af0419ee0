//! `Mutation` — one mutation execution (spec.md §3 Mutation entry, §4.5).
//! Grounded on the teacher's `use_mutation` (`src/mutation/mod.rs`),
//! generalized from a leptos-hook closure chain into a standalone,
//! scope-serializable entity that shares `Retryer` with `Query::fetch`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};

use crate::error::QueryError;
use crate::retryer::{AbortSignal, Retryer, RetryerHooks};
use crate::status::{MutationId, MutationStatus};
use crate::subscribable::{ListenerId, Listeners};

use super::options::MutationOptions;

/// `state` (spec.md §3 Mutation entry).
#[derive(Clone)]
pub struct MutationState<TData, TVariables, TContext> {
    pub status: MutationStatus,
    pub data: Option<TData>,
    pub error: Option<QueryError>,
    pub failure_count: u32,
    pub failure_reason: Option<QueryError>,
    pub is_paused: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub variables: Option<TVariables>,
    pub context: Option<TContext>,
}

impl<TData, TVariables, TContext> Default for MutationState<TData, TVariables, TContext> {
    fn default() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
            failure_count: 0,
            failure_reason: None,
            is_paused: false,
            submitted_at: None,
            variables: None,
            context: None,
        }
    }
}

/// The user-supplied mutation function, given the variables for this call
/// plus a cooperative abort signal (spec.md §4.1).
pub type MutationFn<TData, TVariables> = Arc<
    dyn Fn(TVariables, AbortSignal) -> Pin<Box<dyn Future<Output = Result<TData, QueryError>> + Send>>
        + Send
        + Sync,
>;

/// Object-safe surface `MutationCache` operates on without knowing a
/// mutation's concrete types (spec.md §4.5 `resumePausedMutations`).
pub trait AnyMutation: Send + Sync {
    fn mutation_id(&self) -> MutationId;
    fn scope_id(&self) -> Option<String>;
    fn submitted_at(&self) -> Option<DateTime<Utc>>;
    fn is_paused(&self) -> bool;
    /// Force a resume attempt on the underlying retryer (used by
    /// `resumePausedMutations`).
    fn resume(&self);
    /// Resolves once the mutation's current execution settles, whatever
    /// the outcome. Used to serialize a scope group without needing to
    /// know `TData`.
    fn settled(&self) -> BoxFuture<'static, ()>;
}

/// A single mutation execution and its lifecycle (spec.md §3 Mutation
/// entry, §4.5).
pub struct Mutation<TData, TVariables, TContext>
where
    TData: Clone + Send + Sync + 'static,
    TVariables: Clone + Send + Sync + 'static,
    TContext: Clone + Send + Sync + 'static,
{
    id: MutationId,
    options: MutationOptions<TData, TVariables, TContext>,
    state: RwLock<MutationState<TData, TVariables, TContext>>,
    retryer: Mutex<Option<Retryer<TData>>>,
    listeners: Listeners<MutationState<TData, TVariables, TContext>>,
}

impl<TData, TVariables, TContext> Mutation<TData, TVariables, TContext>
where
    TData: Clone + Send + Sync + 'static,
    TVariables: Clone + Send + Sync + 'static,
    TContext: Clone + Send + Sync + 'static,
{
    pub fn new(id: MutationId, options: MutationOptions<TData, TVariables, TContext>) -> Arc<Self> {
        Arc::new(Self {
            id,
            options,
            state: RwLock::new(MutationState::default()),
            retryer: Mutex::new(None),
            listeners: Listeners::new(),
        })
    }

    pub fn mutation_id(&self) -> MutationId {
        self.id
    }

    /// `mutationKey` (spec.md §3), carried through dehydration so a fresh
    /// client can resolve the replayed `mutationFn` from its defaults.
    pub fn mutation_key(&self) -> Option<&str> {
        self.options.mutation_key.as_deref()
    }

    pub fn state(&self) -> MutationState<TData, TVariables, TContext> {
        self.state.read().clone()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&MutationState<TData, TVariables, TContext>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }

    fn notify(&self) {
        let snapshot = self.state.read().clone();
        self.listeners
            .notify_via(&crate::notify_manager::NotifyManager::ambient(), snapshot);
    }

    /// spec.md §4.5: `execute(variables)`. Scope FIFO serialization is the
    /// caller's responsibility (`MutationCache::dispatch` holds the scope
    /// lock across this call) — a `Mutation` only knows its own lifecycle.
    pub async fn execute(
        self: &Arc<Self>,
        variables: TVariables,
        mutation_fn: MutationFn<TData, TVariables>,
        can_run: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Result<TData, QueryError> {
        let context = self.options.on_mutate.as_ref().and_then(|f| f(&variables));
        {
            let mut state = self.state.write();
            state.status = MutationStatus::Pending;
            state.variables = Some(variables.clone());
            state.context = context.clone();
            state.submitted_at = Some(Utc::now());
            state.error = None;
            state.failure_count = 0;
            state.failure_reason = None;
        }
        self.notify();

        let this_fail = self.clone();
        let this_pause = self.clone();
        let this_continue = self.clone();
        let hooks = RetryerHooks {
            on_fail: Some(Arc::new(move |count, error: &QueryError| {
                let mut state = this_fail.state.write();
                state.failure_count = count;
                state.failure_reason = Some(error.clone());
                drop(state);
                this_fail.notify();
            })),
            on_pause: Some(Arc::new(move || {
                this_pause.state.write().is_paused = true;
                this_pause.notify();
            })),
            on_continue: Some(Arc::new(move || {
                this_continue.state.write().is_paused = false;
                this_continue.notify();
            })),
            on_success: None,
            on_error: None,
        };

        let vars_for_fn = variables.clone();
        let retryer = Retryer::start(
            move |abort| mutation_fn(vars_for_fn.clone(), abort),
            self.options.retry.clone(),
            self.options.retry_delay.clone(),
            self.options.network_mode,
            can_run,
            hooks,
        );
        *self.retryer.lock() = Some(retryer.clone());
        let outcome = retryer.promise().await;
        self.settle(outcome, variables, context)
    }

    /// spec.md §4.5 / §7: run the terminal lifecycle callbacks and apply
    /// the "original queryFn error wins over callback errors" rule.
    fn settle(
        &self,
        outcome: Result<TData, QueryError>,
        variables: TVariables,
        context: Option<TContext>,
    ) -> Result<TData, QueryError> {
        let result = match outcome {
            Ok(data) => {
                let mut terminal_error = None;
                if let Some(on_success) = &self.options.on_success {
                    if let Err(e) = on_success(&data, &variables, context.as_ref()) {
                        terminal_error = Some(e);
                    }
                }
                if let Some(on_settled) = &self.options.on_settled {
                    if let Err(e) = on_settled(Some(&data), terminal_error.as_ref(), &variables, context.as_ref()) {
                        terminal_error.get_or_insert(e);
                    }
                }
                match terminal_error {
                    Some(error) => Err(error),
                    None => Ok(data),
                }
            }
            Err(error) => {
                // The mutation function itself already failed: its error
                // wins regardless of what onError/onSettled report back
                // (spec.md §7 LifecycleCallbackFailure).
                if let Some(on_error) = &self.options.on_error {
                    let _ = on_error(&error, &variables, context.as_ref());
                }
                if let Some(on_settled) = &self.options.on_settled {
                    let _ = on_settled(None, Some(&error), &variables, context.as_ref());
                }
                Err(error)
            }
        };

        {
            let mut state = self.state.write();
            state.is_paused = false;
            match &result {
                Ok(data) => {
                    state.status = MutationStatus::Success;
                    state.data = Some(data.clone());
                    state.error = None;
                }
                Err(error) => {
                    state.status = MutationStatus::Error;
                    state.error = Some(error.clone());
                }
            }
        }
        self.notify();
        result
    }
}

impl<TData, TVariables, TContext> AnyMutation for Mutation<TData, TVariables, TContext>
where
    TData: Clone + Send + Sync + 'static,
    TVariables: Clone + Send + Sync + 'static,
    TContext: Clone + Send + Sync + 'static,
{
    fn mutation_id(&self) -> MutationId {
        self.id
    }

    fn scope_id(&self) -> Option<String> {
        self.options.scope.as_ref().map(|s| s.id.clone())
    }

    fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().submitted_at
    }

    fn is_paused(&self) -> bool {
        self.state.read().is_paused
    }

    fn resume(&self) {
        if let Some(retryer) = self.retryer.lock().as_ref() {
            retryer.continue_retry();
        }
    }

    fn settled(&self) -> BoxFuture<'static, ()> {
        let retryer = self.retryer.lock().clone();
        match retryer {
            Some(retryer) => async move {
                let _ = retryer.promise().await;
            }
            .boxed(),
            None => async move {}.boxed(),
        }
    }
}

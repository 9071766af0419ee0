//! # query-core
//!
//! An asynchronous state-cache engine: a `Query`/`QueryCache` keyed by a
//! deterministic hash of a JSON-like key, each entry driven by a
//! retry/backoff-aware fetch state machine; a `QueryObserver` layer that
//! derives per-subscriber results (placeholder data, tracked-field change
//! detection, mount/focus/reconnect/interval refetch triggers); and the
//! matching `Mutation`/`MutationCache`/`MutationObserver` machinery, with
//! per-scope FIFO serialization and pause/resume across an offline period.
//!
//! ```ignore
//! use query_core::{QueryClient, QueryKey, QueryOptions};
//! use std::sync::Arc;
//!
//! # async fn fetch_user(id: u32) -> Result<String, query_core::QueryError> { Ok(format!("user-{id}")) }
//! # async fn run() -> Result<(), query_core::QueryError> {
//! let client = QueryClient::new();
//! let key = QueryKey::new(["users", "1"])?;
//! let user = client
//!     .fetch_query(
//!         key,
//!         Arc::new(|_abort| Box::pin(async move { fetch_user(1).await })),
//!         Some(QueryOptions::default()),
//!     )
//!     .await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```
//!
//! What this crate deliberately does not model: framework reactivity
//! bindings, SSR serialization beyond the typed dehydrate/hydrate contract
//! in [`client::dehydrate`], devtools, concrete persistence backends beyond
//! the [`persistence`] contract, infinite-query pagination beyond the
//! page-walking helpers in [`infinite`], and notification batching beyond
//! the injected [`notify_manager`] scheduler. See `DESIGN.md` for the
//! reasoning behind each of these boundaries.

pub mod client;
pub mod error;
pub mod focus_manager;
pub mod infinite;
pub mod key;
pub mod mutation;
pub mod notify_manager;
pub mod online_manager;
pub mod persistence;
pub mod query;
pub mod removable;
pub mod retryer;
pub mod status;
pub mod subscribable;

pub use client::{
    dehydrate_mutation, DehydratedMutation, DehydratedQuery, DehydratedState, QueryClient, QueryClientConfig,
    RefetchType,
};
pub use error::{default_logger, ErrorSeverity, LogRecord, Logger, QueryError, StderrLogger};
pub use focus_manager::{FocusEventSource, FocusManager};
pub use infinite::{infinite_query_fn, GetNextPageParam, InfiniteData, PageFn};
pub use key::{default_hash_fn, CanonicalValue, QueryHash, QueryKey, QueryKeyFilter, QueryKeyHashFn};
pub use mutation::{
    AnyMutation, Mutation, MutationCache, MutationCacheConfig, MutationFn, MutationObserver, MutationObserverResult,
    MutationOptions, MutationScope, MutationState, PerCallCallbacks,
};
pub use notify_manager::NotifyManager;
pub use online_manager::{OnlineEventSource, OnlineManager};
pub use persistence::{MemoryPersistence, PersistenceAdapter};
pub use query::{
    keep_previous_data, AnyQuery, NotifyOnChangeProps, PlaceholderData, Query, QueryCache, QueryFilter,
    QueryFilterType, QueryFnSource, QueryObserver, QueryObserverOptions, QueryObserverResult, QueryOptions,
    QueryState, RefetchInterval, RefetchOnMount, RefetchTrigger, ResultField, SkipToken, StaleTime, TrackedResult,
};
pub use removable::{GcTime, GcTimer, LifecycleResource};
pub use retryer::{AbortSignal, CancelOptions, NetworkMode, RetryDelay, RetryPolicy, Retryer, RetryerHooks};
pub use status::{FetchStatus, MutationId, MutationStatus, ObserverId, QueryStatus};
pub use subscribable::{ListenerId, Listeners};

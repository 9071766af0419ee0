//! Query entity, cache and observer (spec.md §3 Query entry, §4.2–§4.4).

pub mod cache;
pub mod entity;
pub mod observer;
pub mod options;

pub use cache::{QueryCache, QueryFilter, QueryFilterType};
pub use entity::{AnyQuery, Query, QueryState};
pub use observer::{
    keep_previous_data, NotifyOnChangeProps, PlaceholderData, QueryFnSource, QueryObserver,
    QueryObserverOptions, QueryObserverResult, RefetchOnMount, ResultField, SkipToken, TrackedResult,
};
pub use options::{QueryOptions, RefetchInterval, RefetchTrigger, StaleTime};

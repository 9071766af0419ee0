//! Mutation entity and cache (spec.md §3 Mutation entry, §4.5).

pub mod cache;
pub mod entity;
pub mod observer;
pub mod options;

pub use cache::{MutationCache, MutationCacheConfig};
pub use entity::{AnyMutation, Mutation, MutationFn, MutationState};
pub use observer::{MutationObserver, MutationObserverResult, PerCallCallbacks};
pub use options::{MutationOptions, MutationScope};

//! Status enums and id types shared by the query and mutation sides
//! (spec.md §3 / GLOSSARY). Generalized from the teacher's inline `types`
//! module (`QueryStatus`, `MutationStatus`, `QueryObserverId`).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// `status`: the data side of a query entry (spec.md §3 Query entry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryStatus {
    Pending,
    Error,
    Success,
}

/// `fetchStatus`: whether a fetch is currently in flight, independent of
/// whether data is present (spec.md §3: "decoupled from `status`").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStatus {
    Idle,
    Fetching,
    Paused,
}

/// `status`: the lifecycle of a single mutation (spec.md §3 Mutation entry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// Unique identifier for a `QueryObserver` instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Unique identifier for a `Mutation` instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MutationId(u64);

fn next_id(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst)
}

impl ObserverId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(next_id(&COUNTER))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(next_id(&COUNTER))
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

//! Persistence adapter contract (spec.md §1 Non-goals: "persistence
//! adapters beyond the contract" are out of scope — this module is the
//! contract itself, not a concrete localStorage/IndexedDB/filesystem
//! backend). An adapter stores and retrieves opaque bytes keyed by a
//! caller-chosen storage key; what those bytes mean is
//! [`crate::client::dehydrate`]'s business, not this module's.
//!
//! Narrowed from the teacher's `StorageBackend`/`MemoryBackend`
//! (`src/persistence/mod.rs`), which modeled concrete wasm storage
//! backends behind an `async_trait` object. This crate's dehydrate/hydrate
//! contract is synchronous and in-process, so the adapter trait below is
//! synchronous too; an application wiring this to a real async store (a
//! database, a remote KV) bridges that on its own side, the same way the
//! teacher's `#[cfg(target_arch = "wasm32")]` branch bridged to
//! `web_sys::Storage`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::dehydrate::DehydratedState;
use crate::error::QueryError;

/// The storage contract a persistence backend must satisfy. Bytes in,
/// bytes out — serialization format is this module's concern
/// ([`persist_queries`]/[`restore_queries`] use `bincode`), not the
/// adapter's.
pub trait PersistenceAdapter: Send + Sync {
    fn persist(&self, storage_key: &str, bytes: Vec<u8>) -> Result<(), QueryError>;
    fn restore(&self, storage_key: &str) -> Result<Option<Vec<u8>>, QueryError>;
    fn remove(&self, storage_key: &str) -> Result<(), QueryError>;
}

/// An in-process reference adapter, useful in tests and for applications
/// that only need persistence across a hydrate/dehydrate boundary within
/// the same process (e.g. handing a snapshot from a server render to a
/// worker thread).
#[derive(Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl PersistenceAdapter for MemoryPersistence {
    fn persist(&self, storage_key: &str, bytes: Vec<u8>) -> Result<(), QueryError> {
        self.entries.lock().insert(storage_key.to_string(), bytes);
        Ok(())
    }

    fn restore(&self, storage_key: &str) -> Result<Option<Vec<u8>>, QueryError> {
        Ok(self.entries.lock().get(storage_key).cloned())
    }

    fn remove(&self, storage_key: &str) -> Result<(), QueryError> {
        self.entries.lock().remove(storage_key);
        Ok(())
    }
}

/// Serialize a dehydrated snapshot and hand it to `adapter` (spec.md §4.7's
/// dehydrate step, extended one layer to an actual store).
pub fn persist_queries<T: Serialize>(
    adapter: &dyn PersistenceAdapter,
    storage_key: &str,
    state: &DehydratedState<T>,
) -> Result<(), QueryError> {
    let bytes = bincode::serialize(state).map_err(|e| QueryError::Serialization(e.to_string()))?;
    adapter.persist(storage_key, bytes)
}

/// The matching hydrate-side read. Returns `Ok(None)` if nothing was
/// stored under `storage_key`, distinct from a deserialization failure.
pub fn restore_queries<T: DeserializeOwned>(
    adapter: &dyn PersistenceAdapter,
    storage_key: &str,
) -> Result<Option<DehydratedState<T>>, QueryError> {
    match adapter.restore(storage_key)? {
        None => Ok(None),
        Some(bytes) => {
            let state = bincode::deserialize(&bytes).map_err(|e| QueryError::Deserialization(e.to_string()))?;
            Ok(Some(state))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::dehydrate::DehydratedQuery;
    use crate::key::QueryKey;
    use crate::status::QueryStatus;

    #[test]
    fn round_trips_through_memory_adapter() {
        let adapter = MemoryPersistence::new();
        let state = DehydratedState {
            queries: vec![DehydratedQuery {
                query_hash: "[\"users\"]".to_string(),
                query_key: QueryKey::single("users").unwrap(),
                data: Some(42u32),
                data_update_count: 1,
                status: QueryStatus::Success,
            }],
        };

        persist_queries(adapter.as_ref(), "cache", &state).unwrap();
        let restored: DehydratedState<u32> = restore_queries(adapter.as_ref(), "cache").unwrap().unwrap();

        assert_eq!(restored.queries.len(), 1);
        assert_eq!(restored.queries[0].data, Some(42));
    }

    #[test]
    fn restoring_an_unknown_key_returns_none() {
        let adapter = MemoryPersistence::new();
        let restored: Option<DehydratedState<u32>> = restore_queries(adapter.as_ref(), "missing").unwrap();
        assert!(restored.is_none());
    }

    #[test]
    fn remove_drops_the_stored_snapshot() {
        let adapter = MemoryPersistence::new();
        let state = DehydratedState::<u32> { queries: vec![] };
        persist_queries(adapter.as_ref(), "cache", &state).unwrap();
        adapter.remove("cache").unwrap();
        let restored: Option<DehydratedState<u32>> = restore_queries(adapter.as_ref(), "cache").unwrap();
        assert!(restored.is_none());
    }
}

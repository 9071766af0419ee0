//! Query keys, query hashes and key-matching patterns (spec.md §3, §4.3).
//!
//! A `QueryKey` is the "ordered tuple" spec.md describes: a `Vec` of JSON
//! values, each of which may itself be an arbitrary tree of primitives,
//! objects or arrays. Two keys are the same cache entry iff their
//! `queryHash` (computed by `QueryKeyHashFn`) match; the default hash
//! function stably sorts object keys, which `serde_json::Value`'s default
//! `Map` (a `BTreeMap` unless the `preserve_order` feature is enabled,
//! which this crate does not turn on) already guarantees.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::QueryError;

/// The logical identity of a query: an ordered tuple of JSON-representable
/// segments, e.g. `query_key!["users", user_id]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(Vec<CanonicalValue>);

impl QueryKey {
    /// Build a key from any serializable segments.
    pub fn new<T: Serialize>(segments: impl IntoIterator<Item = T>) -> Result<Self, QueryError> {
        let segments = segments
            .into_iter()
            .map(|segment| {
                serde_json::to_value(segment)
                    .map(CanonicalValue)
                    .map_err(|e| QueryError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }

    /// Build a key from a single serializable value, wrapped in a one-tuple.
    pub fn single<T: Serialize>(segment: T) -> Result<Self, QueryError> {
        Self::new([segment])
    }

    pub fn segments(&self) -> &[CanonicalValue] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// spec.md §4.3: prefix matching for `setQueryDefaults`/filters — the
    /// longest matching prefix wins; this just tests containment.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.0.len() <= self.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", seg.0)?;
        }
        write!(f, "]")
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        Self(vec![CanonicalValue(Value::String(s.to_string()))])
    }
}

impl From<String> for QueryKey {
    fn from(s: String) -> Self {
        Self(vec![CanonicalValue(Value::String(s))])
    }
}

/// A `serde_json::Value` with a total order, so `QueryKey` can live in a
/// `BTreeMap`-keyed structure if desired and be compared in property tests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalValue(pub Value);

impl PartialEq for CanonicalValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for CanonicalValue {}

impl PartialOrd for CanonicalValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Values don't implement Ord; compare on their canonical string
        // encoding, which is sufficient for the deterministic-hash and
        // prefix-matching uses this type is put to.
        canonical_string(&self.0).cmp(&canonical_string(&other.0))
    }
}

fn canonical_string(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// The deterministic `queryHash` computed from a `QueryKey` (spec.md §3).
/// Two `QueryKey`s hash equal iff their canonical JSON encodings are equal —
/// object keys are sorted (the non-`preserve_order` `serde_json::Map`
/// default), so `{a:1,b:2}` and `{b:2,a:1}` hash identically.
pub type QueryHash = String;

/// A user-overridable hash function (spec.md §3: "a user-overridable hash
/// function whose default stably sorts object keys").
pub type QueryKeyHashFn = Arc<dyn Fn(&QueryKey) -> QueryHash + Send + Sync>;

pub fn default_hash_fn() -> QueryKeyHashFn {
    Arc::new(|key: &QueryKey| {
        let values: Vec<&Value> = key.0.iter().map(|c| &c.0).collect();
        serde_json::to_string(&values).unwrap_or_default()
    })
}

/// Filters over a `QueryKey`, used by `QueryCache::find`/`findAll` and by
/// `QueryClient::invalidateQueries`/`setQueriesData` (spec.md §4.3).
#[derive(Clone)]
pub enum QueryKeyFilter {
    /// Match iff the hash of `key` equals the hash of this pattern's key
    /// (when `exact` is true) or the query key starts with it.
    Key { key: QueryKey, exact: bool },
    /// A prefix match regardless of the `exact` flag (used by
    /// `setQueryDefaults`'s longest-prefix-wins resolution).
    Prefix(QueryKey),
}

impl QueryKeyFilter {
    pub fn exact(key: QueryKey) -> Self {
        Self::Key { key, exact: true }
    }

    pub fn prefix(key: QueryKey) -> Self {
        Self::Key { key, exact: false }
    }

    pub fn matches(&self, candidate: &QueryKey) -> bool {
        match self {
            QueryKeyFilter::Key { key, exact: true } => candidate == key,
            QueryKeyFilter::Key { key, exact: false } => candidate.starts_with(key),
            QueryKeyFilter::Prefix(key) => candidate.starts_with(key),
        }
    }
}

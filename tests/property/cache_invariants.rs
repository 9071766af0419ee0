//! Property-based tests for query-key hashing, filter matching, retry
//! bounds and structural sharing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use query_core::{
    default_hash_fn, NetworkMode, Query, QueryError, QueryKey, QueryKeyFilter, QueryOptions, RetryDelay, RetryPolicy,
};

fn can_run_always() -> Arc<dyn Fn() -> bool + Send + Sync> {
    Arc::new(|| true)
}

fn segments_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{1,8}", 0..6)
}

proptest! {
    /// Hashing the same segments twice always produces the same hash, and
    /// a `QueryKey` built from the same segments always equals itself —
    /// the cache has no business ever disagreeing with itself about a
    /// key's identity.
    #[test]
    fn hash_is_deterministic_for_identical_segments(segments in segments_strategy()) {
        let hash = default_hash_fn();
        let a = QueryKey::new(segments.clone()).unwrap();
        let b = QueryKey::new(segments).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(hash(&a), hash(&b));
    }

    /// Appending one more segment to a key always yields a key the
    /// original `starts_with`, and an exact filter built from the
    /// original never matches the extended key.
    #[test]
    fn extending_a_key_preserves_prefix_matching(segments in segments_strategy(), extra in "[a-z0-9]{1,8}") {
        let base = QueryKey::new(segments.clone()).unwrap();
        let mut extended_segments = segments;
        extended_segments.push(extra);
        let extended = QueryKey::new(extended_segments).unwrap();

        prop_assert!(extended.starts_with(&base));
        prop_assert!(QueryKeyFilter::prefix(base.clone()).matches(&extended));

        if base != extended {
            prop_assert!(!QueryKeyFilter::exact(base).matches(&extended));
        }
    }

    /// A key never starts with a prefix longer than itself, and a prefix
    /// filter never matches a key strictly shorter than the pattern.
    #[test]
    fn a_shorter_key_never_matches_a_longer_prefix_filter(segments in segments_strategy(), extra in "[a-z0-9]{1,8}") {
        let short = QueryKey::new(segments.clone()).unwrap();
        let mut longer_segments = segments;
        longer_segments.push(extra);
        let longer = QueryKey::new(longer_segments).unwrap();

        prop_assert!(!short.starts_with(&longer));
        prop_assert!(!QueryKeyFilter::prefix(longer).matches(&short));
    }

    /// Object-segment key order never affects the hash: every permutation
    /// of the same key/value pairs collapses to one canonical encoding.
    #[test]
    fn object_segment_key_order_never_affects_the_hash(
        a in 0i32..1000, b in 0i32..1000, c in 0i32..1000,
    ) {
        let hash = default_hash_fn();
        let forward = QueryKey::single(serde_json::json!({ "a": a, "b": b, "c": c })).unwrap();
        let shuffled = QueryKey::single(serde_json::json!({ "c": c, "a": a, "b": b })).unwrap();
        prop_assert_eq!(hash(&forward), hash(&shuffled));
    }
}

fn options_with_retry(count: u32) -> QueryOptions<u32> {
    QueryOptions {
        retry: RetryPolicy::Count(count),
        retry_delay: RetryDelay::fixed(Duration::from_millis(1)),
        network_mode: NetworkMode::Always,
        ..Default::default()
    }
}

proptest! {
    /// `RetryPolicy::Count(n)` always attempts exactly `n + 1` times
    /// against a fetch function that never succeeds: the initial attempt
    /// plus exactly `n` retries, never more and never fewer.
    #[test]
    fn retry_count_bounds_the_total_attempts(count in 0u32..5) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let key = QueryKey::single("retry-bound").unwrap();
            let query = Query::new("retry-hash".to_string(), key, options_with_retry(count), can_run_always());
            let attempts = Arc::new(AtomicU32::new(0));
            let attempts_fn = attempts.clone();

            let result = query
                .fetch(Arc::new(move |_abort| {
                    let attempts = attempts_fn.clone();
                    Box::pin(async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(QueryError::network("always fails"))
                    })
                }))
                .await;

            prop_assert!(result.is_err());
            prop_assert_eq!(attempts.load(Ordering::SeqCst), count + 1);
            Ok(())
        })?;
    }

    /// Structural sharing never loses data: whatever the fetch returns is
    /// exactly what the next read observes, regardless of whether the
    /// value happened to equal the one already cached.
    #[test]
    fn structural_sharing_never_changes_the_observed_value(first in prop::collection::vec(0i32..50, 0..5), second in prop::collection::vec(0i32..50, 0..5)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let key = QueryKey::single("structural").unwrap();
            let mut options = QueryOptions::<Vec<i32>>::default();
            options.structural_sharing = true;
            let query = Query::new("structural-hash".to_string(), key, options, can_run_always());

            let first_clone = first.clone();
            query.fetch(Arc::new(move |_abort| {
                let v = first_clone.clone();
                Box::pin(async move { Ok(v) })
            })).await.unwrap();
            prop_assert_eq!(query.state().data, Some(first));

            let second_clone = second.clone();
            query.fetch(Arc::new(move |_abort| {
                let v = second_clone.clone();
                Box::pin(async move { Ok(v) })
            })).await.unwrap();
            prop_assert_eq!(query.state().data, Some(second));
            Ok(())
        })?;
    }
}

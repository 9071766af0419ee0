//! Unit tests for `Mutation`'s lifecycle and `MutationCache`'s scope
//! serialization.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use query_core::{
    AnyMutation, Mutation, MutationCache, MutationCacheConfig, MutationId, MutationOptions, MutationScope,
    MutationStatus, QueryError, RetryPolicy,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    value: String,
    metadata: Option<String>,
}

fn can_run_always() -> Arc<dyn Fn() -> bool + Send + Sync> {
    Arc::new(|| true)
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_success_path_transitions_through_pending_to_success() {
    let mutation: Arc<Mutation<TestData, u32, ()>> = Mutation::new(MutationId::new(), MutationOptions::default());
    assert_eq!(mutation.state().status, MutationStatus::Idle);

    let result = mutation
        .execute(
            7,
            Arc::new(|variables: u32, _abort| {
                Box::pin(async move { Ok(TestData { id: variables, value: "created".to_string(), metadata: None }) })
            }),
            can_run_always(),
        )
        .await;

    assert!(result.is_ok());
    let state = mutation.state();
    assert_eq!(state.status, MutationStatus::Success);
    assert_eq!(state.data.unwrap().id, 7);
    assert_eq!(state.variables, Some(7));
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_failure_path_records_the_query_fn_error() {
    let mutation: Arc<Mutation<TestData, u32, ()>> =
        Mutation::new(MutationId::new(), MutationOptions { retry: RetryPolicy::Never, ..Default::default() });

    let result = mutation
        .execute(1, Arc::new(|_variables, _abort| Box::pin(async { Err(QueryError::network("down")) })), can_run_always())
        .await;

    assert!(result.is_err());
    let state = mutation.state();
    assert_eq!(state.status, MutationStatus::Error);
    assert!(state.error.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn mutations_do_not_retry_by_default() {
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_fn = attempts.clone();
    let mutation: Arc<Mutation<TestData, u32, ()>> = Mutation::new(MutationId::new(), MutationOptions::default());

    let _ = mutation
        .execute(
            1,
            Arc::new(move |_variables, _abort| {
                let attempts = attempts_fn.clone();
                Box::pin(async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(QueryError::network("still down"))
                })
            }),
            can_run_always(),
        )
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_observe_every_state_transition() {
    let mutation: Arc<Mutation<TestData, u32, ()>> = Mutation::new(MutationId::new(), MutationOptions::default());
    let seen_statuses = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = seen_statuses.clone();
    let _id = mutation.subscribe(move |state| seen.lock().push(state.status));

    mutation
        .execute(
            1,
            Arc::new(|v, _abort| Box::pin(async move { Ok(TestData { id: v, value: "ok".to_string(), metadata: None }) })),
            can_run_always(),
        )
        .await
        .unwrap();

    let statuses = seen_statuses.lock();
    assert!(statuses.contains(&MutationStatus::Pending));
    assert!(statuses.contains(&MutationStatus::Success));
}

#[tokio::test(flavor = "multi_thread")]
async fn scoped_mutations_run_one_at_a_time_in_submission_order() {
    let cache = MutationCache::new(can_run_always(), MutationCacheConfig::default());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let scope = MutationScope::new("accounts");

    let mut handles = Vec::new();
    for i in 0..3u32 {
        let cache = cache.clone();
        let order = order.clone();
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            let options = MutationOptions { scope: Some(scope), ..Default::default() };
            let (_mutation, result): (_, Result<u32, QueryError>) = cache
                .dispatch::<u32, u32, ()>(
                    options,
                    i,
                    Arc::new(move |v, _abort| {
                        let order = order.clone();
                        Box::pin(async move {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            order.lock().push(v);
                            Ok(v)
                        })
                    }),
                )
                .await;
            result
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unscoped_mutations_may_interleave() {
    let cache = MutationCache::new(can_run_always(), MutationCacheConfig::default());

    let fast = cache.dispatch::<u32, u32, ()>(
        MutationOptions::default(),
        1,
        Arc::new(|v, _abort| Box::pin(async move { Ok(v) })),
    );
    let slow = cache.dispatch::<u32, u32, ()>(
        MutationOptions::default(),
        2,
        Arc::new(|v, _abort| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(v)
            })
        }),
    );

    let ((_, fast_result), (_, slow_result)) = tokio::join!(fast, slow);
    assert_eq!(fast_result.unwrap(), 1);
    assert_eq!(slow_result.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn find_by_scope_and_remove_operate_on_the_cache_wide_registry() {
    let cache = MutationCache::new(can_run_always(), MutationCacheConfig::default());
    let scope = MutationScope::new("billing");
    let options = MutationOptions { scope: Some(scope.clone()), ..Default::default() };

    let (mutation, result): (_, Result<u32, QueryError>) = cache
        .dispatch::<u32, u32, ()>(options, 1, Arc::new(|v, _abort| Box::pin(async move { Ok(v) })))
        .await;
    assert!(result.is_ok());

    assert_eq!(cache.find_by_scope(&scope.id).len(), 1);
    cache.remove(mutation.mutation_id());
    assert_eq!(cache.find_by_scope(&scope.id).len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn get_all_and_clear_reflect_the_cache_wide_registry() {
    let cache = MutationCache::new(can_run_always(), MutationCacheConfig::default());
    assert_eq!(cache.get_all().len(), 0);

    let _ = cache
        .dispatch::<u32, u32, ()>(MutationOptions::default(), 1, Arc::new(|v, _abort| Box::pin(async move { Ok(v) })))
        .await;
    assert_eq!(cache.get_all().len(), 1);

    cache.clear();
    assert_eq!(cache.get_all().len(), 0);
}

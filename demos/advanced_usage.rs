//! Exercises the parts of `query-core` a simple `fetch_query` call doesn't
//! reach: a live `QueryObserver` subscription, scope-serialized mutations,
//! and an infinite (paginated) query walk.
//!
//! Run with `cargo run --example advanced_usage`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use query_core::{
    MutationCache, MutationCacheConfig, MutationOptions, MutationScope, QueryClient, QueryError, QueryFnSource, QueryKey,
    QueryObserver, QueryObserverOptions, QueryOptions, RetryPolicy,
};

#[derive(Clone, Debug, PartialEq)]
struct Post {
    id: u32,
    title: String,
}

async fn fetch_post_page(page: u32) -> Result<Vec<Post>, QueryError> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    const PAGE_SIZE: u32 = 3;
    const TOTAL_PAGES: u32 = 3;
    if page >= TOTAL_PAGES {
        return Ok(Vec::new());
    }
    let start = page * PAGE_SIZE;
    Ok((start..start + PAGE_SIZE).map(|id| Post { id, title: format!("Post {id}") }).collect())
}

/// Subscribe a `QueryObserver` to a freshly built `Query` and print every
/// derived result it emits until the query settles.
async fn observe_user_count(client: &Arc<QueryClient>) -> Result<(), QueryError> {
    let key = QueryKey::new(["users", "count"])?;
    let options = QueryOptions::<u32> { retry: RetryPolicy::Never, ..Default::default() };
    let query = client.query_cache().build::<u32>(key, options)?;

    let fetcher: QueryFnSource<u32> = QueryFnSource::Enabled(Arc::new(|_abort| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(42)
        })
    }));
    let observer = QueryObserver::new(query, fetcher, QueryObserverOptions::default());

    let _subscription = observer.subscribe(|result| {
        println!("observer saw: status={:?} data={:?}", result.status, result.data);
    });

    // Subscribing already triggered a mount fetch; wait for it to settle.
    tokio::time::sleep(Duration::from_millis(60)).await;
    Ok(())
}

/// Dispatch three mutations sharing one scope id and confirm they ran
/// strictly FIFO rather than interleaved.
async fn run_scoped_mutations(order: &Arc<parking_lot::Mutex<Vec<u32>>>) {
    let can_run: Arc<dyn Fn() -> bool + Send + Sync> = Arc::new(|| true);
    let cache = MutationCache::new(can_run, MutationCacheConfig::default());
    let scope = MutationScope::new("posts-author-1");

    let mut handles = Vec::new();
    for id in 0..3u32 {
        let cache = cache.clone();
        let order = order.clone();
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            let options = MutationOptions::<u32, u32, ()> { scope: Some(scope), retry: RetryPolicy::Never, ..Default::default() };
            cache
                .dispatch(
                    options,
                    id,
                    Arc::new(move |variables, _abort| {
                        let order = order.clone();
                        Box::pin(async move {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            order.lock().push(variables);
                            Ok(variables)
                        })
                    }),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::main]
async fn main() -> Result<(), QueryError> {
    let client = QueryClient::new();

    println!("-- live observer --");
    observe_user_count(&client).await?;

    println!("-- scope-serialized mutations --");
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    run_scoped_mutations(&order).await;
    println!("mutation completion order: {:?}", order.lock());

    println!("-- infinite query page walk --");
    let key = QueryKey::single("post-feed")?;
    let calls = Arc::new(AtomicU32::new(0));
    let calls_for_fetch = calls.clone();
    let feed = client
        .fetch_infinite_query(
            key,
            0u32,
            Arc::new(move |page, _abort| {
                let calls = calls_for_fetch.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    fetch_post_page(page).await
                })
            }),
            Arc::new(|last_page: &Vec<Post>, _all_pages, last_param: &u32| {
                if last_page.is_empty() { None } else { Some(last_param + 1) }
            }),
            5,
            None,
        )
        .await?;
    println!("fetched {} page(s), {} total post(s), {} page fetch(es)", feed.page_params.len(), feed.pages.iter().flatten().count(), calls.load(Ordering::SeqCst));

    Ok(())
}

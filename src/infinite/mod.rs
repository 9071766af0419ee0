//! Infinite-query page-walking (spec.md §4.6, §1 Non-goals: "infinite-query
//! pagination reducers beyond the page-walking contract noted in §4" — this
//! module stops exactly there, it does not reintroduce a reducer/signal
//! layer). `fetchInfiniteQuery`/`prefetchInfiniteQuery` seed the walk with
//! an initial page param, then keep calling the page function with the
//! param `get_next_page_param` returns, stopping once it returns `None` or
//! `max_pages` pages have been fetched.
//!
//! Grounded on the teacher's `Page`/`PageInfo`/`InfiniteQueryOptions`
//! (`src/infinite/mod.rs`), generalized from its `RwSignal`-backed
//! reactive result (dependent on the dropped leptos reactivity surface, see
//! `DESIGN.md`) into a page-walking `QueryFn` that slots into the existing
//! `Query`/`Retryer` machinery unchanged: a whole infinite-query walk is one
//! fetch as far as `Query<InfiniteData<TPage, TParam>>` is concerned, so it
//! gets retry/backoff, staleness and gc for free.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::QueryError;
use crate::key::QueryKey;
use crate::query::entity::QueryFn;
use crate::query::options::QueryOptions;
use crate::retryer::AbortSignal;

use super::client::QueryClient;

/// The accumulated result of a page walk: every page fetched so far, and
/// the param that produced each one (spec.md §4.6 `InfiniteData`).
#[derive(Clone)]
pub struct InfiniteData<TPage, TParam> {
    pub pages: Vec<TPage>,
    pub page_params: Vec<TParam>,
}

impl<TPage: PartialEq, TParam: PartialEq> PartialEq for InfiniteData<TPage, TParam> {
    fn eq(&self, other: &Self) -> bool {
        self.pages == other.pages && self.page_params == other.page_params
    }
}

/// One page's fetch function, parameterized over the page param (spec.md
/// §4.6: `queryFn` for an infinite query receives `pageParam`).
pub type PageFn<TPage, TParam> =
    Arc<dyn Fn(TParam, AbortSignal) -> Pin<Box<dyn Future<Output = Result<TPage, QueryError>> + Send>> + Send + Sync>;

/// `getNextPageParam(lastPage, allPages, lastPageParam) -> Option<param>`
/// (spec.md §4.6). Returning `None` stops the walk.
pub type GetNextPageParam<TPage, TParam> = Arc<dyn Fn(&TPage, &[TPage], &TParam) -> Option<TParam> + Send + Sync>;

/// Build the `QueryFn` that performs the whole page walk, for use with
/// [`QueryClient::fetch_infinite_query`] or directly with
/// `QueryClient::fetch_query`/`ensure_query_data`.
pub fn infinite_query_fn<TPage, TParam>(
    initial_param: TParam,
    page_fn: PageFn<TPage, TParam>,
    get_next_page_param: GetNextPageParam<TPage, TParam>,
    max_pages: usize,
) -> QueryFn<InfiniteData<TPage, TParam>>
where
    TPage: Clone + Send + Sync + 'static,
    TParam: Clone + Send + Sync + 'static,
{
    Arc::new(move |abort: AbortSignal| {
        let initial_param = initial_param.clone();
        let page_fn = page_fn.clone();
        let get_next_page_param = get_next_page_param.clone();
        Box::pin(async move {
            let mut pages = Vec::new();
            let mut page_params = Vec::new();
            let mut next_param = Some(initial_param);
            while let Some(param) = next_param.take() {
                if abort.is_aborted() {
                    return Err(QueryError::Cancelled);
                }
                let page = page_fn(param.clone(), abort.clone()).await?;
                let candidate = if pages.len() + 1 >= max_pages {
                    None
                } else {
                    get_next_page_param(&page, &pages, &param)
                };
                page_params.push(param);
                pages.push(page);
                next_param = candidate;
            }
            Ok(InfiniteData { pages, page_params })
        })
    })
}

impl QueryClient {
    /// `fetchInfiniteQuery` (spec.md §4.6): walk up to `max_pages` pages
    /// starting from `initial_param`, caching the whole accumulated result
    /// under `key` the same way a regular query caches its single value.
    pub async fn fetch_infinite_query<TPage, TParam>(
        self: &Arc<Self>,
        key: QueryKey,
        initial_param: TParam,
        page_fn: PageFn<TPage, TParam>,
        get_next_page_param: GetNextPageParam<TPage, TParam>,
        max_pages: usize,
        options: Option<QueryOptions<InfiniteData<TPage, TParam>>>,
    ) -> Result<InfiniteData<TPage, TParam>, QueryError>
    where
        TPage: Clone + Send + Sync + PartialEq + 'static,
        TParam: Clone + Send + Sync + PartialEq + 'static,
    {
        let walker = infinite_query_fn(initial_param, page_fn, get_next_page_param, max_pages);
        self.fetch_query(key, walker, options).await
    }

    /// `prefetchInfiniteQuery`: like [`fetch_infinite_query`], but failures
    /// are logged rather than propagated (spec.md §4.6, mirroring
    /// `prefetch_query`'s best-effort contract).
    pub async fn prefetch_infinite_query<TPage, TParam>(
        self: &Arc<Self>,
        key: QueryKey,
        initial_param: TParam,
        page_fn: PageFn<TPage, TParam>,
        get_next_page_param: GetNextPageParam<TPage, TParam>,
        max_pages: usize,
        options: Option<QueryOptions<InfiniteData<TPage, TParam>>>,
    ) where
        TPage: Clone + Send + Sync + PartialEq + 'static,
        TParam: Clone + Send + Sync + PartialEq + 'static,
    {
        if let Err(error) = self
            .fetch_infinite_query(key, initial_param, page_fn, get_next_page_param, max_pages, options)
            .await
        {
            self.log("prefetch_infinite_query", &error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retryer::{NetworkMode, RetryDelay, RetryPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn page_fn(calls: Arc<AtomicU32>) -> PageFn<Vec<u32>, u32> {
        Arc::new(move |param, _abort| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![param * 10, param * 10 + 1])
            })
        })
    }

    fn next_param() -> GetNextPageParam<Vec<u32>, u32> {
        Arc::new(|_last_page, all_pages, last_param| {
            if all_pages.len() >= 2 {
                None
            } else {
                Some(last_param + 1)
            }
        })
    }

    fn options() -> QueryOptions<InfiniteData<Vec<u32>, u32>> {
        QueryOptions {
            retry: RetryPolicy::Never,
            retry_delay: RetryDelay::fixed(Duration::from_millis(1)),
            network_mode: NetworkMode::Always,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn walks_pages_until_get_next_page_param_returns_none() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let result = client
            .fetch_infinite_query(
                QueryKey::single("posts").unwrap(),
                0u32,
                page_fn(calls.clone()),
                next_param(),
                10,
                Some(options()),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.page_params, vec![0, 1, 2]);
        assert_eq!(result.pages, vec![vec![0, 1], vec![10, 11], vec![20, 21]]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn max_pages_caps_the_walk_even_if_more_pages_remain() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let result = client
            .fetch_infinite_query(
                QueryKey::single("capped").unwrap(),
                0u32,
                page_fn(calls.clone()),
                next_param(),
                1,
                Some(options()),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.pages, vec![vec![0, 1]]);
    }
}

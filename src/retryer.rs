//! The `Retryer` (spec.md §4.1): a pause-capable, cancel-capable async task
//! wrapper with an exponential-backoff retry policy and network-mode-aware
//! pausing. This is the cross-cutting primitive both `Query::fetch` and
//! `Mutation::execute` build on.
//!
//! Grounded on the teacher's `src/retry/mod.rs` (`execute_with_retry`,
//! `RetryConfig`, `RetryDelay`) generalized from a one-shot retry loop into
//! a resumable state machine, and on the gaucho-labs sibling's
//! `oneshot`-channel cancellation pattern (`Query::new_execution` /
//! `execute_with_cancellation`) generalized to a `watch`-backed abort
//! signal so multiple in-flight attempts can observe the same cancellation.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::QueryError;

/// Cooperative cancellation handle passed into the wrapped task function.
/// spec.md §5: "Aborting a fetch propagates an abort signal to the query
/// function; the query function is expected to honor it cooperatively."
#[derive(Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
    observed: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Reading `is_aborted` is how a query function "references" the
    /// signal (spec.md §5), so every call marks it observed regardless of
    /// the returned value.
    pub fn is_aborted(&self) -> bool {
        self.observed.store(true, Ordering::SeqCst);
        self.aborted.load(Ordering::SeqCst)
    }

    fn trip(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// spec.md §4.1 / §4.2: whether anything ever asked whether the fetch
    /// was aborted — used to decide whether the cache may let an orphaned
    /// fetch run to completion (spec.md §5: "If no observer has referenced
    /// the abort signal, the cache keeps the fetch alive").
    pub fn was_observed(&self) -> bool {
        self.observed.load(Ordering::SeqCst)
    }
}

/// `retry` policy: bool | number | fn(count, err) -> bool (spec.md §4.1).
#[derive(Clone)]
pub enum RetryPolicy {
    Never,
    Always,
    /// `retry = n`: retry while `failure_count <= n`, i.e. at most `n + 1`
    /// total attempts (spec.md §8 boundary behavior).
    Count(u32),
    Predicate(Arc<dyn Fn(u32, &QueryError) -> bool + Send + Sync>),
}

impl RetryPolicy {
    fn should_retry(&self, failure_count: u32, error: &QueryError) -> bool {
        if !error.is_retryable() {
            return false;
        }
        match self {
            RetryPolicy::Never => false,
            RetryPolicy::Always => true,
            RetryPolicy::Count(n) => failure_count <= *n,
            RetryPolicy::Predicate(f) => f(failure_count, error),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Count(3)
    }
}

impl From<bool> for RetryPolicy {
    fn from(value: bool) -> Self {
        if value {
            RetryPolicy::Always
        } else {
            RetryPolicy::Never
        }
    }
}

impl From<u32> for RetryPolicy {
    fn from(value: u32) -> Self {
        RetryPolicy::Count(value)
    }
}

/// `retryDelay` policy: defaults to `min(1000 * 2^count, 30000)` ms
/// (spec.md §4.1).
#[derive(Clone)]
pub struct RetryDelay(Arc<dyn Fn(u32, &QueryError) -> Duration + Send + Sync>);

impl RetryDelay {
    pub fn new(f: impl Fn(u32, &QueryError) -> Duration + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn fixed(duration: Duration) -> Self {
        Self::new(move |_, _| duration)
    }

    fn calculate(&self, attempt: u32, error: &QueryError) -> Duration {
        (self.0)(attempt, error)
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self::new(|attempt, _| {
            let millis = 1000u64.saturating_mul(1u64 << attempt.min(20));
            Duration::from_millis(millis.min(30_000))
        })
    }
}

/// The policy deciding whether a fetch runs, pauses, or always proceeds
/// relative to the online signal (spec.md §4.1, GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkMode {
    /// Requires online; pauses otherwise. The default.
    Online,
    /// Never pauses, regardless of the online signal.
    Always,
    /// The first attempt runs regardless of online; retries pause when
    /// offline.
    OfflineFirst,
}

impl Default for NetworkMode {
    fn default() -> Self {
        NetworkMode::Online
    }
}

impl NetworkMode {
    fn requires_online(self, attempt: u32) -> bool {
        match self {
            NetworkMode::Always => false,
            NetworkMode::Online => true,
            NetworkMode::OfflineFirst => attempt > 0,
        }
    }
}

/// Options for `Retryer::cancel`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CancelOptions {
    /// Report the error that was current before cancellation instead of a
    /// fresh `Cancelled` error (spec.md §4.2: `cancelQueries({revert:true})`
    /// "explicitly aborts and reverts state to pre-fetch").
    pub revert: bool,
    /// Suppress `onError`/`onSuccess` callbacks for this resolution.
    pub silent: bool,
}

struct Shared_<T> {
    failure_count: AtomicU32,
    paused: AtomicBool,
    cancelled: AtomicBool,
    cancel_opts: Mutex<CancelOptions>,
    cancel_retry_requested: AtomicBool,
    abort: AbortSignal,
    resume: Notify,
    last_error: Mutex<Option<QueryError>>,
    _marker: std::marker::PhantomData<T>,
}

/// Hooks a caller supplies to observe a `Retryer`'s lifecycle, mirroring
/// spec.md §4.1's `onFail`/`onPause`/`onContinue`/`onSuccess`/`onError`.
pub struct RetryerHooks<T> {
    pub on_fail: Option<Arc<dyn Fn(u32, &QueryError) + Send + Sync>>,
    pub on_pause: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_continue: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_success: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&QueryError) + Send + Sync>>,
}

impl<T> Default for RetryerHooks<T> {
    fn default() -> Self {
        Self {
            on_fail: None,
            on_pause: None,
            on_continue: None,
            on_success: None,
            on_error: None,
        }
    }
}

/// A pause-capable, cancel-capable wrapper around a retried async task.
pub struct Retryer<T: Clone + Send + Sync + 'static> {
    shared: Arc<Shared_<T>>,
    promise: Shared<BoxFuture<'static, Result<T, QueryError>>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Retryer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            promise: self.promise.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Retryer<T> {
    /// Start a new retryer. `task` is invoked once per attempt with a fresh
    /// `AbortSignal`; `can_run` models `networkMode`'s online check.
    pub fn start<F, Fut>(
        task: F,
        retry: RetryPolicy,
        retry_delay: RetryDelay,
        network_mode: NetworkMode,
        can_run: Arc<dyn Fn() -> bool + Send + Sync>,
        hooks: RetryerHooks<T>,
    ) -> Self
    where
        F: Fn(AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let shared = Arc::new(Shared_ {
            failure_count: AtomicU32::new(0),
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            cancel_opts: Mutex::new(CancelOptions::default()),
            cancel_retry_requested: AtomicBool::new(false),
            abort: AbortSignal::default(),
            resume: Notify::new(),
            last_error: Mutex::new(None),
            _marker: std::marker::PhantomData,
        });

        let run_shared = shared.clone();
        let fut: BoxFuture<'static, Result<T, QueryError>> = Box::pin(async move {
            run(run_shared, task, retry, retry_delay, network_mode, can_run, hooks).await
        });

        Self {
            shared,
            promise: fut.shared(),
        }
    }

    /// The in-flight (or already-settled) promise, shared across however
    /// many observers subscribed before it started (spec.md §3 invariant 1).
    pub fn promise(&self) -> Shared<BoxFuture<'static, Result<T, QueryError>>> {
        self.promise.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.promise.peek().is_some()
    }

    pub fn failure_count(&self) -> u32 {
        self.shared.failure_count.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// spec.md §4.1: whether the wrapped transport honors cooperative
    /// cancellation (i.e. whether anything ever inspected the abort
    /// signal). Exposed so `Query` can decide whether to let an orphaned
    /// fetch run to completion.
    pub fn is_transport_cancelable(&self) -> bool {
        self.shared.abort.was_observed()
    }

    /// Abort the in-flight attempt and terminate the retryer.
    pub fn cancel(&self, options: CancelOptions) {
        *self.shared.cancel_opts.lock() = options;
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.abort.trip();
        self.shared.resume.notify_waiters();
    }

    /// Stop waiting for the next retry (delay or pause) and resolve
    /// immediately with the last error, without incrementing the failure
    /// count further.
    pub fn cancel_retry(&self) {
        self.shared.cancel_retry_requested.store(true, Ordering::SeqCst);
        self.shared.resume.notify_waiters();
    }

    /// Force a resume attempt regardless of `can_run` (used to force-retry
    /// a paused mutation/query once the caller knows conditions changed).
    pub fn continue_retry(&self) {
        self.shared.resume.notify_waiters();
    }

    /// Alias kept for symmetry with spec.md's `continue()` operation name.
    pub fn r#continue(&self) {
        self.continue_retry();
    }
}

async fn run<T, F, Fut>(
    shared: Arc<Shared_<T>>,
    task: F,
    retry: RetryPolicy,
    retry_delay: RetryDelay,
    network_mode: NetworkMode,
    can_run: Arc<dyn Fn() -> bool + Send + Sync>,
    hooks: RetryerHooks<T>,
) -> Result<T, QueryError>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
{
    let mut attempt: u32 = 0;

    loop {
        if shared.cancelled.load(Ordering::SeqCst) {
            return resolve_cancelled(&shared, &hooks);
        }

        if network_mode.requires_online(attempt) && !can_run() {
            shared.paused.store(true, Ordering::SeqCst);
            if let Some(on_pause) = &hooks.on_pause {
                on_pause();
            }
            while !shared.cancelled.load(Ordering::SeqCst) && !can_run() {
                shared.resume.notified().await;
            }
            shared.paused.store(false, Ordering::SeqCst);
            if shared.cancelled.load(Ordering::SeqCst) {
                return resolve_cancelled(&shared, &hooks);
            }
            if let Some(on_continue) = &hooks.on_continue {
                on_continue();
            }
        }

        let cancel_wait = async {
            loop {
                if shared.cancelled.load(Ordering::SeqCst) {
                    return;
                }
                shared.resume.notified().await;
            }
        };

        // Race the attempt against cancellation so `cancel()` settles the
        // promise immediately even when the wrapped task never inspects
        // its `AbortSignal` (spec.md §5: the task is only *expected* to
        // honor it cooperatively, not required to for cancel() to work).
        let outcome = tokio::select! {
            biased;
            _ = cancel_wait => None,
            res = task(shared.abort.clone()) => Some(res),
        };

        let result = match outcome {
            None => return resolve_cancelled(&shared, &hooks),
            Some(r) => r,
        };

        match result {
            Ok(value) => {
                if let Some(on_success) = &hooks.on_success {
                    on_success(&value);
                }
                return Ok(value);
            }
            Err(error) => {
                *shared.last_error.lock() = Some(error.clone());

                if shared.cancelled.load(Ordering::SeqCst) {
                    return resolve_cancelled(&shared, &hooks);
                }

                let failure_count = shared.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(on_fail) = &hooks.on_fail {
                    on_fail(failure_count, &error);
                }

                if !retry.should_retry(failure_count, &error) {
                    if let Some(on_error) = &hooks.on_error {
                        on_error(&error);
                    }
                    return Err(error);
                }

                let delay = retry_delay.calculate(failure_count - 1, &error);
                let cancel_retry = wait_or_cancel_retry(&shared, delay).await;
                if cancel_retry || shared.cancelled.load(Ordering::SeqCst) {
                    if let Some(on_error) = &hooks.on_error {
                        on_error(&error);
                    }
                    return Err(error);
                }
                attempt += 1;
            }
        }
    }
}

/// Waits for `delay`, but returns early (with `true`) if `cancel_retry` or
/// `cancel` is requested mid-wait.
async fn wait_or_cancel_retry<T>(shared: &Arc<Shared_<T>>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            _ = shared.resume.notified() => {
                if shared.cancel_retry_requested.load(Ordering::SeqCst)
                    || shared.cancelled.load(Ordering::SeqCst)
                {
                    return true;
                }
            }
        }
    }
}

fn resolve_cancelled<T>(shared: &Arc<Shared_<T>>, hooks: &RetryerHooks<T>) -> Result<T, QueryError> {
    let options = *shared.cancel_opts.lock();
    let error = if options.revert {
        shared
            .last_error
            .lock()
            .clone()
            .unwrap_or(QueryError::CancelledRevert)
    } else {
        QueryError::Cancelled
    };
    if !options.silent {
        if let Some(on_error) = &hooks.on_error {
            on_error(&error);
        }
    }
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as AU32;

    fn always_online() -> Arc<dyn Fn() -> bool + Send + Sync> {
        Arc::new(|| true)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_with_backoff_then_succeeds() {
        let calls = Arc::new(AU32::new(0));
        let failure_log = Arc::new(Mutex::new(Vec::new()));
        let hooks = RetryerHooks::<&'static str> {
            on_fail: Some({
                let failure_log = failure_log.clone();
                Arc::new(move |count, err| failure_log.lock().push((count, err.to_string())))
            }),
            ..Default::default()
        };

        let calls2 = calls.clone();
        let retryer = Retryer::start(
            move |_abort| {
                let calls = calls2.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(QueryError::network("err"))
                    } else {
                        Ok("ok")
                    }
                }
            },
            RetryPolicy::Count(2),
            RetryDelay::fixed(Duration::from_millis(5)),
            NetworkMode::Always,
            always_online(),
            hooks,
        );

        let result = retryer.promise().await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failure_log.lock().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_zero_performs_exactly_one_attempt() {
        let calls = Arc::new(AU32::new(0));
        let calls2 = calls.clone();
        let retryer = Retryer::start(
            move |_abort| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(QueryError::network("always fails"))
                }
            },
            RetryPolicy::Count(0),
            RetryDelay::fixed(Duration::from_millis(1)),
            NetworkMode::Always,
            always_online(),
            RetryerHooks::default(),
        );

        let result = retryer.promise().await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_mode_pauses_until_resumed() {
        let online = Arc::new(AtomicBool::new(false));
        let online_check: Arc<dyn Fn() -> bool + Send + Sync> = {
            let online = online.clone();
            Arc::new(move || online.load(Ordering::SeqCst))
        };
        let paused_seen = Arc::new(AtomicBool::new(false));
        let hooks = RetryerHooks::<&'static str> {
            on_pause: Some({
                let paused_seen = paused_seen.clone();
                Arc::new(move || paused_seen.store(true, Ordering::SeqCst))
            }),
            ..Default::default()
        };

        let retryer = Retryer::start(
            |_abort| async move { Ok("ok") },
            RetryPolicy::Never,
            RetryDelay::default(),
            NetworkMode::Online,
            online_check,
            hooks,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(retryer.is_paused());
        assert!(paused_seen.load(Ordering::SeqCst));

        online.store(true, Ordering::SeqCst);
        retryer.continue_retry();

        let result = retryer.promise().await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_with_revert_resolves_with_last_error_without_incrementing() {
        let calls = Arc::new(AU32::new(0));
        let calls2 = calls.clone();
        let retryer = Retryer::start(
            move |_abort| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<(), _>(QueryError::network("boom"))
                }
            },
            RetryPolicy::Always,
            RetryDelay::fixed(Duration::from_millis(5)),
            NetworkMode::Always,
            always_online(),
            RetryerHooks::default(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        retryer.cancel(CancelOptions {
            revert: true,
            silent: true,
        });

        let result = retryer.promise().await;
        assert!(result.is_err());
        assert_eq!(retryer.failure_count(), 0);
    }
}

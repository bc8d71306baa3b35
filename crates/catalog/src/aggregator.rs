//! Catalog aggregation over a paginated key-value store.
//!
//! `CatalogAggregator::list_all` produces a snapshot of every product record in
//! two phases:
//!
//! 1. **Drain**: sequentially walk `list` pages with the store's cursor until the
//!    store reports `done`. Any page that fails permanently aborts the whole call
//!    with [`CatalogError::ListFailure`]; keys gathered so far are discarded.
//! 2. **Fetch**: `get` every key with at most `concurrency` calls in flight.
//!    Outcomes are slotted by enumeration index, so the output order never
//!    depends on completion order.
//!
//! NotFound during fetch is an omission, not a failure (the key was removed
//! between `list` and `get`). Transient errors are retried with backoff; keys
//! that still fail are reported in [`AggregationResult::failures`] and the
//! aggregation succeeds with a degraded catalog.
//!
//! Cancellation (token or deadline) drops all in-flight work and returns
//! [`CatalogError::Cancelled`] without any partial result.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use storefront_core::{Cursor, ProductRecord, RecordKey, StoreError, StoreResult};

use crate::retry::RetryPolicy;
use crate::store::{KeyValueStore, ListPage};

/// Aggregator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    /// Maximum concurrent `get` calls (values below 1 are treated as 1).
    pub concurrency: usize,
    /// Retry policy for each `list` page.
    pub list_retry: RetryPolicy,
    /// Retry policy for each `get`.
    pub get_retry: RetryPolicy,
    /// Overall time budget for one `list_all` call.
    pub deadline: Option<Duration>,
    /// Upper bound on `list` pages; a store that never reports `done` is a list failure.
    pub max_pages: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            list_retry: RetryPolicy::default(),
            get_retry: RetryPolicy::default(),
            deadline: None,
            max_pages: 10_000,
        }
    }
}

impl AggregatorConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Use the same retry policy for `list` and `get`.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.list_retry = policy.clone();
        self.get_retry = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

/// Why an aggregation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Signal,
    /// The configured deadline elapsed.
    Deadline,
}

impl core::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Signal => f.write_str("cancelled by caller"),
            Self::Deadline => f.write_str("deadline exceeded"),
        }
    }
}

/// Fatal aggregation error. Per-key fetch failures are not fatal and are
/// reported in [`AggregationResult::failures`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The key space could not be fully enumerated.
    #[error("key enumeration failed after {pages_drained} page(s): {cause}")]
    ListFailure { pages_drained: usize, cause: StoreError },

    #[error("catalog aggregation aborted: {0}")]
    Cancelled(CancelReason),
}

impl CatalogError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Result of fetching a single key.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(ProductRecord),
    NotFound(RecordKey),
    Failed { key: RecordKey, error: StoreError },
}

impl FetchOutcome {
    pub fn key(&self) -> &RecordKey {
        match self {
            Self::Success(record) => &record.key,
            Self::NotFound(key) => key,
            Self::Failed { key, .. } => key,
        }
    }
}

/// Snapshot of the catalog produced by one `list_all` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    /// Successfully fetched records, in key-enumeration order.
    pub records: Vec<ProductRecord>,
    /// Keys whose fetch failed permanently, with the error description.
    pub failures: BTreeMap<RecordKey, String>,
    /// Keys that were listed but no longer existed at fetch time.
    pub omitted: Vec<RecordKey>,
    /// Distinct keys enumerated during the drain phase.
    pub keys_listed: usize,
    /// Number of `list` pages drained.
    pub pages: usize,
    pub completed_at: DateTime<Utc>,
}

impl AggregationResult {
    /// True when no key failed to fetch.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Successes + failures + omissions; equals `keys_listed`.
    pub fn accounted_keys(&self) -> usize {
        self.records.len() + self.failures.len() + self.omitted.len()
    }

    /// Record payloads in enumeration order.
    pub fn into_values(self) -> Vec<JsonValue> {
        self.records.into_iter().map(ProductRecord::into_value).collect()
    }
}

/// Aggregates every product record held by a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct CatalogAggregator<S> {
    store: S,
    config: AggregatorConfig,
}

impl<S> CatalogAggregator<S>
where
    S: KeyValueStore,
{
    pub fn new(store: S, config: AggregatorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Aggregate the full catalog (bounded only by the configured deadline).
    pub async fn list_all(&self) -> Result<AggregationResult, CatalogError> {
        self.list_all_with_cancel(CancellationToken::new()).await
    }

    /// Aggregate the full catalog, aborting when `cancel` fires or the deadline elapses.
    #[instrument(
        skip_all,
        fields(concurrency = self.config.concurrency.max(1), deadline_ms = ?self.config.deadline.map(|d| d.as_millis()))
    )]
    pub async fn list_all_with_cancel(
        &self,
        cancel: CancellationToken,
    ) -> Result<AggregationResult, CatalogError> {
        let deadline = self.config.deadline;
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Dropping `run` abandons the drain loop, backoff sleeps and in-flight gets.
        let run = async {
            let (keys, pages) = self.drain().await?;
            Ok::<_, CatalogError>(self.fetch_all(keys, pages).await)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("catalog aggregation cancelled by caller");
                Err(CatalogError::Cancelled(CancelReason::Signal))
            }
            _ = expired => {
                warn!("catalog aggregation deadline exceeded");
                Err(CatalogError::Cancelled(CancelReason::Deadline))
            }
            result = run => result,
        }
    }

    async fn drain(&self) -> Result<(Vec<RecordKey>, usize), CatalogError> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0usize;

        loop {
            if pages >= self.config.max_pages {
                return Err(CatalogError::ListFailure {
                    pages_drained: pages,
                    cause: StoreError::backend(format!(
                        "pagination did not finish within {} pages",
                        self.config.max_pages
                    )),
                });
            }

            let page = self
                .list_page(cursor.as_ref(), pages)
                .await
                .map_err(|cause| CatalogError::ListFailure {
                    pages_drained: pages,
                    cause,
                })?;
            pages += 1;

            let ListPage {
                keys: page_keys,
                cursor: next,
                done,
            } = page;
            debug!(page = pages, keys = page_keys.len(), done, "drained list page");

            // Stores like Redis SCAN may repeat keys across pages.
            for key in page_keys {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            if done {
                break;
            }

            match next {
                Some(next) => cursor = Some(next),
                None => {
                    return Err(CatalogError::ListFailure {
                        pages_drained: pages,
                        cause: StoreError::backend("page reported more keys but carried no cursor"),
                    });
                }
            }
        }

        Ok((keys, pages))
    }

    async fn list_page(&self, cursor: Option<&Cursor>, page: usize) -> StoreResult<ListPage> {
        let policy = &self.config.list_retry;
        let mut attempt = 0u32;

        loop {
            match self.store.list(cursor).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                    attempt += 1;
                    let delay = policy.delay_for_attempt(attempt, page as u64);
                    warn!(page, attempt, delay_ms = delay.as_millis() as u64, error = %e, "list call failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_all(&self, keys: Vec<RecordKey>, pages: usize) -> AggregationResult {
        let keys_listed = keys.len();
        let concurrency = self.config.concurrency.max(1);

        // Single owner of all outcomes; workers only return (index, outcome).
        let mut slots: Vec<Option<FetchOutcome>> = Vec::with_capacity(keys_listed);
        slots.resize_with(keys_listed, || None);

        let mut queued = keys.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        for (idx, key) in queued.by_ref().take(concurrency) {
            in_flight.push(self.fetch_indexed(idx, key));
        }

        while let Some((idx, outcome)) = in_flight.next().await {
            slots[idx] = Some(outcome);
            if let Some((idx, key)) = queued.next() {
                in_flight.push(self.fetch_indexed(idx, key));
            }
        }

        let mut records = Vec::with_capacity(keys_listed);
        let mut failures = BTreeMap::new();
        let mut omitted = Vec::new();
        for outcome in slots.into_iter().flatten() {
            match outcome {
                FetchOutcome::Success(record) => records.push(record),
                FetchOutcome::NotFound(key) => omitted.push(key),
                FetchOutcome::Failed { key, error } => {
                    failures.insert(key, error.to_string());
                }
            }
        }

        info!(
            keys = keys_listed,
            pages,
            records = records.len(),
            failures = failures.len(),
            omitted = omitted.len(),
            "catalog aggregated"
        );

        AggregationResult {
            records,
            failures,
            omitted,
            keys_listed,
            pages,
            completed_at: Utc::now(),
        }
    }

    async fn fetch_indexed(&self, idx: usize, key: RecordKey) -> (usize, FetchOutcome) {
        (idx, self.fetch_one(idx, key).await)
    }

    async fn fetch_one(&self, idx: usize, key: RecordKey) -> FetchOutcome {
        let policy = &self.config.get_retry;
        let mut attempt = 0u32;

        loop {
            match self.store.get(&key).await {
                Ok(Some(value)) => return FetchOutcome::Success(ProductRecord::new(key, value)),
                Ok(None) => {
                    debug!(key = %key, "key disappeared between list and get; omitting");
                    return FetchOutcome::NotFound(key);
                }
                Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                    attempt += 1;
                    let delay = policy.delay_for_attempt(attempt, idx as u64);
                    debug!(key = %key, attempt, delay_ms = delay.as_millis() as u64, error = %e, "get failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    warn!(key = %key, attempts = attempt + 1, error = %error, "get failed permanently");
                    return FetchOutcome::Failed { key, error };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::in_memory_store::InMemoryKeyValueStore;

    fn key(s: &str) -> RecordKey {
        RecordKey::new(s).unwrap()
    }

    fn product_key(i: usize) -> String {
        format!("product:{i:03}")
    }

    fn seeded(count: usize, page_size: usize) -> InMemoryKeyValueStore {
        let store = InMemoryKeyValueStore::new().with_page_size(page_size);
        for i in 0..count {
            let k = product_key(i);
            store.insert(
                k.clone(),
                &json!({ "id": k, "name": format!("Indicator {i}"), "mainImage": null }),
            );
        }
        store
    }

    fn fast_config() -> AggregatorConfig {
        AggregatorConfig::default().with_retry(RetryPolicy::fixed(2, Duration::ZERO))
    }

    fn record_keys(result: &AggregationResult) -> Vec<String> {
        result.records.iter().map(|r| r.key.as_str().to_string()).collect()
    }

    #[tokio::test]
    async fn drains_every_page() {
        let store = Arc::new(seeded(25, 4));
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 25);
        assert_eq!(result.keys_listed, 25);
        assert_eq!(result.pages, 7);
        assert_eq!(store.list_calls(), 7);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn empty_catalog_is_not_an_error() {
        let aggregator = CatalogAggregator::new(InMemoryKeyValueStore::new(), fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert!(result.records.is_empty());
        assert!(result.failures.is_empty());
        assert!(result.omitted.is_empty());
        assert_eq!(result.pages, 1);
    }

    #[tokio::test]
    async fn order_follows_enumeration_not_completion() {
        let count = 12;
        let store = Arc::new(seeded(count, 5));
        // Later keys finish first.
        for i in 0..count {
            store.delay_get(product_key(i), Duration::from_millis(((count - i) * 3) as u64));
        }
        let aggregator = CatalogAggregator::new(store, fast_config().with_concurrency(count));

        let first = aggregator.list_all().await.unwrap();
        let second = aggregator.list_all().await.unwrap();

        let expected: Vec<String> = (0..count).map(product_key).collect();
        assert_eq!(record_keys(&first), expected);
        assert_eq!(record_keys(&first), record_keys(&second));
    }

    #[tokio::test]
    async fn permanent_get_failure_is_reported_not_fatal() {
        let store = Arc::new(seeded(6, 2));
        store.fail_gets_permanently(product_key(3));
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 5);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures.contains_key(&key(&product_key(3))));
        assert!(!record_keys(&result).contains(&product_key(3)));
        // initial call + 2 retries for the failing key
        assert_eq!(store.get_calls(), 5 + 3);
    }

    #[tokio::test]
    async fn transient_get_failure_is_retried() {
        let store = Arc::new(seeded(3, 10));
        store.fail_gets(product_key(1), 2);
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 3);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn malformed_payload_is_not_retried() {
        let store = Arc::new(seeded(2, 10));
        store.insert_raw("product:bad", "{\"name\": ");
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 2);
        let cause = result.failures.get(&key("product:bad")).unwrap();
        assert!(cause.starts_with("decode error"));
        assert_eq!(store.get_calls(), 3);
    }

    fn backoff_config() -> AggregatorConfig {
        AggregatorConfig::default().with_retry(
            RetryPolicy::exponential(2, Duration::from_millis(100), Duration::from_secs(1)).with_jitter(0.0),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn get_retries_back_off_exponentially() {
        let store = Arc::new(seeded(1, 10));
        store.fail_gets(product_key(0), 2);
        let aggregator = CatalogAggregator::new(store.clone(), backoff_config());

        let started = tokio::time::Instant::now();
        let result = aggregator.list_all().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.records.len(), 1);
        assert_eq!(store.get_calls(), 3);
        // 100ms before the first retry, 200ms before the second.
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(350), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn list_retries_back_off_exponentially() {
        let store = Arc::new(seeded(3, 10));
        store.fail_next_lists(2);
        let aggregator = CatalogAggregator::new(store.clone(), backoff_config());

        let started = tokio::time::Instant::now();
        let result = aggregator.list_all().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.records.len(), 3);
        assert_eq!(store.list_calls(), 3);
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(350), "{elapsed:?}");
    }

    #[tokio::test]
    async fn vanished_keys_are_silently_omitted() {
        let store = Arc::new(seeded(5, 2));
        store.vanish_on_get(product_key(2));
        let aggregator = CatalogAggregator::new(store, fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 4);
        assert!(result.failures.is_empty());
        assert_eq!(result.omitted, vec![key(&product_key(2))]);
        assert_eq!(result.accounted_keys(), 5);
    }

    #[tokio::test]
    async fn falsy_values_are_records() {
        let store = InMemoryKeyValueStore::new();
        store.insert("a", &json!(0));
        store.insert("b", &json!(false));
        store.insert("c", &JsonValue::Null);
        store.insert("d", &json!(""));
        let aggregator = CatalogAggregator::new(store, fast_config());

        let values = aggregator.list_all().await.unwrap().into_values();

        assert_eq!(values, vec![json!(0), json!(false), JsonValue::Null, json!("")]);
    }

    #[tokio::test]
    async fn every_fetch_failing_still_returns_a_result() {
        let store = Arc::new(seeded(4, 3));
        for i in 0..4 {
            store.fail_gets_permanently(product_key(i));
        }
        let aggregator = CatalogAggregator::new(store, fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert!(result.records.is_empty());
        assert_eq!(result.failures.len(), 4);
    }

    #[tokio::test]
    async fn concurrency_cap_is_respected() {
        let store = Arc::new(seeded(20, 7).with_get_delay(Duration::from_millis(5)));
        let aggregator = CatalogAggregator::new(store.clone(), fast_config().with_concurrency(2));

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 20);
        assert!(store.max_in_flight_gets() <= 2);
        assert!(store.max_in_flight_gets() >= 1);
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped() {
        let store = Arc::new(seeded(3, 10));
        let aggregator = CatalogAggregator::new(store.clone(), fast_config().with_concurrency(0));

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 3);
        assert_eq!(store.max_in_flight_gets(), 1);
    }

    #[tokio::test]
    async fn transient_list_failure_is_retried() {
        let store = Arc::new(seeded(5, 2));
        store.fail_next_lists(2);
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(result.records.len(), 5);
        assert_eq!(store.list_calls(), 3 + 2);
    }

    #[tokio::test]
    async fn exhausted_list_retries_fail_the_call() {
        let store = Arc::new(seeded(5, 2));
        store.fail_next_lists(3);
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());

        let err = aggregator.list_all().await.unwrap_err();

        assert!(matches!(err, CatalogError::ListFailure { pages_drained: 0, .. }));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_mid_fetch_discards_completed_outcomes() {
        let store = Arc::new(seeded(10, 4));
        store.hang_on_get(product_key(9));
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { aggregator.list_all_with_cancel(cancel).await })
        };

        for _ in 0..400 {
            if store.completed_gets() >= 9 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.completed_gets(), 9);

        cancel.cancel();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(CatalogError::Cancelled(CancelReason::Signal))));
        assert_eq!(store.in_flight_gets(), 0);
    }

    #[tokio::test]
    async fn already_cancelled_token_does_no_work() {
        let store = Arc::new(seeded(3, 10));
        let aggregator = CatalogAggregator::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = aggregator.list_all_with_cancel(cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn deadline_expiry_is_reported_as_cancellation() {
        let store = Arc::new(seeded(3, 10));
        store.hang_on_get(product_key(0));
        let aggregator = CatalogAggregator::new(
            store,
            fast_config().with_deadline(Duration::from_millis(30)),
        );

        let err = aggregator.list_all().await.unwrap_err();

        assert_eq!(err, CatalogError::Cancelled(CancelReason::Deadline));
    }

    /// Store serving a fixed script of `list` responses.
    struct ScriptedStore {
        pages: Vec<StoreResult<ListPage>>,
        calls: AtomicUsize,
    }

    impl ScriptedStore {
        fn new(pages: Vec<StoreResult<ListPage>>) -> Self {
            Self {
                pages,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl KeyValueStore for ScriptedStore {
        async fn list(&self, _cursor: Option<&Cursor>) -> StoreResult<ListPage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(n) {
                Some(page) => page.clone(),
                None => Ok(ListPage::more(vec![], Cursor::new(format!("c{n}")))),
            }
        }

        async fn get(&self, key: &RecordKey) -> StoreResult<Option<JsonValue>> {
            Ok(Some(json!({ "id": key.as_str() })))
        }
    }

    #[tokio::test]
    async fn duplicate_keys_across_pages_are_collapsed() {
        let store = ScriptedStore::new(vec![
            Ok(ListPage::more(vec![key("a"), key("b")], Cursor::new("1"))),
            Ok(ListPage::last(vec![key("b"), key("c"), key("a")])),
        ]);
        let aggregator = CatalogAggregator::new(store, fast_config());

        let result = aggregator.list_all().await.unwrap();

        assert_eq!(record_keys(&result), vec!["a", "b", "c"]);
        assert_eq!(result.keys_listed, 3);
    }

    #[tokio::test]
    async fn failure_after_first_page_discards_partial_keys() {
        let store = ScriptedStore::new(vec![
            Ok(ListPage::more(vec![key("a")], Cursor::new("1"))),
            Err(StoreError::backend("403 forbidden")),
        ]);
        let aggregator = CatalogAggregator::new(store, fast_config());

        let err = aggregator.list_all().await.unwrap_err();

        assert_eq!(
            err,
            CatalogError::ListFailure {
                pages_drained: 1,
                cause: StoreError::backend("403 forbidden"),
            }
        );
    }

    #[tokio::test]
    async fn missing_cursor_on_unfinished_page_is_a_list_failure() {
        let store = ScriptedStore::new(vec![Ok(ListPage {
            keys: vec![key("a")],
            cursor: None,
            done: false,
        })]);
        let aggregator = CatalogAggregator::new(store, fast_config());

        let err = aggregator.list_all().await.unwrap_err();

        assert!(matches!(err, CatalogError::ListFailure { pages_drained: 1, .. }));
    }

    #[tokio::test]
    async fn endless_pagination_is_bounded() {
        let aggregator = CatalogAggregator::new(ScriptedStore::new(vec![]), fast_config().with_max_pages(50));

        let err = aggregator.list_all().await.unwrap_err();

        assert!(matches!(err, CatalogError::ListFailure { pages_drained: 50, .. }));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: every stored key is returned exactly once, in store order,
            /// whatever the page size and concurrency.
            #[test]
            fn snapshot_is_complete_and_ordered(
                keys in proptest::collection::btree_set("[a-z0-9]{1,8}", 0..60),
                page_size in 1usize..10,
                concurrency in 1usize..6,
            ) {
                let store = InMemoryKeyValueStore::new().with_page_size(page_size);
                for k in &keys {
                    store.insert(k.clone(), &json!({ "id": k }));
                }
                let aggregator = CatalogAggregator::new(store, fast_config().with_concurrency(concurrency));

                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let result = runtime.block_on(aggregator.list_all()).unwrap();

                let expected: Vec<String> = keys.iter().cloned().collect();
                prop_assert_eq!(record_keys(&result), expected);
                prop_assert_eq!(result.accounted_keys(), keys.len());
            }
        }
    }
}

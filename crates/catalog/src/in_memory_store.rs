//! In-memory key-value store for tests/dev.
//!
//! - Keys are enumerated in byte order, `page_size` keys per `list` call
//! - Values are kept as raw JSON text and decoded on `get`, like a remote store
//! - Faults (transient errors, vanished keys, slow or hanging gets) can be
//!   injected, and `get` concurrency is instrumented

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde_json::Value as JsonValue;

use storefront_core::{Cursor, RecordKey, StoreError, StoreResult};

use crate::store::{KeyValueStore, ListPage};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Default)]
struct Faults {
    /// Remaining `list` calls that fail with a transport error.
    list_failures: u32,
    /// Remaining failing `get` calls per key (`u32::MAX` = never recovers).
    get_failures: HashMap<String, u32>,
    /// Keys that are listed but report NotFound on `get`.
    vanished: HashSet<String>,
    /// Keys whose `get` never completes.
    hanging: HashSet<String>,
    get_delays: HashMap<String, Duration>,
    default_get_delay: Duration,
}

#[derive(Debug, Default)]
struct Stats {
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    completed_gets: AtomicUsize,
    in_flight_gets: AtomicUsize,
    max_in_flight_gets: AtomicUsize,
}

/// Decrements the in-flight counter when a `get` finishes or is dropped.
struct InFlightGuard<'a> {
    stats: &'a Stats,
}

impl<'a> InFlightGuard<'a> {
    fn enter(stats: &'a Stats) -> Self {
        let now = stats.in_flight_gets.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight_gets.fetch_max(now, Ordering::SeqCst);
        Self { stats }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight_gets.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory paginated store.
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
    page_size: usize,
    faults: Mutex<Faults>,
    stats: Stats,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            faults: Mutex::new(Faults::default()),
            stats: Stats::default(),
        }
    }

    /// Number of keys returned per `list` call (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay applied to every `get` without a per-key delay.
    pub fn with_get_delay(self, delay: Duration) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.default_get_delay = delay;
        }
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Store `value` under `key`, serialized as JSON text.
    pub fn insert(&self, key: impl Into<String>, value: &JsonValue) {
        self.insert_raw(key, value.to_string());
    }

    /// Store raw text under `key`. The text is decoded as JSON on `get`.
    pub fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), raw.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail the next `times` `list` calls with a transport error.
    pub fn fail_next_lists(&self, times: u32) {
        self.with_faults(|f| f.list_failures = times);
    }

    /// Fail the next `times` `get` calls for `key` with a transport error.
    pub fn fail_gets(&self, key: impl Into<String>, times: u32) {
        self.with_faults(|f| {
            f.get_failures.insert(key.into(), times);
        });
    }

    /// Fail every `get` for `key` with a transport error.
    pub fn fail_gets_permanently(&self, key: impl Into<String>) {
        self.fail_gets(key, u32::MAX);
    }

    /// Keep `key` in listings but report it as NotFound on `get`.
    pub fn vanish_on_get(&self, key: impl Into<String>) {
        self.with_faults(|f| {
            f.vanished.insert(key.into());
        });
    }

    /// Never complete a `get` for `key`.
    pub fn hang_on_get(&self, key: impl Into<String>) {
        self.with_faults(|f| {
            f.hanging.insert(key.into());
        });
    }

    pub fn delay_get(&self, key: impl Into<String>, delay: Duration) {
        self.with_faults(|f| {
            f.get_delays.insert(key.into(), delay);
        });
    }

    pub fn list_calls(&self) -> usize {
        self.stats.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.stats.get_calls.load(Ordering::SeqCst)
    }

    /// `get` calls that ran to completion (successfully or not).
    pub fn completed_gets(&self) -> usize {
        self.stats.completed_gets.load(Ordering::SeqCst)
    }

    pub fn in_flight_gets(&self) -> usize {
        self.stats.in_flight_gets.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running `get` calls observed so far.
    pub fn max_in_flight_gets(&self) -> usize {
        self.stats.max_in_flight_gets.load(Ordering::SeqCst)
    }

    fn with_faults(&self, f: impl FnOnce(&mut Faults)) {
        if let Ok(mut faults) = self.faults.lock() {
            f(&mut faults);
        }
    }
}

struct GetPlan {
    delay: Duration,
    hang: bool,
    fail: bool,
    vanished: bool,
}

impl InMemoryKeyValueStore {
    fn plan_get(&self, key: &str) -> StoreResult<GetPlan> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::backend("fault table lock poisoned"))?;

        let fail = match faults.get_failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
            _ => false,
        };

        Ok(GetPlan {
            delay: faults
                .get_delays
                .get(key)
                .copied()
                .unwrap_or(faults.default_get_delay),
            hang: faults.hanging.contains(key),
            fail,
            vanished: faults.vanished.contains(key),
        })
    }

    fn read_raw(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::backend("entries lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn list(&self, cursor: Option<&Cursor>) -> StoreResult<ListPage> {
        self.stats.list_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut faults = self
                .faults
                .lock()
                .map_err(|_| StoreError::backend("fault table lock poisoned"))?;
            if faults.list_failures > 0 {
                faults.list_failures -= 1;
                return Err(StoreError::transport("injected list failure"));
            }
        }

        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::backend("entries lock poisoned"))?;

        let lower = match cursor {
            Some(c) => Bound::Excluded(c.as_str()),
            None => Bound::Unbounded,
        };

        // Peek one past the page to know whether more keys follow.
        let mut names: Vec<&String> = entries
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(k, _)| k)
            .take(self.page_size + 1)
            .collect();
        let has_more = names.len() > self.page_size;
        names.truncate(self.page_size);

        let keys: Vec<RecordKey> = names.iter().filter_map(|k| RecordKey::new(k.as_str())).collect();

        match (has_more, names.last()) {
            (true, Some(last)) => Ok(ListPage::more(keys, Cursor::new(last.as_str()))),
            _ => Ok(ListPage::last(keys)),
        }
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<JsonValue>> {
        self.stats.get_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard::enter(&self.stats);

        let plan = self.plan_get(key.as_str())?;

        if !plan.delay.is_zero() {
            tokio::time::sleep(plan.delay).await;
        }
        if plan.hang {
            std::future::pending::<()>().await;
        }

        let result = if plan.fail {
            Err(StoreError::transport(format!("injected get failure for '{key}'")))
        } else if plan.vanished {
            Ok(None)
        } else {
            match self.read_raw(key.as_str())? {
                Some(raw) => serde_json::from_str(&raw).map(Some).map_err(StoreError::from),
                None => Ok(None),
            }
        };

        self.stats.completed_gets.fetch_add(1, Ordering::SeqCst);
        result
    }
}

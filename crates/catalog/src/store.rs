//! Key-value store capability consumed by the aggregator.
//!
//! The aggregator depends on two operations only:
//!
//! - **`list`**: paginated key enumeration. Callers must keep calling with the
//!   returned cursor until a page reports `done`; a single call is never
//!   assumed to cover the whole key space.
//! - **`get`**: per-key retrieval of a JSON value. A missing key is `Ok(None)`,
//!   distinct from a transport failure.
//!
//! Adapters do not retry. Retry policy lives in the aggregator.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use storefront_core::{Cursor, RecordKey, StoreResult};

/// One page of keys from a paginated `list` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<RecordKey>,
    /// Continuation token for the next call. Only meaningful when `done` is false.
    pub cursor: Option<Cursor>,
    /// True once the key space has been fully enumerated.
    pub done: bool,
}

impl ListPage {
    /// Final page of an enumeration.
    pub fn last(keys: Vec<RecordKey>) -> Self {
        Self {
            keys,
            cursor: None,
            done: true,
        }
    }

    /// Intermediate page with a continuation cursor.
    pub fn more(keys: Vec<RecordKey>, cursor: Cursor) -> Self {
        Self {
            keys,
            cursor: Some(cursor),
            done: false,
        }
    }
}

/// Paginated key-value store holding JSON product records.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Return the page of keys following `cursor` (`None` starts from the beginning).
    async fn list(&self, cursor: Option<&Cursor>) -> StoreResult<ListPage>;

    /// Fetch and decode the value stored under `key`.
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<JsonValue>>;
}

#[async_trait::async_trait]
impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    async fn list(&self, cursor: Option<&Cursor>) -> StoreResult<ListPage> {
        (**self).list(cursor).await
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<JsonValue>> {
        (**self).get(key).await
    }
}

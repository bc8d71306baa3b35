//! Redis-backed product store.
//!
//! Records are JSON strings stored under `<prefix><key>`. Enumeration uses
//! `SCAN` with a `MATCH <prefix>*` filter; Redis returns cursor `0` once the
//! iteration is complete. `SCAN` can return a key more than once, which the
//! aggregator tolerates.

use redis::aio::MultiplexedConnection;
use serde_json::Value as JsonValue;
use tracing::instrument;

use storefront_catalog::{KeyValueStore, ListPage};
use storefront_core::{Cursor, RecordKey, StoreError, StoreResult};

use crate::config::{InfraError, RedisStoreConfig};

#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    match_pattern: String,
    scan_count: usize,
}

impl core::fmt::Debug for RedisKeyValueStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisKeyValueStore")
            .field("key_prefix", &self.key_prefix)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}

impl RedisKeyValueStore {
    /// Open a multiplexed connection to the configured Redis server.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self, InfraError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| InfraError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| InfraError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            match_pattern: format!("{}*", escape_glob(&config.key_prefix)),
            scan_count: config.scan_count.max(1),
        })
    }

    fn storage_key(&self, key: &RecordKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisKeyValueStore {
    #[instrument(skip(self), fields(pattern = %self.match_pattern), err(level = "warn"))]
    async fn list(&self, cursor: Option<&Cursor>) -> StoreResult<ListPage> {
        let position = match cursor {
            Some(c) => parse_scan_cursor(c)?,
            None => 0,
        };

        let mut conn = self.conn.clone();
        let (next, names): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(position)
            .arg("MATCH")
            .arg(&self.match_pattern)
            .arg("COUNT")
            .arg(self.scan_count)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        let keys = strip_prefix(&self.key_prefix, names);
        if next == 0 {
            Ok(ListPage::last(keys))
        } else {
            Ok(ListPage::more(keys, Cursor::new(next.to_string())))
        }
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<JsonValue>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.storage_key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

fn parse_scan_cursor(cursor: &Cursor) -> StoreResult<u64> {
    cursor
        .as_str()
        .parse()
        .map_err(|_| StoreError::backend(format!("invalid SCAN cursor '{}'", cursor.as_str())))
}

/// Connection-level failures are worth retrying; command errors are not.
fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
        StoreError::transport(e.to_string())
    } else {
        StoreError::backend(e.to_string())
    }
}

/// Escape glob metacharacters so the prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn strip_prefix(prefix: &str, names: Vec<String>) -> Vec<RecordKey> {
    names
        .into_iter()
        .filter_map(|name| name.strip_prefix(prefix).and_then(RecordKey::new))
        .collect()
}

//! Key-value store adapters.
//!
//! - `memory`: [`InMemoryKeyValueStore`], optionally seeded from a JSON file
//! - `redis` (feature `redis`): `SCAN`/`GET` over keys under a prefix
//! - `cloudflare` (feature `cloudflare`): Workers KV REST API

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;

use storefront_catalog::{InMemoryKeyValueStore, KeyValueStore};

use crate::config::{InfraError, MemoryStoreConfig, StoreConfig};

#[cfg(feature = "cloudflare")]
pub mod cloudflare;
#[cfg(feature = "redis")]
pub mod redis_store;

#[cfg(feature = "cloudflare")]
pub use cloudflare::CloudflareKvStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisKeyValueStore;

/// Build the store selected by `config`.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    let store: Arc<dyn KeyValueStore> = match config {
        StoreConfig::Memory(memory) => Arc::new(memory_store(memory).await?),
        StoreConfig::Redis(redis) => connect_redis(redis).await?,
        StoreConfig::Cloudflare(cf) => connect_cloudflare(cf)?,
    };

    info!(backend = config.backend(), "key-value store ready");
    Ok(store)
}

async fn memory_store(config: &MemoryStoreConfig) -> Result<InMemoryKeyValueStore, InfraError> {
    let store = InMemoryKeyValueStore::new().with_page_size(config.page_size);
    if let Some(path) = &config.seed_file {
        let seeded = load_seed_file(&store, path).await?;
        info!(path = %path.display(), records = seeded, "seeded in-memory store");
    }
    Ok(store)
}

#[cfg(feature = "redis")]
async fn connect_redis(
    config: &crate::config::RedisStoreConfig,
) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    Ok(Arc::new(RedisKeyValueStore::connect(config).await?))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(
    _config: &crate::config::RedisStoreConfig,
) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    Err(InfraError::config("redis backend requires the `redis` feature"))
}

#[cfg(feature = "cloudflare")]
fn connect_cloudflare(
    config: &crate::config::CloudflareKvConfig,
) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    Ok(Arc::new(CloudflareKvStore::new(config.clone())?))
}

#[cfg(not(feature = "cloudflare"))]
fn connect_cloudflare(
    _config: &crate::config::CloudflareKvConfig,
) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    Err(InfraError::config("cloudflare backend requires the `cloudflare` feature"))
}

/// Load records from a JSON file into `store`. Returns the number of records inserted.
pub async fn load_seed_file(store: &InMemoryKeyValueStore, path: &Path) -> Result<usize, InfraError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| InfraError::Seed(format!("reading {}: {e}", path.display())))?;
    let document: JsonValue = serde_json::from_str(&raw)
        .map_err(|e| InfraError::Seed(format!("parsing {}: {e}", path.display())))?;
    seed_from_json(store, &document)
}

/// Insert records from a seed document.
///
/// Accepts either an object (key → record) or an array of records whose `id`
/// field (string or number) becomes the key. When ids repeat, the later record
/// wins. Returns the number of distinct keys written.
pub fn seed_from_json(store: &InMemoryKeyValueStore, document: &JsonValue) -> Result<usize, InfraError> {
    match document {
        JsonValue::Object(entries) => {
            for (key, record) in entries {
                if key.is_empty() {
                    return Err(InfraError::Seed("seed object contains an empty key".to_string()));
                }
                store.insert(key.clone(), record);
            }
            Ok(entries.len())
        }
        JsonValue::Array(records) => {
            let mut keys = HashSet::with_capacity(records.len());
            for (idx, record) in records.iter().enumerate() {
                let key = match record.get("id") {
                    Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
                    Some(JsonValue::Number(n)) => n.to_string(),
                    _ => {
                        return Err(InfraError::Seed(format!(
                            "seed record at index {idx} has no usable `id`"
                        )));
                    }
                };
                store.insert(key.clone(), record);
                keys.insert(key);
            }
            Ok(keys.len())
        }
        _ => Err(InfraError::Seed(
            "seed document must be an object or an array".to_string(),
        )),
    }
}

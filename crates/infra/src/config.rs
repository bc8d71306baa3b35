//! Store configuration loading and representation.
//!
//! Values come from a lookup function (normally `std::env::var`) so parsing can
//! be exercised without touching the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 1000;
pub const DEFAULT_REDIS_KEY_PREFIX: &str = "product:";
pub const DEFAULT_REDIS_SCAN_COUNT: usize = 100;
pub const DEFAULT_CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
/// Cloudflare accepts `limit` between 10 and 1000 on key listing; the store clamps to that range.
pub const DEFAULT_CLOUDFLARE_PAGE_LIMIT: usize = 1000;
pub const DEFAULT_CLOUDFLARE_TIMEOUT: Duration = Duration::from_secs(10);

/// Infrastructure setup error.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store connection error: {0}")]
    Connection(String),

    #[error("seed error: {0}")]
    Seed(String),
}

impl InfraError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// JSON file used to pre-populate the store.
    pub seed_file: Option<PathBuf>,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisStoreConfig {
    pub url: String,
    /// Only keys under this prefix belong to the catalog; the prefix is not part of the record key.
    pub key_prefix: String,
    /// `COUNT` hint passed to `SCAN`.
    pub scan_count: usize,
}

#[derive(Clone, PartialEq, Eq)]
pub struct CloudflareKvConfig {
    pub account_id: String,
    pub namespace_id: String,
    pub api_token: String,
    pub api_base: String,
    pub page_limit: usize,
    pub request_timeout: Duration,
}

impl core::fmt::Debug for CloudflareKvConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CloudflareKvConfig")
            .field("account_id", &self.account_id)
            .field("namespace_id", &self.namespace_id)
            .field("api_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("page_limit", &self.page_limit)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Which store backs the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory(MemoryStoreConfig),
    Redis(RedisStoreConfig),
    Cloudflare(CloudflareKvConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryStoreConfig {
            seed_file: None,
            page_size: DEFAULT_MEMORY_PAGE_SIZE,
        })
    }
}

impl StoreConfig {
    /// Backend name for logs.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
            Self::Cloudflare(_) => "cloudflare",
        }
    }

    /// Read the store configuration from the process environment.
    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the store configuration through `lookup` (variable name → value).
    ///
    /// `STORE_BACKEND` selects `memory` (default), `redis` or `cloudflare`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InfraError> {
        let backend = lookup("STORE_BACKEND").unwrap_or_else(|| "memory".to_string());

        match backend.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory(MemoryStoreConfig {
                seed_file: non_empty(&lookup, "CATALOG_SEED_FILE").map(PathBuf::from),
                page_size: parse_or(&lookup, "MEMORY_PAGE_SIZE", DEFAULT_MEMORY_PAGE_SIZE)?,
            })),
            "redis" => Ok(Self::Redis(RedisStoreConfig {
                url: required(&lookup, "REDIS_URL")?,
                key_prefix: lookup("REDIS_KEY_PREFIX")
                    .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_string()),
                scan_count: parse_or(&lookup, "REDIS_SCAN_COUNT", DEFAULT_REDIS_SCAN_COUNT)?,
            })),
            "cloudflare" => Ok(Self::Cloudflare(CloudflareKvConfig {
                account_id: required(&lookup, "CF_ACCOUNT_ID")?,
                namespace_id: required(&lookup, "CF_NAMESPACE_ID")?,
                api_token: required(&lookup, "CF_API_TOKEN")?,
                api_base: non_empty(&lookup, "CF_API_BASE")
                    .unwrap_or_else(|| DEFAULT_CLOUDFLARE_API_BASE.to_string()),
                page_limit: parse_or(&lookup, "CF_PAGE_LIMIT", DEFAULT_CLOUDFLARE_PAGE_LIMIT)?,
                request_timeout: parse_or(&lookup, "CF_TIMEOUT_MS", DEFAULT_CLOUDFLARE_TIMEOUT.as_millis() as u64)
                    .map(Duration::from_millis)?,
            })),
            other => Err(InfraError::config(format!(
                "unknown STORE_BACKEND '{other}' (expected memory, redis or cloudflare)"
            ))),
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, InfraError> {
    non_empty(lookup, name).ok_or_else(|| InfraError::config(format!("{name} must be set")))
}

/// Parse `name` if set, otherwise return `default`.
pub fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, InfraError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match non_empty(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| InfraError::config(format!("{name}='{raw}' is invalid: {e}"))),
        None => Ok(default),
    }
}

//! Application configuration (environment-driven wiring).
//!
//! | variable | default |
//! |---|---|
//! | `BIND_ADDR` | `0.0.0.0:8080` |
//! | `CATALOG_CONCURRENCY` | `8` |
//! | `CATALOG_RETRY_ATTEMPTS` | `3` |
//! | `CATALOG_RETRY_BASE_MS` | `50` |
//! | `CATALOG_DEADLINE_MS` | `10000` (`0` disables the deadline) |
//!
//! Store selection is documented on [`StoreConfig::from_lookup`].

use std::net::SocketAddr;
use std::time::Duration;

use storefront_catalog::{AggregatorConfig, RetryPolicy};
use storefront_infra::config::parse_or;
use storefront_infra::{InfraError, StoreConfig};

pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub aggregator: AggregatorConfig,
    pub store: StoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            aggregator: AggregatorConfig::default().with_deadline(DEFAULT_DEADLINE),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InfraError> {
        let defaults = AggregatorConfig::default();

        let concurrency: usize = parse_or(&lookup, "CATALOG_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(InfraError::config("CATALOG_CONCURRENCY must be at least 1"));
        }

        let retry_defaults = RetryPolicy::default();
        let attempts: u32 = parse_or(&lookup, "CATALOG_RETRY_ATTEMPTS", retry_defaults.max_attempts)?;
        let base_ms: u64 = parse_or(
            &lookup,
            "CATALOG_RETRY_BASE_MS",
            retry_defaults.base_delay.as_millis() as u64,
        )?;
        let base_delay = Duration::from_millis(base_ms);
        let retry = RetryPolicy::exponential(
            attempts,
            base_delay,
            retry_defaults.max_delay.max(base_delay),
        );

        let deadline_ms: u64 = parse_or(
            &lookup,
            "CATALOG_DEADLINE_MS",
            DEFAULT_DEADLINE.as_millis() as u64,
        )?;

        let aggregator = AggregatorConfig {
            concurrency,
            list_retry: retry.clone(),
            get_retry: retry,
            deadline: (deadline_ms > 0).then(|| Duration::from_millis(deadline_ms)),
            max_pages: defaults.max_pages,
        };

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(DEFAULT_BIND_ADDR))?,
            aggregator,
            store: StoreConfig::from_lookup(&lookup)?,
        })
    }
}

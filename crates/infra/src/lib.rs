//! Infrastructure layer: concrete key-value store adapters and their configuration.

pub mod config;
pub mod kv;

pub use config::{InfraError, StoreConfig};
pub use kv::connect_store;

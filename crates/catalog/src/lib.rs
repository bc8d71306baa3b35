//! Catalog aggregation: drain a paginated key-value store and fetch every
//! product record under bounded concurrency.

pub mod aggregator;
pub mod in_memory_store;
pub mod retry;
pub mod store;

pub use aggregator::{
    AggregationResult, AggregatorConfig, CancelReason, CatalogAggregator, CatalogError, FetchOutcome,
};
pub use in_memory_store::InMemoryKeyValueStore;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use store::{KeyValueStore, ListPage};

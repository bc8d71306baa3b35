//! `storefront-core`: catalog building blocks.
//!
//! This crate contains **pure** types shared by the aggregator, the store
//! adapters and the HTTP layer (no IO, no async).

pub mod error;
pub mod key;
pub mod record;

pub use error::{StoreError, StoreResult};
pub use key::{Cursor, RecordKey};
pub use record::ProductRecord;

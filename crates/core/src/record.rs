//! Product records as returned by the store.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::key::RecordKey;

/// A product record: an opaque JSON document addressed by its key.
///
/// The payload shape is owned by whoever writes the store. Any JSON value is
/// a valid record, including `null`, `false`, `0` and `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub key: RecordKey,
    pub value: JsonValue,
}

impl ProductRecord {
    pub fn new(key: RecordKey, value: JsonValue) -> Self {
        Self { key, value }
    }

    pub fn into_value(self) -> JsonValue {
        self.value
    }
}

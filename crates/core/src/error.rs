//! Store error model.

use thiserror::Error;

/// Result type returned by key-value store adapters.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by a key-value store adapter.
///
/// "Not found" is not an error: adapters report it as `Ok(None)` from `get`.
/// Adapters never retry; the caller decides based on [`StoreError::is_transient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network/transport failure (timeouts, dropped connections, 5xx, throttling).
    #[error("transport error: {0}")]
    Transport(String),

    /// The stored payload could not be decoded as JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// The store rejected the request (auth, bad request, unexpected response shape).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(StoreError::transport("reset").is_transient());
        assert!(!StoreError::decode("bad json").is_transient());
        assert!(!StoreError::backend("401").is_transient());
    }

    #[test]
    fn json_errors_map_to_decode() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(StoreError::from(err), StoreError::Decode(_)));
    }
}

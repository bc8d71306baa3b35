use serde::Serialize;

/// Error body returned by the products endpoint.
///
/// The `{message, error}` shape is what storefront clients already parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub error: String,
}

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use storefront_catalog::CatalogError;

use crate::app::dto::ErrorBody;

pub const PRODUCTS_FAILURE_MESSAGE: &str = "Failed to fetch products";

pub fn catalog_error_to_response(err: CatalogError) -> axum::response::Response {
    // Cancellation and list failures both mean "no trustworthy catalog".
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        PRODUCTS_FAILURE_MESSAGE,
        err.to_string(),
    )
}

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
    error: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
            error: error.into(),
        }),
    )
        .into_response()
}

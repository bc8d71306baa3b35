use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{error, warn};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestContext;

/// Number of records that could not be fetched; only present on degraded responses.
pub const CATALOG_FAILURES_HEADER: &str = "x-catalog-failures";

/// `GET /products`: every product record, in store enumeration order.
///
/// A partially fetched catalog is still a `200`; only enumeration failure or
/// cancellation produces a `500`.
pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    let result = match services.catalog().list_all().await {
        Ok(result) => result,
        Err(e) => {
            error!(request_id = %ctx.request_id(), error = %e, "product aggregation failed");
            return errors::catalog_error_to_response(e);
        }
    };

    let failures = result.failures.len();
    if failures > 0 {
        warn!(
            request_id = %ctx.request_id(),
            failures,
            failed_keys = ?result.failures.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            "serving degraded catalog"
        );
    }

    let mut response = (
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        Json(result.into_values()),
    )
        .into_response();

    if failures > 0 {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CATALOG_FAILURES_HEADER), HeaderValue::from(failures));
    }

    response
}

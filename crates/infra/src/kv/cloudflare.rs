//! Cloudflare Workers KV store (REST API).
//!
//! - `GET {base}/accounts/{account}/storage/kv/namespaces/{ns}/keys?limit=&cursor=`
//!   lists key names; an empty `result_info.cursor` marks the last page
//! - `GET .../values/{key}` returns the raw stored value (404 when missing)
//!
//! Throttling (429), 5xx and network errors are transient. Other non-success
//! statuses are backend errors.

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::instrument;

use storefront_catalog::{KeyValueStore, ListPage};
use storefront_core::{Cursor, RecordKey, StoreError, StoreResult};

use crate::config::{CloudflareKvConfig, InfraError};

/// Bounds the key-listing endpoint accepts for `limit`.
const PAGE_LIMIT_RANGE: (usize, usize) = (10, 1000);

#[derive(Debug, Deserialize)]
struct ListKeysResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    result: Vec<KeyEntry>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudflareKvStore {
    http: reqwest::Client,
    namespace_url: Url,
    api_token: String,
    page_limit: usize,
}

impl CloudflareKvStore {
    pub fn new(config: CloudflareKvConfig) -> Result<Self, InfraError> {
        let mut namespace_url = Url::parse(&config.api_base)
            .map_err(|e| InfraError::config(format!("CF_API_BASE '{}': {e}", config.api_base)))?;
        namespace_url
            .path_segments_mut()
            .map_err(|_| InfraError::config("CF_API_BASE cannot be used as a base URL"))?
            .pop_if_empty()
            .extend([
                "accounts",
                config.account_id.as_str(),
                "storage",
                "kv",
                "namespaces",
                config.namespace_id.as_str(),
            ]);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| InfraError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            namespace_url,
            api_token: config.api_token,
            page_limit: config.page_limit.clamp(PAGE_LIMIT_RANGE.0, PAGE_LIMIT_RANGE.1),
        })
    }

    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.namespace_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::backend("namespace URL cannot be a base"))?
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, url: Url) -> StoreResult<reqwest::Response> {
        self.http
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(map_reqwest_error)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for CloudflareKvStore {
    #[instrument(skip(self), err(level = "warn"))]
    async fn list(&self, cursor: Option<&Cursor>) -> StoreResult<ListPage> {
        let mut url = self.url(&["keys"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.page_limit.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor.as_str());
            }
        }

        let response = self.send(url).await?;
        if let Some(err) = status_error(response.status()) {
            return Err(err);
        }

        let body: ListKeysResponse = response
            .json()
            .await
            .map_err(|e| StoreError::backend(format!("unexpected list response: {e}")))?;
        if !body.success {
            return Err(StoreError::backend(api_errors(&body.errors)));
        }

        let keys = body
            .result
            .into_iter()
            .filter_map(|entry| RecordKey::new(entry.name))
            .collect();

        match body
            .result_info
            .and_then(|info| info.cursor)
            .filter(|c| !c.is_empty())
        {
            Some(next) => Ok(ListPage::more(keys, Cursor::new(next))),
            None => Ok(ListPage::last(keys)),
        }
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<JsonValue>> {
        let url = self.url(&["values", key.as_str()])?;

        let response = self.send(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if let Some(err) = status_error(response.status()) {
            return Err(err);
        }

        let raw = response.text().await.map_err(map_reqwest_error)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

fn status_error(status: StatusCode) -> Option<StoreError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(StoreError::transport(format!("HTTP {status}")))
    } else {
        Some(StoreError::backend(format!("HTTP {status}")))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_builder() {
        StoreError::backend(e.to_string())
    } else {
        StoreError::transport(e.to_string())
    }
}

fn api_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request was not successful".to_string();
    }
    errors
        .iter()
        .map(|e| match e.code {
            Some(code) => format!("{code}: {}", e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use storefront_catalog::{AggregatorConfig, CatalogAggregator, RetryPolicy};

    use super::*;

    const TOKEN: &str = "test-token";

    #[derive(Clone, Default)]
    struct MockKv {
        flaky_calls: Arc<AtomicUsize>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {TOKEN}"))
    }

    async fn list_keys(
        headers: HeaderMap,
        Path((_account, _ns)): Path<(String, String)>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        let limit = params.get("limit").and_then(|l| l.parse::<usize>().ok());
        if !limit.is_some_and(|l| (10..=1000).contains(&l)) {
            return (
                AxumStatus::BAD_REQUEST,
                Json(json!({ "success": false, "errors": [{ "code": 10026, "message": "invalid limit" }] })),
            )
                .into_response();
        }
        if !authorized(&headers) {
            return (
                AxumStatus::UNAUTHORIZED,
                Json(json!({ "success": false, "errors": [{ "code": 10000, "message": "Authentication error" }] })),
            )
                .into_response();
        }

        let body = match params.get("cursor").map(String::as_str) {
            None => json!({
                "success": true,
                "errors": [],
                "result": [{ "name": "macd" }, { "name": "rsi" }],
                "result_info": { "count": 2, "cursor": "page-2" }
            }),
            Some("page-2") => json!({
                "success": true,
                "errors": [],
                "result": [{ "name": "flaky" }, { "name": "gone" }, { "name": "volume" }],
                "result_info": { "count": 3, "cursor": "" }
            }),
            Some(_) => json!({ "success": false, "errors": [{ "code": 10011, "message": "bad cursor" }] }),
        };
        Json(body).into_response()
    }

    async fn get_value(
        State(state): State<MockKv>,
        headers: HeaderMap,
        Path((_account, _ns, key)): Path<(String, String, String)>,
    ) -> Response {
        if !authorized(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        match key.as_str() {
            "gone" => AxumStatus::NOT_FOUND.into_response(),
            "flaky" if state.flaky_calls.fetch_add(1, Ordering::SeqCst) == 0 => {
                AxumStatus::SERVICE_UNAVAILABLE.into_response()
            }
            "broken" => "{not json".into_response(),
            other => Json(json!({ "id": other, "name": other.to_uppercase() })).into_response(),
        }
    }

    async fn spawn_mock() -> (String, tokio::task::JoinHandle<()>) {
        let app = Router::new()
            .route(
                "/client/v4/accounts/:account/storage/kv/namespaces/:ns/keys",
                get(list_keys),
            )
            .route(
                "/client/v4/accounts/:account/storage/kv/namespaces/:ns/values/:key",
                get(get_value),
            )
            .with_state(MockKv::default());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/client/v4"), handle)
    }

    fn config(api_base: &str, token: &str) -> CloudflareKvConfig {
        CloudflareKvConfig {
            account_id: "acc".to_string(),
            namespace_id: "ns".to_string(),
            api_token: token.to_string(),
            api_base: api_base.to_string(),
            page_limit: 10,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn aggregates_across_cloudflare_pages() {
        let (base, handle) = spawn_mock().await;
        let store = CloudflareKvStore::new(config(&base, TOKEN)).unwrap();
        let aggregator = CatalogAggregator::new(
            store,
            AggregatorConfig::default().with_retry(RetryPolicy::fixed(2, Duration::ZERO)),
        );

        let result = aggregator.list_all().await.unwrap();
        handle.abort();

        let keys: Vec<&str> = result.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["macd", "rsi", "flaky", "volume"]);
        assert_eq!(result.omitted, vec![RecordKey::new("gone").unwrap()]);
        assert!(result.failures.is_empty());
        assert_eq!(result.pages, 2);
        assert_eq!(result.records[1].value["name"], "RSI");
    }

    #[tokio::test]
    async fn rejected_token_is_a_backend_error() {
        let (base, handle) = spawn_mock().await;
        let store = CloudflareKvStore::new(config(&base, "wrong")).unwrap();

        let err = store.list(None).await.unwrap_err();
        handle.abort();

        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unavailable_value_is_transient_and_bad_json_is_decode() {
        let (base, handle) = spawn_mock().await;
        let store = CloudflareKvStore::new(config(&base, TOKEN)).unwrap();

        let first = store.get(&RecordKey::new("flaky").unwrap()).await.unwrap_err();
        let broken = store.get(&RecordKey::new("broken").unwrap()).await.unwrap_err();
        handle.abort();

        assert!(first.is_transient());
        assert!(matches!(broken, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_api_is_transient() {
        // Port 9 (discard) is almost never listening locally.
        let store = CloudflareKvStore::new(config("http://127.0.0.1:9/client/v4", TOKEN)).unwrap();
        let err = store.list(None).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn page_limit_is_kept_within_accepted_bounds() {
        let (base, handle) = spawn_mock().await;
        let tiny = CloudflareKvStore::new(CloudflareKvConfig {
            page_limit: 1,
            ..config(&base, TOKEN)
        })
        .unwrap();
        let huge = CloudflareKvStore::new(CloudflareKvConfig {
            page_limit: 50_000,
            ..config(&base, TOKEN)
        })
        .unwrap();

        assert_eq!(tiny.page_limit, 10);
        assert_eq!(huge.page_limit, 1000);
        assert_eq!(tiny.list(None).await.unwrap().keys.len(), 2);
        handle.abort();
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = CloudflareKvStore::new(config("not a url", TOKEN)).unwrap_err();
        assert!(matches!(err, InfraError::Config(_)));
    }

    #[test]
    fn status_classification() {
        assert!(status_error(StatusCode::OK).is_none());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS).unwrap().is_transient());
        assert!(status_error(StatusCode::BAD_GATEWAY).unwrap().is_transient());
        assert!(!status_error(StatusCode::FORBIDDEN).unwrap().is_transient());
    }
}

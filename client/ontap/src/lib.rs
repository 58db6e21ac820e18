//! REST client for a single ONTAP cluster admin endpoint.
//!
//! Users should use the [`HttpTransport`].
//! The [`mock`] module is useful for tests.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use mos_context::Context;

mod errors;
mod http;
mod metrics;

#[cfg(any(test, feature = "test-fixture"))]
pub mod mock;

pub use self::errors::ApiStatus;
pub use self::errors::Transport;
pub use self::http::HttpTransport;
pub use self::metrics::register_metrics;

use self::metrics::CLIENT_ERRORS;
use self::metrics::CLIENT_REQUESTS;

/// Timeout for the availability probe, tighter than regular requests so an
/// unreachable cluster is detected within the invocation budget.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw outcome of a single API request.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code of the response.
    pub status: u16,

    /// Decoded JSON body; [`Value::Null`] for non-200 responses.
    pub body: Value,
}

/// Interface to issue requests against a cluster admin endpoint.
#[async_trait::async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issue a GET request for the given path and query string.
    ///
    /// Transport failures (connection, read, TLS) are errors; HTTP error
    /// statuses are not and surface in the returned [`ApiResponse`].
    async fn get(
        &self,
        context: &Context,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse>;
}

/// Client for a single cluster admin endpoint.
#[derive(Clone)]
pub struct Api {
    inner: Arc<dyn ApiTransport>,
}

impl Api {
    /// Probe a root resource with the tighter availability timeout.
    pub async fn probe(&self, context: &Context, path: &str) -> Result<ApiResponse> {
        CLIENT_REQUESTS.inc();
        self.inner
            .get(context, path, Some(PROBE_TIMEOUT))
            .await
            .map_err(|error| {
                CLIENT_ERRORS.inc();
                error
            })
    }

    /// Fetch a single JSON document, treating any non-200 status as an
    /// error.
    pub async fn object(&self, context: &Context, path: &str) -> Result<Value> {
        CLIENT_REQUESTS.inc();
        let response = self.inner.get(context, path, None).await.map_err(|error| {
            CLIENT_ERRORS.inc();
            error
        })?;
        if response.status != 200 {
            CLIENT_ERRORS.inc();
            anyhow::bail!(ApiStatus {
                endpoint: path.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }

    /// Walk a paginated collection and return every record, in order.
    ///
    /// Pages are followed through `_links.next.href` until absent. A non-200
    /// status on any page fails the whole walk: partial collections must
    /// never reach the evaluators, or existing event-history records would
    /// be aged out by a transient upstream failure.
    pub async fn records(&self, context: &Context, path: &str) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut next = Some(path.to_string());
        while let Some(path) = next {
            CLIENT_REQUESTS.inc();
            let response = self.inner.get(context, &path, None).await.map_err(|error| {
                CLIENT_ERRORS.inc();
                error
            })?;
            if response.status != 200 {
                CLIENT_ERRORS.inc();
                anyhow::bail!(ApiStatus {
                    endpoint: path,
                    status: response.status,
                });
            }
            if let Some(page) = response.body.get("records").and_then(Value::as_array) {
                records.extend(page.iter().cloned());
            }
            next = response
                .body
                .pointer("/_links/next/href")
                .and_then(Value::as_str)
                .map(String::from);
        }
        Ok(records)
    }
}

impl<T> From<T> for Api
where
    T: ApiTransport + 'static,
{
    fn from(value: T) -> Self {
        Api {
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Api {
    /// Initialise a client over an in-memory transport for unit tests.
    pub fn mock() -> (Api, mock::MockTransport) {
        let transport = mock::MockTransport::default();
        (Api::from(transport.clone()), transport)
    }
}

#[cfg(test)]
mod tests {
    use mos_context::Context;

    use super::Api;
    use super::ApiStatus;

    #[tokio::test]
    async fn records_walks_pagination() {
        let context = Context::fixture();
        let (api, transport) = Api::mock();
        transport.reply(
            "/api/support/ems/events?return_timeout=15",
            200,
            serde_json::json!({
                "records": [{"index": 1}],
                "_links": {"next": {"href": "/api/support/ems/events?page=2"}},
            }),
        );
        transport.reply(
            "/api/support/ems/events?page=2",
            200,
            serde_json::json!({"records": [{"index": 2}]}),
        );
        let records = api
            .records(&context, "/api/support/ems/events?return_timeout=15")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["index"], 2);
    }

    #[tokio::test]
    async fn records_fails_on_any_bad_page() {
        let context = Context::fixture();
        let (api, transport) = Api::mock();
        transport.reply(
            "/api/support/ems/events?return_timeout=15",
            200,
            serde_json::json!({
                "records": [{"index": 1}],
                "_links": {"next": {"href": "/api/support/ems/events?page=2"}},
            }),
        );
        transport.reply("/api/support/ems/events?page=2", 503, serde_json::Value::Null);
        let result = api
            .records(&context, "/api/support/ems/events?return_timeout=15")
            .await;
        let error = result.expect_err("bad page must fail the walk");
        assert!(error.is::<ApiStatus>());
    }

    #[tokio::test]
    async fn object_rejects_error_statuses() {
        let context = Context::fixture();
        let (api, transport) = Api::mock();
        transport.reply("/api/cluster", 403, serde_json::Value::Null);
        let error = api
            .object(&context, "/api/cluster")
            .await
            .expect_err("403 must be an error");
        assert!(error.is::<ApiStatus>());
    }
}

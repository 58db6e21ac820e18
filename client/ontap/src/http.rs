//! HTTPS implementation of the cluster API transport.
use std::time::Duration;

use anyhow::Context as AnyhowContext;
use anyhow::Result;
use slog::debug;

use mos_context::Context;
use mos_secrets::Credentials;

use super::errors::Transport;
use super::ApiResponse;
use super::ApiTransport;

/// String to set as the user agent in HTTP requests.
static CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout; individual requests may override it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout establishing the TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cluster API transport over HTTPS with basic auth.
///
/// Clusters present self-signed certificates so verification is disabled.
/// Transport failures are retried once; HTTP error statuses are never
/// retried and are reported through [`ApiResponse::status`].
pub struct HttpTransport {
    base: String,
    client: reqwest::Client,
    credentials: Credentials,
}

impl HttpTransport {
    /// Initialise a transport for the given cluster admin endpoint.
    pub fn make(host: &str, credentials: Credentials) -> Result<HttpTransport> {
        let client = reqwest::Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .danger_accept_invalid_certs(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(HttpTransport {
            base: format!("https://{}", host),
            client,
            credentials,
        })
    }
}

#[async_trait::async_trait]
impl ApiTransport for HttpTransport {
    async fn get(
        &self,
        context: &Context,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base, path);
        let mut retried = false;
        let response = loop {
            let mut request = self
                .client
                .get(&url)
                .basic_auth(&self.credentials.username, Some(&self.credentials.password));
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            match request.send().await {
                Ok(response) => break response,
                Err(error) if !retried && (error.is_connect() || error.is_timeout()) => {
                    retried = true;
                    debug!(
                        context.logger, "Retrying API request after transport error";
                        "endpoint" => &url, "error" => %error,
                    );
                }
                Err(error) => {
                    return Err(anyhow::Error::from(error).context(Transport {
                        endpoint: url,
                    }));
                }
            }
        };
        let status = response.status().as_u16();
        let body = if status == 200 {
            response
                .json()
                .await
                .with_context(|| Transport {
                    endpoint: url.clone(),
                })?
        } else {
            serde_json::Value::Null
        };
        Ok(ApiResponse { status, body })
    }
}

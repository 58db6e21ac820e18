//! Cluster credential resolution.
//!
//! Credentials live in an external secret store; the engine only knows how
//! to turn a secret reference plus a pair of key names into a username and
//! password for HTTP basic auth.
use std::sync::Arc;

use anyhow::Result;

use mos_context::Context;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::SecretsFixture;

/// A secret exists but does not carry the expected key.
#[derive(Debug, thiserror::Error)]
#[error("'{key}' not found in secret '{secret_ref}'")]
pub struct MissingSecretKey {
    pub key: String,
    pub secret_ref: String,
}

/// Username and password for a cluster admin endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Resolve cluster credentials from the configured secret store.
#[derive(Clone)]
pub struct Secrets {
    inner: Arc<dyn SecretStore>,
}

impl Secrets {
    /// Resolve the credentials stored under `secret_ref`.
    ///
    /// The secret is expected to be a JSON object carrying the username and
    /// password under the given keys (`username` / `password` by default).
    pub async fn credentials(
        &self,
        context: &Context,
        secret_ref: &str,
        username_key: &str,
        password_key: &str,
    ) -> Result<Credentials> {
        let secret = self.inner.fetch(context, secret_ref).await?;
        let username = secret
            .get(username_key)
            .and_then(|value| value.as_str())
            .ok_or_else(|| MissingSecretKey {
                key: username_key.to_string(),
                secret_ref: secret_ref.to_string(),
            })?;
        let password = secret
            .get(password_key)
            .and_then(|value| value.as_str())
            .ok_or_else(|| MissingSecretKey {
                key: password_key.to_string(),
                secret_ref: secret_ref.to_string(),
            })?;
        Ok(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl<T> From<T> for Secrets
where
    T: SecretStore + 'static,
{
    fn from(value: T) -> Self {
        Secrets {
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Secrets {
    /// Initialise an in-memory secret store for unit tests.
    pub fn fixture() -> (Secrets, SecretsFixture) {
        let fixture = SecretsFixture::default();
        (Secrets::from(fixture.clone()), fixture)
    }
}

/// Operations implemented by secret stores supported by the engine.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the JSON document stored under a secret reference.
    async fn fetch(&self, context: &Context, secret_ref: &str) -> Result<serde_json::Value>;
}

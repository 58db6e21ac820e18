//! In-memory implementation of [`SecretStore`](super::SecretStore) for unit
//! tests.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;

use mos_context::Context;

use super::SecretStore;

/// An unknown secret reference was requested.
#[derive(Debug, thiserror::Error)]
#[error("no secret stored under '{secret_ref}'")]
pub struct SecretNotFound {
    pub secret_ref: String,
}

/// In-memory secret store for unit tests.
#[derive(Clone, Default)]
pub struct SecretsFixture {
    inner: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl SecretsFixture {
    /// Seed a secret document.
    pub fn insert<K: Into<String>>(&self, secret_ref: K, secret: serde_json::Value) {
        self.inner
            .lock()
            .expect("SecretsFixture::inner state lock poisoned")
            .insert(secret_ref.into(), secret);
    }
}

#[async_trait::async_trait]
impl SecretStore for SecretsFixture {
    async fn fetch(&self, _: &Context, secret_ref: &str) -> Result<serde_json::Value> {
        let secrets = self
            .inner
            .lock()
            .expect("SecretsFixture::inner state lock poisoned");
        match secrets.get(secret_ref) {
            Some(secret) => Ok(secret.clone()),
            None => Err(SecretNotFound {
                secret_ref: secret_ref.to_string(),
            }
            .into()),
        }
    }
}

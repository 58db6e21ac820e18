//! Blob store interface for the Monitor ONTAP Services engine.
//!
//! All persisted engine state lives in a shared blob store as JSON objects
//! keyed by name. The [`Blobs`] handle wraps a runtime selected
//! [`BlobStore`] backend and layers the conventions every caller relies on:
//!
//! - a missing key is not an error, it reads as [`None`];
//! - writes are unconditional overwrites, there is no cross-key transaction.
//!
//! Both are safe because runs for the same cluster are strictly serialised
//! by the dispatcher, so no two tasks mutate the same key concurrently.
use std::sync::Arc;

use anyhow::Context as AnyhowContext;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use mos_context::Context;

mod state;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::BlobsFixture;

pub use self::state::Domain;
pub use self::state::StateKeys;
pub use self::state::StateStore;

/// Errors decoding state objects fetched from the blob store.
///
/// A blob that exists but fails to decode is surfaced instead of being
/// clobbered: the object may be corrupted but recoverable.
#[derive(Debug, thiserror::Error)]
#[error("unable to decode state object '{key}' from the blob store")]
pub struct DecodeError {
    pub key: String,
}

/// Typed access to JSON state objects in the configured blob store.
#[derive(Clone)]
pub struct Blobs {
    inner: Arc<dyn BlobStore>,
}

impl Blobs {
    /// Fetch a raw object, mapping a missing key to [`None`].
    pub async fn get(&self, context: &Context, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(context, key).await
    }

    /// Fetch an object as UTF-8 text.
    pub async fn get_text(&self, context: &Context, key: &str) -> Result<Option<String>> {
        let body = match self.inner.get(context, key).await? {
            None => return Ok(None),
            Some(body) => body,
        };
        let text = String::from_utf8(body).with_context(|| DecodeError { key: key.into() })?;
        Ok(Some(text))
    }

    /// Fetch and decode a JSON state object.
    pub async fn get_json<T>(&self, context: &Context, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let body = match self.inner.get(context, key).await? {
            None => return Ok(None),
            Some(body) => body,
        };
        let value =
            serde_json::from_slice(&body).with_context(|| DecodeError { key: key.into() })?;
        Ok(Some(value))
    }

    /// Encode and store a JSON state object, overwriting any existing value.
    pub async fn put_json<T>(&self, context: &Context, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let body = serde_json::to_vec(value)?;
        self.inner.put(context, key, body).await
    }

    /// Encode and store a JSON state object with human friendly indentation.
    ///
    /// Used for the match-conditions document, which operators edit by hand.
    pub async fn put_json_pretty<T>(&self, context: &Context, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let body = serde_json::to_vec_pretty(value)?;
        self.inner.put(context, key, body).await
    }
}

impl<T> From<T> for Blobs
where
    T: BlobStore + 'static,
{
    fn from(value: T) -> Self {
        Blobs {
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Blobs {
    /// Initialise an in-memory blob store for unit tests.
    pub fn fixture() -> (Blobs, BlobsFixture) {
        let fixture = BlobsFixture::default();
        (Blobs::from(fixture.clone()), fixture)
    }
}

/// Operations implemented by blob stores supported by the engine.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch an object by key, returning [`None`] for missing keys.
    async fn get(&self, context: &Context, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store an object, overwriting any existing value.
    async fn put(&self, context: &Context, key: &str, body: Vec<u8>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use mos_context::Context;

    use super::Blobs;

    #[tokio::test]
    async fn missing_key_is_none() {
        let context = Context::fixture();
        let (blobs, _) = Blobs::fixture();
        let found: Option<Vec<String>> = blobs.get_json(&context, "no-such-key").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn json_round_trip() {
        let context = Context::fixture();
        let (blobs, _) = Blobs::fixture();
        let value = vec!["one".to_string(), "two".to_string()];
        blobs.put_json(&context, "key", &value).await.unwrap();
        let found: Option<Vec<String>> = blobs.get_json(&context, "key").await.unwrap();
        assert_eq!(found, Some(value));
    }

    #[tokio::test]
    async fn undecodable_blob_is_an_error() {
        let context = Context::fixture();
        let (blobs, fixture) = Blobs::fixture();
        fixture.insert("key", b"not json".to_vec());
        let found = blobs.get_json::<Vec<String>>(&context, "key").await;
        let error = found.expect_err("decode error expected");
        assert!(error.is::<super::DecodeError>());
    }
}

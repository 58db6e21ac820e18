//! In-memory implementation of [`BlobStore`](super::BlobStore) for unit
//! tests.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;

use mos_context::Context;

use super::BlobStore;

/// In-memory blob store for unit tests.
#[derive(Clone, Default)]
pub struct BlobsFixture {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl BlobsFixture {
    fn access(&self) -> MutexGuard<HashMap<String, Vec<u8>>> {
        self.inner
            .lock()
            .expect("BlobsFixture::inner state lock poisoned")
    }

    /// Seed an object directly, bypassing the [`Blobs`](super::Blobs) API.
    pub fn insert<K: Into<String>>(&self, key: K, body: Vec<u8>) {
        self.access().insert(key.into(), body);
    }

    /// Read back an object written by the code under test.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.access().get(key).cloned()
    }

    /// Read back and decode an object written by the code under test.
    pub fn json(&self, key: &str) -> Option<serde_json::Value> {
        let body = self.raw(key)?;
        Some(serde_json::from_slice(&body).expect("fixture blob is not valid JSON"))
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.access().len()
    }

    /// True when nothing was persisted.
    pub fn is_empty(&self) -> bool {
        self.access().is_empty()
    }
}

#[async_trait::async_trait]
impl BlobStore for BlobsFixture {
    async fn get(&self, _: &Context, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.access().get(key).cloned())
    }

    async fn put(&self, _: &Context, key: &str, body: Vec<u8>) -> Result<()> {
        self.access().insert(key.to_string(), body);
        Ok(())
    }
}

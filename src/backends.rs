//! Local backend implementations.
//!
//! Production deployments bind the engine's seams to the cloud services
//! (object storage, secret manager, pub/sub topic, log aggregation).
//! These built-ins keep the process runnable against the local filesystem
//! and the process logger, and double as reference implementations of the
//! backend traits.
use std::path::PathBuf;

use anyhow::Context as AnyhowContext;
use anyhow::Result;
use slog::info;

use mos_context::Context;
use mos_secrets::SecretStore;
use mos_store::BlobStore;
use mos_stream_alerts::LogEvent;
use mos_stream_alerts::LogStreamBackend;
use mos_stream_alerts::PubSubBackend;

/// A secret reference missing from the local secrets file.
#[derive(Debug, thiserror::Error)]
#[error("no secret stored under '{secret_ref}' in the local secrets file")]
pub struct UnknownSecret {
    pub secret_ref: String,
}

/// Blob store over a local directory, one file per key.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> FsBlobStore {
        FsBlobStore { root: root.into() }
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, _: &Context, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(key);
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(anyhow::Error::from(error)
                .context(format!("unable to read blob '{}'", path.display()))),
        }
    }

    async fn put(&self, _: &Context, key: &str, body: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("unable to create '{}'", self.root.display()))?;
        let path = self.root.join(key);
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("unable to write blob '{}'", path.display()))?;
        Ok(())
    }
}

/// Secret store over a JSON file of `{"<secret-ref>": {"username": ...}}`
/// objects.
pub struct FileSecretStore {
    secrets: serde_json::Value,
}

impl FileSecretStore {
    /// Load the secrets file at the given path.
    pub fn load(path: &str) -> Result<FileSecretStore> {
        let body = std::fs::read(path)
            .with_context(|| format!("unable to read secrets file '{}'", path))?;
        let secrets = serde_json::from_slice(&body)
            .with_context(|| format!("unable to decode secrets file '{}'", path))?;
        Ok(FileSecretStore { secrets })
    }

    /// A store with no secrets; every fetch fails.
    pub fn empty() -> FileSecretStore {
        FileSecretStore {
            secrets: serde_json::json!({}),
        }
    }
}

#[async_trait::async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch(&self, _: &Context, secret_ref: &str) -> Result<serde_json::Value> {
        self.secrets
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| {
                UnknownSecret {
                    secret_ref: secret_ref.to_string(),
                }
                .into()
            })
    }
}

/// Pub/sub sink that publishes through the process logger.
pub struct LoggerPubSub;

#[async_trait::async_trait]
impl PubSubBackend for LoggerPubSub {
    async fn publish(&self, context: &Context, subject: &str, message: &str) -> Result<()> {
        info!(
            context.logger, "{}", message;
            "sink" => "pubsub", "subject" => subject.to_string(),
        );
        Ok(())
    }
}

/// Log-stream sink that writes through the process logger.
pub struct LoggerLogStream;

#[async_trait::async_trait]
impl LogStreamBackend for LoggerLogStream {
    async fn ensure_stream(&self, _: &Context, _: &str) -> Result<()> {
        Ok(())
    }

    async fn put_events(&self, context: &Context, stream: &str, events: &[LogEvent]) -> Result<()> {
        for event in events {
            info!(
                context.logger, "{}", event.message;
                "sink" => "logstream",
                "stream" => stream.to_string(),
                "timestamp" => event.timestamp,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mos_context::Context;
    use mos_store::BlobStore;

    use super::FsBlobStore;

    #[tokio::test]
    async fn fs_blob_store_round_trips() {
        let context = Context::fixture();
        let root = std::env::temp_dir().join(format!("mos-test-{}", std::process::id()));
        let store = FsBlobStore::new(&root);
        let missing = store.get(&context, "absent").await.unwrap();
        assert!(missing.is_none());
        store
            .put(&context, "fsx.example-emsEvents", b"[]".to_vec())
            .await
            .unwrap();
        let found = store.get(&context, "fsx.example-emsEvents").await.unwrap();
        assert_eq!(found, Some(b"[]".to_vec()));
        let _ = std::fs::remove_dir_all(root);
    }
}

//! Pub/sub topic sink.
use std::sync::Arc;

use anyhow::Result;

use mos_context::Context;

/// Publish alert messages to the configured pub/sub topic.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<dyn PubSubBackend>,
}

impl PubSub {
    /// Publish a message with the given subject.
    pub async fn publish(&self, context: &Context, subject: &str, message: &str) -> Result<()> {
        self.inner.publish(context, subject, message).await
    }
}

impl<T> From<T> for PubSub
where
    T: PubSubBackend + 'static,
{
    fn from(value: T) -> Self {
        PubSub {
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl PubSub {
    /// Initialise an in-memory pub/sub sink for unit tests.
    pub fn fixture() -> (PubSub, super::fixture::PubSubFixture) {
        let fixture = super::fixture::PubSubFixture::default();
        (PubSub::from(fixture.clone()), fixture)
    }
}

/// Operations implemented by pub/sub sinks supported by the engine.
#[async_trait::async_trait]
pub trait PubSubBackend: Send + Sync {
    /// Publish a message with the given subject.
    async fn publish(&self, context: &Context, subject: &str, message: &str) -> Result<()>;
}

//! Log-aggregation stream sink.
use std::sync::Arc;

use anyhow::Result;

use mos_context::Context;

/// One record appended to a log stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEvent {
    /// Millisecond epoch of the record.
    pub timestamp: i64,

    /// Record body.
    pub message: String,
}

/// Append records to named streams of the configured log-aggregation
/// destination.
#[derive(Clone)]
pub struct LogStream {
    inner: Arc<dyn LogStreamBackend>,
}

impl LogStream {
    /// Append events to a stream, creating the stream if needed.
    pub async fn append(&self, context: &Context, stream: &str, events: &[LogEvent]) -> Result<()> {
        self.inner.ensure_stream(context, stream).await?;
        self.inner.put_events(context, stream, events).await
    }
}

impl<T> From<T> for LogStream
where
    T: LogStreamBackend + 'static,
{
    fn from(value: T) -> Self {
        LogStream {
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl LogStream {
    /// Initialise an in-memory log stream sink for unit tests.
    pub fn fixture() -> (LogStream, super::fixture::LogStreamFixture) {
        let fixture = super::fixture::LogStreamFixture::default();
        (LogStream::from(fixture.clone()), fixture)
    }
}

/// Operations implemented by log-aggregation sinks supported by the engine.
///
/// The destination (log group, index, ...) is part of the backend's own
/// configuration; callers only name streams within it.
#[async_trait::async_trait]
pub trait LogStreamBackend: Send + Sync {
    /// Create a stream if it does not already exist.
    ///
    /// Implementations must treat an already-existing stream as success so
    /// streams can be created lazily on first use.
    async fn ensure_stream(&self, context: &Context, stream: &str) -> Result<()>;

    /// Append records to an existing stream.
    async fn put_events(&self, context: &Context, stream: &str, events: &[LogEvent]) -> Result<()>;
}

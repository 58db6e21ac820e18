//! In-memory sink implementations for unit tests.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;

use mos_context::Context;

use super::LogEvent;
use super::LogStreamBackend;
use super::PubSubBackend;

/// A simulated pub/sub outage.
#[derive(Debug, thiserror::Error)]
#[error("pub/sub publish failed")]
pub struct PublishFailed;

#[derive(Default)]
struct PubSubState {
    messages: Vec<(String, String)>,
    fail_next: bool,
}

/// In-memory pub/sub sink recording published messages.
#[derive(Clone, Default)]
pub struct PubSubFixture {
    inner: Arc<Mutex<PubSubState>>,
}

impl PubSubFixture {
    fn access(&self) -> MutexGuard<PubSubState> {
        self.inner
            .lock()
            .expect("PubSubFixture::inner state lock poisoned")
    }

    /// Published (subject, message) pairs, in order.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.access().messages.clone()
    }

    /// Make the next publish fail.
    pub fn fail_next(&self) {
        self.access().fail_next = true;
    }
}

#[async_trait::async_trait]
impl PubSubBackend for PubSubFixture {
    async fn publish(&self, _: &Context, subject: &str, message: &str) -> Result<()> {
        let mut state = self.access();
        if state.fail_next {
            state.fail_next = false;
            return Err(PublishFailed.into());
        }
        state
            .messages
            .push((subject.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct LogStreamState {
    streams: HashMap<String, Vec<LogEvent>>,
    fail_next_put: bool,
}

/// In-memory log stream sink recording appended events.
#[derive(Clone, Default)]
pub struct LogStreamFixture {
    inner: Arc<Mutex<LogStreamState>>,
}

impl LogStreamFixture {
    fn access(&self) -> MutexGuard<LogStreamState> {
        self.inner
            .lock()
            .expect("LogStreamFixture::inner state lock poisoned")
    }

    /// Events appended to the named stream.
    pub fn events(&self, stream: &str) -> Vec<LogEvent> {
        self.access().streams.get(stream).cloned().unwrap_or_default()
    }

    /// Names of streams created so far.
    pub fn streams(&self) -> Vec<String> {
        let mut streams: Vec<String> = self.access().streams.keys().cloned().collect();
        streams.sort();
        streams
    }

    /// Make the next put fail, after the stream was ensured.
    pub fn fail_next_put(&self) {
        self.access().fail_next_put = true;
    }
}

#[async_trait::async_trait]
impl LogStreamBackend for LogStreamFixture {
    async fn ensure_stream(&self, _: &Context, stream: &str) -> Result<()> {
        self.access().streams.entry(stream.to_string()).or_default();
        Ok(())
    }

    async fn put_events(&self, _: &Context, stream: &str, events: &[LogEvent]) -> Result<()> {
        let mut state = self.access();
        if state.fail_next_put {
            state.fail_next_put = false;
            anyhow::bail!("log stream put failed");
        }
        state
            .streams
            .entry(stream.to_string())
            .or_default()
            .extend(events.iter().cloned());
        Ok(())
    }
}

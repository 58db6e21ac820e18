//! In-memory implementation of [`ApiTransport`](super::ApiTransport) for
//! unit tests.
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use mos_context::Context;

use super::errors::Transport;
use super::ApiResponse;
use super::ApiTransport;

enum Reply {
    Response(ApiResponse),
    TransportError,
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<Reply>>,
    requests: Vec<String>,
}

/// In-memory cluster API transport for unit tests.
///
/// Replies are queued per request path and consumed in order; requesting a
/// path with no queued reply is a transport error, so tests fail loudly on
/// unexpected requests.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn access(&self) -> MutexGuard<MockState> {
        self.inner
            .lock()
            .expect("MockTransport::inner state lock poisoned")
    }

    /// Queue a reply with the given status and body for a path.
    pub fn reply<P: Into<String>>(&self, path: P, status: u16, body: Value) {
        self.access()
            .replies
            .entry(path.into())
            .or_default()
            .push_back(Reply::Response(ApiResponse { status, body }));
    }

    /// Queue a single-page `records` reply for a path.
    pub fn reply_records<P: Into<String>>(&self, path: P, records: Value) {
        self.reply(path, 200, serde_json::json!({ "records": records }));
    }

    /// Queue a transport failure (connection refused, timeout, ...) for a
    /// path.
    pub fn fail<P: Into<String>>(&self, path: P) {
        self.access()
            .replies
            .entry(path.into())
            .or_default()
            .push_back(Reply::TransportError);
    }

    /// Paths requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.access().requests.clone()
    }
}

#[async_trait::async_trait]
impl ApiTransport for MockTransport {
    async fn get(&self, _: &Context, path: &str, _: Option<Duration>) -> Result<ApiResponse> {
        let mut state = self.access();
        state.requests.push(path.to_string());
        let reply = state
            .replies
            .get_mut(path)
            .and_then(|queue| queue.pop_front());
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::TransportError) | None => Err(Transport {
                endpoint: path.to_string(),
            }
            .into()),
        }
    }
}

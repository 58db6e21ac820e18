//! Errors returned by the cluster API client.

/// The cluster answered a request with a non-200 HTTP status.
///
/// Evaluators treat this as "the whole domain result is unusable" and abort
/// the domain for the run without persisting aged state.
#[derive(Debug, thiserror::Error)]
#[error("API call to {endpoint} failed. HTTP status code: {status}")]
pub struct ApiStatus {
    pub endpoint: String,
    pub status: u16,
}

/// A request failed before an HTTP status was received.
#[derive(Debug, thiserror::Error)]
#[error("unable to complete API request to {endpoint}")]
pub struct Transport {
    pub endpoint: String,
}

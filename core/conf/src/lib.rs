//! Invocation payload handling and per-cluster option resolution.
//!
//! The engine is configured through a flat key/value payload: process
//! environment variables when driven by a scheduler, or an event map when
//! driven by the dispatcher. Deployment tooling passes empty strings for
//! options it has no value for, so empty values read as unset everywhere.
mod controller;
mod ingest;
mod monitor;
mod payload;

pub use self::controller::ControllerConf;
pub use self::controller::InvocationType;
pub use self::ingest::IngestConf;
pub use self::monitor::MonitorConf;
pub use self::monitor::MonitorOptions;
pub use self::payload::payload_from_env;
pub use self::payload::payload_from_event;
pub use self::payload::Payload;

/// Errors resolving engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required option is missing from the payload.
    #[error("missing required option '{0}'")]
    // (option,)
    MissingOption(String),

    /// The event payload is not a JSON object of scalar values.
    #[error("the event payload must be a JSON object of scalar values")]
    PayloadShape,
}

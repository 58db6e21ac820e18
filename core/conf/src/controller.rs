//! Configuration of the cluster dispatcher.
use anyhow::Result;

use super::payload;
use super::Payload;

/// How the dispatcher invokes per-cluster monitor tasks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvocationType {
    /// The dispatcher does not observe monitor outcomes.
    FireAndForget,

    /// The dispatcher awaits each monitor and maintains failure counters.
    Synchronous,
}

/// Fully resolved configuration for a dispatcher run.
#[derive(Clone, Debug)]
pub struct ControllerConf {
    /// Blob store bucket holding the fleet descriptor and all state.
    pub bucket: String,

    /// Region of the blob store bucket.
    pub bucket_region: String,

    /// Blob key of the fleet descriptor.
    pub fleet_key: String,

    /// Pub/sub topic for dispatcher meta-alerts.
    pub sns_topic: String,

    /// Monitor invocation mode.
    pub invocation: InvocationType,

    /// Blob key of the fleet failure counters.
    pub fleet_status_key: String,

    /// The full payload, used to seed per-cluster monitor payloads.
    pub payload: Payload,
}

impl ControllerConf {
    /// Resolve the dispatcher configuration from the invocation payload.
    pub fn resolve(payload: &Payload) -> Result<ControllerConf> {
        let invocation = payload::required(payload, "monitorInvocationType")?;
        let invocation = if invocation.eq_ignore_ascii_case("asynchronous") {
            InvocationType::FireAndForget
        } else {
            InvocationType::Synchronous
        };
        Ok(ControllerConf {
            bucket: payload::required(payload, "s3BucketName")?,
            bucket_region: payload::required(payload, "s3BucketRegion")?,
            fleet_key: payload::required(payload, "FSxNList")?,
            sns_topic: payload::required(payload, "snsTopicArn")?,
            invocation,
            fleet_status_key: payload::required(payload, "FSxNStatusFilename")?,
            payload: payload.clone(),
        })
    }

    /// Seed the payload for one cluster's monitor invocation.
    ///
    /// The monitor receives the shared options, the per-entry target and
    /// every `initial*` option so a first-run cluster can synthesise its
    /// match-conditions document.
    pub fn monitor_payload(&self, host: &str, secret_ref: &str) -> Payload {
        let mut monitor = Payload::new();
        for key in ["s3BucketName", "s3BucketRegion", "snsTopicArn"] {
            if let Some(value) = payload::option(&self.payload, key) {
                monitor.insert(key.to_string(), value);
            }
        }
        for (key, value) in &self.payload {
            if key.starts_with("initial") {
                monitor.insert(key.clone(), value.clone());
            }
        }
        monitor.insert("OntapAdminServer".to_string(), host.to_string());
        monitor.insert("secretArn".to_string(), secret_ref.to_string());
        monitor
    }
}

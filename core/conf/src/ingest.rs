//! Configuration of the audit-log ingester.
use anyhow::Result;

use super::payload;
use super::Payload;

/// Fully resolved configuration for an audit-log ingestion run.
#[derive(Clone, Debug)]
pub struct IngestConf {
    /// Blob store bucket holding the fleet descriptor and the watermarks.
    pub bucket: String,

    /// Region of the blob store bucket.
    pub bucket_region: String,

    /// Blob key of the fleet descriptor.
    pub fleet_key: String,

    /// Blob key of the per-cluster watermark map.
    pub stats_key: String,

    /// Secret used for clusters without one of their own.
    pub default_secret_ref: Option<String>,

    /// Records whose `input` matches are excluded; unset never matches.
    pub input_filter: Option<String>,

    /// Records must match on `input`; unset matches everything.
    pub input_match: Option<String>,

    /// Records must match on `application`; unset matches everything.
    pub application_match: Option<String>,

    /// Records must match on `user`; unset matches everything.
    pub user_match: Option<String>,

    /// Records must match on `state`; unset matches everything.
    pub state_match: Option<String>,
}

impl IngestConf {
    /// Resolve the ingester configuration from the invocation payload.
    pub fn resolve(payload: &Payload) -> Result<IngestConf> {
        Ok(IngestConf {
            bucket: payload::required(payload, "s3BucketName")?,
            bucket_region: payload::required(payload, "s3BucketRegion")?,
            fleet_key: payload::required(payload, "FSxNList")?,
            stats_key: payload::required(payload, "statsName")?,
            default_secret_ref: payload::option(payload, "defaultSecretARN"),
            input_filter: payload::option(payload, "inputFilter"),
            input_match: payload::option(payload, "inputMatch"),
            application_match: payload::option(payload, "applicationMatch"),
            user_match: payload::option(payload, "userMatch"),
            state_match: payload::option(payload, "stateMatch"),
        })
    }
}

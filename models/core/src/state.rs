//! State objects persisted to the blob store between monitor runs.
use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::EVENT_RESILIENCE;

/// A deduplication record in a per-domain event history.
///
/// Records carry a `refresh` counter that starts at [`EVENT_RESILIENCE`]
/// when the record is inserted, is aged down by one at the start of every
/// run and restored when the underlying condition is observed again.
/// A record whose counter reaches zero is dropped by the end-of-run sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stable identifier of the underlying incident.
    #[serde(deserialize_with = "index_string")]
    pub index: String,

    /// Timestamp reported by the cluster for the originating message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    /// Name of the originating message, where the domain has one.
    #[serde(
        default,
        rename = "messageName",
        skip_serializing_if = "Option::is_none"
    )]
    pub message_name: Option<String>,

    /// Human readable snapshot of the alert that created the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Remaining polls the record survives without being observed.
    pub refresh: i64,
}

impl EventRecord {
    /// Create a fresh record with a full refresh counter.
    pub fn new<S: Into<String>>(index: S) -> EventRecord {
        EventRecord {
            index: index.into(),
            time: None,
            message_name: None,
            message: None,
            refresh: EVENT_RESILIENCE,
        }
    }
}

/// Identifiers assigned by the cluster are numeric for EMS events and
/// strings everywhere else; state written by earlier releases stores them
/// as-is, so both forms must load.
fn index_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(index) => Ok(index),
        serde_json::Value::Number(index) => Ok(index.to_string()),
        _ => Err(serde::de::Error::custom(
            "event record index must be a string or a number",
        )),
    }
}

/// Per-cluster system status tracked by the availability probe and the
/// system-health rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Consecutive failed availability probes; 0 while the cluster responds.
    #[serde(rename = "systemHealth")]
    pub system_health: u32,

    /// Last known cluster software version.
    pub version: String,

    /// Last known node count.
    #[serde(rename = "numberNodes")]
    pub number_nodes: u64,

    /// Interfaces currently observed down, each with its own refresh counter.
    #[serde(rename = "downInterfaces")]
    pub down_interfaces: Vec<EventRecord>,
}

impl SystemStatus {
    /// Version placeholder stored until the first successful probe.
    pub const INITIAL_VERSION: &'static str = "Initial Run";

    /// Status recorded the first time a cluster is monitored.
    pub fn initial() -> SystemStatus {
        SystemStatus {
            system_health: 0,
            version: SystemStatus::INITIAL_VERSION.to_string(),
            number_nodes: 2,
            down_interfaces: Vec::new(),
        }
    }
}

/// An active replication transfer watched for stall detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferWatch {
    /// UUID of the transfer being watched.
    pub uuid: String,

    /// Epoch seconds of the last observed byte-count change.
    pub time: i64,

    /// Byte count at the last observed change.
    #[serde(rename = "bytesTransferred")]
    pub bytes_transferred: u64,

    /// Whether the transfer was seen again this run; unseen entries are
    /// dropped at the end of the run.
    pub refresh: bool,
}

/// Cursor of the audit-log ingester for one cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditWatermark {
    /// Millisecond epoch of the last emitted record.
    pub timestamp: i64,

    /// Monotonic index of the last emitted record.
    pub index: u64,

    /// Timestamp string seeding the next `timestamp=>` query.
    #[serde(rename = "ascTimestamp")]
    pub seed: String,
}

impl Default for AuditWatermark {
    fn default() -> AuditWatermark {
        // "5m" asks the cluster for the last five minutes on the first run.
        AuditWatermark {
            timestamp: 0,
            index: 0,
            seed: "5m".to_string(),
        }
    }
}

/// Consecutive failed monitor invocations for one cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureCounter {
    #[serde(rename = "NumberOfFailedInvokes")]
    pub failed_invokes: u32,
}

/// Failure counters for the whole fleet, keyed by admin endpoint.
pub type FleetStatus = BTreeMap<String, FailureCounter>;

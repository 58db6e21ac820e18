//! Data models shared across the Monitor ONTAP Services crates.
//!
//! The serialised form of the state models matches the JSON objects the
//! engine persists to the blob store, so state written by earlier
//! deployments keeps loading across upgrades.
mod conditions;
mod fleet;
mod severity;
mod state;

pub use self::conditions::MatchConditions;
pub use self::conditions::RuleObject;
pub use self::conditions::ServiceBlock;
pub use self::fleet::FleetEntry;
pub use self::severity::Severity;
pub use self::state::AuditWatermark;
pub use self::state::EventRecord;
pub use self::state::FailureCounter;
pub use self::state::FleetStatus;
pub use self::state::SystemStatus;
pub use self::state::TransferWatch;

/// Number of consecutive polls an event must be absent for before its
/// history record is dropped and the incident considered cleared.
///
/// The cluster API intermittently drops records from its responses and
/// returns them again on later calls; without this grace window every such
/// gap would re-fire the alert for an incident that never went away.
pub const EVENT_RESILIENCE: i64 = 4;

/// Consecutive failed monitor invocations for a cluster before the
/// dispatcher raises a meta-alert.
pub const MAX_ALLOWED_FAILURES: u32 = 2;

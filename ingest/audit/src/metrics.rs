use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::Registry;
use slog::debug;
use slog::Logger;

pub static AUDIT_RECORDS_INGESTED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "mos_audit_records_ingested",
        "Number of audit records pushed into log streams",
    )
    .expect("Failed to create AUDIT_RECORDS_INGESTED counter")
});

/// Attempts to register metrics with the Registry.
///
/// Metrics that fail to register are logged and ignored.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(error) = registry.register(Box::new(AUDIT_RECORDS_INGESTED.clone())) {
        debug!(logger, "Failed to register AUDIT_RECORDS_INGESTED"; "error" => ?error);
    }
}

use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::Registry;
use slog::debug;
use slog::Logger;

pub static MONITOR_INVOCATIONS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "mos_dispatch_invocations",
        "Number of monitor tasks dispatched over the fleet",
    )
    .expect("Failed to create MONITOR_INVOCATIONS counter")
});

pub static MONITOR_FAILURES: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "mos_dispatch_failures",
        "Number of dispatched monitor tasks that failed",
    )
    .expect("Failed to create MONITOR_FAILURES counter")
});

/// Attempts to register metrics with the Registry.
///
/// Metrics that fail to register are logged and ignored.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(error) = registry.register(Box::new(MONITOR_INVOCATIONS.clone())) {
        debug!(logger, "Failed to register MONITOR_INVOCATIONS"; "error" => ?error);
    }
    if let Err(error) = registry.register(Box::new(MONITOR_FAILURES.clone())) {
        debug!(logger, "Failed to register MONITOR_FAILURES"; "error" => ?error);
    }
}

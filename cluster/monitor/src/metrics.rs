use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::Registry;
use slog::debug;
use slog::Logger;

pub static MONITOR_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "mos_monitor_duration",
            "Duration (in seconds) of a single-cluster monitor pass",
        )
        .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0]),
    )
    .expect("Failed to create MONITOR_DURATION histogram")
});

pub static MONITOR_ERRORS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "mos_monitor_errors",
        "Number of monitor passes aborted by a core error",
    )
    .expect("Failed to create MONITOR_ERRORS counter")
});

/// Attempts to register metrics with the Registry.
///
/// Metrics that fail to register are logged and ignored.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(error) = registry.register(Box::new(MONITOR_DURATION.clone())) {
        debug!(logger, "Failed to register MONITOR_DURATION"; "error" => ?error);
    }
    if let Err(error) = registry.register(Box::new(MONITOR_ERRORS.clone())) {
        debug!(logger, "Failed to register MONITOR_ERRORS"; "error" => ?error);
    }
}

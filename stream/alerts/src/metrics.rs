use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::Registry;
use slog::debug;
use slog::Logger;

pub static ALERTS_EMITTED: Lazy<Counter> = Lazy::new(|| {
    Counter::new("mos_alerts_emitted", "Number of alerts emitted to the sinks")
        .expect("Failed to create ALERTS_EMITTED counter")
});

pub static SINK_ERRORS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "mos_alert_sink_errors",
        "Number of alert deliveries that failed at a sink",
    )
    .expect("Failed to create SINK_ERRORS counter")
});

/// Attempts to register metrics with the Registry.
///
/// Metrics that fail to register are logged and ignored.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(error) = registry.register(Box::new(ALERTS_EMITTED.clone())) {
        debug!(logger, "Failed to register ALERTS_EMITTED"; "error" => ?error);
    }
    if let Err(error) = registry.register(Box::new(SINK_ERRORS.clone())) {
        debug!(logger, "Failed to register SINK_ERRORS"; "error" => ?error);
    }
}

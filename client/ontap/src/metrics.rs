use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::Registry;
use slog::debug;
use slog::Logger;

pub static CLIENT_REQUESTS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "mos_ontap_client_requests",
        "Number of requests issued to cluster APIs",
    )
    .expect("Failed to create CLIENT_REQUESTS counter")
});

pub static CLIENT_ERRORS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "mos_ontap_client_errors",
        "Number of cluster API requests that failed or returned an error status",
    )
    .expect("Failed to create CLIENT_ERRORS counter")
});

/// Attempts to register metrics with the Registry.
///
/// Metrics that fail to register are logged and ignored.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(error) = registry.register(Box::new(CLIENT_REQUESTS.clone())) {
        debug!(logger, "Failed to register CLIENT_REQUESTS"; "error" => ?error);
    }
    if let Err(error) = registry.register(Box::new(CLIENT_ERRORS.clone())) {
        debug!(logger, "Failed to register CLIENT_ERRORS"; "error" => ?error);
    }
}

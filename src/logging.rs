//! Process logging setup: JSON records to stdout behind an async drain.
use std::io::stdout;
use std::sync::Mutex;

use slog::Drain;
use slog::IgnoreResult;
use slog::Logger;

/// Alternative implementation of slog's `LevelFilter` with `Ok == ()`.
///
/// The stock `LevelFilter` wraps `D::Ok` into an `Option`, which stops a
/// filtering drain from being wrapped into a `Logger` directly.
struct LevelFilter<D: Drain>(D, slog::Level);

impl<D: Drain> Drain for LevelFilter<D> {
    type Ok = ();
    type Err = D::Err;

    fn log(
        &self,
        record: &slog::Record,
        values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        if record.level().is_at_least(self.1) {
            self.0.log(record, values)?;
        }
        Ok(())
    }
}

/// The minimum level logged, from the `MOS_LOG_LEVEL` environment
/// variable; info when unset or unrecognised.
fn level() -> slog::Level {
    let level = std::env::var("MOS_LOG_LEVEL").unwrap_or_default();
    match level.to_lowercase().as_str() {
        "critical" => slog::Level::Critical,
        "error" => slog::Level::Error,
        "warning" => slog::Level::Warning,
        "debug" => slog::Level::Debug,
        _ => slog::Level::Info,
    }
}

/// Create the process root [`Logger`].
pub fn configure() -> Logger {
    let drain = Mutex::new(slog_json::Json::default(stdout())).map(IgnoreResult::new);
    let drain = LevelFilter(drain, level());
    let drain = slog_async::Async::new(drain).build().ignore_res();
    Logger::root(drain, slog::o!("version" => env!("CARGO_PKG_VERSION")))
}

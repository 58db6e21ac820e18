//! The [`Context`] is an immutable container carrying operation scoped
//! values through the monitoring engine.
//!
//! Contexts are organised into a tree:
//!
//! - A root context represents the process wide scope.
//! - Derived contexts narrow the scope, typically attaching the cluster
//!   being monitored to the logger.
//!
//! Besides the [`Logger`], contexts carry the clock used for every "now"
//! the evaluators need (lag percentages, snapshot ages, stall detection).
//! Threading the clock through the context keeps time-dependent rules
//! deterministic under test.
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use slog::Logger;
use slog::OwnedKV;
use slog::SendSyncRefUnwindSafeKV;

/// Clock used to observe the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Immutable container for operation scoped values.
#[derive(Clone)]
pub struct Context {
    /// Logger with contextual attributes attached to it.
    pub logger: Logger,

    clock: Clock,
}

impl Context {
    /// Initialise a new root context using the wall clock.
    pub fn root(logger: Logger) -> ContextBuilder {
        ContextBuilder {
            logger,
            clock: Arc::new(Utc::now),
        }
    }

    /// Derive a new [`Context`] by making changes to the current one.
    pub fn derive(&self) -> ContextBuilder {
        ContextBuilder {
            logger: self.logger.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    /// The current instant, as observed by the context clock.
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// A builder for root and derived contexts.
pub struct ContextBuilder {
    logger: Logger,
    clock: Clock,
}

impl ContextBuilder {
    /// Finalise the build process and return a new [`Context`].
    pub fn build(self) -> Context {
        Context {
            logger: self.logger,
            clock: self.clock,
        }
    }

    /// Attach new key/value pairs to the context logger.
    pub fn log_values<T>(mut self, entries: OwnedKV<T>) -> Self
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        self.logger = self.logger.new(entries);
        self
    }

    /// Replace the clock observed by [`Context::now`].
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Context {
    /// Create a discarding context useful for tests.
    pub fn fixture() -> Context {
        let logger = Logger::root(slog::Discard, slog::o!());
        Context::root(logger).build()
    }

    /// Create a discarding context with a frozen clock.
    pub fn fixture_at(now: DateTime<Utc>) -> Context {
        let logger = Logger::root(slog::Discard, slog::o!());
        Context::root(logger).clock(Arc::new(move || now)).build()
    }
}

//! Alert sink fan-out.
//!
//! [`AlertSinks::emit`] is the single place alert intents are serialised
//! into sink specific formats: the structured log, an optional syslog
//! target, the pub/sub topic, an optional per-day log stream and an
//! optional webhook. Delivery is best-effort: a failing sink is logged
//! (and, for the webhook, echoed to pub/sub) but never fails the run.
use slog::crit;
use slog::debug;
use slog::error;
use slog::info;
use slog::warn;

use mos_context::Context;
use mos_models::Severity;

mod logstream;
mod metrics;
mod pubsub;
mod syslog;
mod webhook;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::LogStreamFixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::PubSubFixture;

pub use self::logstream::LogEvent;
pub use self::logstream::LogStream;
pub use self::logstream::LogStreamBackend;
pub use self::metrics::register_metrics;
pub use self::pubsub::PubSub;
pub use self::pubsub::PubSubBackend;
pub use self::syslog::Syslog;
pub use self::webhook::message_identifier;
pub use self::webhook::Webhook;

use self::metrics::ALERTS_EMITTED;
use self::metrics::SINK_ERRORS;
use self::webhook::WebhookOutcome;

/// Maximum size, in bytes, of a pub/sub subject.
const SUBJECT_LIMIT: usize = 100;

/// Fan-out of alert messages to every configured sink.
#[derive(Clone)]
pub struct AlertSinks {
    pubsub: PubSub,
    stream: Option<LogStream>,
    syslog: Option<Syslog>,
    webhook: Option<Webhook>,
    lambda_runtime: bool,
}

impl AlertSinks {
    /// Fan-out with only the mandatory pub/sub sink attached.
    pub fn new(pubsub: PubSub) -> AlertSinks {
        AlertSinks {
            pubsub,
            stream: None,
            syslog: None,
            webhook: None,
            lambda_runtime: false,
        }
    }

    /// Attach a log-aggregation stream sink.
    pub fn with_stream(mut self, stream: LogStream) -> AlertSinks {
        self.stream = Some(stream);
        self
    }

    /// Attach a syslog sink.
    pub fn with_syslog(mut self, syslog: Syslog) -> AlertSinks {
        self.syslog = Some(syslog);
        self
    }

    /// Attach a webhook sink gated by a minimum severity.
    pub fn with_webhook(mut self, webhook: Webhook) -> AlertSinks {
        self.webhook = Some(webhook);
        self
    }

    /// Tag pub/sub subjects as coming from a managed function runtime.
    pub fn lambda_runtime(mut self, lambda_runtime: bool) -> AlertSinks {
        self.lambda_runtime = lambda_runtime;
        self
    }

    /// Direct access to the pub/sub sink, for dispatcher meta-alerts.
    pub fn pubsub(&self) -> &PubSub {
        &self.pubsub
    }

    /// Deliver an alert for a cluster to every configured sink.
    pub async fn emit(&self, context: &Context, cluster: &str, message: &str, severity: Severity) {
        ALERTS_EMITTED.inc();
        match severity {
            Severity::Critical => crit!(context.logger, "{}", message; "cluster" => cluster),
            Severity::Error => error!(context.logger, "{}", message; "cluster" => cluster),
            Severity::Warning => warn!(context.logger, "{}", message; "cluster" => cluster),
            Severity::Info => info!(context.logger, "{}", message; "cluster" => cluster),
            Severity::Debug => debug!(context.logger, "{}", message; "cluster" => cluster),
        }

        if let Some(syslog) = &self.syslog {
            if let Err(error) = syslog.send(severity, message) {
                SINK_ERRORS.inc();
                debug!(
                    context.logger, "Unable to forward alert to syslog";
                    "cluster" => cluster, "error" => %error,
                );
            }
        }

        let source = if self.lambda_runtime { " Lambda " } else { " " };
        let subject = format!(
            "{}:{}Monitor ONTAP Services Alert for cluster {}",
            severity, source, cluster,
        );
        let publish = self
            .pubsub
            .publish(context, truncate_subject(&subject), message)
            .await;
        if let Err(error) = publish {
            SINK_ERRORS.inc();
            error!(
                context.logger, "Unable to publish alert to the pub/sub topic";
                "cluster" => cluster, "error" => %error,
            );
        }

        if let Some(stream) = &self.stream {
            let date = context.now().format("%Y-%m-%d");
            let name = format!("{}-monitor-ontap-services-{}", cluster, date);
            let event = LogEvent {
                timestamp: context.now().timestamp_millis(),
                message: message.to_string(),
            };
            if let Err(error) = stream.append(context, &name, &[event]).await {
                SINK_ERRORS.inc();
                error!(
                    context.logger, "Unable to forward alert to the log stream";
                    "cluster" => cluster, "stream" => name, "error" => %error,
                );
            }
        }

        if let Some(webhook) = &self.webhook {
            if !webhook.due(severity) {
                return;
            }
            match webhook.send(context, cluster, message, severity).await {
                Ok(WebhookOutcome::Delivered) => {
                    info!(context.logger, "Webhook sent successfully"; "cluster" => cluster);
                }
                Ok(WebhookOutcome::Rejected { status }) => {
                    SINK_ERRORS.inc();
                    error!(
                        context.logger,
                        "Received a non-200 HTTP status code when sending the webhook";
                        "cluster" => cluster, "status" => status,
                    );
                }
                Err(error) => {
                    SINK_ERRORS.inc();
                    let note = format!(
                        "Error: Exception occurred when sending to webhook {} for cluster {}.",
                        webhook.endpoint(),
                        cluster,
                    );
                    crit!(context.logger, "{}", note; "error" => %error);
                    let subject = format!(
                        "CRITICAL: Monitor ONTAP Services failed to send the webhook for cluster {}",
                        cluster,
                    );
                    let echo = self
                        .pubsub
                        .publish(context, truncate_subject(&subject), &note)
                        .await;
                    if let Err(error) = echo {
                        error!(
                            context.logger, "Unable to publish webhook failure to pub/sub";
                            "cluster" => cluster, "error" => %error,
                        );
                    }
                }
            }
        }
    }
}

/// Truncate a pub/sub subject to [`SUBJECT_LIMIT`] bytes on a character
/// boundary.
fn truncate_subject(subject: &str) -> &str {
    if subject.len() <= SUBJECT_LIMIT {
        return subject;
    }
    let mut end = SUBJECT_LIMIT;
    while !subject.is_char_boundary(end) {
        end -= 1;
    }
    &subject[..end]
}

#[cfg(test)]
mod tests {
    use mos_context::Context;
    use mos_models::Severity;

    use super::truncate_subject;
    use super::AlertSinks;
    use super::LogStream;
    use super::PubSub;

    #[test]
    fn short_subjects_pass_through() {
        assert_eq!(truncate_subject("WARNING: alert"), "WARNING: alert");
    }

    #[test]
    fn long_subjects_cap_at_100_bytes() {
        let subject = "X".repeat(150);
        assert_eq!(truncate_subject(&subject).len(), 100);
    }

    #[tokio::test]
    async fn emit_publishes_subject_and_body() {
        let context = Context::fixture();
        let (pubsub, published) = PubSub::fixture();
        let sinks = AlertSinks::new(pubsub);
        sinks
            .emit(&context, "fsx-test", "something broke", Severity::Warning)
            .await;
        let messages = published.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].0,
            "WARNING: Monitor ONTAP Services Alert for cluster fsx-test"
        );
        assert_eq!(messages[0].1, "something broke");
    }

    #[tokio::test]
    async fn emit_tags_lambda_runtime_subjects() {
        let context = Context::fixture();
        let (pubsub, published) = PubSub::fixture();
        let sinks = AlertSinks::new(pubsub).lambda_runtime(true);
        sinks
            .emit(&context, "fsx-test", "oh no", Severity::Critical)
            .await;
        assert_eq!(
            published.messages()[0].0,
            "CRITICAL: Lambda Monitor ONTAP Services Alert for cluster fsx-test"
        );
    }

    #[tokio::test]
    async fn emit_appends_to_daily_stream() {
        let now = chrono::DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let context = Context::fixture_at(now);
        let (pubsub, _) = PubSub::fixture();
        let (stream, streamed) = LogStream::fixture();
        let sinks = AlertSinks::new(pubsub).with_stream(stream);
        sinks
            .emit(&context, "fsx-test", "volume is full", Severity::Warning)
            .await;
        let events = streamed.events("fsx-test-monitor-ontap-services-2024-03-05");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "volume is full");
        assert_eq!(events[0].timestamp, now.timestamp_millis());
    }

    #[tokio::test]
    async fn pubsub_failure_is_best_effort() {
        let context = Context::fixture();
        let (pubsub, published) = PubSub::fixture();
        published.fail_next();
        let sinks = AlertSinks::new(pubsub);
        sinks
            .emit(&context, "fsx-test", "lost alert", Severity::Error)
            .await;
        assert!(published.messages().is_empty());
    }
}

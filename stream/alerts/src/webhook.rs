//! Webhook sink.
//!
//! The payload shape targets an incident-management webhook; the numeric
//! identifier makes repeated deliveries of the same message body collapse
//! into one incident on the receiving side.
use std::time::Duration;

use anyhow::Result;
use sha2::Digest;
use sha2::Sha256;

use mos_context::Context;
use mos_models::Severity;

/// Timeout for webhook deliveries.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a webhook delivery attempt that reached the endpoint.
pub enum WebhookOutcome {
    Delivered,
    Rejected { status: u16 },
}

/// Webhook sink with a minimum severity gate.
#[derive(Clone)]
pub struct Webhook {
    client: reqwest::Client,
    endpoint: String,
    minimum: Severity,
}

impl Webhook {
    /// Initialise a webhook sink for the given endpoint.
    pub fn new(endpoint: &str, minimum: Severity) -> Result<Webhook> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Webhook {
            client,
            endpoint: endpoint.to_string(),
            minimum,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether a message at the given severity should be delivered.
    ///
    /// Severities are encoded 1 = CRITICAL through 5 = DEBUG; a message is
    /// delivered when it is at least as severe as the configured minimum.
    pub fn due(&self, severity: Severity) -> bool {
        self.minimum.number() >= severity.number()
    }

    /// Deliver one alert to the webhook endpoint.
    pub async fn send(
        &self,
        _context: &Context,
        cluster: &str,
        message: &str,
        severity: Severity,
    ) -> Result<WebhookOutcome> {
        // The receiving side wants the bare hostname; strip the account
        // disambiguation suffix when present.
        let hostname = match cluster.find('(') {
            Some(position) => &cluster[..position],
            None => cluster,
        };
        let payload = serde_json::json!({
            "INC__summary": format!(
                "{}: FSx ONTAP Monitoring Services Alert for cluster {}", severity, cluster,
            ),
            "INC__manager": "FSxONTAP",
            "INC__severity": "3",
            "INC__identifier": format!(
                "FSx ONTAP Monitoring Services alert for cluster {} - {}",
                cluster,
                message_identifier(message),
            ),
            "INC__configurationItem": hostname,
            "INC__fullMessageText": message,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        if status == 200 {
            Ok(WebhookOutcome::Delivered)
        } else {
            Ok(WebhookOutcome::Rejected { status })
        }
    }
}

/// Stable numeric identifier for a message body.
///
/// SHA-256 of the body interpreted as a big-endian integer, modulo 10^8.
pub fn message_identifier(message: &str) -> u64 {
    let digest = Sha256::digest(message.as_bytes());
    digest
        .iter()
        .fold(0u64, |acc, byte| (acc * 256 + u64::from(*byte)) % 100_000_000)
}

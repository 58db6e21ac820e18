//! Administrative audit-log ingestion.
//!
//! For every cluster in the fleet descriptor the ingester pulls the
//! security-audit message stream from a per-cluster watermark, filters the
//! records, pushes each page's batch into a `<clusterId>-<YYYY-MM-DD>`
//! log stream and only then advances the watermark. Push or transport
//! failures leave the watermark in place, so records are re-read rather
//! than lost: delivery is at-least-once.
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context as AnyhowContext;
use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use slog::debug;
use slog::warn;

use mos_client_ontap::Api;
use mos_cluster_dispatch::fleet;
use mos_conf::IngestConf;
use mos_context::Context;
use mos_models::AuditWatermark;
use mos_models::FleetEntry;
use mos_secrets::Credentials;
use mos_secrets::Secrets;
use mos_store::Blobs;
use mos_stream_alerts::LogEvent;
use mos_stream_alerts::LogStream;

mod metrics;
mod timestamp;

pub use self::metrics::register_metrics;
pub use self::timestamp::ms_epoch;

use self::metrics::AUDIT_RECORDS_INGESTED;

/// Watermarks for every cluster, keyed by cluster id.
type WatermarkMap = BTreeMap<String, AuditWatermark>;

/// Build API clients for clusters as the ingester reaches them.
///
/// Implemented by the binary over the HTTPS transport; tests substitute
/// mock transports per cluster.
#[async_trait::async_trait]
pub trait ApiFactory: Send + Sync {
    async fn connect(&self, context: &Context, host: &str, credentials: Credentials)
        -> Result<Api>;
}

/// Pull administrative audit logs for the whole fleet.
pub struct Ingester {
    blobs: Blobs,
    secrets: Secrets,
    stream: LogStream,
    clients: Arc<dyn ApiFactory>,
    conf: IngestConf,
}

impl Ingester {
    pub fn new(
        blobs: Blobs,
        secrets: Secrets,
        stream: LogStream,
        clients: Arc<dyn ApiFactory>,
        conf: IngestConf,
    ) -> Ingester {
        Ingester {
            blobs,
            secrets,
            stream,
            clients,
            conf,
        }
    }

    /// Run one ingestion pass over the fleet.
    ///
    /// Per-cluster failures are logged and skipped; the pass continues with
    /// the next cluster and never advances a failed cluster's watermark.
    pub async fn run(&self, context: &Context) -> Result<()> {
        let descriptor = self
            .blobs
            .get_text(context, &self.conf.fleet_key)
            .await?
            .ok_or_else(|| anyhow::anyhow!(
                "unable to fetch the fleet descriptor '{}' from the blob store",
                self.conf.fleet_key,
            ))?;
        let entries = fleet::parse(context, &descriptor);
        let filters = Filters::compile(&self.conf)?;
        let mut watermarks: WatermarkMap = self
            .blobs
            .get_json(context, &self.conf.stats_key)
            .await?
            .unwrap_or_default();

        for entry in entries {
            let context = context
                .derive()
                .log_values(slog::o!("cluster" => entry.host.clone()))
                .build();
            let outcome = self
                .ingest_cluster(&context, &entry, &filters, &mut watermarks)
                .await;
            if let Err(error) = outcome {
                warn!(
                    context.logger, "Skipping cluster for this ingestion pass";
                    "error" => format!("{:#}", error),
                );
            }
        }
        Ok(())
    }

    async fn ingest_cluster(
        &self,
        context: &Context,
        entry: &FleetEntry,
        filters: &Filters,
        watermarks: &mut WatermarkMap,
    ) -> Result<()> {
        let secret_ref = match (&entry.secret_ref, &self.conf.default_secret_ref) {
            (secret_ref, _) if !secret_ref.is_empty() => secret_ref.clone(),
            (_, Some(default)) => default.clone(),
            (_, None) => anyhow::bail!("no secret reference configured for {}", entry.host),
        };
        let credentials = self
            .secrets
            .credentials(context, &secret_ref, "username", "password")
            .await
            .with_context(|| format!("unable to resolve credentials for {}", entry.host))?;
        let api = self.clients.connect(context, &entry.host, credentials).await?;

        let cluster_id = entry.cluster_id().to_string();
        let mut watermark = watermarks.get(&cluster_id).cloned().unwrap_or_default();

        let mut endpoint = Some(format!(
            "/api/security/audit/messages?timestamp=>{}&max_records=1000",
            watermark.seed,
        ));
        while let Some(path) = endpoint {
            let page = api.object(context, &path).await?;
            let records = page
                .get("records")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            debug!(
                context.logger, "Received audit records";
                "count" => records.len(),
            );

            let mut batch = Vec::new();
            let mut advanced = watermark.clone();
            for record in &records {
                let raw_timestamp = match record.get("timestamp").and_then(Value::as_str) {
                    Some(raw) => raw,
                    None => continue,
                };
                let epoch = match timestamp::ms_epoch(raw_timestamp) {
                    Some(epoch) => epoch,
                    None => {
                        warn!(
                            context.logger, "Skipping audit record with malformed timestamp";
                            "timestamp" => raw_timestamp.to_string(),
                        );
                        continue;
                    }
                };
                let index = record.get("index").and_then(Value::as_u64).unwrap_or(0);
                // The index may roll over, so both cursors are checked.
                if index <= watermark.index && epoch <= watermark.timestamp {
                    continue;
                }
                if !filters.matches(record) {
                    continue;
                }
                batch.push(LogEvent {
                    timestamp: epoch,
                    message: render(record),
                });
                advanced.index = index;
                advanced.timestamp = epoch;
                advanced.seed = raw_timestamp.to_string();
            }

            if !batch.is_empty() {
                let stream = format!("{}-{}", cluster_id, context.now().format("%Y-%m-%d"));
                self.stream.append(context, &stream, &batch).await?;
                AUDIT_RECORDS_INGESTED.inc_by(batch.len() as f64);
                watermark = advanced;
                watermarks.insert(cluster_id.clone(), watermark.clone());
                self.blobs
                    .put_json(context, &self.conf.stats_key, watermarks)
                    .await?;
            }

            endpoint = page
                .pointer("/_links/next/href")
                .and_then(Value::as_str)
                .map(String::from);
        }
        Ok(())
    }
}

/// Render an audit record into its log-stream line.
fn render(record: &Value) -> String {
    let field = |name: &str| -> &str {
        record.get(name).and_then(Value::as_str).unwrap_or("N/A")
    };
    format!(
        "{} Node:{} location:{} application:{} user:{} state:{} scope:{} input:{}",
        field("timestamp"),
        record
            .pointer("/node/name")
            .and_then(Value::as_str)
            .unwrap_or("N/A"),
        field("location"),
        field("application"),
        field("user"),
        field("state"),
        field("scope"),
        field("input"),
    )
}

/// The compound audit record filter.
///
/// The exclusion pattern never matches when unset; the match patterns
/// match everything when unset.
struct Filters {
    input_filter: Option<Regex>,
    input_match: Option<Regex>,
    application_match: Option<Regex>,
    user_match: Option<Regex>,
    state_match: Option<Regex>,
}

impl Filters {
    fn compile(conf: &IngestConf) -> Result<Filters> {
        let compile = |pattern: &Option<String>, name: &str| -> Result<Option<Regex>> {
            match pattern {
                None => Ok(None),
                Some(pattern) => {
                    let regex = Regex::new(pattern)
                        .with_context(|| format!("invalid '{}' pattern", name))?;
                    Ok(Some(regex))
                }
            }
        };
        Ok(Filters {
            input_filter: compile(&conf.input_filter, "inputFilter")?,
            input_match: compile(&conf.input_match, "inputMatch")?,
            application_match: compile(&conf.application_match, "applicationMatch")?,
            user_match: compile(&conf.user_match, "userMatch")?,
            state_match: compile(&conf.state_match, "stateMatch")?,
        })
    }

    fn matches(&self, record: &Value) -> bool {
        let field = |name: &str| -> &str {
            record.get(name).and_then(Value::as_str).unwrap_or("")
        };
        if let Some(filter) = &self.input_filter {
            if filter.is_match(field("input")) {
                return false;
            }
        }
        let check = |pattern: &Option<Regex>, value: &str| -> bool {
            pattern
                .as_ref()
                .map(|pattern| pattern.is_match(value))
                .unwrap_or(true)
        };
        check(&self.input_match, field("input"))
            && check(&self.application_match, field("application"))
            && check(&self.user_match, field("user"))
            && check(&self.state_match, field("state"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use anyhow::Result;

    use mos_client_ontap::mock::MockTransport;
    use mos_client_ontap::Api;
    use mos_conf::IngestConf;
    use mos_conf::Payload;
    use mos_context::Context;
    use mos_secrets::Credentials;
    use mos_secrets::Secrets;
    use mos_secrets::SecretsFixture;
    use mos_store::Blobs;
    use mos_store::BlobsFixture;
    use mos_stream_alerts::LogStream;
    use mos_stream_alerts::LogStreamFixture;

    use super::ApiFactory;
    use super::Ingester;

    struct MockClients {
        transports: HashMap<String, MockTransport>,
    }

    #[async_trait::async_trait]
    impl ApiFactory for MockClients {
        async fn connect(&self, _: &Context, host: &str, _: Credentials) -> Result<Api> {
            self.transports
                .get(host)
                .cloned()
                .map(Api::from)
                .ok_or_else(|| anyhow::anyhow!("no transport for {}", host))
        }
    }

    struct Fixtures {
        ingester: Ingester,
        blobs: BlobsFixture,
        streamed: LogStreamFixture,
        transports: HashMap<String, MockTransport>,
    }

    fn fixtures(hosts: &[&str], extra: &[(&str, &str)]) -> Fixtures {
        let mut payload = Payload::new();
        payload.insert("s3BucketName".into(), "state-bucket".into());
        payload.insert("s3BucketRegion".into(), "us-west-2".into());
        payload.insert("FSxNList".into(), "fleet.txt".into());
        payload.insert("statsName".into(), "lastFileRead".into());
        for (key, value) in extra {
            payload.insert(key.to_string(), value.to_string());
        }
        let conf = IngestConf::resolve(&payload).unwrap();

        let (blobs_handle, blobs) = Blobs::fixture();
        let descriptor = hosts
            .iter()
            .map(|host| format!("{},arn:secret:{}\n", host, host))
            .collect::<String>();
        blobs.insert("fleet.txt", descriptor.into_bytes());

        let (secrets_handle, secrets) = Secrets::fixture();
        seed_secrets(&secrets, hosts);

        let (stream_handle, streamed) = LogStream::fixture();
        let transports: HashMap<String, MockTransport> = hosts
            .iter()
            .map(|host| (host.to_string(), MockTransport::default()))
            .collect();
        let clients = MockClients {
            transports: transports.clone(),
        };
        let ingester = Ingester::new(
            blobs_handle,
            secrets_handle,
            stream_handle,
            Arc::new(clients),
            conf,
        );
        Fixtures {
            ingester,
            blobs,
            streamed,
            transports,
        }
    }

    fn seed_secrets(secrets: &SecretsFixture, hosts: &[&str]) {
        for host in hosts {
            secrets.insert(
                format!("arn:secret:{}", host),
                serde_json::json!({"username": "fsxadmin", "password": "hunter2"}),
            );
        }
    }

    const FIRST_PAGE: &str = "/api/security/audit/messages?timestamp=>5m&max_records=1000";

    fn audit_record(index: u64, timestamp: &str, input: &str) -> serde_json::Value {
        serde_json::json!({
            "index": index,
            "timestamp": timestamp,
            "node": {"name": "node1"},
            "application": "ssh",
            "user": "fsxadmin",
            "state": "success",
            "scope": "cluster",
            "input": input,
        })
    }

    fn test_context() -> Context {
        let now = chrono::DateTime::parse_from_rfc3339("2025-07-14T20:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        Context::fixture_at(now)
    }

    #[tokio::test]
    async fn first_run_seeds_five_minutes_back_and_persists_the_watermark() {
        let context = test_context();
        let host = "management.fs-01.fsx.example";
        let fixtures = fixtures(&[host], &[]);
        let transport = &fixtures.transports[host];
        transport.reply(
            FIRST_PAGE,
            200,
            serde_json::json!({
                "records": [
                    audit_record(10, "2025-07-14T08:08:48-06:00", "volume show"),
                    audit_record(11, "2025-07-14T08:09:12-06:00", "volume offline vol1"),
                ],
                "_links": {},
            }),
        );
        fixtures.ingester.run(&context).await.unwrap();

        assert_eq!(transport.requests(), vec![FIRST_PAGE.to_string()]);
        let stats = fixtures.blobs.json("lastFileRead").unwrap();
        assert_eq!(stats["fs-01"]["index"], 11);
        assert_eq!(stats["fs-01"]["ascTimestamp"], "2025-07-14T08:09:12-06:00");
        assert_eq!(
            stats["fs-01"]["timestamp"],
            super::ms_epoch("2025-07-14T08:09:12-06:00").unwrap()
        );
        let events = fixtures.streamed.events("fs-01-2025-07-14");
        assert_eq!(events.len(), 2);
        assert!(events[1].message.contains("input:volume offline vol1"));
        assert!(events[1].message.contains("Node:node1"));
    }

    #[tokio::test]
    async fn records_at_or_below_the_watermark_are_not_replayed() {
        let context = test_context();
        let host = "management.fs-01.fsx.example";
        let fixtures = fixtures(&[host], &[]);
        fixtures.blobs.insert(
            "lastFileRead",
            serde_json::to_vec(&serde_json::json!({
                "fs-01": {
                    "index": 10,
                    "timestamp": super::ms_epoch("2025-07-14T08:08:48-06:00").unwrap(),
                    "ascTimestamp": "2025-07-14T08:08:48-06:00",
                },
            }))
            .unwrap(),
        );
        let seeded = "/api/security/audit/messages?timestamp=>2025-07-14T08:08:48-06:00&max_records=1000";
        fixtures.transports[host].reply(
            seeded,
            200,
            serde_json::json!({
                "records": [
                    audit_record(10, "2025-07-14T08:08:48-06:00", "volume show"),
                    audit_record(11, "2025-07-14T08:09:12-06:00", "volume offline vol1"),
                ],
            }),
        );
        fixtures.ingester.run(&context).await.unwrap();
        let events = fixtures.streamed.events("fs-01-2025-07-14");
        assert_eq!(events.len(), 1);
        let stats = fixtures.blobs.json("lastFileRead").unwrap();
        assert_eq!(stats["fs-01"]["index"], 11);
    }

    #[tokio::test]
    async fn push_failure_leaves_the_watermark_in_place() {
        let context = test_context();
        let host = "management.fs-01.fsx.example";
        let fixtures = fixtures(&[host], &[]);
        fixtures.transports[host].reply(
            FIRST_PAGE,
            200,
            serde_json::json!({
                "records": [audit_record(10, "2025-07-14T08:08:48-06:00", "volume show")],
            }),
        );
        fixtures.streamed.fail_next_put();
        fixtures.ingester.run(&context).await.unwrap();
        assert!(fixtures.blobs.json("lastFileRead").is_none());
    }

    #[tokio::test]
    async fn one_unreachable_cluster_does_not_block_the_rest() {
        let context = test_context();
        let first = "management.fs-01.fsx.example";
        let second = "management.fs-02.fsx.example";
        let fixtures = fixtures(&[first, second], &[]);
        fixtures.transports[first].fail(FIRST_PAGE);
        fixtures.transports[second].reply(
            FIRST_PAGE,
            200,
            serde_json::json!({
                "records": [audit_record(5, "2025-07-14T08:00:00-06:00", "security login")],
            }),
        );
        fixtures.ingester.run(&context).await.unwrap();
        assert_eq!(fixtures.streamed.events("fs-02-2025-07-14").len(), 1);
        let stats = fixtures.blobs.json("lastFileRead").unwrap();
        assert!(stats.get("fs-01").is_none());
        assert_eq!(stats["fs-02"]["index"], 5);
    }

    #[tokio::test]
    async fn compound_filters_gate_the_records() {
        let context = test_context();
        let host = "management.fs-01.fsx.example";
        let fixtures = fixtures(
            &[host],
            &[("inputFilter", "show"), ("userMatch", "fsxadmin")],
        );
        fixtures.transports[host].reply(
            FIRST_PAGE,
            200,
            serde_json::json!({
                "records": [
                    audit_record(1, "2025-07-14T08:00:00-06:00", "volume show"),
                    audit_record(2, "2025-07-14T08:01:00-06:00", "volume offline vol1"),
                ],
            }),
        );
        fixtures.ingester.run(&context).await.unwrap();
        let events = fixtures.streamed.events("fs-01-2025-07-14");
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("volume offline"));
    }

    #[tokio::test]
    async fn pagination_pushes_and_advances_per_page() {
        let context = test_context();
        let host = "management.fs-01.fsx.example";
        let fixtures = fixtures(&[host], &[]);
        let transport = &fixtures.transports[host];
        transport.reply(
            FIRST_PAGE,
            200,
            serde_json::json!({
                "records": [audit_record(1, "2025-07-14T08:00:00-06:00", "volume show")],
                "_links": {"next": {"href": "/api/security/audit/messages?page=2"}},
            }),
        );
        transport.reply(
            "/api/security/audit/messages?page=2",
            200,
            serde_json::json!({
                "records": [audit_record(2, "2025-07-14T08:01:00-06:00", "volume offline")],
            }),
        );
        fixtures.ingester.run(&context).await.unwrap();
        assert_eq!(fixtures.streamed.events("fs-01-2025-07-14").len(), 2);
        let stats = fixtures.blobs.json("lastFileRead").unwrap();
        assert_eq!(stats["fs-01"]["index"], 2);
    }
}

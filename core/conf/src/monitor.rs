//! Configuration of a single-cluster monitor run.
use std::collections::BTreeMap;

use anyhow::Result;
use slog::warn;
use slog::Logger;

use mos_models::Severity;
use mos_store::StateKeys;

use super::payload;
use super::Payload;

/// Options the monitor recognises, from the payload or the per-cluster
/// config file. Anything else in a config file warns and is ignored.
const KNOWN_OPTIONS: &[&str] = &[
    "OntapAdminServer",
    "s3BucketName",
    "s3BucketRegion",
    "snsTopicArn",
    "secretArn",
    "secretUsernameKey",
    "secretPasswordKey",
    "configFilename",
    "syslogIP",
    "cloudWatchLogGroupArn",
    "awsAccountId",
    "webhookEndpoint",
    "webhookSeverity",
    "emsEventsFilename",
    "smEventsFilename",
    "smRelationshipsFilename",
    "conditionsFilename",
    "storageEventsFilename",
    "quotaEventsFilename",
    "systemStatusFilename",
    "vserverEventsFilename",
];

/// State-object options and the stem their default key is derived from.
const FILENAME_OPTIONS: &[(&str, &str)] = &[
    ("emsEventsFilename", "emsEvents"),
    ("smEventsFilename", "smEvents"),
    ("smRelationshipsFilename", "smRelationships"),
    ("conditionsFilename", "conditions"),
    ("storageEventsFilename", "storageEvents"),
    ("quotaEventsFilename", "quotaEvents"),
    ("systemStatusFilename", "systemStatus"),
    ("vserverEventsFilename", "vserverEvents"),
];

/// Monitor options gathered from the payload, before the per-cluster config
/// file overlay.
///
/// Resolution happens in two steps because the config file lives in the
/// blob store: the payload names the cluster and the bucket, the config
/// file may then fill in any option the payload left unset.
pub struct MonitorOptions {
    admin_server: String,
    options: BTreeMap<String, String>,
    initials: BTreeMap<String, String>,
}

impl MonitorOptions {
    /// Gather options from the invocation payload.
    pub fn gather(payload: &Payload) -> Result<MonitorOptions> {
        let admin_server = payload::required(payload, "OntapAdminServer")?;
        payload::required(payload, "s3BucketName")?;
        payload::required(payload, "s3BucketRegion")?;
        let mut options = BTreeMap::new();
        for key in KNOWN_OPTIONS {
            if let Some(value) = payload::option(payload, key) {
                options.insert(key.to_string(), value);
            }
        }
        let initials = payload
            .iter()
            .filter(|(key, _)| key.starts_with("initial"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(MonitorOptions {
            admin_server,
            options,
            initials,
        })
    }

    /// The cluster admin endpoint this run targets.
    pub fn admin_server(&self) -> &str {
        &self.admin_server
    }

    /// The blob key of the per-cluster config file, and whether it was
    /// explicitly configured rather than defaulted.
    pub fn config_key(&self) -> (String, bool) {
        match self.options.get("configFilename") {
            Some(key) => (key.clone(), true),
            None => (format!("{}-config", self.admin_server), false),
        }
    }

    /// Overlay a per-cluster config file.
    ///
    /// Lines are `key=value`, optionally prefixed with `export `; `#` starts
    /// a comment and double quotes are stripped. Values from the file only
    /// fill options the payload left unset.
    pub fn apply_config_file(&mut self, text: &str, logger: &Logger) {
        for line in text.lines() {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let line = line.split('#').next().unwrap_or("");
            let line = line.trim().replace('"', "");
            let mut parts = line.splitn(2, '=');
            let (key, value) = match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => (key.trim().to_string(), value.trim().to_string()),
                _ => continue,
            };
            if value.is_empty() {
                warn!(
                    logger, "Empty value in per-cluster config file";
                    "cluster" => &self.admin_server, "option" => key,
                );
                continue;
            }
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                warn!(
                    logger, "Unknown option in per-cluster config file";
                    "cluster" => &self.admin_server, "option" => key,
                );
                continue;
            }
            self.options.entry(key).or_insert(value);
        }
    }

    /// Finalise the configuration, applying defaults and checking options
    /// that must be set once payload and config file are merged.
    pub fn finish(self) -> Result<MonitorConf> {
        let MonitorOptions {
            admin_server,
            mut options,
            initials,
        } = self;
        let missing = |key: &str| super::Error::MissingOption(key.to_string());
        let sns_topic = options.remove("snsTopicArn").ok_or_else(|| missing("snsTopicArn"))?;
        let secret_ref = options.remove("secretArn").ok_or_else(|| missing("secretArn"))?;
        let bucket = options.remove("s3BucketName").ok_or_else(|| missing("s3BucketName"))?;
        let bucket_region = options
            .remove("s3BucketRegion")
            .ok_or_else(|| missing("s3BucketRegion"))?;

        let mut filename = |option: &str, stem: &str| match options.remove(option) {
            Some(key) => key,
            None => format!("{}-{}", admin_server, stem),
        };
        let state_keys = StateKeys {
            system_status: filename("systemStatusFilename", "systemStatus"),
            ems_events: filename("emsEventsFilename", "emsEvents"),
            sm_events: filename("smEventsFilename", "smEvents"),
            sm_relationships: filename("smRelationshipsFilename", "smRelationships"),
            storage_events: filename("storageEventsFilename", "storageEvents"),
            quota_events: filename("quotaEventsFilename", "quotaEvents"),
            vserver_events: filename("vserverEventsFilename", "vserverEvents"),
            conditions: filename("conditionsFilename", "conditions"),
        };

        let webhook_severity = options
            .remove("webhookSeverity")
            .map(|value| Severity::parse(&value))
            .unwrap_or(Severity::Info);
        Ok(MonitorConf {
            admin_server,
            bucket,
            bucket_region,
            sns_topic,
            secret_ref,
            secret_username_key: options
                .remove("secretUsernameKey")
                .unwrap_or_else(|| "username".to_string()),
            secret_password_key: options
                .remove("secretPasswordKey")
                .unwrap_or_else(|| "password".to_string()),
            syslog_ip: options.remove("syslogIP"),
            log_group: options.remove("cloudWatchLogGroupArn"),
            account_id: options.remove("awsAccountId"),
            webhook_endpoint: options.remove("webhookEndpoint"),
            webhook_severity,
            state_keys,
            initials,
        })
    }

    /// Whether the monitor recognises an option name.
    pub fn is_known_option(key: &str) -> bool {
        KNOWN_OPTIONS.contains(&key)
    }
}

/// Fully resolved configuration for a single-cluster monitor run.
#[derive(Clone, Debug)]
pub struct MonitorConf {
    /// Hostname or IP of the cluster admin endpoint.
    pub admin_server: String,

    /// Blob store bucket holding every state object.
    pub bucket: String,

    /// Region of the blob store bucket.
    pub bucket_region: String,

    /// Pub/sub topic alerts are published to.
    pub sns_topic: String,

    /// Reference to the secret holding the cluster credentials.
    pub secret_ref: String,

    /// Key of the username inside the secret document.
    pub secret_username_key: String,

    /// Key of the password inside the secret document.
    pub secret_password_key: String,

    /// Optional syslog server to mirror alerts to.
    pub syslog_ip: Option<String>,

    /// Optional log-aggregation destination for per-day alert streams.
    pub log_group: Option<String>,

    /// Account identifier used to disambiguate cluster names in alerts.
    pub account_id: Option<String>,

    /// Optional webhook endpoint.
    pub webhook_endpoint: Option<String>,

    /// Minimum severity forwarded to the webhook.
    pub webhook_severity: Severity,

    /// Resolved blob keys of this cluster's state objects.
    pub state_keys: StateKeys,

    /// `initial*` options used to synthesise a first-run match-conditions
    /// document.
    pub initials: BTreeMap<String, String>,
}

impl MonitorConf {
    /// Cluster display name before the first successful probe.
    ///
    /// The probe replaces it with the cluster's own name; until then alerts
    /// name the admin endpoint, disambiguated by account when configured.
    pub fn fallback_cluster_name(&self) -> String {
        match &self.account_id {
            Some(account) => format!("{}({})", self.admin_server, account),
            None => self.admin_server.clone(),
        }
    }
}

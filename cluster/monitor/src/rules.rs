//! Typed views over the match-conditions rule objects.
//!
//! Rule names are case-insensitive; unrecognised names warn and are
//! otherwise ignored, so an operator typo never aborts monitoring.
use regex::Regex;
use serde_json::Value;
use slog::warn;

use mos_context::Context;
use mos_models::RuleObject;

/// Case-insensitive lookup of a rule payload.
fn value_ci<'a>(rule: &'a RuleObject, name: &str) -> Option<&'a Value> {
    rule.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

/// Consolidated system-health rules.
#[derive(Default)]
pub struct SystemHealthRules {
    pub version_change: bool,
    pub failover: bool,
    pub network_interfaces: bool,
}

impl SystemHealthRules {
    pub fn parse(context: &Context, rules: &[RuleObject]) -> SystemHealthRules {
        let mut parsed = SystemHealthRules::default();
        for rule in rules {
            for (key, value) in rule {
                let enabled = value.as_bool().unwrap_or(false);
                match key.to_lowercase().as_str() {
                    "versionchange" => parsed.version_change = enabled,
                    "failover" => parsed.failover = enabled,
                    "networkinterfaces" => parsed.network_interfaces = enabled,
                    _ => {
                        warn!(
                            context.logger, "Unknown system health matching condition";
                            "rule" => key.clone(),
                        );
                    }
                }
            }
        }
        parsed
    }
}

/// One EMS matching rule with compiled patterns.
pub struct EmsRule {
    pub name: Regex,
    pub severity: Regex,
    pub message: Regex,
    /// Exclusion pattern; a matching `log_message` suppresses the event.
    pub filter: Option<Regex>,
}

impl EmsRule {
    pub fn parse_all(context: &Context, rules: &[RuleObject]) -> Vec<EmsRule> {
        let mut parsed = Vec::new();
        for rule in rules {
            let pattern = |name: &str| -> Option<Regex> {
                let pattern = value_ci(rule, name).and_then(Value::as_str)?;
                match Regex::new(pattern) {
                    Ok(regex) => Some(regex),
                    Err(error) => {
                        warn!(
                            context.logger, "Invalid EMS rule pattern";
                            "rule" => name.to_string(), "error" => %error,
                        );
                        None
                    }
                }
            };
            let (name, severity, message) =
                match (pattern("name"), pattern("severity"), pattern("message")) {
                    (Some(name), Some(severity), Some(message)) => (name, severity, message),
                    _ => {
                        warn!(context.logger, "Skipping incomplete EMS rule");
                        continue;
                    }
                };
            let filter = value_ci(rule, "filter")
                .and_then(Value::as_str)
                .filter(|pattern| !pattern.is_empty())
                .and_then(|pattern| Regex::new(pattern).ok());
            parsed.push(EmsRule {
                name,
                severity,
                message,
                filter,
            });
        }
        parsed
    }

    /// Whether an event with the given attributes matches this rule.
    pub fn matches(&self, name: &str, severity: &str, log_message: &str) -> bool {
        if let Some(filter) = &self.filter {
            if filter.is_match(log_message) {
                return false;
            }
        }
        self.name.is_match(name)
            && self.severity.is_match(severity)
            && self.message.is_match(log_message)
    }
}

/// Consolidated replication rules.
///
/// Identifiers embed the rule name as the operator spelled it, so each rule
/// keeps its original key alongside the payload.
#[derive(Default)]
pub struct SnapmirrorRules {
    pub max_lag_time: Option<(String, i64)>,
    pub max_lag_time_percent: Option<(String, i64)>,
    pub healthy: Option<(String, bool)>,
    pub stalled_transfer_seconds: Option<(String, i64)>,
}

impl SnapmirrorRules {
    pub fn parse(context: &Context, rules: &[RuleObject]) -> SnapmirrorRules {
        let mut parsed = SnapmirrorRules::default();
        for rule in rules {
            for (key, value) in rule {
                match key.to_lowercase().as_str() {
                    "maxlagtime" => {
                        if let Some(seconds) = value.as_i64() {
                            parsed.max_lag_time = Some((key.clone(), seconds));
                        }
                    }
                    "maxlagtimepercent" => {
                        if let Some(percent) = value.as_i64() {
                            parsed.max_lag_time_percent = Some((key.clone(), percent));
                        }
                    }
                    "healthy" => {
                        if let Some(healthy) = value.as_bool() {
                            parsed.healthy = Some((key.clone(), healthy));
                        }
                    }
                    "stalledtransferseconds" => {
                        if let Some(seconds) = value.as_i64() {
                            parsed.stalled_transfer_seconds = Some((key.clone(), seconds));
                        }
                    }
                    _ => {
                        warn!(
                            context.logger, "Unknown snapmirror matching condition";
                            "rule" => key.clone(),
                        );
                    }
                }
            }
        }
        parsed
    }
}

/// One storage rule, in configuration order.
pub struct StorageRule {
    /// The rule name as the operator spelled it.
    pub key: String,
    pub kind: StorageRuleKind,
}

pub enum StorageRuleKind {
    AggrPercentUsed { critical: bool, threshold: f64 },
    VolumePercentUsed { critical: bool, threshold: f64 },
    VolumeFilesPercentUsed { critical: bool, threshold: f64 },
    Offline { enabled: bool },
    OldSnapshot { days: i64 },
}

impl StorageRule {
    pub fn parse_all(context: &Context, rules: &[RuleObject]) -> Vec<StorageRule> {
        let mut parsed = Vec::new();
        for rule in rules {
            for (key, value) in rule {
                let threshold = value.as_f64();
                let kind = match key.to_lowercase().as_str() {
                    "aggrwarnpercentused" => threshold.map(|threshold| {
                        StorageRuleKind::AggrPercentUsed {
                            critical: false,
                            threshold,
                        }
                    }),
                    "aggrcriticalpercentused" => threshold.map(|threshold| {
                        StorageRuleKind::AggrPercentUsed {
                            critical: true,
                            threshold,
                        }
                    }),
                    "volumewarnpercentused" => threshold.map(|threshold| {
                        StorageRuleKind::VolumePercentUsed {
                            critical: false,
                            threshold,
                        }
                    }),
                    "volumecriticalpercentused" => threshold.map(|threshold| {
                        StorageRuleKind::VolumePercentUsed {
                            critical: true,
                            threshold,
                        }
                    }),
                    "volumewarnfilespercentused" => threshold.map(|threshold| {
                        StorageRuleKind::VolumeFilesPercentUsed {
                            critical: false,
                            threshold,
                        }
                    }),
                    "volumecriticalfilespercentused" => threshold.map(|threshold| {
                        StorageRuleKind::VolumeFilesPercentUsed {
                            critical: true,
                            threshold,
                        }
                    }),
                    "offline" => Some(StorageRuleKind::Offline {
                        enabled: value.as_bool().unwrap_or(false),
                    }),
                    "oldsnapshot" => value.as_i64().map(|days| StorageRuleKind::OldSnapshot { days }),
                    _ => {
                        warn!(
                            context.logger, "Unknown storage matching condition";
                            "rule" => key.clone(),
                        );
                        continue;
                    }
                };
                match kind {
                    Some(kind) => parsed.push(StorageRule {
                        key: key.clone(),
                        kind,
                    }),
                    None => {
                        warn!(
                            context.logger, "Storage matching condition has an invalid payload";
                            "rule" => key.clone(),
                        );
                    }
                }
            }
        }
        parsed
    }
}

/// One quota rule, in configuration order.
pub struct QuotaRule {
    /// The rule name as the operator spelled it.
    pub key: String,
    pub kind: QuotaRuleKind,
    pub threshold: f64,
}

#[derive(Clone, Copy)]
pub enum QuotaRuleKind {
    SoftInodesPercentUsed,
    HardInodesPercentUsed,
    HardSpacePercentUsed,
    SoftSpacePercentUsed,
}

impl QuotaRule {
    pub fn parse_all(context: &Context, rules: &[RuleObject]) -> Vec<QuotaRule> {
        let mut parsed = Vec::new();
        for rule in rules {
            for (key, value) in rule {
                let kind = match key.to_lowercase().as_str() {
                    "maxsoftquotainodespercentused" => QuotaRuleKind::SoftInodesPercentUsed,
                    // The bare name is an accepted alias of the hard limit.
                    "maxquotainodespercentused" | "maxhardquotainodespercentused" => {
                        QuotaRuleKind::HardInodesPercentUsed
                    }
                    "maxhardquotaspacepercentused" => QuotaRuleKind::HardSpacePercentUsed,
                    "maxsoftquotaspacepercentused" => QuotaRuleKind::SoftSpacePercentUsed,
                    _ => {
                        warn!(
                            context.logger, "Unknown quota matching condition";
                            "rule" => key.clone(),
                        );
                        continue;
                    }
                };
                match value.as_f64() {
                    Some(threshold) => parsed.push(QuotaRule {
                        key: key.clone(),
                        kind,
                        threshold,
                    }),
                    None => {
                        warn!(
                            context.logger, "Quota matching condition has an invalid payload";
                            "rule" => key.clone(),
                        );
                    }
                }
            }
        }
        parsed
    }
}

/// Consolidated logical-server rules.
#[derive(Default)]
pub struct VserverRules {
    pub vserver_state: Option<(String, bool)>,
    pub nfs_protocol_state: Option<(String, bool)>,
    pub cifs_protocol_state: Option<(String, bool)>,
}

impl VserverRules {
    pub fn parse(context: &Context, rules: &[RuleObject]) -> VserverRules {
        let mut parsed = VserverRules::default();
        for rule in rules {
            for (key, value) in rule {
                let enabled = value.as_bool().unwrap_or(false);
                match key.to_lowercase().as_str() {
                    "vserverstate" => parsed.vserver_state = Some((key.clone(), enabled)),
                    "nfsprotocolstate" => parsed.nfs_protocol_state = Some((key.clone(), enabled)),
                    "cifsprotocolstate" => {
                        parsed.cifs_protocol_state = Some((key.clone(), enabled))
                    }
                    _ => {
                        warn!(
                            context.logger, "Unknown vserver matching condition";
                            "rule" => key.clone(),
                        );
                    }
                }
            }
        }
        parsed
    }
}

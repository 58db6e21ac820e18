//! Quota utilization rules.
use anyhow::Result;
use serde_json::Value;
use slog::info;

use mos_context::Context;
use mos_models::EventRecord;
use mos_models::ServiceBlock;
use mos_models::Severity;
use mos_store::Domain;

use crate::fmt_number;
use crate::history::EventHistory;
use crate::json_id;
use crate::num_display;
use crate::rules::QuotaRule;
use crate::rules::QuotaRuleKind;
use crate::ClusterRun;

/// The structured quota-report endpoint returns zero records on affected
/// cluster releases, so the report is read through the CLI passthrough.
const QUOTA_REPORT_PATH: &str = "/api/private/cli/volume/quota/report?fields=vserver,volume,\
index,tree,quota-type,quota-target,disk-used,disk-limit,files-used,file-limit,soft-disk-limit,\
soft-file-limit,quota-specifier,disk-used-pct-soft-disk-limit,disk-used-pct-disk-limit,\
files-used-pct-soft-file-limit,files-used-pct-file-limit&return_timeout=15";

/// Evaluate the quota service block.
pub async fn check(context: &Context, run: &ClusterRun<'_>, service: &ServiceBlock) -> Result<()> {
    let rules = QuotaRule::parse_all(context, &service.rules);
    let mut history = EventHistory::load(run.state.events(context, Domain::Quota).await?);
    history.age();

    let records = run.api.records(context, QUOTA_REPORT_PATH).await?;
    info!(
        context.logger, "Found quota report records";
        "cluster" => run.cluster.name.clone(), "count" => records.len(),
    );
    for record in &records {
        for rule in &rules {
            let (field, resource) = match rule.kind {
                QuotaRuleKind::SoftInodesPercentUsed => {
                    ("files_used_pct_soft_file_limit", Resource::Inodes)
                }
                QuotaRuleKind::HardInodesPercentUsed => {
                    ("files_used_pct_file_limit", Resource::Inodes)
                }
                QuotaRuleKind::HardSpacePercentUsed => {
                    ("disk_used_pct_disk_limit", Resource::Space)
                }
                QuotaRuleKind::SoftSpacePercentUsed => {
                    ("disk_used_pct_soft_disk_limit", Resource::Space)
                }
            };
            let used = match record.get(field) {
                Some(used) => used,
                None => continue,
            };
            let percent = used.as_f64().unwrap_or(0.0);
            // Space percentages report zero for rows without that limit.
            if matches!(resource, Resource::Space) && percent == 0.0 {
                continue;
            }
            if percent < rule.threshold {
                continue;
            }
            let index = match record.get("index") {
                Some(index) => json_id(index),
                None => continue,
            };
            let id = format!("{}_{}", index, rule.key);
            if history.observe(&id) {
                let message = alert_message(run, record, rule, resource, used);
                run.alerts
                    .emit(context, &run.cluster.name, &message, Severity::Warning)
                    .await;
                let mut entry = EventRecord::new(id);
                entry.message = Some(message);
                history.insert(entry);
            }
        }
    }

    history.sweep(context);
    if history.changed() {
        run.state
            .save_events(context, Domain::Quota, history.records())
            .await?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Resource {
    Inodes,
    Space,
}

fn alert_message(
    run: &ClusterRun<'_>,
    record: &Value,
    rule: &QuotaRule,
    resource: Resource,
    used: &Value,
) -> String {
    let quota_type = record
        .get("quota_type")
        .and_then(Value::as_str)
        .unwrap_or("");

    // User-type quotas name every user the row aggregates.
    let mut user_part = String::new();
    if quota_type == "user" {
        if let Some(targets) = record.get("quota_target").and_then(Value::as_array) {
            let users = targets
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",");
            user_part = format!("associated with user(s) \"{}\" ", users);
        }
    }
    let qtree_part = match record.get("tree").and_then(Value::as_str) {
        Some(tree) if !tree.is_empty() => format!(" under qtree: {} ", tree),
        _ => " ".to_string(),
    };

    let limit = match rule.kind {
        QuotaRuleKind::SoftInodesPercentUsed | QuotaRuleKind::SoftSpacePercentUsed => "Soft",
        QuotaRuleKind::HardInodesPercentUsed | QuotaRuleKind::HardSpacePercentUsed => "Hard",
    };
    let (alert_kind, resource_part) = match resource {
        Resource::Inodes => ("Inode", "of its inodes"),
        Resource::Space => ("Space", "of its allocated space"),
    };
    format!(
        "Quota {} Usage Alert: {} quota of type \"{}\" on {}:/{}{}{}on {} is using {}% \
         which is more than {}% {}.",
        alert_kind,
        limit,
        quota_type,
        record.get("vserver").and_then(Value::as_str).unwrap_or(""),
        record.get("volume").and_then(Value::as_str).unwrap_or(""),
        qtree_part,
        user_part,
        run.cluster.name,
        num_display(used),
        fmt_number(rule.threshold),
        resource_part,
    )
}

#[cfg(test)]
mod tests {
    use mos_context::Context;

    use super::check;
    use super::QUOTA_REPORT_PATH;
    use crate::testutil::service;
    use crate::testutil::Harness;

    #[tokio::test]
    async fn user_quota_lists_users_in_the_alert() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service(
            "quota",
            serde_json::json!([{"maxSoftQuotaInodesPercentUsed": 80}]),
        );
        harness.transport.reply_records(
            QUOTA_REPORT_PATH,
            serde_json::json!([{
                "index": 1,
                "vserver": "svm1",
                "volume": "vol1",
                "quota_type": "user",
                "quota_target": ["alice", "bob"],
                "files_used_pct_soft_file_limit": 91,
            }]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].1,
            "Quota Inode Usage Alert: Soft quota of type \"user\" on svm1:/vol1 associated \
             with user(s) \"alice,bob\" on fsx-test is using 91% which is more than 80% of \
             its inodes."
        );
        let events = harness.blobs.json("fsx.example-quotaEvents").unwrap();
        assert_eq!(events[0]["index"], "1_maxSoftQuotaInodesPercentUsed");
    }

    #[tokio::test]
    async fn tree_quota_names_the_qtree() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service(
            "quota",
            serde_json::json!([{"maxHardQuotaSpacePercentUsed": 90}]),
        );
        harness.transport.reply_records(
            QUOTA_REPORT_PATH,
            serde_json::json!([{
                "index": 3,
                "vserver": "svm1",
                "volume": "vol1",
                "tree": "projects",
                "quota_type": "tree",
                "disk_used_pct_disk_limit": 95,
            }]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0]
            .1
            .contains("on svm1:/vol1 under qtree: projects on fsx-test"));
        assert!(messages[0].1.contains("of its allocated space."));
    }

    #[tokio::test]
    async fn zero_space_percent_reads_as_no_limit() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service(
            "quota",
            serde_json::json!([{"maxSoftQuotaSpacePercentUsed": 0}]),
        );
        harness.transport.reply_records(
            QUOTA_REPORT_PATH,
            serde_json::json!([{
                "index": 4,
                "vserver": "svm1",
                "volume": "vol1",
                "quota_type": "tree",
                "disk_used_pct_soft_disk_limit": 0,
            }]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        assert!(harness.published.messages().is_empty());
    }

    #[tokio::test]
    async fn rows_deduplicate_by_index_and_rule() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service(
            "quota",
            serde_json::json!([{"maxQuotaInodesPercentUsed": 80}]),
        );
        let report = serde_json::json!([{
            "index": 9,
            "vserver": "svm1",
            "volume": "vol1",
            "quota_type": "tree",
            "files_used_pct_file_limit": 88,
        }]);
        harness
            .transport
            .reply_records(QUOTA_REPORT_PATH, report.clone());
        check(&context, &harness.run(), &block).await.unwrap();
        harness.transport.reply_records(QUOTA_REPORT_PATH, report);
        check(&context, &harness.run(), &block).await.unwrap();
        assert_eq!(harness.published.messages().len(), 1);
        let events = harness.blobs.json("fsx.example-quotaEvents").unwrap();
        assert_eq!(events[0]["index"], "9_maxQuotaInodesPercentUsed");
        assert_eq!(events[0]["refresh"], 4);
    }
}

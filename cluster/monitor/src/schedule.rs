//! Cluster schedule resolution for the replication lag-percent rule.
use std::str::FromStr;

use chrono::DateTime;
use chrono::Duration;
use chrono::TimeZone;
use chrono_tz::Tz;
use cron::Schedule;
use serde_json::Value;
use slog::error;

use mos_context::Context;

use crate::ClusterRun;

/// Most recent instant a replication relationship should have transferred.
///
/// The relationship's own transfer schedule wins; without one the policy's
/// transfer schedule is used. Relationships governed by neither resolve to
/// [`None`], as do schedule documents the cluster fails to serve; the
/// caller then falls back to the absolute lag threshold.
pub async fn last_scheduled_update(
    context: &Context,
    run: &ClusterRun<'_>,
    relationship: &Value,
) -> Option<i64> {
    let schedule_uuid = match relationship.pointer("/transfer_schedule/uuid") {
        Some(uuid) => uuid.as_str().map(String::from),
        None => {
            let policy_uuid = relationship.pointer("/policy/uuid")?.as_str()?;
            policy_schedule(context, run, policy_uuid).await
        }
    };
    let schedule_uuid = schedule_uuid?;
    last_run_time(context, run, &schedule_uuid).await
}

/// UUID of the transfer schedule attached to a replication policy, if any.
async fn policy_schedule(
    context: &Context,
    run: &ClusterRun<'_>,
    policy_uuid: &str,
) -> Option<String> {
    let path = format!(
        "/api/snapmirror/policies/{}?fields=*&return_timeout=15",
        policy_uuid,
    );
    let policy = match run.api.object(context, &path).await {
        Ok(policy) => policy,
        Err(error) => {
            error!(
                context.logger, "Unable to fetch the snapmirror policy";
                "policy" => policy_uuid.to_string(), "error" => %error,
            );
            return None;
        }
    };
    policy
        .pointer("/transfer_schedule/uuid")
        .and_then(Value::as_str)
        .map(String::from)
}

/// Epoch seconds of the most recent past firing of a cluster schedule.
async fn last_run_time(
    context: &Context,
    run: &ClusterRun<'_>,
    schedule_uuid: &str,
) -> Option<i64> {
    let path = format!(
        "/api/cluster/schedules/{}?fields=*&return_timeout=15",
        schedule_uuid,
    );
    let document = match run.api.object(context, &path).await {
        Ok(document) => document,
        Err(error) => {
            error!(
                context.logger, "Unable to fetch the cluster schedule";
                "schedule" => schedule_uuid.to_string(), "error" => %error,
            );
            return None;
        }
    };
    let expression = cron_expression(&document);
    let now = context.now();
    let last = match run.cluster.timezone {
        Some(timezone) => {
            last_fire_before(&expression, now.with_timezone(&timezone)).map(|fire| fire.timestamp())
        }
        None => last_fire_before(&expression, now).map(|fire| fire.timestamp()),
    };
    if last.is_none() {
        error!(
            context.logger, "Unable to resolve the last firing of a cluster schedule";
            "schedule" => schedule_uuid.to_string(), "expression" => expression,
        );
    }
    last
}

/// Build a five-field cron expression from a cluster schedule document,
/// substituting `*` for absent fields.
///
/// The cluster numbers weekdays from Sunday = 0; the expression parser
/// numbers them from Sunday = 1, so that field is shifted.
pub(crate) fn cron_expression(document: &Value) -> String {
    let field = |name: &str, shift: i64| -> String {
        let values = document
            .pointer(&format!("/cron/{}", name))
            .and_then(Value::as_array);
        let values = match values {
            Some(values) if !values.is_empty() => values,
            _ => return "*".to_string(),
        };
        values
            .iter()
            .map(|value| match value.as_i64() {
                Some(value) => (value + shift).to_string(),
                None => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "{} {} {} {} {}",
        field("minutes", 0),
        field("hours", 0),
        field("days", 0),
        field("months", 0),
        field("weekdays", 1),
    )
}

/// Most recent firing of a five-field cron expression at or before `now`.
///
/// The search scans forward from progressively wider windows in the past;
/// the narrow windows keep frequent schedules cheap while the widest covers
/// yearly ones.
pub(crate) fn last_fire_before<Z>(expression: &str, now: DateTime<Z>) -> Option<DateTime<Z>>
where
    Z: TimeZone,
{
    // The cron crate expects a seconds field; schedules fire on the minute.
    let schedule = Schedule::from_str(&format!("0 {}", expression)).ok()?;
    const WINDOWS: [i64; 5] = [3600, 86_400, 7 * 86_400, 35 * 86_400, 400 * 86_400];
    for window in WINDOWS {
        let start = now.clone() - Duration::seconds(window);
        let mut last = None;
        for fire in schedule.after(&start) {
            if fire > now {
                break;
            }
            last = Some(fire);
        }
        if last.is_some() {
            return last;
        }
    }
    None
}

/// The current instant in the cluster's timezone, as epoch seconds.
pub(crate) fn now_seconds(context: &Context) -> i64 {
    context.now().timestamp()
}

/// Render epoch seconds as a local timestamp for alert bodies.
pub(crate) fn render_local(epoch: i64, timezone: Option<Tz>) -> String {
    let instant = DateTime::from_timestamp(epoch, 0).unwrap_or_default();
    match timezone {
        Some(timezone) => instant
            .with_timezone(&timezone)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => instant.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

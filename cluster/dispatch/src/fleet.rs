//! Fleet descriptor parsing.
//!
//! The descriptor is plain text, one target per line:
//!
//! ```text
//! # hostname,secretRef[,option=value,...]
//! fsx1.example,arn:secret:fsx1
//! fsx2.example,arn:secret:fsx2,webhookSeverity=ERROR
//! ```
//!
//! Blank lines and `#` comments are skipped, so targets can be disabled
//! without deleting their entry.
use slog::warn;

use mos_context::Context;
use mos_models::FleetEntry;

/// Parse a fleet descriptor into its valid entries.
///
/// Lines with fewer than two fields warn and are skipped; malformed
/// override fields warn and are dropped from their entry.
pub fn parse(context: &Context, descriptor: &str) -> Vec<FleetEntry> {
    let mut entries = Vec::new();
    for (number, line) in descriptor.lines().enumerate() {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts[0].is_empty() || parts[0].starts_with('#') {
            continue;
        }
        if parts.len() < 2 {
            warn!(
                context.logger, "Skipping invalid fleet entry";
                "line" => number + 1,
            );
            continue;
        }
        let mut entry = FleetEntry::new(parts[0], parts[1]);
        for part in &parts[2..] {
            match part.split_once('=') {
                Some((key, value)) => {
                    entry
                        .overrides
                        .push((key.trim().to_string(), value.trim().to_string()));
                }
                None => {
                    warn!(
                        context.logger, "Skipping malformed fleet entry option";
                        "line" => number + 1, "option" => part.to_string(),
                    );
                }
            }
        }
        entries.push(entry);
    }
    entries
}

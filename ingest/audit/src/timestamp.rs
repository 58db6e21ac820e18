//! Audit timestamp folding.
use chrono::NaiveDate;

/// Millisecond epoch of an audit timestamp `YYYY-MM-DDTHH:MM:SS±HH:MM`.
///
/// The clock fields are folded as UTC and the zone offset's hour component
/// is then added back. The offset's minute component is intentionally
/// discarded: persisted watermarks were written this way by earlier
/// releases and must stay comparable across upgrades.
pub fn ms_epoch(value: &str) -> Option<i64> {
    let (date, rest) = value.split_once('T')?;
    let clock = rest.get(0..8)?;

    let mut date = date.split('-');
    let year: i32 = date.next()?.parse().ok()?;
    let month: u32 = date.next()?.parse().ok()?;
    let day: u32 = date.next()?.parse().ok()?;

    let mut clock = clock.split(':');
    let hour: u32 = clock.next()?.parse().ok()?;
    let minute: u32 = clock.next()?.parse().ok()?;
    let second: u32 = clock.next()?.parse().ok()?;

    let folded = NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?
        .and_utc()
        .timestamp_millis();

    // The offset sits in the third ':'-separated segment, e.g. "48-06".
    let segment = value.split(':').nth(2)?;
    let sign = *segment.as_bytes().get(2)?;
    let offset_hours: i64 = segment.get(3..5)?.parse().ok()?;
    let offset = offset_hours * 60 * 60 * 1000;
    match sign {
        b'-' => Some(folded + offset),
        b'+' => Some(folded - offset),
        _ => None,
    }
}

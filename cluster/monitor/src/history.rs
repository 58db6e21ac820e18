//! Refresh-counter based event history.
//!
//! The history is the unit of alert deduplication. Every run ages all
//! records by one, restores the counter of records whose condition is still
//! observed and sweeps out records that have been absent for
//! [`EVENT_RESILIENCE`] consecutive runs. Only incidents without a live
//! record fire an alert, so an incident alerts at most once for as long as
//! its record survives.
use slog::debug;

use mos_context::Context;
use mos_models::EventRecord;
use mos_models::EVENT_RESILIENCE;

/// A domain's event history for the duration of one run.
pub struct EventHistory {
    records: Vec<EventRecord>,
    changed: bool,
}

impl EventHistory {
    /// Wrap the records loaded from the state store.
    pub fn load(records: Vec<EventRecord>) -> EventHistory {
        EventHistory {
            records,
            changed: false,
        }
    }

    /// Age every record by one poll.
    ///
    /// Called once at the start of a run, before any observation.
    pub fn age(&mut self) {
        for record in &mut self.records {
            record.refresh -= 1;
        }
    }

    /// Record an observation of the incident with the given identifier.
    ///
    /// Returns true when the incident is not yet tracked; the caller then
    /// emits the alert and tracks it with [`EventHistory::insert`].
    /// For a tracked incident the refresh counter is restored; that only
    /// counts as a persistable change when the counter held something other
    /// than the value the aging pass just left behind.
    pub fn observe(&mut self, index: &str) -> bool {
        let record = self.records.iter_mut().find(|record| record.index == index);
        match record {
            None => true,
            Some(record) => {
                if record.refresh != EVENT_RESILIENCE - 1 {
                    self.changed = true;
                }
                record.refresh = EVENT_RESILIENCE;
                false
            }
        }
    }

    /// Track a newly observed incident.
    pub fn insert(&mut self, record: EventRecord) {
        self.changed = true;
        self.records.push(record);
    }

    /// Drop expired records and account for aged counters that must be
    /// persisted.
    ///
    /// Called once at the end of a run, after every observation.
    pub fn sweep(&mut self, context: &Context) {
        let mut position = self.records.len();
        while position > 0 {
            position -= 1;
            let record = &self.records[position];
            if record.refresh <= 0 {
                debug!(
                    context.logger, "Deleting event history record";
                    "index" => &record.index,
                );
                self.records.remove(position);
                self.changed = true;
            } else if record.refresh != EVENT_RESILIENCE {
                self.changed = true;
            }
        }
    }

    /// Whether the history differs from what was loaded and must be
    /// persisted.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Hand the records back, for histories stored inside other objects.
    pub fn into_records(self) -> Vec<EventRecord> {
        self.records
    }
}

//! Telemetry — append-only audit trail for one simulator run.
//!
//! Purely observational: nothing in the simulator reads it back to make a
//! decision. Counters and observations live in `BTreeMap`s so serialized
//! output is stable across runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Entry,
    Exit,
    EntrySkipped,
    OracleFailure,
    OracleTimeout,
    GuardEngaged,
    Cooldown,
    VoidBars,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: String,
}

/// Running summary of a numeric observation stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Observation {
    fn new(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    events: Vec<TelemetryEvent>,
    counters: BTreeMap<String, u64>,
    observations: BTreeMap<String, Observation>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>, kind: EventKind, detail: impl Into<String>) {
        let seq = self.events.len() as u64;
        self.events.push(TelemetryEvent {
            seq,
            timestamp,
            kind,
            detail: detail.into(),
        });
    }

    pub fn incr(&mut self, counter: &str) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: &str, n: u64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += n;
    }

    pub fn observe(&mut self, name: &str, value: f64) {
        match self.observations.get_mut(name) {
            Some(obs) => obs.push(value),
            None => {
                self.observations.insert(name.to_string(), Observation::new(value));
            }
        }
    }

    pub fn events(&self) -> &[TelemetryEvent] {
        &self.events
    }

    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &TelemetryEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn count(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    pub fn observation(&self, name: &str) -> Option<&Observation> {
        self.observations.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn events_are_sequenced_in_append_order() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut t = Telemetry::new();
        t.record(t0, EventKind::Entry, "long 1.2");
        t.record(t0, EventKind::Exit, "stop");
        assert_eq!(t.events().len(), 2);
        assert_eq!(t.events()[1].seq, 1);
        assert_eq!(t.events_of(EventKind::Exit).count(), 1);
    }

    #[test]
    fn counters_and_observations_accumulate() {
        let mut t = Telemetry::new();
        t.incr("oracle_failure");
        t.incr("oracle_failure");
        t.observe("guard_scale", 0.5);
        t.observe("guard_scale", 1.0);
        assert_eq!(t.count("oracle_failure"), 2);
        assert_eq!(t.count("missing"), 0);
        let obs = t.observation("guard_scale").unwrap();
        assert_eq!(obs.count, 2);
        assert!((obs.mean() - 0.75).abs() < 1e-12);
        assert_eq!(obs.min, 0.5);
    }
}

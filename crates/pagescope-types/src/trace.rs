//! Raw trace data as delivered by the `Tracing` domain.
//!
//! A [`Trace`] is the unprocessed event log captured during one pass. The
//! metrics engine in `pagescope-trace` builds its model on top of these
//! types; nothing here interprets the events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phase marker of a trace event (the `ph` field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "B")]
    Begin,
    #[serde(rename = "E")]
    End,
    #[serde(rename = "X")]
    Complete,
    #[serde(rename = "I", alias = "i", alias = "R", alias = "n")]
    Instant,
    #[serde(rename = "M")]
    Metadata,
    #[serde(rename = "b")]
    AsyncBegin,
    #[serde(rename = "e")]
    AsyncEnd,
    #[default]
    #[serde(other)]
    Other,
}

/// A single trace event.
///
/// Timestamps and durations are in microseconds of the browser's monotonic
/// clock, exactly as reported on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub tid: i64,
    #[serde(default)]
    pub ts: f64,
    #[serde(default)]
    pub cat: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ph: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

impl TraceEvent {
    /// Build an event with empty args. Mostly used to assemble synthetic traces.
    pub fn new(name: &str, cat: &str, ph: Phase, pid: i64, tid: i64, ts: f64) -> Self {
        Self {
            pid,
            tid,
            ts,
            cat: cat.to_string(),
            name: name.to_string(),
            ph,
            dur: None,
            args: Value::Null,
        }
    }

    /// Set the duration (microseconds) of a complete event.
    #[must_use]
    pub fn with_dur(mut self, dur: f64) -> Self {
        self.dur = Some(dur);
        self
    }

    /// Attach an argument payload.
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    /// End timestamp in microseconds (`ts + dur` for complete events).
    pub fn end_ts(&self) -> f64 {
        self.ts + self.dur.unwrap_or(0.0)
    }
}

/// The ordered event log captured for one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "traceEvents")]
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new(events: Vec<TraceEvent>) -> Self {
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wire_event() {
        let json = serde_json::json!({
            "pid": 89922, "tid": 1295, "ts": 77174383652u64, "ph": "X",
            "cat": "toplevel", "name": "MessageLoop::RunTask", "dur": 1200,
            "args": {}
        });
        let event: TraceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.ph, Phase::Complete);
        assert_eq!(event.dur, Some(1200.0));
        assert!((event.end_ts() - 77174384852.0).abs() < 1e-3);
    }

    #[test]
    fn unknown_phase_maps_to_other() {
        let json = serde_json::json!({"name": "x", "ph": "O", "ts": 1});
        let event: TraceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.ph, Phase::Other);
    }

    #[test]
    fn lowercase_instant_and_mark_alias() {
        for ph in ["i", "I", "R", "n"] {
            let json = serde_json::json!({"name": "navigationStart", "ph": ph, "ts": 1});
            let event: TraceEvent = serde_json::from_value(json).unwrap();
            assert_eq!(event.ph, Phase::Instant, "phase {ph}");
        }
    }

    #[test]
    fn missing_fields_default() {
        let event: TraceEvent = serde_json::from_str(r#"{"pid": 1, "tid": 2, "t": 5}"#).unwrap();
        assert_eq!(event.name, "");
        assert_eq!(event.ts, 0.0);
        assert_eq!(event.ph, Phase::Other);
    }

    #[test]
    fn trace_uses_trace_events_key() {
        let trace = Trace::new(vec![TraceEvent::new("a", "c", Phase::Instant, 1, 1, 10.0)]);
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["traceEvents"][0]["name"], "a");
        assert_eq!(json["traceEvents"][0]["ph"], "I");
    }
}

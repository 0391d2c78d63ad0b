//! Indexed view of a raw trace.
//!
//! [`TraceModel`] locates the renderer main thread and the navigation start,
//! converts timestamps to milliseconds relative to navigation start, and
//! extracts the main thread's top-level tasks as merged busy intervals.

use std::collections::HashMap;

use pagescope_types::{Phase, Trace, TraceEvent};

use crate::error::TraceError;

/// Trace event names of top-level main-thread tasks.
pub const TOP_LEVEL_TASK_NAMES: &[&str] = &[
    "MessageLoop::RunTask",
    "TaskQueueManager::ProcessTaskFromWorkQueue",
    "ThreadControllerImpl::RunTask",
    "ThreadControllerImpl::DoWork",
];

/// Frame-draw event name.
pub const FRAME_EVENT_NAME: &str = "DrawFrame";

const MAIN_THREAD_MARKER: &str = "TracingStartedInPage";
const MAIN_THREAD_NAME: &str = "CrRendererMain";
const NAVIGATION_START: &str = "navigationStart";

/// A half-open span `[start, end)` in milliseconds relative to navigation start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Identifies one thread in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId {
    pub pid: i64,
    pub tid: i64,
}

/// Processed trace.
#[derive(Debug, Clone)]
pub struct TraceModel {
    events: Vec<TraceEvent>,
    main_thread: Option<ThreadId>,
    navigation_start_us: f64,
    bounds: Interval,
    busy: Vec<Interval>,
}

impl TraceModel {
    /// Build the model. Events are sorted stably by timestamp.
    pub fn new(trace: &Trace) -> Result<Self, TraceError> {
        if trace.is_empty() {
            return Err(TraceError::insufficient("trace contains no events"));
        }

        let mut events = trace.events.clone();
        events.sort_by(|a, b| a.ts.total_cmp(&b.ts));

        let main_thread = find_main_thread(&events);
        if main_thread.is_none() {
            tracing::debug!("trace has no renderer main thread marker");
        }

        let on_main = |e: &TraceEvent| match main_thread {
            Some(t) => e.pid == t.pid && e.tid == t.tid,
            None => true,
        };
        let earliest = events
            .iter()
            .filter(|e| e.ph != Phase::Metadata)
            .map(|e| e.ts)
            .fold(f64::INFINITY, f64::min);
        let earliest = if earliest.is_finite() { earliest } else { events[0].ts };
        let navigation_start_us = events
            .iter()
            .find(|e| e.name == NAVIGATION_START && on_main(e))
            .map_or(earliest, |e| e.ts);

        let to_ms = |ts: f64| (ts - navigation_start_us) / 1000.0;

        let latest = events
            .iter()
            .filter(|e| e.ph != Phase::Metadata)
            .map(TraceEvent::end_ts)
            .fold(f64::NEG_INFINITY, f64::max);
        let latest = if latest.is_finite() { latest } else { earliest };
        let bounds = Interval {
            start: to_ms(earliest),
            end: to_ms(latest),
        };

        let busy = match main_thread {
            Some(thread) => merge_intervals(top_level_tasks(&events, thread, to_ms)),
            None => Vec::new(),
        };

        Ok(Self {
            events,
            main_thread,
            navigation_start_us,
            bounds,
            busy,
        })
    }

    /// All events, sorted by timestamp.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn main_thread(&self) -> Option<ThreadId> {
        self.main_thread
    }

    /// Whether an event belongs to the renderer main thread.
    pub fn is_main_thread(&self, event: &TraceEvent) -> bool {
        self.main_thread
            .is_some_and(|t| t.pid == event.pid && t.tid == event.tid)
    }

    /// Navigation start, in trace microseconds.
    pub fn navigation_start_us(&self) -> f64 {
        self.navigation_start_us
    }

    /// Convert a trace timestamp (µs) to ms relative to navigation start.
    pub fn relative_ms(&self, ts_us: f64) -> f64 {
        (ts_us - self.navigation_start_us) / 1000.0
    }

    /// Earliest and latest recorded instants, in relative ms.
    pub fn bounds(&self) -> Interval {
        self.bounds
    }

    /// Merged top-level task intervals on the main thread, in relative ms.
    pub fn busy_intervals(&self) -> &[Interval] {
        &self.busy
    }

    /// Remaining busy time at instant `t`, or 0 when the main thread is idle.
    pub fn remaining_busy(&self, t: f64) -> f64 {
        let idx = self.busy.partition_point(|i| i.end <= t);
        match self.busy.get(idx) {
            Some(interval) if interval.contains(t) => interval.end - t,
            _ => 0.0,
        }
    }

    /// Relative times of frame-draw events, sorted.
    ///
    /// Restricted to the main thread's process when it is known.
    pub fn frame_times(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter(|e| e.name == FRAME_EVENT_NAME)
            .filter(|e| self.main_thread.map_or(true, |t| t.pid == e.pid))
            .map(|e| self.relative_ms(e.ts))
            .collect()
    }
}

fn find_main_thread(events: &[TraceEvent]) -> Option<ThreadId> {
    if let Some(e) = events.iter().find(|e| e.name == MAIN_THREAD_MARKER) {
        return Some(ThreadId {
            pid: e.pid,
            tid: e.tid,
        });
    }
    events
        .iter()
        .find(|e| {
            e.ph == Phase::Metadata
                && e.name == "thread_name"
                && e.args.get("name").and_then(|n| n.as_str()) == Some(MAIN_THREAD_NAME)
        })
        .map(|e| ThreadId {
            pid: e.pid,
            tid: e.tid,
        })
}

/// Top-level task spans on one thread: complete events and matched
/// begin/end pairs. Unmatched begins are dropped.
fn top_level_tasks(
    events: &[TraceEvent],
    thread: ThreadId,
    to_ms: impl Fn(f64) -> f64,
) -> Vec<Interval> {
    let mut spans = Vec::new();
    let mut open: HashMap<&str, Vec<f64>> = HashMap::new();

    for e in events
        .iter()
        .filter(|e| e.pid == thread.pid && e.tid == thread.tid)
        .filter(|e| TOP_LEVEL_TASK_NAMES.contains(&e.name.as_str()))
    {
        match e.ph {
            Phase::Complete => spans.push(Interval {
                start: to_ms(e.ts),
                end: to_ms(e.end_ts()),
            }),
            Phase::Begin => open.entry(e.name.as_str()).or_default().push(e.ts),
            Phase::End => {
                if let Some(begin) = open.get_mut(e.name.as_str()).and_then(Vec::pop) {
                    spans.push(Interval {
                        start: to_ms(begin),
                        end: to_ms(e.ts),
                    });
                }
            }
            _ => {}
        }
    }
    spans
}

/// Merge overlapping or touching intervals. Empty intervals are dropped.
pub fn merge_intervals(mut spans: Vec<Interval>) -> Vec<Interval> {
    spans.retain(|s| s.end > s.start);
    spans.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut merged: Vec<Interval> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

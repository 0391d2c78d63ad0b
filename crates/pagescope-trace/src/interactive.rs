//! Interactivity onset: the first quiet window after first meaningful paint.

use serde::Serialize;

use crate::error::TraceError;
use crate::model::TraceModel;
use crate::responsiveness::{latency_samples, nearest_rank};

/// Length of a candidate window, in ms.
pub const WINDOW_MS: f64 = 500.0;

/// Distance between consecutive candidate windows, in ms.
pub const STEP_MS: f64 = 50.0;

/// A window qualifies when its p90 latency is at most this, in ms.
pub const LATENCY_THRESHOLD_MS: f64 = 50.0;

const PERCENTILE: f64 = 0.9;

/// One candidate window that was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowProbe {
    pub start: f64,
    pub end: f64,
    pub p90_latency: Option<f64>,
}

/// Result of [`find_interactive_window`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractiveWindow {
    /// Start of the first qualifying window, in ms after navigation start.
    pub onset: f64,
    /// Every window evaluated, in scan order; the last one qualified.
    pub probes: Vec<WindowProbe>,
}

/// Scan forward from first meaningful paint for the first quiet window.
///
/// Fails when a candidate window would extend past the end of the trace
/// before a qualifying one is found.
pub fn find_interactive_window(
    model: &TraceModel,
    first_meaningful_paint: f64,
) -> Result<InteractiveWindow, TraceError> {
    if model.main_thread().is_none() {
        return Err(TraceError::insufficient(
            "no renderer main thread to measure responsiveness on",
        ));
    }

    let trace_end = model.bounds().end;
    let mut probes = Vec::new();
    let mut step = 0u32;
    loop {
        let start = first_meaningful_paint + f64::from(step) * STEP_MS;
        step += 1;
        let end = start + WINDOW_MS;
        if end > trace_end {
            return Err(TraceError::insufficient(format!(
                "no quiet window found in {} candidates before trace end at {trace_end:.1} ms",
                probes.len()
            )));
        }

        let samples = latency_samples(model, start, end);
        let p90_latency = nearest_rank(&samples, PERCENTILE);
        probes.push(WindowProbe {
            start,
            end,
            p90_latency,
        });
        if p90_latency.is_some_and(|l| l <= LATENCY_THRESHOLD_MS) {
            tracing::debug!(onset = start, probes = probes.len(), "found interactive window");
            return Ok(InteractiveWindow {
                onset: start,
                probes,
            });
        }
    }
}

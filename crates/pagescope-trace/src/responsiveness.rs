//! Risk to responsiveness: estimated input latency over a window.
//!
//! The window is sampled every millisecond. An input arriving at a sampled
//! instant waits for the rest of the main-thread task running at that
//! instant, plus a fixed base response latency.

use serde::Serialize;

use crate::model::TraceModel;

/// Percentiles reported by [`risk_to_responsiveness`].
pub const DEFAULT_PERCENTILES: [f64; 5] = [0.5, 0.75, 0.9, 0.99, 1.0];

/// Latency of handling an input on an idle main thread, in ms.
pub const BASE_RESPONSE_LATENCY_MS: f64 = 16.0;

/// Distance between sampled instants, in ms.
pub const SAMPLE_INTERVAL_MS: f64 = 1.0;

/// Estimated input latency at one percentile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileLatency {
    pub percentile: f64,
    /// `None` when the window contained no eligible samples.
    pub latency: Option<f64>,
}

/// Latency distribution over `[window_start, window_end]` at the default percentiles.
pub fn risk_to_responsiveness(
    model: &TraceModel,
    window_start: f64,
    window_end: f64,
) -> Vec<PercentileLatency> {
    risk_to_responsiveness_at(model, window_start, window_end, &DEFAULT_PERCENTILES)
}

/// Latency distribution over `[window_start, window_end]` at the given percentiles.
pub fn risk_to_responsiveness_at(
    model: &TraceModel,
    window_start: f64,
    window_end: f64,
    percentiles: &[f64],
) -> Vec<PercentileLatency> {
    let samples = latency_samples(model, window_start, window_end);
    percentiles
        .iter()
        .map(|&percentile| PercentileLatency {
            percentile,
            latency: nearest_rank(&samples, percentile),
        })
        .collect()
}

/// Sorted latency samples for every eligible instant in the window.
///
/// Only instants inside the trace bounds are eligible.
pub fn latency_samples(model: &TraceModel, window_start: f64, window_end: f64) -> Vec<f64> {
    let bounds = model.bounds();
    if !window_start.is_finite() {
        return Vec::new();
    }
    // Sample instants stay on the window's grid; only those inside the
    // trace are visited.
    let first = ((bounds.start - window_start) / SAMPLE_INTERVAL_MS).ceil().max(0.0);
    let last = ((window_end.min(bounds.end) - window_start) / SAMPLE_INTERVAL_MS).floor();
    if !first.is_finite() || !last.is_finite() || last < first {
        return Vec::new();
    }
    let mut samples: Vec<f64> = (first as usize..=last as usize)
        .map(|i| window_start + i as f64 * SAMPLE_INTERVAL_MS)
        .map(|t| model.remaining_busy(t) + BASE_RESPONSE_LATENCY_MS)
        .collect();
    samples.sort_by(f64::total_cmp);
    samples
}

/// Nearest-rank percentile of sorted samples: the value at rank
/// `ceil(p * n)`, clamped to `[1, n]`.
pub fn nearest_rank(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (percentile.clamp(0.0, 1.0) * n as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, n) - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagescope_types::{Phase, Trace, TraceEvent};

    fn model_with_task(task_start_ms: f64, task_ms: f64, trace_end_ms: f64) -> TraceModel {
        let events = vec![
            TraceEvent::new("TracingStartedInPage", "t", Phase::Instant, 1, 1, 0.0),
            TraceEvent::new("navigationStart", "t", Phase::Instant, 1, 1, 0.0),
            TraceEvent::new("MessageLoop::RunTask", "toplevel", Phase::Complete, 1, 1, task_start_ms * 1000.0)
                .with_dur(task_ms * 1000.0),
            TraceEvent::new("end", "t", Phase::Instant, 1, 1, trace_end_ms * 1000.0),
        ];
        TraceModel::new(&Trace::new(events)).unwrap()
    }

    #[test]
    fn nearest_rank_selection() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(nearest_rank(&sorted, 0.5), Some(5.0));
        assert_eq!(nearest_rank(&sorted, 0.9), Some(9.0));
        assert_eq!(nearest_rank(&sorted, 0.91), Some(10.0));
        assert_eq!(nearest_rank(&sorted, 1.0), Some(10.0));
        assert_eq!(nearest_rank(&sorted, 0.0), Some(1.0));
        assert_eq!(nearest_rank(&[], 0.9), None);
    }

    #[test]
    fn idle_window_is_base_latency() {
        let model = model_with_task(500.0, 100.0, 1000.0);
        let result = risk_to_responsiveness(&model, 0.0, 400.0);
        assert_eq!(result.len(), DEFAULT_PERCENTILES.len());
        for p in result {
            assert_eq!(p.latency, Some(BASE_RESPONSE_LATENCY_MS));
        }
    }

    #[test]
    fn busy_window_projects_queueing_delay() {
        // Task covers [100, 200); window [100, 199] is fully busy.
        let model = model_with_task(100.0, 100.0, 1000.0);
        let samples = latency_samples(&model, 100.0, 199.0);
        assert_eq!(samples.len(), 100);
        assert_eq!(samples[0], 1.0 + BASE_RESPONSE_LATENCY_MS);
        assert_eq!(samples[99], 100.0 + BASE_RESPONSE_LATENCY_MS);

        let result = risk_to_responsiveness_at(&model, 100.0, 199.0, &[0.9]);
        assert_eq!(result[0].latency, Some(90.0 + BASE_RESPONSE_LATENCY_MS));
    }

    #[test]
    fn window_outside_trace_has_no_data() {
        let model = model_with_task(100.0, 100.0, 1000.0);
        let result = risk_to_responsiveness(&model, 2000.0, 2500.0);
        assert!(result.iter().all(|p| p.latency.is_none()));
    }

    #[test]
    fn samples_are_clipped_to_trace_bounds() {
        let model = model_with_task(100.0, 100.0, 1000.0);
        // [900, 1100] contains 101 instants inside the trace.
        assert_eq!(latency_samples(&model, 900.0, 1100.0).len(), 101);
    }

    #[test]
    fn huge_window_only_visits_the_trace() {
        let model = model_with_task(100.0, 100.0, 1000.0);
        assert_eq!(latency_samples(&model, 0.0, 1e12).len(), 1001);
        assert_eq!(latency_samples(&model, 0.0, f64::INFINITY).len(), 1001);
        assert_eq!(latency_samples(&model, -1e12, 1e12).len(), 1001);

        let result = risk_to_responsiveness_at(&model, 0.0, 1e12, &[0.5]);
        assert_eq!(result[0].latency, Some(BASE_RESPONSE_LATENCY_MS));
    }

    #[test]
    fn non_finite_or_inverted_windows_have_no_data() {
        let model = model_with_task(100.0, 100.0, 1000.0);
        assert!(latency_samples(&model, f64::NAN, 500.0).is_empty());
        assert!(latency_samples(&model, f64::NEG_INFINITY, 500.0).is_empty());
        assert!(latency_samples(&model, 0.0, f64::NAN).is_empty());
        assert!(latency_samples(&model, 600.0, 500.0).is_empty());
    }
}

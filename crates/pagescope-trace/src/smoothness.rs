//! Frame smoothness: mean instantaneous frame rate during a scroll.

use crate::error::TraceError;
use crate::model::TraceModel;

/// Frame gaps longer than this are stalls: they reset the reference frame
/// instead of producing a sample.
pub const MAX_FRAME_INTERVAL_MS: f64 = 150.0;

/// Upper bound of the reported frame rate.
pub const MAX_FPS: f64 = 60.0;

/// Instantaneous frame rates between consecutive frames, in order.
pub fn frame_rates(frame_times: &[f64]) -> Vec<f64> {
    let mut rates = Vec::new();
    let mut reference: Option<f64> = None;
    for &t in frame_times {
        let Some(previous) = reference else {
            reference = Some(t);
            continue;
        };
        let delta = t - previous;
        if delta <= 0.0 {
            continue;
        }
        if delta <= MAX_FRAME_INTERVAL_MS {
            rates.push(1000.0 / delta);
        }
        reference = Some(t);
    }
    rates
}

/// Mean frame rate over the trace's frame-draw events, capped at 60.
pub fn frame_smoothness(model: &TraceModel) -> Result<f64, TraceError> {
    let mut times = model.frame_times();
    times.sort_by(f64::total_cmp);
    let rates = frame_rates(&times);
    if rates.is_empty() {
        return Err(TraceError::insufficient(format!(
            "no frame intervals found among {} frame events",
            times.len()
        )));
    }
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;
    Ok(mean.min(MAX_FPS))
}

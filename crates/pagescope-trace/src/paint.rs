//! First meaningful paint.

use crate::error::TraceError;
use crate::model::TraceModel;

const FMP_EVENT: &str = "firstMeaningfulPaint";
const FMP_CANDIDATE_EVENT: &str = "firstMeaningfulPaintCandidate";

/// Time of first meaningful paint in ms after navigation start.
///
/// Uses the first `firstMeaningfulPaint` event after navigation start and
/// falls back to the last `firstMeaningfulPaintCandidate`.
pub fn first_meaningful_paint(model: &TraceModel) -> Result<f64, TraceError> {
    let after_navigation = |name: &'static str| {
        model
            .events()
            .iter()
            .filter(move |e| e.name == name)
            .map(|e| model.relative_ms(e.ts))
            .filter(|t| *t >= 0.0)
    };

    if let Some(t) = after_navigation(FMP_EVENT).next() {
        return Ok(t);
    }
    if let Some(t) = after_navigation(FMP_CANDIDATE_EVENT).last() {
        tracing::debug!(fmp = t, "using last first meaningful paint candidate");
        return Ok(t);
    }
    Err(TraceError::insufficient(
        "no firstMeaningfulPaint event found after navigation start",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagescope_types::{Phase, Trace, TraceEvent};

    fn model(extra: &[(&str, f64)]) -> TraceModel {
        let mut events = vec![
            TraceEvent::new("TracingStartedInPage", "t", Phase::Instant, 1, 1, 0.0),
            TraceEvent::new("navigationStart", "blink.user_timing", Phase::Instant, 1, 1, 50_000.0),
        ];
        for (name, ms) in extra {
            events.push(TraceEvent::new(name, "loading", Phase::Instant, 1, 1, ms * 1000.0));
        }
        TraceModel::new(&Trace::new(events)).unwrap()
    }

    #[test]
    fn first_event_after_navigation_wins() {
        let m = model(&[
            ("firstMeaningfulPaint", 20.0),
            ("firstMeaningfulPaint", 950.0),
            ("firstMeaningfulPaint", 1200.0),
        ]);
        assert_eq!(first_meaningful_paint(&m).unwrap(), 900.0);
    }

    #[test]
    fn falls_back_to_last_candidate() {
        let m = model(&[
            ("firstMeaningfulPaintCandidate", 300.0),
            ("firstMeaningfulPaintCandidate", 700.0),
        ]);
        assert_eq!(first_meaningful_paint(&m).unwrap(), 650.0);
    }

    #[test]
    fn missing_paint_is_insufficient() {
        assert!(first_meaningful_paint(&model(&[])).is_err());
    }
}

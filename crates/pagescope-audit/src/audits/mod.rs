//! Built-in audit catalog.

use std::sync::Arc;

use crate::audit::Audit;

mod first_meaningful_paint;
mod infinite_scrolling;
mod media_sized;
mod no_mutation_events;
mod smooth_scrolling;
mod time_to_interactive;

pub use first_meaningful_paint::FirstMeaningfulPaint;
pub use infinite_scrolling::InfiniteScrolling;
pub use media_sized::MediaSized;
pub use no_mutation_events::{NoMutationEvents, MUTATION_EVENTS};
pub use smooth_scrolling::SmoothScrolling;
pub use time_to_interactive::TimeToInteractive;

/// Artifact key of the `url` gatherer.
pub const URL_ARTIFACT: &str = "URL";
/// Artifact key of the `scrolling` gatherer.
pub const SCROLLING_ARTIFACT: &str = "Scrolling";
/// Artifact key of the `media-sized` gatherer.
pub const MEDIA_SIZED_ARTIFACT: &str = "MediaSized";
/// Artifact key of the `mutation-events` gatherer.
pub const MUTATION_EVENT_USE_ARTIFACT: &str = "MutationEventUse";

pub fn builtin_audits() -> Vec<Arc<dyn Audit>> {
    vec![
        Arc::new(FirstMeaningfulPaint),
        Arc::new(TimeToInteractive),
        Arc::new(SmoothScrolling),
        Arc::new(InfiniteScrolling),
        Arc::new(MediaSized),
        Arc::new(NoMutationEvents),
    ]
}

/// Map a duration onto `[0, 1]`: 1 at or below `good`, 0 at or above `poor`,
/// linear in between.
pub(crate) fn linear_score(value: f64, good: f64, poor: f64) -> f64 {
    if value <= good {
        1.0
    } else if value >= poor {
        0.0
    } else {
        (poor - value) / (poor - good)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use pagescope_types::{Phase, TraceEvent};

    pub fn event(name: &str, ph: Phase, ts_ms: f64) -> TraceEvent {
        TraceEvent::new(name, "devtools.timeline", ph, 1, 1, ts_ms * 1000.0)
    }

    /// Main-thread marker and navigation start at 0.
    pub fn page_start() -> Vec<TraceEvent> {
        vec![
            event("TracingStartedInPage", Phase::Instant, 0.0),
            event("navigationStart", Phase::Instant, 0.0),
        ]
    }

    pub fn task(start_ms: f64, dur_ms: f64) -> TraceEvent {
        event("MessageLoop::RunTask", Phase::Complete, start_ms).with_dur(dur_ms * 1000.0)
    }
}

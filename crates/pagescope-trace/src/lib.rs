//! Trace metrics engine.
//!
//! Reduces a raw [`Trace`](pagescope_types::Trace) into performance signals.
//! Build a [`TraceModel`] once per trace, then query it:
//!
//! - [`risk_to_responsiveness`]: input latency percentiles over a window
//! - [`find_interactive_window`]: first quiet window after first meaningful paint
//! - [`frame_smoothness`]: mean frame rate, capped at 60
//! - [`first_meaningful_paint`]
//!
//! All times are milliseconds relative to the trace's navigation start.

pub mod error;
pub mod interactive;
pub mod model;
pub mod paint;
pub mod responsiveness;
pub mod smoothness;

pub use error::TraceError;
pub use interactive::{find_interactive_window, InteractiveWindow, WindowProbe};
pub use model::{Interval, ThreadId, TraceModel};
pub use paint::first_meaningful_paint;
pub use responsiveness::{
    risk_to_responsiveness, risk_to_responsiveness_at, PercentileLatency, DEFAULT_PERCENTILES,
};
pub use smoothness::frame_smoothness;

use pagescope_trace::frame_smoothness;
use pagescope_types::SCROLL_PASS;

use super::SCROLLING_ARTIFACT;
use crate::audit::{ArtifactView, Audit, AuditOutput};
use crate::error::AuditError;

/// Mean frame rate while the page scrolls, in whole frames per second.
pub struct SmoothScrolling;

impl Audit for SmoothScrolling {
    fn name(&self) -> &str {
        "smooth-scrolling"
    }

    fn description(&self) -> &str {
        "Smooth scrolling, scroll performance test (fps)"
    }

    fn required_artifacts(&self) -> &[&str] {
        &[SCROLLING_ARTIFACT]
    }

    fn required_traces(&self) -> &[&str] {
        &[SCROLL_PASS]
    }

    fn audit(&self, artifacts: &ArtifactView<'_>) -> Result<AuditOutput, AuditError> {
        // The scroll itself must have happened for the frames to mean anything.
        artifacts.value(SCROLLING_ARTIFACT)?;
        let model = artifacts.trace_model(SCROLL_PASS)?;
        let fps = frame_smoothness(&model)?.floor();
        Ok(AuditOutput::new(fps)
            .with_score(fps / 60.0)
            .with_display_value(format!("{fps} fps")))
    }
}

use pagescope_trace::first_meaningful_paint;
use pagescope_types::DEFAULT_PASS;

use super::linear_score;
use crate::audit::{ArtifactView, Audit, AuditOutput};
use crate::error::AuditError;

/// Paint at or before this is a perfect score, in ms.
const GOOD_MS: f64 = 1_600.0;
/// Paint at or after this scores zero, in ms.
const POOR_MS: f64 = 10_000.0;

/// Time until the primary page content is painted.
pub struct FirstMeaningfulPaint;

impl Audit for FirstMeaningfulPaint {
    fn name(&self) -> &str {
        "first-meaningful-paint"
    }

    fn description(&self) -> &str {
        "First meaningful paint"
    }

    fn required_artifacts(&self) -> &[&str] {
        &[]
    }

    fn required_traces(&self) -> &[&str] {
        &[DEFAULT_PASS]
    }

    fn audit(&self, artifacts: &ArtifactView<'_>) -> Result<AuditOutput, AuditError> {
        let model = artifacts.trace_model(DEFAULT_PASS)?;
        let fmp = first_meaningful_paint(&model)?;
        Ok(AuditOutput::new(fmp)
            .with_score(linear_score(fmp, GOOD_MS, POOR_MS))
            .with_display_value(format!("{fmp:.1}ms")))
    }
}

use pagescope_trace::{first_meaningful_paint, find_interactive_window, risk_to_responsiveness};
use pagescope_types::DEFAULT_PASS;
use serde_json::json;

use super::linear_score;
use crate::audit::{ArtifactView, Audit, AuditOutput};
use crate::error::AuditError;

const GOOD_MS: f64 = 3_000.0;
const POOR_MS: f64 = 15_000.0;

/// First 500 ms window after first meaningful paint where the main thread
/// keeps estimated input latency at or below 50 ms at the 90th percentile.
pub struct TimeToInteractive;

impl Audit for TimeToInteractive {
    fn name(&self) -> &str {
        "time-to-interactive"
    }

    fn description(&self) -> &str {
        "Time To Interactive"
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
        let window = find_interactive_window(&model, fmp)?;
        let latencies = risk_to_responsiveness(&model, window.onset, window.onset + 500.0);

        Ok(AuditOutput::new(window.onset)
            .with_score(linear_score(window.onset, GOOD_MS, POOR_MS))
            .with_display_value(format!("{:.1}ms", window.onset))
            .with_extended_info(json!({
                "firstMeaningfulPaint": fmp,
                "windowsProbed": window.probes.len(),
                "probes": window.probes,
                "latencies": latencies,
            })))
    }
}

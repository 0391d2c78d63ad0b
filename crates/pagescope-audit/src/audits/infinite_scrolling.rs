use serde::Deserialize;
use serde_json::json;

use super::SCROLLING_ARTIFACT;
use crate::audit::{ArtifactView, Audit, AuditOutput};
use crate::error::AuditError;

/// Shape of the `Scrolling` artifact.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrollMeasurement {
    scroll_offset: f64,
    expected_offset: f64,
    height_diff: f64,
}

/// Whether an infinite list keeps up with a scroll to the bottom: how much
/// of the requested distance was covered beyond the initial third.
pub struct InfiniteScrolling;

impl Audit for InfiniteScrolling {
    fn name(&self) -> &str {
        "infinite-scrolling"
    }

    fn description(&self) -> &str {
        "Infinite scrolling, list increment test"
    }

    fn required_artifacts(&self) -> &[&str] {
        &[SCROLLING_ARTIFACT]
    }

    fn audit(&self, artifacts: &ArtifactView<'_>) -> Result<AuditOutput, AuditError> {
        let scroll: ScrollMeasurement = artifacts.decode(SCROLLING_ARTIFACT)?;
        let threshold = scroll.expected_offset / 3.0;
        if scroll.expected_offset <= 0.0 || scroll.height_diff < threshold {
            return Err(AuditError::not_measurable(
                "the page has no infinite scroll list",
            ));
        }

        let covered = (scroll.scroll_offset - threshold) * 100.0 / (scroll.expected_offset - threshold);
        let value = covered.round();
        Ok(AuditOutput::new(value)
            .with_score(value / 100.0)
            .with_extended_info(json!({
                "scrollOffset": scroll.scroll_offset,
                "expectedOffset": scroll.expected_offset,
                "heightDiff": scroll.height_diff,
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_audit;
    use pagescope_types::{Artifact, ArtifactSet, RawValue};

    fn set(scroll: f64, expected: f64, height_diff: f64) -> ArtifactSet {
        let mut set = ArtifactSet::new("https://example.com/");
        set.insert(
            SCROLLING_ARTIFACT,
            Artifact::Ok(json!({
                "scrollOffset": scroll,
                "expectedOffset": expected,
                "heightDiff": height_diff,
            })),
        )
        .unwrap();
        set
    }

    #[test]
    fn full_scroll_scores_100() {
        let result = run_audit(&InfiniteScrolling, &set(3000.0, 3000.0, 2000.0)).unwrap();
        assert_eq!(result.raw_value(), Some(RawValue::Number(100.0)));
        assert_eq!(result.score(), Some(1.0));
    }

    #[test]
    fn partial_scroll_is_proportional_beyond_threshold() {
        // Threshold 1000: (2000 - 1000) * 100 / (3000 - 1000) = 50.
        let result = run_audit(&InfiniteScrolling, &set(2000.0, 3000.0, 1500.0)).unwrap();
        assert_eq!(result.raw_value(), Some(RawValue::Number(50.0)));
        assert_eq!(result.score(), Some(0.5));
    }

    #[test]
    fn page_without_growing_list_is_not_scored() {
        let result = run_audit(&InfiniteScrolling, &set(3000.0, 3000.0, 10.0)).unwrap();
        assert!(!result.is_scored());
        assert_eq!(result.debug_string(), Some("the page has no infinite scroll list"));
    }

    #[test]
    fn malformed_artifact_is_not_scored() {
        let mut set = ArtifactSet::new("u");
        set.insert(SCROLLING_ARTIFACT, Artifact::Ok(json!("lols"))).unwrap();
        let result = run_audit(&InfiniteScrolling, &set).unwrap();
        assert!(!result.is_scored());
    }
}

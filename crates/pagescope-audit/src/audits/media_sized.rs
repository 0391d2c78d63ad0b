use serde_json::json;

use super::MEDIA_SIZED_ARTIFACT;
use crate::audit::{ArtifactView, Audit, AuditOutput};
use crate::error::AuditError;

/// Media elements declare their dimensions, so loading them does not shift
/// the layout.
pub struct MediaSized;

impl Audit for MediaSized {
    fn name(&self) -> &str {
        "media-sized"
    }

    fn description(&self) -> &str {
        "Media elements have width and height attributes inline or in CSS"
    }

    fn required_artifacts(&self) -> &[&str] {
        &[MEDIA_SIZED_ARTIFACT]
    }

    fn audit(&self, artifacts: &ArtifactView<'_>) -> Result<AuditOutput, AuditError> {
        let unsized_elements: Vec<String> = artifacts.decode(MEDIA_SIZED_ARTIFACT)?;
        let mut output = AuditOutput::new(unsized_elements.is_empty());
        if !unsized_elements.is_empty() {
            output = output.with_display_value(format!(
                "{} unsized element{}",
                unsized_elements.len(),
                if unsized_elements.len() == 1 { "" } else { "s" }
            ));
        }
        Ok(output.with_extended_info(json!({ "unsized": unsized_elements })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_audit;
    use pagescope_types::{Artifact, ArtifactSet, RawValue};

    fn set(value: serde_json::Value) -> ArtifactSet {
        let mut set = ArtifactSet::new("https://example.com/");
        set.insert(MEDIA_SIZED_ARTIFACT, Artifact::Ok(value)).unwrap();
        set
    }

    #[test]
    fn all_sized_passes() {
        let result = run_audit(&MediaSized, &set(json!([]))).unwrap();
        assert_eq!(result.raw_value(), Some(RawValue::Bool(true)));
        assert_eq!(result.score(), Some(1.0));
    }

    #[test]
    fn unsized_elements_fail_and_are_listed() {
        let result = run_audit(&MediaSized, &set(json!(["img.hero (hero.jpg)", "video"]))).unwrap();
        assert_eq!(result.raw_value(), Some(RawValue::Bool(false)));
        match &result.outcome {
            pagescope_types::AuditOutcome::Scored {
                display_value,
                extended_info,
                ..
            } => {
                assert_eq!(display_value.as_deref(), Some("2 unsized elements"));
                assert_eq!(extended_info.as_ref().unwrap()["unsized"][0], "img.hero (hero.jpg)");
            }
            other => panic!("expected scored, got {other:?}"),
        }
    }
}

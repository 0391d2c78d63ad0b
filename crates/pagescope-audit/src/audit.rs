//! The [`Audit`] trait and the read-only view audits score against.
//!
//! Every audit declares the artifact keys and pass traces it reads. The
//! engine only invokes an audit once all of them are present, and the
//! [`ArtifactView`] it receives refuses reads outside the declaration.

use pagescope_trace::TraceModel;
use pagescope_types::{Artifact, ArtifactSet, AuditOutcome, RawValue, Trace};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::AuditError;

/// A scoring function over the artifact set.
///
/// Implementations must be `Send + Sync` so the registry can hand out
/// `Arc<dyn Audit>`. Audits are pure: the same artifacts always produce
/// the same result.
pub trait Audit: Send + Sync {
    /// Unique name, used in configuration and reports.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Artifact keys this audit reads.
    fn required_artifacts(&self) -> &[&str];

    /// Pass names whose traces this audit reads.
    fn required_traces(&self) -> &[&str] {
        &[]
    }

    /// Default weight in report groups.
    fn weight(&self) -> f64 {
        1.0
    }

    fn audit(&self, artifacts: &ArtifactView<'_>) -> Result<AuditOutput, AuditError>;
}

/// Summary of a registered audit, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    pub name: String,
    pub description: String,
    pub required_artifacts: Vec<String>,
    pub required_traces: Vec<String>,
    pub weight: f64,
}

impl AuditInfo {
    pub fn of(audit: &dyn Audit) -> Self {
        Self {
            name: audit.name().to_string(),
            description: audit.description().to_string(),
            required_artifacts: audit
                .required_artifacts()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            required_traces: audit
                .required_traces()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            weight: audit.weight(),
        }
    }
}

/// A scored measurement returned by [`Audit::audit`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOutput {
    pub raw_value: RawValue,
    pub score: Option<f64>,
    pub display_value: Option<String>,
    pub extended_info: Option<Value>,
    pub debug_string: Option<String>,
}

impl AuditOutput {
    pub fn new(raw_value: impl Into<RawValue>) -> Self {
        Self {
            raw_value: raw_value.into(),
            score: None,
            display_value: None,
            extended_info: None,
            debug_string: None,
        }
    }

    /// Normalized score in `[0, 1]`.
    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn with_display_value(mut self, display: impl Into<String>) -> Self {
        self.display_value = Some(display.into());
        self
    }

    #[must_use]
    pub fn with_extended_info(mut self, info: Value) -> Self {
        self.extended_info = Some(info);
        self
    }

    #[must_use]
    pub fn with_debug_string(mut self, debug: impl Into<String>) -> Self {
        self.debug_string = Some(debug.into());
        self
    }

    pub(crate) fn into_outcome(self) -> AuditOutcome {
        AuditOutcome::Scored {
            raw_value: self.raw_value,
            score: self.score,
            display_value: self.display_value,
            extended_info: self.extended_info,
            debug_string: self.debug_string,
        }
    }
}

/// Read access to the artifacts and traces one audit declared.
pub struct ArtifactView<'a> {
    audit: &'a str,
    set: &'a ArtifactSet,
    artifacts: &'a [&'a str],
    traces: &'a [&'a str],
}

impl<'a> ArtifactView<'a> {
    pub fn new(audit: &'a dyn Audit, set: &'a ArtifactSet) -> Self {
        Self {
            audit: audit.name(),
            set,
            artifacts: audit.required_artifacts(),
            traces: audit.required_traces(),
        }
    }

    pub fn requested_url(&self) -> &str {
        self.set.requested_url()
    }

    /// The raw value of a declared, successful artifact.
    pub fn value(&self, key: &str) -> Result<&'a Value, AuditError> {
        if !self.artifacts.contains(&key) {
            return Err(self.violation(key));
        }
        match self.set.get(key) {
            Some(Artifact::Ok(value)) => Ok(value),
            Some(Artifact::Failed { debug_string }) => Err(AuditError::not_measurable(
                format!("{key} gatherer failed: {debug_string}"),
            )),
            None => Err(AuditError::not_measurable(format!(
                "required {key} gatherer did not run"
            ))),
        }
    }

    /// Decode a declared artifact into a typed value.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T, AuditError> {
        let value = self.value(key)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            AuditError::not_measurable(format!("{key} artifact has an unexpected shape: {e}"))
        })
    }

    /// The trace recorded during a declared pass.
    pub fn trace(&self, pass: &str) -> Result<&'a Trace, AuditError> {
        if !self.traces.contains(&pass) {
            return Err(self.violation(pass));
        }
        self.set
            .trace(pass)
            .ok_or_else(|| AuditError::not_measurable(format!("no trace recorded for pass '{pass}'")))
    }

    /// Build the metrics model for a declared pass trace.
    pub fn trace_model(&self, pass: &str) -> Result<TraceModel, AuditError> {
        Ok(TraceModel::new(self.trace(pass)?)?)
    }

    fn violation(&self, key: &str) -> AuditError {
        AuditError::Contract {
            audit: self.audit.to_string(),
            key: key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Reader;

    impl Audit for Reader {
        fn name(&self) -> &str {
            "reader"
        }
        fn description(&self) -> &str {
            "reads URL"
        }
        fn required_artifacts(&self) -> &[&str] {
            &["URL"]
        }
        fn audit(&self, _artifacts: &ArtifactView<'_>) -> Result<AuditOutput, AuditError> {
            Ok(AuditOutput::new(true))
        }
    }

    fn set() -> ArtifactSet {
        let mut set = ArtifactSet::new("https://example.com/");
        set.insert("URL", Artifact::Ok(json!({"finalUrl": "https://example.com/"})))
            .unwrap();
        set.insert("MediaSized", Artifact::Ok(json!([]))).unwrap();
        set
    }

    #[test]
    fn declared_reads_succeed() {
        let set = set();
        let view = ArtifactView::new(&Reader, &set);
        assert_eq!(view.value("URL").unwrap()["finalUrl"], "https://example.com/");
        assert_eq!(view.requested_url(), "https://example.com/");
    }

    #[test]
    fn undeclared_reads_are_contract_violations() {
        let set = set();
        let view = ArtifactView::new(&Reader, &set);
        assert_eq!(
            view.value("MediaSized").unwrap_err(),
            AuditError::Contract {
                audit: "reader".into(),
                key: "MediaSized".into()
            }
        );
        assert!(matches!(
            view.trace("defaultPass"),
            Err(AuditError::Contract { .. })
        ));
    }

    #[test]
    fn bad_shape_is_not_measurable() {
        let set = set();
        let view = ArtifactView::new(&Reader, &set);
        let err = view.decode::<Vec<String>>("URL").unwrap_err();
        assert!(matches!(err, AuditError::NotMeasurable { .. }));
        assert!(err.to_string().contains("unexpected shape"));
    }

    #[test]
    fn output_score_is_clamped() {
        assert_eq!(AuditOutput::new(3.0).with_score(1.4).score, Some(1.0));
        assert_eq!(AuditOutput::new(3.0).with_score(-0.2).score, Some(0.0));
    }
}

//! Audit registry and execution.

use std::collections::BTreeMap;
use std::sync::Arc;

use pagescope_types::{Artifact, ArtifactSet, AuditOutcome, AuditResult};

use crate::audit::{ArtifactView, Audit, AuditInfo};
use crate::error::{AuditError, AuditFailure};

/// Audits available to a run, by name.
#[derive(Clone, Default)]
pub struct AuditRegistry {
    audits: BTreeMap<String, Arc<dyn Audit>>,
}

impl AuditRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in audit.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for audit in crate::audits::builtin_audits() {
            // Built-in names are unique.
            let _ = registry.register(audit);
        }
        registry
    }

    /// Register an audit. Rejects duplicate names.
    pub fn register(&mut self, audit: Arc<dyn Audit>) -> Result<(), String> {
        let name = audit.name().to_string();
        if self.audits.contains_key(&name) {
            return Err(format!("audit already registered: {name}"));
        }
        self.audits.insert(name, audit);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Audit>> {
        self.audits.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.audits.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.audits.keys().map(String::as_str)
    }

    /// Summaries of every registered audit, sorted by name.
    pub fn list(&self) -> Vec<AuditInfo> {
        self.audits.values().map(|a| AuditInfo::of(a.as_ref())).collect()
    }

    /// Default weight of a registered audit.
    pub fn weight(&self, name: &str) -> Option<f64> {
        self.audits.get(name).map(|a| a.weight())
    }

    /// Look up audits in the given order. Returns the first unknown name on failure.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Audit>>, String> {
        names
            .iter()
            .map(|n| self.get(n).ok_or_else(|| n.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.audits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audits.is_empty()
    }
}

/// Run one audit.
///
/// Missing or failed inputs and unmeasurable data become not-scored results.
/// Only a contract violation is returned as an error.
pub fn run_audit(audit: &dyn Audit, artifacts: &ArtifactSet) -> Result<AuditResult, AuditError> {
    let not_scored = |reason: String| -> Result<AuditResult, AuditError> {
        Ok(AuditResult::not_scored(audit.name(), audit.description(), reason))
    };

    for key in audit.required_artifacts() {
        match artifacts.get(key) {
            None => return not_scored(format!("required {key} gatherer did not run")),
            Some(Artifact::Failed { debug_string }) => {
                return not_scored(format!("{key} gatherer failed: {debug_string}"))
            }
            Some(Artifact::Ok(_)) => {}
        }
    }
    for pass in audit.required_traces() {
        if artifacts.trace(pass).is_none() {
            return not_scored(format!("no trace recorded for pass '{pass}'"));
        }
    }

    let view = ArtifactView::new(audit, artifacts);
    match audit.audit(&view) {
        Ok(output) => Ok(AuditResult {
            name: audit.name().to_string(),
            description: audit.description().to_string(),
            outcome: output.into_outcome(),
        }),
        Err(AuditError::NotMeasurable { reason }) => {
            tracing::debug!(audit = audit.name(), %reason, "audit not scored");
            not_scored(reason)
        }
        Err(err @ AuditError::Contract { .. }) => Err(err),
    }
}

/// Run audits in order, stopping at the first contract violation.
pub fn run_audits(
    audits: &[Arc<dyn Audit>],
    artifacts: &ArtifactSet,
) -> Result<Vec<AuditResult>, AuditFailure> {
    let mut results = Vec::with_capacity(audits.len());
    for (index, audit) in audits.iter().enumerate() {
        let result = run_audit(audit.as_ref(), artifacts).map_err(|source| AuditFailure {
            index,
            name: audit.name().to_string(),
            source,
        })?;
        match &result.outcome {
            AuditOutcome::Scored { raw_value, .. } => {
                tracing::info!(audit = audit.name(), raw_value = %raw_value, "audit scored");
            }
            AuditOutcome::NotScored { debug_string } => {
                tracing::info!(audit = audit.name(), reason = %debug_string, "audit not scored");
            }
        }
        results.push(result);
    }
    Ok(results)
}

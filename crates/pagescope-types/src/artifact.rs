//! Artifacts produced by gatherers and the write-once set that holds them.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trace::Trace;
use crate::PagescopeError;

/// The output of one gatherer for one run.
///
/// A gatherer either produced a value or failed with a diagnostic. The
/// failure is kept as data so that audits can report why they were not
/// scored instead of the whole run aborting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    Ok(Value),
    Failed { debug_string: String },
}

impl Artifact {
    pub fn failed(debug_string: impl Into<String>) -> Self {
        Artifact::Failed {
            debug_string: debug_string.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Artifact::Failed { .. })
    }

    /// The value, if the gatherer succeeded.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Artifact::Ok(v) => Some(v),
            Artifact::Failed { .. } => None,
        }
    }

    /// The diagnostic, if the gatherer failed.
    pub fn debug_string(&self) -> Option<&str> {
        match self {
            Artifact::Ok(_) => None,
            Artifact::Failed { debug_string } => Some(debug_string),
        }
    }
}

/// All artifacts and traces collected for one URL.
///
/// Keys are write-once: a second insert under the same key is rejected. The
/// orchestrator owns the set mutably while gathering and hands out shared
/// references once gathering completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactSet {
    requested_url: String,
    artifacts: BTreeMap<String, Artifact>,
    traces: BTreeMap<String, Trace>,
}

impl ArtifactSet {
    pub fn new(requested_url: impl Into<String>) -> Self {
        Self {
            requested_url: requested_url.into(),
            artifacts: BTreeMap::new(),
            traces: BTreeMap::new(),
        }
    }

    pub fn requested_url(&self) -> &str {
        &self.requested_url
    }

    /// Record an artifact. Fails if the key has already been written.
    pub fn insert(&mut self, key: impl Into<String>, artifact: Artifact) -> Result<(), PagescopeError> {
        let key = key.into();
        if self.artifacts.contains_key(&key) {
            return Err(PagescopeError::ArtifactError(format!(
                "artifact '{key}' was already written"
            )));
        }
        self.artifacts.insert(key, artifact);
        Ok(())
    }

    /// Record the trace captured during a pass. Fails if the pass already has one.
    pub fn insert_trace(&mut self, pass_name: impl Into<String>, trace: Trace) -> Result<(), PagescopeError> {
        let pass_name = pass_name.into();
        if self.traces.contains_key(&pass_name) {
            return Err(PagescopeError::ArtifactError(format!(
                "trace for pass '{pass_name}' was already written"
            )));
        }
        self.traces.insert(pass_name, trace);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.artifacts.contains_key(key)
    }

    /// Decode a successful artifact into a typed value.
    ///
    /// Returns `None` when the key is absent or the artifact is a failure.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        self.get(key)
            .and_then(Artifact::value)
            .map(|v| serde_json::from_value(v.clone()))
    }

    pub fn trace(&self, pass_name: &str) -> Option<&Trace> {
        self.traces.get(pass_name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Artifact)> {
        self.artifacts.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn trace_names(&self) -> impl Iterator<Item = &str> {
        self.traces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

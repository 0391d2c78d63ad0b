//! Audit results and their report wire format.
//!
//! Internally an audit outcome is a discriminated value: either it was
//! scored or it was not, with a diagnostic. The reserved `-1` rawValue only
//! appears when a result is serialized into a report.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw value reported by the wire format for results that could not be measured.
pub const NOT_SCORED_RAW_VALUE: i64 = -1;

/// The measured value an audit produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Outcome of running one audit.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    Scored {
        raw_value: RawValue,
        /// Normalized score in `[0, 1]`, when the audit assigns one.
        score: Option<f64>,
        display_value: Option<String>,
        extended_info: Option<Value>,
        debug_string: Option<String>,
    },
    NotScored {
        debug_string: String,
    },
}

/// The immutable result of one audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "WireAuditResult")]
pub struct AuditResult {
    pub name: String,
    pub description: String,
    pub outcome: AuditOutcome,
}

impl AuditResult {
    pub fn not_scored(name: &str, description: &str, debug_string: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            outcome: AuditOutcome::NotScored {
                debug_string: debug_string.into(),
            },
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Scored { .. })
    }

    pub fn raw_value(&self) -> Option<RawValue> {
        match &self.outcome {
            AuditOutcome::Scored { raw_value, .. } => Some(*raw_value),
            AuditOutcome::NotScored { .. } => None,
        }
    }

    pub fn debug_string(&self) -> Option<&str> {
        match &self.outcome {
            AuditOutcome::Scored { debug_string, .. } => debug_string.as_deref(),
            AuditOutcome::NotScored { debug_string } => Some(debug_string),
        }
    }

    /// Normalized score used for aggregation.
    ///
    /// An explicit score wins; otherwise a boolean raw value maps to 1 or 0.
    /// Numeric values without a score and not-scored results have none.
    pub fn score(&self) -> Option<f64> {
        match &self.outcome {
            AuditOutcome::Scored { score: Some(s), .. } => Some(s.clamp(0.0, 1.0)),
            AuditOutcome::Scored {
                raw_value: RawValue::Bool(b),
                ..
            } => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Report shape of an [`AuditResult`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireAuditResult {
    name: String,
    description: String,
    raw_value: Value,
    scored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extended_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_string: Option<String>,
}

impl From<AuditResult> for WireAuditResult {
    fn from(result: AuditResult) -> Self {
        match result.outcome {
            AuditOutcome::Scored {
                raw_value,
                score,
                display_value,
                extended_info,
                debug_string,
            } => WireAuditResult {
                name: result.name,
                description: result.description,
                raw_value: serde_json::to_value(raw_value).unwrap_or(Value::Null),
                scored: true,
                score,
                display_value,
                extended_info,
                debug_string,
            },
            AuditOutcome::NotScored { debug_string } => WireAuditResult {
                name: result.name,
                description: result.description,
                raw_value: Value::from(NOT_SCORED_RAW_VALUE),
                scored: false,
                score: None,
                display_value: None,
                extended_info: None,
                debug_string: Some(debug_string),
            },
        }
    }
}

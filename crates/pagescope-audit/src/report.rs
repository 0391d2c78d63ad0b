//! The final scored report for one URL.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use pagescope_types::{AuditOutcome, AuditResult};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::GroupScore;

/// Report for one audited URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id: Uuid,
    pub generated_time: DateTime<Utc>,
    pub tool_version: String,
    pub requested_url: String,
    pub final_url: Option<String>,
    pub audits: Vec<AuditResult>,
    pub aggregations: Vec<GroupScore>,
}

impl Report {
    pub fn new(
        requested_url: impl Into<String>,
        final_url: Option<String>,
        audits: Vec<AuditResult>,
        aggregations: Vec<GroupScore>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_time: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            requested_url: requested_url.into(),
            final_url,
            audits,
            aggregations,
        }
    }

    pub fn audit(&self, name: &str) -> Option<&AuditResult> {
        self.audits.iter().find(|a| a.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&GroupScore> {
        self.aggregations.iter().find(|g| g.name == name)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "pagescope report for {}", self.requested_url);
        if let Some(final_url) = self.final_url.as_deref().filter(|u| *u != self.requested_url) {
            let _ = writeln!(out, "  final URL: {final_url}");
        }
        let _ = writeln!(out, "  generated {} (run {})", self.generated_time.to_rfc3339(), self.run_id);

        for group in &self.aggregations {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}: {:.0}", group.name, group.score);
            for member in &group.members {
                if let Some(result) = self.audit(&member.audit) {
                    let _ = writeln!(out, "  {}", render_result(result));
                }
            }
        }

        let ungrouped: Vec<&AuditResult> = self
            .audits
            .iter()
            .filter(|a| {
                !self
                    .aggregations
                    .iter()
                    .any(|g| g.members.iter().any(|m| m.audit == a.name))
            })
            .collect();
        if !ungrouped.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Other audits:");
            for result in ungrouped {
                let _ = writeln!(out, "  {}", render_result(result));
            }
        }
        out
    }
}

fn render_result(result: &AuditResult) -> String {
    match &result.outcome {
        AuditOutcome::Scored {
            raw_value,
            display_value,
            ..
        } => {
            let value = display_value.clone().unwrap_or_else(|| raw_value.to_string());
            format!("{}: {} ({})", result.name, value, result.description)
        }
        AuditOutcome::NotScored { debug_string } => {
            format!("{}: not scored ({debug_string})", result.name)
        }
    }
}

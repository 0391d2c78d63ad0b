//! Weighted aggregation of audit results into report groups.

use pagescope_types::{AuditResult, GroupConfig};
use serde::Serialize;

/// One audit's contribution to a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub audit: String,
    pub weight: f64,
    /// Normalized score, or `None` when the audit is unscorable.
    pub score: Option<f64>,
}

/// A scored group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupScore {
    pub name: String,
    pub description: String,
    /// Weighted score in `[0, 100]`.
    pub score: f64,
    pub members: Vec<GroupMember>,
}

/// Score every configured group against the audit results.
///
/// An item's weight defaults to `audit_weight(name)`, then 1. Members that
/// did not run, were not scored, or report a numeric value without a score
/// are listed with no score and excluded from the average, as are members
/// with a zero weight. Groups without a scorable member are omitted.
pub fn aggregate<F>(groups: &[GroupConfig], results: &[AuditResult], audit_weight: F) -> Vec<GroupScore>
where
    F: Fn(&str) -> Option<f64>,
{
    groups
        .iter()
        .filter_map(|group| {
            let members: Vec<GroupMember> = group
                .items
                .iter()
                .map(|item| GroupMember {
                    audit: item.audit.clone(),
                    weight: item
                        .weight
                        .or_else(|| audit_weight(&item.audit))
                        .unwrap_or(1.0),
                    score: results
                        .iter()
                        .find(|r| r.name == item.audit)
                        .and_then(AuditResult::score),
                })
                .collect();

            let (weighted, total) = members
                .iter()
                .filter(|m| m.weight > 0.0)
                .filter_map(|m| m.score.map(|s| (m.weight * s, m.weight)))
                .fold((0.0, 0.0), |(ws, w), (a, b)| (ws + a, w + b));
            if total <= 0.0 {
                tracing::debug!(group = %group.name, "group has no scorable members");
                return None;
            }

            Some(GroupScore {
                name: group.name.clone(),
                description: group.description.clone(),
                score: 100.0 * weighted / total,
                members,
            })
        })
        .collect()
}

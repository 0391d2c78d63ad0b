use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::{MUTATION_EVENT_USE_ARTIFACT, URL_ARTIFACT};
use crate::audit::{ArtifactView, Audit, AuditOutput};
use crate::error::AuditError;

/// Deprecated DOM mutation event names.
pub const MUTATION_EVENTS: &[&str] = &[
    "DOMAttrModified",
    "DOMAttributeNameChanged",
    "DOMCharacterDataModified",
    "DOMElementNameChanged",
    "DOMNodeInserted",
    "DOMNodeInsertedIntoDocument",
    "DOMNodeRemoved",
    "DOMNodeRemovedFromDocument",
    "DOMSubtreeModified",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlArtifact {
    final_url: String,
}

#[derive(Debug, Deserialize)]
struct MutationEventUse {
    #[serde(default)]
    usage: Vec<Usage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct Usage {
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    line: u64,
    #[serde(default)]
    col: u64,
}

/// The page's own scripts do not register mutation event listeners.
/// Registrations from other hosts are ignored.
pub struct NoMutationEvents;

impl Audit for NoMutationEvents {
    fn name(&self) -> &str {
        "no-mutation-events"
    }

    fn description(&self) -> &str {
        "Site does not use Mutation Events in its own scripts"
    }

    fn required_artifacts(&self) -> &[&str] {
        &[URL_ARTIFACT, MUTATION_EVENT_USE_ARTIFACT]
    }

    fn audit(&self, artifacts: &ArtifactView<'_>) -> Result<AuditOutput, AuditError> {
        let page: UrlArtifact = artifacts.decode(URL_ARTIFACT)?;
        let uses: MutationEventUse = artifacts.decode(MUTATION_EVENT_USE_ARTIFACT)?;
        let page_host = host_of(&page.final_url).ok_or_else(|| {
            AuditError::not_measurable(format!("final URL '{}' has no host", page.final_url))
        })?;

        let offenders: Vec<Value> = uses
            .usage
            .into_iter()
            .filter(|u| host_of(&u.url).as_deref() == Some(page_host.as_str()))
            .filter(|u| {
                u.args
                    .first()
                    .and_then(Value::as_str)
                    .is_some_and(|name| MUTATION_EVENTS.contains(&name))
            })
            .map(|u| {
                json!({
                    "label": format!("line: {}, col: {}", u.line, u.col),
                    "url": u.url,
                    "line": u.line,
                    "col": u.col,
                    "args": u.args,
                })
            })
            .collect();

        Ok(AuditOutput::new(offenders.is_empty()).with_extended_info(json!({ "usage": offenders })))
    }
}

/// Host and port, as compared between the page and a script.
fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

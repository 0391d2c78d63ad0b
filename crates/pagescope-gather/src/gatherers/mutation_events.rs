use async_trait::async_trait;
use pagescope_audit::audits::{MUTATION_EVENTS, MUTATION_EVENT_USE_ARTIFACT};
use pagescope_driver::{CallSite, CallSiteCollector};
use serde_json::{json, Value};

use crate::error::GatherError;
use crate::gatherer::{Gatherer, PassContext};

const CAPTURED_FUNCTIONS: [&str; 2] = ["addEventListener", "document.addEventListener"];

/// Records where the page registers listeners for deprecated mutation
/// events. Capture starts before the page loads.
#[derive(Default)]
pub struct MutationEventsGatherer {
    collectors: Vec<CallSiteCollector>,
}

#[async_trait]
impl Gatherer for MutationEventsGatherer {
    fn artifact_key(&self) -> &str {
        MUTATION_EVENT_USE_ARTIFACT
    }

    async fn before_pass(&mut self, ctx: &PassContext<'_>) -> Result<(), GatherError> {
        for function in CAPTURED_FUNCTIONS {
            let collector = ctx.driver.capture_function_call_sites(function).await?;
            self.collectors.push(collector);
        }
        Ok(())
    }

    async fn after_pass(&mut self, _ctx: &PassContext<'_>) -> Result<Value, GatherError> {
        if self.collectors.is_empty() {
            return Err(GatherError::MissingState {
                gatherer: "mutation-events".to_string(),
                reason: "call-site capture never started".to_string(),
            });
        }
        let mut sites: Vec<CallSite> = Vec::new();
        for collector in std::mem::take(&mut self.collectors) {
            sites.extend(collector.collect().await?);
        }
        let usage: Vec<CallSite> = sites.into_iter().filter(is_mutation_listener).collect();
        tracing::debug!(uses = usage.len(), "collected mutation event listeners");
        serde_json::to_value(&usage)
            .map(|usage| json!({ "usage": usage }))
            .map_err(|e| GatherError::unexpected_data(format!("call sites: {e}")))
    }
}

fn is_mutation_listener(site: &CallSite) -> bool {
    site.args
        .first()
        .and_then(Value::as_str)
        .is_some_and(|name| MUTATION_EVENTS.contains(&name))
}

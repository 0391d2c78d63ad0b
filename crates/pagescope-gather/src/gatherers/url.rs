use async_trait::async_trait;
use pagescope_audit::audits::URL_ARTIFACT;
use serde_json::{json, Value};

use crate::error::GatherError;
use crate::gatherer::{Gatherer, PassContext};

/// Records the requested URL and where the page ended up after redirects.
#[derive(Debug, Default)]
pub struct UrlGatherer;

#[async_trait]
impl Gatherer for UrlGatherer {
    fn artifact_key(&self) -> &str {
        URL_ARTIFACT
    }

    async fn after_pass(&mut self, ctx: &PassContext<'_>) -> Result<Value, GatherError> {
        let final_url = ctx.driver.current_url().await?;
        Ok(json!({ "requestedUrl": ctx.url, "finalUrl": final_url }))
    }
}

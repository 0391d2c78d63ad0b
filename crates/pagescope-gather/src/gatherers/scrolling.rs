use async_trait::async_trait;
use pagescope_audit::audits::SCROLLING_ARTIFACT;
use serde_json::Value;

use crate::error::GatherError;
use crate::gatherer::{Gatherer, PassContext};

/// Smooth-scrolls to the bottom of the page and reports how far it got.
///
/// Uses the GPU benchmarking extension when the browser exposes it, and a
/// smooth `scrollBy` otherwise.
pub const SCROLL_SCRIPT: &str = r#"(function scrollPage() {
  const initialHeight = document.body.scrollHeight;
  const distance = document.body.offsetHeight - window.innerHeight;
  const report = () => __returnResults({
    scrollOffset: window.scrollY,
    expectedOffset: distance,
    heightDiff: document.body.scrollHeight - initialHeight,
  });
  if (window.chrome && chrome.gpuBenchmarking && chrome.gpuBenchmarking.smoothScrollBy) {
    chrome.gpuBenchmarking.smoothScrollBy(distance, report);
  } else {
    window.scrollBy({ top: distance, behavior: 'smooth' });
    setTimeout(report, 2000);
  }
})()"#;

const FIELDS: [&str; 3] = ["scrollOffset", "expectedOffset", "heightDiff"];

/// Measures an infinite-scroll list. Runs while the scrolling trace records
/// so the frames drawn during the scroll land in that trace.
#[derive(Debug, Default)]
pub struct ScrollingGatherer {
    measurement: Option<Value>,
}

#[async_trait]
impl Gatherer for ScrollingGatherer {
    fn artifact_key(&self) -> &str {
        SCROLLING_ARTIFACT
    }

    async fn during_pass(&mut self, ctx: &PassContext<'_>) -> Result<(), GatherError> {
        let value = ctx.driver.evaluate_async(SCROLL_SCRIPT).await?;
        if let Some(missing) = FIELDS.iter().find(|f| !value.get(**f).is_some_and(Value::is_number)) {
            return Err(GatherError::unexpected_data(format!(
                "scroll measurement lacks numeric '{missing}': {value}"
            )));
        }
        self.measurement = Some(value);
        Ok(())
    }

    async fn after_pass(&mut self, _ctx: &PassContext<'_>) -> Result<Value, GatherError> {
        self.measurement.take().ok_or_else(|| GatherError::MissingState {
            gatherer: "scrolling".to_string(),
            reason: "the page was never scrolled".to_string(),
        })
    }
}

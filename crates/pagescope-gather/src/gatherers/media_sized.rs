use async_trait::async_trait;
use pagescope_audit::audits::MEDIA_SIZED_ARTIFACT;
use serde_json::Value;

use crate::error::GatherError;
use crate::gatherer::{Gatherer, PassContext};

/// Lists `img`, `video` and `svg` elements whose width and height come
/// neither from attributes nor from a matching style rule.
pub const UNSIZED_MEDIA_SCRIPT: &str = r#"(function getUnsizedMediaElements() {
  const hasSize = element => {
    if (element.getAttribute('width') && element.getAttribute('height')) return true;
    const rules = [];
    for (const sheet of Array.from(document.styleSheets)) {
      let cssRules;
      try { cssRules = sheet.cssRules; } catch (e) { continue; }
      for (const rule of Array.from(cssRules || [])) {
        if (rule.selectorText && element.matches(rule.selectorText)) rules.push(rule);
      }
    }
    return rules.some(r => r.style.width !== '' && r.style.height !== '');
  };
  const describe = element => {
    let fileName = '';
    if (element.src) {
      try { fileName = new URL(element.src).pathname.split('/').pop(); } catch (e) {}
    }
    const className = typeof element.className === 'string' && element.className
      ? '.' + element.className : '';
    return element.nodeName.toLowerCase() + className + (fileName ? ' (' + fileName + ')' : '');
  };
  __returnResults(Array.from(document.querySelectorAll('img, video, svg'))
    .filter(el => !hasSize(el))
    .map(describe));
})()"#;

#[derive(Debug, Default)]
pub struct MediaSizedGatherer;

#[async_trait]
impl Gatherer for MediaSizedGatherer {
    fn artifact_key(&self) -> &str {
        MEDIA_SIZED_ARTIFACT
    }

    async fn after_pass(&mut self, ctx: &PassContext<'_>) -> Result<Value, GatherError> {
        let value = ctx.driver.evaluate_async(UNSIZED_MEDIA_SCRIPT).await?;
        let Some(elements) = value.as_array() else {
            return Err(GatherError::unexpected_data(format!(
                "expected a list of media elements, got {value}"
            )));
        };
        if elements.iter().any(|e| !e.is_string()) {
            return Err(GatherError::unexpected_data(
                "media element descriptions must be strings",
            ));
        }
        tracing::debug!(unsized_elements = elements.len(), "collected media sizes");
        Ok(value)
    }
}

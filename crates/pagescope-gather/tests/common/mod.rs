//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use async_trait::async_trait;
use pagescope_driver::mock::{MockReply, MockTarget, MockTargetBuilder};
use pagescope_gather::{GatherError, Gatherer, PassContext};
use pagescope_types::{PassConfig, Phase, RunConfig, TraceEvent, DEFAULT_PASS, SCROLL_PASS};
use serde_json::{json, Value};

pub const PAGE_URL: &str = "https://example.com/";

fn ev(name: &str, ph: Phase, ts_ms: f64) -> TraceEvent {
    TraceEvent::new(name, "devtools.timeline", ph, 1, 1, ts_ms * 1000.0)
}

/// A page that paints at 800 ms, is busy from 700 to 900 ms, and draws
/// frames every 16.7 ms from 1 s on.
pub fn trace_events() -> Vec<TraceEvent> {
    let mut events = vec![
        ev("TracingStartedInPage", Phase::Instant, 0.0),
        ev("navigationStart", Phase::Instant, 0.0),
        ev("firstMeaningfulPaint", Phase::Instant, 800.0),
        ev("MessageLoop::RunTask", Phase::Complete, 700.0).with_dur(200_000.0),
    ];
    events.extend((0..30).map(|i| ev("DrawFrame", Phase::Instant, 1000.0 + f64::from(i) * 16.7)));
    events.push(ev("end", Phase::Instant, 4000.0));
    events
}

/// Mock target answering every page script the built-in gatherers run.
pub fn scripted_target() -> MockTargetBuilder {
    MockTarget::builder()
        .with_trace_events(trace_events())
        .on_evaluate("getUnsizedMediaElements", |_| {
            MockReply::value(json!(["img.hero (hero.jpg)"]))
        })
        .on_evaluate("scrollPage", |_| {
            MockReply::value(json!({"scrollOffset": 2400, "expectedOffset": 3000, "heightDiff": 1500}))
        })
        .on_evaluate("__addEventListenerCallSites", |_| {
            MockReply::value(json!([
                {"args": ["DOMNodeInserted"], "url": "https://example.com/app.js", "line": 3, "col": 7},
                {"args": ["click"], "url": "https://example.com/app.js", "line": 9, "col": 1}
            ]))
        })
        .on_evaluate("__document_addEventListenerCallSites", |_| MockReply::value(json!([])))
}

/// Default configuration plus a third pass that neither loads nor traces.
pub fn run_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.passes.push(PassConfig {
        name: "idle".to_string(),
        trace_categories: Vec::new(),
        offline: false,
        load_page: false,
        gatherers: Vec::new(),
    });
    assert_eq!(config.passes[0].name, DEFAULT_PASS);
    assert_eq!(config.passes[1].name, SCROLL_PASS);
    config
}

/// Gatherer whose `before_pass` always fails. Counts the hooks it sees.
#[derive(Default)]
pub struct BrokenGatherer {
    pub after_pass_calls: usize,
}

#[async_trait]
impl Gatherer for BrokenGatherer {
    fn artifact_key(&self) -> &str {
        "Broken"
    }

    async fn before_pass(&mut self, _ctx: &PassContext<'_>) -> Result<(), GatherError> {
        Err(GatherError::unexpected_data("service worker registry unavailable"))
    }

    async fn after_pass(&mut self, _ctx: &PassContext<'_>) -> Result<Value, GatherError> {
        self.after_pass_calls += 1;
        Ok(json!("should not be stored"))
    }
}

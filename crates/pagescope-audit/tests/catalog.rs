use pagescope_audit::{aggregate, run_audits, AuditRegistry, Report};
use pagescope_types::{
    Artifact, ArtifactSet, Phase, RunConfig, Trace, TraceEvent, DEFAULT_PASS, SCROLL_PASS,
};
use serde_json::json;

fn ev(name: &str, ph: Phase, ts_ms: f64) -> TraceEvent {
    TraceEvent::new(name, "devtools.timeline", ph, 1, 1, ts_ms * 1000.0)
}

fn load_trace() -> Trace {
    Trace::new(vec![
        ev("TracingStartedInPage", Phase::Instant, 0.0),
        ev("navigationStart", Phase::Instant, 0.0),
        ev("firstMeaningfulPaint", Phase::Instant, 800.0),
        ev("MessageLoop::RunTask", Phase::Complete, 700.0).with_dur(200_000.0),
        ev("end", Phase::Instant, 4000.0),
    ])
}

fn scroll_trace() -> Trace {
    let mut events = vec![ev("TracingStartedInPage", Phase::Instant, 0.0)];
    events.extend((0..30).map(|i| ev("DrawFrame", Phase::Instant, 50.0 + f64::from(i) * 20.0)));
    Trace::new(events)
}

fn artifacts() -> ArtifactSet {
    let mut set = ArtifactSet::new("https://example.com/");
    set.insert(
        "URL",
        Artifact::Ok(json!({"requestedUrl": "https://example.com/", "finalUrl": "https://example.com/"})),
    )
    .unwrap();
    set.insert("MediaSized", Artifact::failed("Runtime.evaluate threw: TypeError"))
        .unwrap();
    set.insert("MutationEventUse", Artifact::Ok(json!({"usage": []})))
        .unwrap();
    set.insert(
        "Scrolling",
        Artifact::Ok(json!({"scrollOffset": 1800.0, "expectedOffset": 1800.0, "heightDiff": 0.0})),
    )
    .unwrap();
    set.insert_trace(DEFAULT_PASS, load_trace()).unwrap();
    set.insert_trace(SCROLL_PASS, scroll_trace()).unwrap();
    set
}

#[test]
fn default_catalog_survives_partial_failure() {
    let config = RunConfig::default();
    let registry = AuditRegistry::builtin();
    let audits = registry.resolve(&config.audits).unwrap();
    let set = artifacts();

    let results = run_audits(&audits, &set).unwrap();
    assert_eq!(results.len(), config.audits.len());

    let by_name = |name: &str| results.iter().find(|r| r.name == name).unwrap();
    assert_eq!(by_name("first-meaningful-paint").score(), Some(1.0));
    assert!(by_name("time-to-interactive").is_scored());
    assert!(by_name("smooth-scrolling").is_scored());
    assert!(by_name("no-mutation-events").is_scored());
    // Gatherer failure and an unmeasurable page stay in the report.
    assert!(!by_name("media-sized").is_scored());
    assert!(!by_name("infinite-scrolling").is_scored());

    let groups = aggregate(&config.groups, &results, |name| registry.weight(name));
    let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
    // Scrolling only holds the unscored infinite-scrolling audit.
    assert_eq!(names, vec!["Performance", "Best Practices"]);
    let best = groups.iter().find(|g| g.name == "Best Practices").unwrap();
    assert_eq!(best.score, 100.0);

    let report = Report::new(set.requested_url(), Some("https://example.com/".into()), results, groups);
    let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
    let media = json["audits"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["name"] == "media-sized")
        .unwrap();
    assert_eq!(media["rawValue"], -1);
    assert_eq!(media["debugString"], "MediaSized gatherer failed: Runtime.evaluate threw: TypeError");
}

#[test]
fn audits_are_idempotent_over_the_same_artifacts() {
    let registry = AuditRegistry::builtin();
    let audits = registry.resolve(&RunConfig::default().audits).unwrap();
    let set = artifacts();
    assert_eq!(run_audits(&audits, &set).unwrap(), run_audits(&audits, &set).unwrap());
}

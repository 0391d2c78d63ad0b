//! Pass orchestration.
//!
//! Each pass moves through `Idle → BeforePass → Active → AfterPass →
//! Complete`. Passes run strictly in declaration order, and every gatherer
//! hook runs in attachment order. A hook failure is recorded as a failed
//! artifact for that gatherer; only channel-level failures abort the run.

use std::collections::{HashMap, HashSet};
use std::fmt;

use pagescope_audit::AuditRegistry;
use pagescope_driver::Driver;
use pagescope_types::{Artifact, ArtifactSet, PassConfig, RunConfig};

use crate::error::{ConfigError, GatherError, RunError};
use crate::gatherer::{Gatherer, GathererRegistry, PassContext};

/// Lifecycle of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    BeforePass,
    Active,
    AfterPass,
    Complete,
}

impl PassState {
    /// The state that follows this one. `Complete` is terminal.
    pub fn next(self) -> Self {
        match self {
            PassState::Idle => PassState::BeforePass,
            PassState::BeforePass => PassState::Active,
            PassState::Active => PassState::AfterPass,
            PassState::AfterPass | PassState::Complete => PassState::Complete,
        }
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PassState::Idle => "idle",
            PassState::BeforePass => "before-pass",
            PassState::Active => "active",
            PassState::AfterPass => "after-pass",
            PassState::Complete => "complete",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Configuration checks
// ---------------------------------------------------------------------------

/// Check a run configuration before any gathering happens.
///
/// Collects every problem rather than stopping at the first: duplicate pass
/// and audit names, unknown gatherers, artifact keys produced twice, unknown
/// audits, and audits whose artifacts or traces nothing in the run produces.
pub fn check_config(
    config: &RunConfig,
    gatherers: &GathererRegistry,
    audits: &AuditRegistry,
) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    let mut pass_names = HashSet::new();
    for pass in &config.passes {
        if !pass_names.insert(pass.name.as_str()) {
            problems.push(format!("duplicate pass name '{}'", pass.name));
        }
    }

    let mut audit_names = HashSet::new();
    for name in &config.audits {
        if !audit_names.insert(name.as_str()) {
            problems.push(format!("audit '{name}' is listed twice"));
        }
    }

    let mut producers: HashMap<String, String> = HashMap::new();
    for pass in &config.passes {
        for name in &pass.gatherers {
            let Some(key) = gatherers.artifact_key(name) else {
                problems.push(format!("unknown gatherer '{name}' in pass '{}'", pass.name));
                continue;
            };
            let producer = format!("{name} (pass '{}')", pass.name);
            if let Some(previous) = producers.insert(key.clone(), producer.clone()) {
                problems.push(format!(
                    "artifact '{key}' is produced by both {previous} and {producer}"
                ));
            }
        }
    }

    let traced: HashSet<&str> = config
        .passes
        .iter()
        .filter(|p| p.records_trace())
        .map(|p| p.name.as_str())
        .collect();

    for name in &config.audits {
        let Some(audit) = audits.get(name) else {
            problems.push(format!("unknown audit '{name}'"));
            continue;
        };
        for key in audit.required_artifacts() {
            if !producers.contains_key(*key) {
                problems.push(format!(
                    "audit '{name}' requires artifact '{key}' but no configured gatherer produces it"
                ));
            }
        }
        for pass in audit.required_traces() {
            if !traced.contains(pass) {
                problems.push(format!(
                    "audit '{name}' requires the trace of pass '{pass}' but no such pass records one"
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError { problems })
    }
}

// ---------------------------------------------------------------------------
// Pass execution
// ---------------------------------------------------------------------------

struct Slot {
    name: String,
    gatherer: Box<dyn Gatherer>,
    /// First hook failure; later hooks are skipped.
    failure: Option<String>,
}

/// Runs the configured passes over one URL.
pub struct Orchestrator<'a> {
    driver: &'a Driver,
    gatherers: &'a GathererRegistry,
}

impl<'a> Orchestrator<'a> {
    pub fn new(driver: &'a Driver, gatherers: &'a GathererRegistry) -> Self {
        Self { driver, gatherers }
    }

    /// Run every pass in order and return the assembled artifacts.
    pub async fn run(&self, url: &str, passes: &[PassConfig]) -> Result<ArtifactSet, RunError> {
        let mut artifacts = ArtifactSet::new(url);
        for (index, pass) in passes.iter().enumerate() {
            self.run_pass(url, pass, &mut artifacts)
                .await
                .map_err(|source| RunError::Pass {
                    index,
                    name: pass.name.clone(),
                    source,
                })?;
        }
        Ok(artifacts)
    }

    async fn run_pass(
        &self,
        url: &str,
        pass: &PassConfig,
        artifacts: &mut ArtifactSet,
    ) -> Result<(), GatherError> {
        let mut state = PassState::Idle;
        let mut slots = Vec::with_capacity(pass.gatherers.len());
        for name in &pass.gatherers {
            let gatherer = self.gatherers.create(name).ok_or_else(|| {
                GatherError::MissingState {
                    gatherer: name.clone(),
                    reason: "not registered".to_string(),
                }
            })?;
            slots.push(Slot {
                name: name.clone(),
                gatherer,
                failure: None,
            });
        }
        let ctx = PassContext {
            driver: self.driver,
            url,
            pass,
        };

        state = self.enter(pass, state);
        for slot in &mut slots {
            let outcome = slot.gatherer.before_pass(&ctx).await;
            record_hook_failure(slot, "before_pass", outcome)?;
        }

        state = self.enter(pass, state);
        if pass.offline {
            self.driver.set_offline(true).await?;
        }
        if pass.records_trace() {
            self.driver.begin_trace(&pass.trace_categories).await?;
        }
        if pass.load_page {
            self.driver.navigate(url).await?;
        }
        for slot in &mut slots {
            if slot.failure.is_some() {
                continue;
            }
            let outcome = slot.gatherer.during_pass(&ctx).await;
            record_hook_failure(slot, "during_pass", outcome)?;
        }
        let trace = if pass.records_trace() {
            Some(self.driver.end_trace().await?)
        } else {
            None
        };
        if pass.offline {
            self.driver.set_offline(false).await?;
        }

        state = self.enter(pass, state);
        for slot in &mut slots {
            let key = slot.gatherer.artifact_key().to_string();
            let artifact = match slot.failure.take() {
                Some(failure) => Artifact::failed(failure),
                None => match slot.gatherer.after_pass(&ctx).await {
                    Ok(value) => Artifact::Ok(value),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!(gatherer = %slot.name, hook = "after_pass", error = %e, "gatherer failed");
                        Artifact::failed(e.to_string())
                    }
                },
            };
            artifacts.insert(key, artifact)?;
        }

        state = self.enter(pass, state);
        debug_assert_eq!(state, PassState::Complete);
        if let Some(trace) = trace {
            tracing::debug!(pass = %pass.name, events = trace.len(), "stored pass trace");
            artifacts.insert_trace(pass.name.clone(), trace)?;
        }
        Ok(())
    }

    fn enter(&self, pass: &PassConfig, from: PassState) -> PassState {
        let to = from.next();
        tracing::debug!(pass = %pass.name, from = %from, to = %to, "pass state");
        to
    }
}

/// Keep a non-fatal hook failure on the slot; propagate fatal ones.
fn record_hook_failure(
    slot: &mut Slot,
    hook: &str,
    outcome: Result<(), GatherError>,
) -> Result<(), GatherError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(gatherer = %slot.name, hook, error = %e, "gatherer failed");
            slot.failure = Some(format!("{hook} failed: {e}"));
            Ok(())
        }
    }
}

//! The per-URL run pipeline: connect, check, gather, audit, aggregate.

use pagescope_audit::{aggregate, run_audits, AuditRegistry, Report};
use pagescope_driver::{wait_until_ready, Driver, ProbePolicy};
use pagescope_types::{config_loader::validate_config, ArtifactSet, RunConfig};
use tracing::Instrument;

use crate::error::{ConfigError, RunError};
use crate::gatherer::GathererRegistry;
use crate::orchestrator::{check_config, Orchestrator};

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: Report,
    pub artifacts: ArtifactSet,
}

/// Runs the full pipeline for one URL at a time.
pub struct Runner {
    config: RunConfig,
    gatherers: GathererRegistry,
    audits: AuditRegistry,
}

impl Runner {
    /// Runner with the built-in gatherers and audits.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            gatherers: GathererRegistry::builtin(),
            audits: AuditRegistry::builtin(),
        }
    }

    #[must_use]
    pub fn with_gatherers(mut self, gatherers: GathererRegistry) -> Self {
        self.gatherers = gatherers;
        self
    }

    #[must_use]
    pub fn with_audits(mut self, audits: AuditRegistry) -> Self {
        self.audits = audits;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn audits(&self) -> &AuditRegistry {
        &self.audits
    }

    /// Connect to the configured endpoint, run every pass and audit for
    /// `url`, and disconnect.
    pub async fn run(&self, url: &str) -> Result<RunOutput, RunError> {
        let span = tracing::info_span!("run", url = %url);
        async {
            let driver_config = &self.config.driver;
            wait_until_ready(
                &driver_config.host,
                driver_config.port,
                ProbePolicy::from(driver_config),
            )
            .await
            .map_err(RunError::Connect)?;
            let driver = Driver::connect(driver_config)
                .await
                .map_err(RunError::Connect)?;

            let result = self.run_with_driver(&driver, url).await;
            driver.disconnect();
            result
        }
        .instrument(span)
        .await
    }

    /// Check the configuration, then gather, audit and aggregate over an
    /// already-connected driver.
    pub async fn run_with_driver(&self, driver: &Driver, url: &str) -> Result<RunOutput, RunError> {
        self.check()?;

        let orchestrator = Orchestrator::new(driver, &self.gatherers);
        let artifacts = orchestrator.run(url, &self.config.passes).await?;
        tracing::info!(artifacts = artifacts.len(), "gathering complete");

        let audits = self.audits.resolve(&self.config.audits).map_err(|name| ConfigError {
            problems: vec![format!("unknown audit '{name}'")],
        })?;
        let results = run_audits(&audits, &artifacts)?;
        let groups = aggregate(&self.config.groups, &results, |name| self.audits.weight(name));

        let final_url = artifacts
            .decode::<serde_json::Value>(pagescope_audit::audits::URL_ARTIFACT)
            .and_then(Result::ok)
            .and_then(|v| v.get("finalUrl").and_then(|u| u.as_str()).map(str::to_string));
        let report = Report::new(url, final_url, results, groups);
        Ok(RunOutput { report, artifacts })
    }

    /// Configuration checks that need no browser.
    pub fn check(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if let Err(e) = validate_config(&self.config) {
            problems.push(e.to_string());
        }
        if let Err(e) = check_config(&self.config, &self.gatherers, &self.audits) {
            for problem in e.problems {
                if !problems.iter().any(|p| p.ends_with(&problem)) {
                    problems.push(problem);
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_audit_is_reported_once() {
        let mut config = RunConfig::default();
        let first = config.audits[0].clone();
        config.audits.push(first.clone());

        let problems = Runner::new(config).check().unwrap_err().problems;
        let mentions = problems.iter().filter(|p| p.contains("listed twice")).count();
        assert_eq!(mentions, 1, "{problems:?}");
        assert!(problems[0].ends_with(&format!("audit '{first}' is listed twice")));
    }
}

mod commands;
mod interrupt;
mod output;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use pagescope_audit::AuditRegistry;
use pagescope_driver::{ChromeLauncher, Launcher};
use pagescope_gather::Runner;
use pagescope_types::{ConfigLoader, ConfigSource, RunConfig};
use tracing_subscriber::EnvFilter;

use crate::interrupt::Interrupt;
use crate::output::OutputMode;

/// Exit status after an operator interrupt.
const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Pagescope -- audit web pages over the Chrome DevTools Protocol.
#[derive(Parser, Debug)]
#[command(name = "pagescope", version, about)]
struct Cli {
    /// URLs to audit, one after another
    #[arg(required_unless_present_any = ["list_all_audits", "list_trace_categories"])]
    urls: Vec<String>,

    /// Config file layered over ~/.pagescope/config.toml and ./.pagescope/config.toml
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "pretty")]
    output: OutputMode,

    /// Where to write the report; "stdout" prints it
    #[arg(long, default_value = output::STDOUT)]
    output_path: String,

    /// Save every gathered artifact and trace to {host}_{timestamp}.artifacts.json
    #[arg(long)]
    save_artifacts: bool,

    /// Print every available audit and exit
    #[arg(long)]
    list_all_audits: bool,

    /// Print the trace categories the configured passes record and exit
    #[arg(long)]
    list_trace_categories: bool,

    /// Debugging endpoint host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Debugging endpoint port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Do not start a browser; connect to one already listening
    #[arg(long)]
    skip_launch: bool,

    /// Log at debug level
    #[arg(long, short, conflicts_with = "quiet")]
    verbose: bool,

    /// Log errors only
    #[arg(long, short)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

fn init_tracing(default_level: &str) {
    // RUST_LOG wins over --verbose/--quiet.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Fields set by a file or environment variable, sorted by field path.
fn overridden_fields(sources: &HashMap<String, ConfigSource>) -> Vec<(&str, &ConfigSource)> {
    let mut fields: Vec<(&str, &ConfigSource)> = sources
        .iter()
        .filter(|(_, source)| **source != ConfigSource::BuiltinDefault)
        .map(|(field, source)| (field.as_str(), source))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
}

fn load_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config_path {
        loader = loader.with_explicit_path(path.clone());
    }
    let effective = loader.load().context("failed to load configuration")?;
    for file in &effective.source_files {
        tracing::debug!(path = %file.display(), "loaded config file");
    }
    for (field, source) in overridden_fields(&effective.sources) {
        tracing::debug!(field, source = %source, "config field overridden");
    }

    let mut config = effective.config;
    if let Some(host) = &cli.host {
        config.driver.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.driver.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    if cli.list_all_audits {
        commands::print_json(&commands::audits_listing(&AuditRegistry::builtin()))?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    if cli.list_trace_categories {
        commands::print_json(&commands::trace_categories_listing(&config))?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut interrupt = Interrupt::install();

    let mut launcher = if cli.skip_launch {
        None
    } else {
        let mut launcher = ChromeLauncher::from_config(&config.driver);
        let launched = tokio::select! {
            biased;
            _ = interrupt.wait() => None,
            result = launcher.launch() => Some(result),
        };
        match launched {
            Some(result) => result.context("failed to launch browser")?,
            None => {
                tracing::warn!("interrupted during browser launch, shutting down");
                return Ok(interrupted(Some(&mut launcher)).await);
            }
        }
        Some(launcher)
    };

    let runner = Runner::new(config);
    let mut failures = 0usize;
    for url in &cli.urls {
        // Biased so an interrupt that arrived while the previous report was
        // written stops the batch before the next URL starts.
        let result = tokio::select! {
            biased;
            _ = interrupt.wait() => None,
            result = runner.run(url) => Some(result),
        };
        let Some(result) = result else {
            // Dropping the run future drops its driver, which closes the connection.
            tracing::warn!(%url, "interrupted, shutting down");
            return Ok(interrupted(launcher.as_mut()).await);
        };

        match result {
            Ok(run) => {
                output::write_report(&run.report, cli.output, &cli.output_path)?;
                if cli.save_artifacts {
                    output::save_artifacts(url, &run.artifacts, Path::new("."))?;
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(%url, phase = %e.phase(), error = %e, "run aborted");
                eprintln!("{url}: {e}");
            }
        }
    }

    if interrupt.is_set() {
        tracing::warn!("interrupted, shutting down");
        return Ok(interrupted(launcher.as_mut()).await);
    }
    shutdown(launcher.as_mut()).await;
    if failures > 0 {
        anyhow::bail!("{failures} of {} URL(s) could not be audited", cli.urls.len());
    }
    Ok(ExitCode::SUCCESS)
}

async fn shutdown(launcher: Option<&mut ChromeLauncher>) {
    if let Some(launcher) = launcher {
        if let Err(e) = launcher.kill().await {
            tracing::warn!(error = %e, "failed to stop browser");
        }
    }
}

async fn interrupted(launcher: Option<&mut ChromeLauncher>) -> ExitCode {
    shutdown(launcher).await;
    ExitCode::from(INTERRUPTED_EXIT_CODE)
}

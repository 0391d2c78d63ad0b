//! Report rendering and on-disk persistence.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use pagescope_audit::Report;
use pagescope_types::ArtifactSet;

/// `--output-path` value that means "write to standard output".
pub const STDOUT: &str = "stdout";

/// How a report is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Machine-readable JSON.
    Json,
    /// Human-readable text.
    Pretty,
}

pub fn render(report: &Report, mode: OutputMode) -> anyhow::Result<String> {
    match mode {
        OutputMode::Json => report
            .to_json_pretty()
            .context("failed to serialize report"),
        OutputMode::Pretty => Ok(report.render_text()),
    }
}

/// Write the rendered report to stdout or to `path`.
pub fn write_report(report: &Report, mode: OutputMode, path: &str) -> anyhow::Result<()> {
    let mut rendered = render(report, mode)?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    if path == STDOUT {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(rendered.as_bytes())
            .context("failed to write report to stdout")?;
        return Ok(());
    }
    std::fs::write(path, rendered).with_context(|| format!("failed to write report to {path}"))?;
    tracing::info!(path, "report written");
    Ok(())
}

/// `{host}_{timestamp}`, used to name files saved for one run.
pub fn filename_prefix(url: &str, at: DateTime<Local>) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "page".to_string());
    format!("{host}_{}", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Save the full artifact set, traces included, as pretty JSON in `dir`.
pub fn save_artifacts(url: &str, artifacts: &ArtifactSet, dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("{}.artifacts.json", filename_prefix(url, Local::now())));
    let json = serde_json::to_string_pretty(artifacts).context("failed to serialize artifacts")?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "artifacts saved");
    Ok(path)
}

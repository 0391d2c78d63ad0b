//! Browser process launching.
//!
//! [`Launcher`] is the seam between the run pipeline and whatever provides
//! the debugging endpoint. [`ChromeLauncher`] starts a local Chrome or
//! Chromium with a throwaway profile.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::{Child, Command};

use crate::error::DriverError;
use crate::probe::{self, ProbePolicy};

/// Environment variable naming an explicit browser binary.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Starts and stops the process behind the debugging endpoint.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start the process and wait until its endpoint is reachable.
    async fn launch(&mut self) -> Result<(), DriverError>;

    /// Whether the endpoint currently accepts connections.
    async fn is_ready(&self) -> bool;

    /// Stop the process and release its resources.
    async fn kill(&mut self) -> Result<(), DriverError>;
}

/// Launches a local Chrome/Chromium with remote debugging enabled.
pub struct ChromeLauncher {
    host: String,
    port: u16,
    binary: Option<PathBuf>,
    probe: ProbePolicy,
    child: Option<Child>,
    profile: Option<TempDir>,
}

impl ChromeLauncher {
    pub fn new(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            binary: None,
            probe: ProbePolicy::default(),
            child: None,
            profile: None,
        }
    }

    /// Build a launcher for the endpoint described by a driver config.
    pub fn from_config(config: &pagescope_types::DriverConfig) -> Self {
        Self {
            host: config.host.clone(),
            probe: ProbePolicy::from(config),
            ..Self::new(config.port)
        }
    }

    /// Use this binary instead of searching for one.
    #[must_use]
    pub fn with_binary(mut self, path: PathBuf) -> Self {
        self.binary = Some(path);
        self
    }

    /// Whether this launcher started (and therefore owns) a process.
    pub fn owns_process(&self) -> bool {
        self.child.is_some()
    }

    async fn spawn(&mut self) -> Result<(), DriverError> {
        let profile = tempfile::Builder::new()
            .prefix("pagescope-profile-")
            .tempdir()
            .map_err(|e| DriverError::Launch {
                reason: format!("failed to create profile directory: {e}"),
            })?;
        let args = chrome_flags(self.port, profile.path());

        let mut last_error = None;
        let mut spawned = None;
        for candidate in browser_binary_candidates(self.binary.as_deref()) {
            let mut cmd = Command::new(&candidate);
            cmd.args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            match cmd.spawn() {
                Ok(child) => {
                    tracing::info!(binary = %candidate.display(), port = self.port, "launched browser");
                    spawned = Some(child);
                    break;
                }
                Err(e) => {
                    tracing::debug!(binary = %candidate.display(), error = %e, "browser candidate failed");
                    last_error = Some(format!("{}: {e}", candidate.display()));
                }
            }
        }

        let child = spawned.ok_or_else(|| DriverError::Launch {
            reason: format!(
                "failed to launch browser: {}",
                last_error.unwrap_or_else(|| "no candidates available".to_string())
            ),
        })?;
        self.child = Some(child);
        self.profile = Some(profile);
        Ok(())
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    async fn launch(&mut self) -> Result<(), DriverError> {
        if self.is_ready().await {
            tracing::info!(host = %self.host, port = self.port, "reusing browser already listening");
            return Ok(());
        }
        self.spawn().await?;
        if let Err(e) = probe::wait_until_ready(&self.host, self.port, self.probe).await {
            let _ = self.kill().await;
            return Err(e);
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        probe::is_reachable(&self.host, self.port).await
    }

    async fn kill(&mut self) -> Result<(), DriverError> {
        if let Some(mut child) = self.child.take() {
            tracing::info!(port = self.port, "stopping browser");
            child.kill().await.map_err(|e| DriverError::Launch {
                reason: format!("failed to stop browser: {e}"),
            })?;
        }
        if let Some(profile) = self.profile.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove profile directory");
            }
        }
        Ok(())
    }
}

/// Command-line flags for a debuggable browser with an isolated profile.
pub fn chrome_flags(port: u16, profile_dir: &Path) -> Vec<String> {
    let mut flags = vec![
        format!("--remote-debugging-port={port}"),
        "--disable-extensions".to_string(),
        "--no-first-run".to_string(),
        format!("--user-data-dir={}", profile_dir.display()),
    ];
    if cfg!(target_os = "linux") {
        flags.push("--disable-setuid-sandbox".to_string());
    }
    flags.push("about:blank".to_string());
    flags
}

/// Candidate binaries in preference order: explicit path, `CHROME_PATH`,
/// then well-known install locations that exist on this machine.
pub fn browser_binary_candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(CHROME_PATH_ENV) {
        if !env_path.trim().is_empty() {
            candidates.push(PathBuf::from(env_path));
        }
    }
    candidates.extend(
        platform_candidate_paths()
            .iter()
            .map(PathBuf::from)
            .filter(|p| p.exists()),
    );
    candidates
}

/// Well-known Chrome/Chromium binary paths for the current platform.
pub fn platform_candidate_paths() -> &'static [&'static str] {
    #[cfg(target_os = "macos")]
    {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    }

    #[cfg(target_os = "linux")]
    {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
    }

    #[cfg(target_os = "windows")]
    {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_include_port_profile_and_blank_page() {
        let flags = chrome_flags(9333, Path::new("/var/lib/pagescope/profile"));
        assert_eq!(flags[0], "--remote-debugging-port=9333");
        assert!(flags.contains(&"--disable-extensions".to_string()));
        assert!(flags.contains(&"--no-first-run".to_string()));
        assert!(flags.contains(&"--user-data-dir=/var/lib/pagescope/profile".to_string()));
        assert_eq!(flags.last().map(String::as_str), Some("about:blank"));
        #[cfg(target_os = "linux")]
        assert!(flags.contains(&"--disable-setuid-sandbox".to_string()));
    }

    #[test]
    fn configured_binary_comes_first() {
        let configured = PathBuf::from("/opt/custom/chrome");
        let candidates = browser_binary_candidates(Some(&configured));
        assert_eq!(candidates[0], configured);
    }

    #[tokio::test]
    async fn kill_without_launch_is_noop() {
        let mut launcher = ChromeLauncher::new(9222);
        launcher.kill().await.unwrap();
        assert!(!launcher.owns_process());
    }
}

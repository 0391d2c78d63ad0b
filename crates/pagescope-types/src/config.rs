//! Run configuration: driver endpoint, passes, audits and report groups.
//!
//! [`RunConfig`] is what a `config.toml` deserializes into. Every section has
//! a default so that an empty file (or no file at all) yields the built-in
//! configuration.

use serde::{Deserialize, Serialize};

use crate::PagescopeError;

/// Config file name looked up in the user and workspace directories.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Name of the pass that loads the page and records the main trace.
pub const DEFAULT_PASS: &str = "defaultPass";

/// Name of the pass that scrolls the page and records the scrolling trace.
pub const SCROLL_PASS: &str = "scrolling";

/// Trace categories recorded by the built-in passes.
pub const DEFAULT_TRACE_CATEGORIES: &[&str] = &[
    "-*",
    "toplevel",
    "blink.console",
    "blink.user_timing",
    "benchmark",
    "loading",
    "latencyInfo",
    "devtools.timeline",
    "disabled-by-default-devtools.timeline",
    "disabled-by-default-devtools.timeline.frame",
    "disabled-by-default-devtools.timeline.stack",
    "disabled-by-default-devtools.screenshot",
];

/// Connection settings for the debugging endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// Host of the remote debugging endpoint.
    pub host: String,
    /// Port of the remote debugging endpoint.
    pub port: u16,
    /// Delay between readiness probe attempts.
    pub ready_poll_interval_ms: u64,
    /// Readiness probe attempts before the target is declared unreachable.
    pub ready_max_retries: u32,
    /// How long to wait for `Page.loadEventFired` after navigating.
    pub page_load_timeout_ms: u64,
    /// Log every protocol message at `trace` level.
    pub log_protocol: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9222,
            ready_poll_interval_ms: 500,
            ready_max_retries: 10,
            page_load_timeout_ms: 30_000,
            log_protocol: false,
        }
    }
}

impl DriverConfig {
    /// HTTP base URL of the debugging endpoint.
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// One instrumented pass over the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassConfig {
    pub name: String,
    /// Trace categories recorded while the pass is active. Empty disables tracing.
    #[serde(default)]
    pub trace_categories: Vec<String>,
    /// Emulate an offline network for the duration of the pass.
    #[serde(default)]
    pub offline: bool,
    /// Navigate to the URL as the pass's primary interaction.
    #[serde(default = "default_true")]
    pub load_page: bool,
    /// Gatherer names, run in this order.
    #[serde(default)]
    pub gatherers: Vec<String>,
}

impl PassConfig {
    pub fn records_trace(&self) -> bool {
        !self.trace_categories.is_empty()
    }
}

/// One weighted member of a report group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupItem {
    pub audit: String,
    /// Overrides the audit's own weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// A named, weighted category of audits in the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<GroupItem>,
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default = "default_passes")]
    pub passes: Vec<PassConfig>,
    #[serde(default = "default_audits")]
    pub audits: Vec<String>,
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            passes: default_passes(),
            audits: default_audits(),
            groups: default_groups(),
        }
    }
}

impl RunConfig {
    /// Parse a TOML document, filling missing sections with defaults.
    pub fn from_toml(content: &str) -> Result<Self, PagescopeError> {
        let config: RunConfig = toml::from_str(content)
            .map_err(|e| PagescopeError::ConfigError(format!("invalid config: {e}")))?;
        Ok(config)
    }

    /// Every trace category any pass records, deduplicated, in first-seen order.
    pub fn trace_categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for pass in &self.passes {
            for cat in &pass.trace_categories {
                if !out.contains(cat) {
                    out.push(cat.clone());
                }
            }
        }
        out
    }

    pub fn pass(&self, name: &str) -> Option<&PassConfig> {
        self.passes.iter().find(|p| p.name == name)
    }
}

fn default_true() -> bool {
    true
}

fn default_categories() -> Vec<String> {
    DEFAULT_TRACE_CATEGORIES.iter().map(|s| s.to_string()).collect()
}

fn default_passes() -> Vec<PassConfig> {
    vec![
        PassConfig {
            name: DEFAULT_PASS.to_string(),
            trace_categories: default_categories(),
            offline: false,
            load_page: true,
            gatherers: vec![
                "url".to_string(),
                "media-sized".to_string(),
                "mutation-events".to_string(),
            ],
        },
        PassConfig {
            name: SCROLL_PASS.to_string(),
            trace_categories: default_categories(),
            offline: false,
            load_page: false,
            gatherers: vec!["scrolling".to_string()],
        },
    ]
}

fn default_audits() -> Vec<String> {
    [
        "first-meaningful-paint",
        "time-to-interactive",
        "smooth-scrolling",
        "infinite-scrolling",
        "media-sized",
        "no-mutation-events",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn item(audit: &str) -> GroupItem {
    GroupItem {
        audit: audit.to_string(),
        weight: None,
    }
}

fn default_groups() -> Vec<GroupConfig> {
    vec![
        GroupConfig {
            name: "Performance".to_string(),
            description: "Load responsiveness and rendering smoothness".to_string(),
            items: vec![
                item("first-meaningful-paint"),
                item("time-to-interactive"),
                item("smooth-scrolling"),
            ],
        },
        GroupConfig {
            name: "Scrolling".to_string(),
            description: "Infinite scrolling lists keep up with the user".to_string(),
            items: vec![item("infinite-scrolling")],
        },
        GroupConfig {
            name: "Best Practices".to_string(),
            description: "Layout stability and modern DOM APIs".to_string(),
            items: vec![item("media-sized"), item("no-mutation-events")],
        },
    ]
}

//! Core types shared across all Pagescope crates.
//!
//! Defines run configuration, raw traces, artifacts, audit results, and the
//! error type used by the driver, gatherers, metrics engine, audits, and CLI.

pub mod artifact;
pub mod audit;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod trace;

pub use artifact::{Artifact, ArtifactSet};
pub use audit::{AuditOutcome, AuditResult, RawValue, NOT_SCORED_RAW_VALUE};
pub use config::{
    DriverConfig, GroupConfig, GroupItem, PassConfig, RunConfig, CONFIG_FILENAME, DEFAULT_PASS,
    DEFAULT_TRACE_CATEGORIES, SCROLL_PASS,
};
pub use config_loader::{ConfigLoader, ConfigSource, EffectiveConfig};
pub use error::PagescopeError;
pub use trace::{Phase, Trace, TraceEvent};

//! Pass orchestration and the per-URL run pipeline.
//!
//! - [`gatherer`]: the [`Gatherer`] trait and [`GathererRegistry`]
//! - [`gatherers`]: built-in gatherers
//! - [`orchestrator`]: configuration checks and pass sequencing
//! - [`runner`]: connect, gather, audit and aggregate one URL

pub mod error;
pub mod gatherer;
pub mod gatherers;
pub mod orchestrator;
pub mod runner;

pub use error::{ConfigError, GatherError, RunError, RunPhase};
pub use gatherer::{Gatherer, GathererRegistry, PassContext};
pub use orchestrator::{check_config, Orchestrator, PassState};
pub use runner::{RunOutput, Runner};

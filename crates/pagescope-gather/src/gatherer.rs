//! The [`Gatherer`] trait and the registry gatherers are built from.
//!
//! A gatherer instruments one pass. The orchestrator calls its hooks in
//! order (`before_pass`, `during_pass`, `after_pass`) and stores the value
//! `after_pass` returns under the gatherer's artifact key. Gatherers are
//! built fresh for every run, so they may keep state between hooks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use pagescope_driver::Driver;
use pagescope_types::PassConfig;
use serde_json::Value;

use crate::error::GatherError;

/// What a gatherer hook can see of the current pass.
pub struct PassContext<'a> {
    pub driver: &'a Driver,
    /// The URL being audited.
    pub url: &'a str,
    pub pass: &'a PassConfig,
}

/// One instrumentation unit.
#[async_trait]
pub trait Gatherer: Send {
    /// Key the artifact is stored under. Unique across a run.
    fn artifact_key(&self) -> &str;

    /// Runs before tracing starts and before the page loads.
    async fn before_pass(&mut self, _ctx: &PassContext<'_>) -> Result<(), GatherError> {
        Ok(())
    }

    /// Runs after the page loaded, while the pass trace is still recording.
    async fn during_pass(&mut self, _ctx: &PassContext<'_>) -> Result<(), GatherError> {
        Ok(())
    }

    /// Produces the artifact once tracing has stopped.
    async fn after_pass(&mut self, ctx: &PassContext<'_>) -> Result<Value, GatherError>;
}

type Factory = Box<dyn Fn() -> Box<dyn Gatherer> + Send + Sync>;

/// Gatherer constructors by configuration name.
#[derive(Default)]
pub struct GathererRegistry {
    factories: BTreeMap<String, Factory>,
}

impl GathererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in gatherer.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("url", || Box::new(crate::gatherers::UrlGatherer::default()));
        registry.register("scrolling", || {
            Box::new(crate::gatherers::ScrollingGatherer::default())
        });
        registry.register("media-sized", || {
            Box::new(crate::gatherers::MediaSizedGatherer)
        });
        registry.register("mutation-events", || {
            Box::new(crate::gatherers::MutationEventsGatherer::default())
        });
        registry
    }

    /// Register a constructor, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Gatherer> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build a fresh gatherer.
    pub fn create(&self, name: &str) -> Option<Box<dyn Gatherer>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Artifact key a gatherer produces, without keeping an instance.
    pub fn artifact_key(&self, name: &str) -> Option<String> {
        self.create(name).map(|g| g.artifact_key().to_string())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

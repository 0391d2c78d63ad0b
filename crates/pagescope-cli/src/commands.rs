//! Listing commands that print and exit without touching a browser.

use std::collections::BTreeSet;

use anyhow::Context;
use pagescope_audit::AuditRegistry;
use pagescope_types::RunConfig;
use serde_json::{json, Value};

/// Every registered audit with its description, inputs and weight.
pub fn audits_listing(registry: &AuditRegistry) -> Value {
    json!({ "audits": registry.list() })
}

/// The union of the trace categories the configured passes record, sorted.
pub fn trace_categories_listing(config: &RunConfig) -> Value {
    let categories: BTreeSet<&str> = config
        .passes
        .iter()
        .flat_map(|pass| pass.trace_categories.iter().map(String::as_str))
        .collect();
    json!({ "traceCategories": categories })
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize listing")?;
    println!("{text}");
    Ok(())
}

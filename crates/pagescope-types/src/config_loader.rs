//! Layered run configuration.
//!
//! Layers, lowest priority first:
//! 1. Built-in defaults ([`RunConfig::default()`])
//! 2. User-level: `~/.pagescope/config.toml`
//! 3. Workspace-level: `./.pagescope/config.toml`
//! 4. An explicit file passed with `--config-path`
//! 5. `PAGESCOPE_*` environment variables
//!
//! [`EffectiveConfig::sources`] records which layer set each field.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{RunConfig, CONFIG_FILENAME};
use crate::PagescopeError;

/// Maximum config file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1 << 20;

/// The layer a configuration value was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    BuiltinDefault,
    UserFile(PathBuf),
    WorkspaceFile(PathBuf),
    /// File named on the command line.
    ExplicitFile(PathBuf),
    EnvVar(String),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::BuiltinDefault => write!(f, "built-in default"),
            ConfigSource::UserFile(p) => write!(f, "user file: {}", p.display()),
            ConfigSource::WorkspaceFile(p) => write!(f, "workspace file: {}", p.display()),
            ConfigSource::ExplicitFile(p) => write!(f, "config file: {}", p.display()),
            ConfigSource::EnvVar(name) => write!(f, "env var: {name}"),
        }
    }
}

/// The merged config plus provenance for each field.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: RunConfig,
    /// Dotted field path (`driver.port`) to the layer that set it.
    pub sources: HashMap<String, ConfigSource>,
    /// Config files that were found and loaded, in priority order.
    pub source_files: Vec<PathBuf>,
}

/// Builds a [`RunConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    workspace_config_path: Option<PathBuf>,
    explicit_path: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_config_path: None,
            workspace_config_path: None,
            explicit_path: None,
        }
    }

    /// Read the user layer from `path` instead of `~/.pagescope/config.toml`.
    #[must_use]
    pub fn with_user_path(mut self, path: PathBuf) -> Self {
        self.user_config_path = Some(path);
        self
    }

    /// Read the workspace layer from `path` instead of `./.pagescope/config.toml`.
    #[must_use]
    pub fn with_workspace_path(mut self, path: PathBuf) -> Self {
        self.workspace_config_path = Some(path);
        self
    }

    /// Load this file on top of the user and workspace layers.
    ///
    /// Unlike the implicit layers, an explicit file must exist.
    #[must_use]
    pub fn with_explicit_path(mut self, path: PathBuf) -> Self {
        self.explicit_path = Some(path);
        self
    }

    fn user_path(&self) -> PathBuf {
        self.user_config_path.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(".pagescope").join(CONFIG_FILENAME)
        })
    }

    fn workspace_path(&self) -> PathBuf {
        self.workspace_config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".pagescope").join(CONFIG_FILENAME))
    }

    /// Merge every layer, then validate the result.
    pub fn load(&self) -> Result<EffectiveConfig, PagescopeError> {
        let mut sources = HashMap::new();
        let mut source_files = Vec::new();

        let default_config = RunConfig::default();
        let mut merged = toml::Value::try_from(&default_config).map_err(|e| {
            PagescopeError::ConfigError(format!("failed to serialize defaults: {e}"))
        })?;

        if let toml::Value::Table(ref table) = merged {
            for key in table.keys() {
                sources.insert(key.clone(), ConfigSource::BuiltinDefault);
            }
        }

        let user_path = self.user_path();
        if user_path.exists() {
            let layer = read_layer(&user_path, "user")?;
            deep_merge(&mut merged, &layer);
            record_sources(&layer, &mut sources, ConfigSource::UserFile(user_path.clone()));
            source_files.push(user_path);
        }

        let workspace_path = self.workspace_path();
        if workspace_path.exists() {
            let layer = read_layer(&workspace_path, "workspace")?;
            deep_merge(&mut merged, &layer);
            record_sources(
                &layer,
                &mut sources,
                ConfigSource::WorkspaceFile(workspace_path.clone()),
            );
            source_files.push(workspace_path);
        }

        if let Some(explicit) = &self.explicit_path {
            if !explicit.exists() {
                return Err(PagescopeError::ConfigError(format!(
                    "config file {} does not exist",
                    explicit.display()
                )));
            }
            let layer = read_layer(explicit, "explicit")?;
            deep_merge(&mut merged, &layer);
            record_sources(&layer, &mut sources, ConfigSource::ExplicitFile(explicit.clone()));
            source_files.push(explicit.clone());
        }

        apply_env_overrides(&mut merged, &mut sources)?;

        let config: RunConfig = merged.try_into().map_err(|e| {
            PagescopeError::ConfigError(format!("failed to parse merged config: {e}"))
        })?;

        validate_config(&config)?;

        Ok(EffectiveConfig {
            config,
            sources,
            source_files,
        })
    }
}

fn read_layer(path: &Path, label: &str) -> Result<toml::Value, PagescopeError> {
    let content = read_config_file(path)?;
    toml::from_str(&content)
        .map_err(|e| PagescopeError::ConfigError(format!("invalid {label} config: {e}")))
}

/// Read a config file with a size limit and a null-byte check.
fn read_config_file(path: &Path) -> Result<String, PagescopeError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        PagescopeError::ConfigError(format!("cannot read config file {}: {e}", path.display()))
    })?;

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(PagescopeError::ConfigError(format!(
            "config file {} exceeds maximum size of {} bytes (actual: {} bytes)",
            path.display(),
            MAX_CONFIG_FILE_SIZE,
            metadata.len()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        PagescopeError::ConfigError(format!("cannot read config file {}: {e}", path.display()))
    })?;

    if content.contains('\0') {
        return Err(PagescopeError::ConfigError(format!(
            "config file {} contains null bytes",
            path.display()
        )));
    }

    Ok(content)
}

/// Deep-merge `overlay` into `base`. Tables merge field-by-field; arrays and
/// scalars in the overlay replace the base value entirely.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn record_sources(
    layer: &toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
    source: ConfigSource,
) {
    if let toml::Value::Table(table) = layer {
        for (key, value) in table {
            sources.insert(key.clone(), source.clone());
            record_nested_sources(value, sources, &source, key);
        }
    }
}

fn record_nested_sources(
    value: &toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
    source: &ConfigSource,
    prefix: &str,
) {
    if let toml::Value::Table(table) = value {
        for (key, val) in table {
            let path = format!("{prefix}.{key}");
            sources.insert(path.clone(), source.clone());
            record_nested_sources(val, sources, source, &path);
        }
    }
}

/// One `PAGESCOPE_*` variable and the config field it sets.
pub struct EnvMapping {
    pub env_var: &'static str,
    /// Path of the target field, one segment per table.
    pub toml_path: &'static [&'static str],
}

/// All supported `PAGESCOPE_*` environment variable mappings.
pub const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        env_var: "PAGESCOPE_HOST",
        toml_path: &["driver", "host"],
    },
    EnvMapping {
        env_var: "PAGESCOPE_PORT",
        toml_path: &["driver", "port"],
    },
    EnvMapping {
        env_var: "PAGESCOPE_READY_RETRIES",
        toml_path: &["driver", "ready_max_retries"],
    },
    EnvMapping {
        env_var: "PAGESCOPE_PAGE_LOAD_TIMEOUT_MS",
        toml_path: &["driver", "page_load_timeout_ms"],
    },
    EnvMapping {
        env_var: "PAGESCOPE_LOG_PROTOCOL",
        toml_path: &["driver", "log_protocol"],
    },
];

fn apply_env_overrides(
    merged: &mut toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
) -> Result<(), PagescopeError> {
    for mapping in ENV_MAPPINGS {
        if let Ok(raw_value) = std::env::var(mapping.env_var) {
            validate_env_value(mapping.env_var, &raw_value)?;

            let toml_val = env_value_to_toml(mapping.env_var, mapping.toml_path, &raw_value)?;
            set_nested_value(merged, mapping.toml_path, toml_val);

            sources.insert(
                mapping.toml_path.join("."),
                ConfigSource::EnvVar(mapping.env_var.to_string()),
            );
        }
    }
    Ok(())
}

fn validate_env_value(var_name: &str, value: &str) -> Result<(), PagescopeError> {
    if value.contains('\0') {
        return Err(PagescopeError::ConfigError(format!(
            "environment variable {var_name} contains null bytes"
        )));
    }
    for ch in value.chars() {
        if ch.is_control() && ch != '\t' && ch != '\n' && ch != '\r' {
            return Err(PagescopeError::ConfigError(format!(
                "environment variable {var_name} contains control character U+{:04X}",
                ch as u32
            )));
        }
    }
    Ok(())
}

/// Convert an environment variable string to the TOML value its field expects.
fn env_value_to_toml(
    env_var: &str,
    toml_path: &[&str],
    raw: &str,
) -> Result<toml::Value, PagescopeError> {
    let last = toml_path.last().copied().unwrap_or("");

    match last {
        "port" | "ready_max_retries" | "page_load_timeout_ms" => {
            let num: i64 = raw.trim().parse().map_err(|e| {
                PagescopeError::ConfigError(format!(
                    "environment variable {env_var} must be numeric: {e}"
                ))
            })?;
            Ok(toml::Value::Integer(num))
        }
        "log_protocol" => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" | "" => Ok(toml::Value::Boolean(false)),
            other => Err(PagescopeError::ConfigError(format!(
                "environment variable {env_var} must be a boolean, got {other:?}"
            ))),
        },
        _ => Ok(toml::Value::String(raw.to_string())),
    }
}

/// Set a value at a nested path, creating intermediate tables as needed.
fn set_nested_value(root: &mut toml::Value, path: &[&str], value: toml::Value) {
    if path.is_empty() {
        return;
    }
    if path.len() == 1 {
        if let toml::Value::Table(table) = root {
            table.insert(path[0].to_string(), value);
        }
        return;
    }
    if let toml::Value::Table(table) = root {
        let entry = table
            .entry(path[0].to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        set_nested_value(entry, &path[1..], value);
    }
}

/// Structural checks on the merged configuration.
///
/// Checks that need the gatherer and audit registries (unknown names,
/// duplicate artifact keys) run in the orchestrator before gathering.
pub fn validate_config(config: &RunConfig) -> Result<(), PagescopeError> {
    if config.driver.host.trim().is_empty() {
        return Err(PagescopeError::ConfigError("driver.host cannot be empty".into()));
    }
    if config.driver.port == 0 {
        return Err(PagescopeError::ConfigError(
            "driver.port must be in range 1-65535".into(),
        ));
    }
    if config.driver.ready_max_retries == 0 {
        return Err(PagescopeError::ConfigError(
            "driver.ready_max_retries must be at least 1".into(),
        ));
    }
    if config.passes.is_empty() {
        return Err(PagescopeError::ConfigError(
            "at least one pass must be configured".into(),
        ));
    }

    let mut pass_names = HashSet::new();
    for (i, pass) in config.passes.iter().enumerate() {
        if pass.name.trim().is_empty() {
            return Err(PagescopeError::ConfigError(format!(
                "passes[{i}]: name cannot be empty"
            )));
        }
        if !pass_names.insert(pass.name.as_str()) {
            return Err(PagescopeError::ConfigError(format!(
                "duplicate pass name '{}'",
                pass.name
            )));
        }
    }

    let mut audit_names = HashSet::new();
    for audit in &config.audits {
        if !audit_names.insert(audit.as_str()) {
            return Err(PagescopeError::ConfigError(format!(
                "audit '{audit}' is listed twice"
            )));
        }
    }

    for group in &config.groups {
        for item in &group.items {
            if let Some(w) = item.weight {
                if !w.is_finite() || w < 0.0 {
                    return Err(PagescopeError::ConfigError(format!(
                        "group '{}': weight for '{}' must be a non-negative number",
                        group.name, item.audit
                    )));
                }
            }
            if !audit_names.contains(item.audit.as_str()) {
                return Err(PagescopeError::ConfigError(format!(
                    "group '{}' references audit '{}' which is not configured",
                    group.name, item.audit
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    /// Environment variables are process-global; loader tests must not interleave.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        for mapping in ENV_MAPPINGS {
            std::env::remove_var(mapping.env_var);
        }
    }

    fn isolated_loader(tmp: &TempDir) -> ConfigLoader {
        ConfigLoader::new()
            .with_user_path(tmp.path().join("user").join("config.toml"))
            .with_workspace_path(tmp.path().join("workspace").join("config.toml"))
    }

    #[test]
    fn defaults_when_no_files() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let tmp = TempDir::new().unwrap();
        let effective = isolated_loader(&tmp).load().unwrap();
        assert_eq!(effective.config, RunConfig::default());
        assert!(effective.source_files.is_empty());
        assert_eq!(
            effective.sources.get("driver"),
            Some(&ConfigSource::BuiltinDefault)
        );
    }

    #[test]
    fn config_merge_priority_order() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let tmp = TempDir::new().unwrap();
        let user = write_config(
            &tmp.path().join("user"),
            "[driver]\nport = 9300\nhost = \"10.0.0.1\"\n",
        );
        let workspace = write_config(&tmp.path().join("workspace"), "[driver]\nport = 9400\n");

        let effective = isolated_loader(&tmp).load().unwrap();
        assert_eq!(effective.config.driver.port, 9400);
        assert_eq!(effective.config.driver.host, "10.0.0.1");
        assert_eq!(effective.source_files, vec![user.clone(), workspace.clone()]);
        assert_eq!(
            effective.sources.get("driver.port"),
            Some(&ConfigSource::WorkspaceFile(workspace))
        );
        assert_eq!(
            effective.sources.get("driver.host"),
            Some(&ConfigSource::UserFile(user))
        );
    }

    #[test]
    fn explicit_file_overrides_workspace() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let tmp = TempDir::new().unwrap();
        write_config(&tmp.path().join("workspace"), "[driver]\nport = 9400\n");
        let explicit = write_config(
            &tmp.path().join("explicit"),
            "audits = [\"smooth-scrolling\"]\ngroups = []\n[driver]\nport = 9500\n",
        );
        let effective = isolated_loader(&tmp)
            .with_explicit_path(explicit)
            .load()
            .unwrap();
        assert_eq!(effective.config.driver.port, 9500);
        assert_eq!(effective.config.audits, vec!["smooth-scrolling".to_string()]);
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let tmp = TempDir::new().unwrap();
        let err = isolated_loader(&tmp)
            .with_explicit_path(tmp.path().join("nope.toml"))
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn env_overrides_files() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let tmp = TempDir::new().unwrap();
        write_config(&tmp.path().join("user"), "[driver]\nport = 9300\n");
        std::env::set_var("PAGESCOPE_PORT", "9777");
        std::env::set_var("PAGESCOPE_LOG_PROTOCOL", "yes");
        let effective = isolated_loader(&tmp).load();
        clear_env_vars();
        let effective = effective.unwrap();
        assert_eq!(effective.config.driver.port, 9777);
        assert!(effective.config.driver.log_protocol);
        assert_eq!(
            effective.sources.get("driver.port"),
            Some(&ConfigSource::EnvVar("PAGESCOPE_PORT".into()))
        );
    }

    #[test]
    fn non_numeric_env_port_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let tmp = TempDir::new().unwrap();
        std::env::set_var("PAGESCOPE_PORT", "nine");
        let result = isolated_loader(&tmp).load();
        clear_env_vars();
        assert!(result.unwrap_err().to_string().contains("must be numeric"));
    }

    #[test]
    fn null_bytes_in_file_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let tmp = TempDir::new().unwrap();
        write_config(&tmp.path().join("user"), "[driver]\nhost = \"a\0b\"\n");
        let err = isolated_loader(&tmp).load().unwrap_err();
        assert!(err.to_string().contains("null bytes"));
    }

    #[test]
    fn validate_rejects_duplicate_pass_names() {
        let mut config = RunConfig::default();
        let first = config.passes[0].clone();
        config.passes.push(first);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate pass name"));
    }

    #[test]
    fn validate_rejects_group_with_unknown_audit() {
        let mut config = RunConfig::default();
        config.audits.retain(|a| a != "media-sized");
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("media-sized"));
    }

    #[test]
    fn validate_rejects_negative_weight() {
        let mut config = RunConfig::default();
        config.groups[0].items[0].weight = Some(-1.0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let mut base: toml::Value = toml::from_str("a = [1, 2]\n[t]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("a = [3]\n[t]\ny = 5\n").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["a"].as_array().unwrap().len(), 1);
        assert_eq!(base["t"]["x"].as_integer(), Some(1));
        assert_eq!(base["t"]["y"].as_integer(), Some(5));
    }
}

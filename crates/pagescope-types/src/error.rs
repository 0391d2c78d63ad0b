//! Error types shared across all pagescope crates.

/// Errors raised by the shared data model and configuration layer.
///
/// Channel-level failures live in the driver crate; these variants cover the
/// configuration check that runs before gathering and the write-once
/// discipline of the artifact set.
#[derive(Debug, thiserror::Error)]
pub enum PagescopeError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("artifact error: {0}")]
    ArtifactError(String),
}

//! Session configuration.
//!
//! One `SessionConfig` is fixed for the lifetime of a render session. It
//! decides whether the engine exports for a final render, an interactive
//! render or the host viewport, which changes motion blur, hider and
//! camera handling.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the exported scene is rendered for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Final,
    /// Live render that receives incremental updates
    Interactive,
    /// Interactive render driven by the host viewport camera
    Viewport,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: RenderMode,
    /// Rendering in a separate process; thread count is left to the renderer
    pub external_render: bool,
    /// Render output goes back into the host's image editor
    pub render_into_host: bool,
    /// Base directory for relative texture paths
    pub texture_search_path: Option<PathBuf>,
    /// Output directory for display files
    pub output_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Final,
            external_render: false,
            render_into_host: false,
            texture_search_path: None,
            output_dir: PathBuf::from("renders"),
        }
    }
}

impl SessionConfig {
    pub fn interactive() -> Self {
        Self {
            mode: RenderMode::Interactive,
            ..Default::default()
        }
    }

    pub fn viewport() -> Self {
        Self {
            mode: RenderMode::Viewport,
            ..Default::default()
        }
    }

    /// Interactive and viewport sessions both receive incremental updates.
    pub fn is_interactive(&self) -> bool {
        matches!(self.mode, RenderMode::Interactive | RenderMode::Viewport)
    }

    pub fn is_viewport(&self) -> bool {
        self.mode == RenderMode::Viewport
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert!(!config.is_interactive());
    }

    #[test]
    fn test_viewport_is_interactive() {
        let config = SessionConfig::from_json_str(r#"{"mode": "viewport"}"#).unwrap();
        assert!(config.is_interactive());
        assert!(config.is_viewport());
        assert!(SessionConfig::interactive().is_interactive());
        assert!(!SessionConfig::interactive().is_viewport());
    }
}

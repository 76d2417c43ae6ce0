//! Engine configuration.
//!
//! Serde-backed TOML configuration for the window, the backend choice
//! and engine behavior. Every field has a default so a partial (or
//! missing) file still boots the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file contents did not parse as TOML.
    #[error("parse error: {0}")]
    Parse(String),

    /// The configuration could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Which render system backend to boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Desktop-style immediate-mode backend.
    #[default]
    Immediate,
    /// Console-style backend with software matrix stacks and TEV
    /// combiners.
    Flipper,
}

/// Output window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Framebuffer width in pixels.
    pub width: u32,
    /// Framebuffer height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            title: "knowledge".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Window settings.
    pub window: WindowConfig,
    /// Backend selection.
    pub backend: BackendKind,
    /// Synchronize presentation to the display refresh.
    pub vsync: bool,
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a configuration from a TOML file.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Serialize the configuration to TOML text.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_small_immediate_window() {
        let config = EngineConfig::default();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.backend, BackendKind::Immediate);
    }

    #[test]
    fn toml_round_trip_preserves_settings() {
        let mut config = EngineConfig::default();
        config.window.width = 1280;
        config.window.height = 720;
        config.backend = BackendKind::Flipper;
        config.vsync = true;

        let text = config.to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed = EngineConfig::from_toml_str("backend = \"flipper\"\n").unwrap();
        assert_eq!(parsed.backend, BackendKind::Flipper);
        assert_eq!(parsed.window, WindowConfig::default());
        assert!(!parsed.vsync);
    }
}

//! Minimal configuration loading for stompd.
//!
//! This crate provides configuration loading with minimal dependencies so it
//! can be imported by every stompd crate without dependency cycles.
//!
//! # Configuration Philosophy
//!
//! Everything in here is decided once at startup and never changes at
//! runtime: which panel and engine variants to use, where they live, where
//! runtime state is kept, and how verbose logging should be. Notably the
//! real/stand-in collaborator selection happens here, not by runtime type
//! inspection.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/stompd/config.toml` (system)
//! 2. `~/.config/stompd/config.toml` (user)
//! 3. `./stompd.toml` (local override)
//! 4. Environment variables (`STOMPD_*`)
//!
//! # Example Config
//!
//! ```toml
//! [panel]
//! mode = "real"
//! socket = "/run/stompd/panel.sock"
//!
//! [engine]
//! mode = "real"
//! addr = "127.0.0.1:5555"
//!
//! [paths]
//! state_dir = "~/.local/share/stompd"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;

pub use loader::{discover_config_files, expand_path, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Which implementation of a collaborator to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Stand-in implementation, no hardware or external process required.
    #[default]
    Dev,
    /// Connect to the real collaborator.
    Real,
}

/// Control panel (HMI) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Real panel bridge vs. stand-in. Default: dev
    #[serde(default)]
    pub mode: Mode,

    /// Unix socket of the panel bridge (real mode only).
    /// Default: /run/stompd/panel.sock
    #[serde(default = "PanelConfig::default_socket")]
    pub socket: PathBuf,
}

impl PanelConfig {
    fn default_socket() -> PathBuf {
        PathBuf::from("/run/stompd/panel.sock")
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Dev,
            socket: Self::default_socket(),
        }
    }
}

/// Audio engine (plugin host) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Real plugin host vs. stand-in. Default: dev
    #[serde(default)]
    pub mode: Mode,

    /// TCP address of the plugin host command socket (real mode only).
    /// Default: 127.0.0.1:5555
    #[serde(default = "EngineConfig::default_addr")]
    pub addr: String,
}

impl EngineConfig {
    fn default_addr() -> String {
        "127.0.0.1:5555".to_string()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Dev,
            addr: Self::default_addr(),
        }
    }
}

/// Filesystem paths for stompd state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for runtime state (last pedalboard, recordings).
    /// Default: ~/.local/share/stompd
    #[serde(default = "PathsConfig::default_state_dir")]
    pub state_dir: PathBuf,
}

impl PathsConfig {
    fn default_state_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/stompd"))
            .unwrap_or_else(|| PathBuf::from(".local/share/stompd"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: Self::default_state_dir(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// tracing-subscriber filter directive. Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Complete stompd configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StompConfig {
    #[serde(default)]
    pub panel: PanelConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl StompConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/stompd/config.toml`
    /// 3. `~/.config/stompd/config.toml`
    /// 4. `./stompd.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./stompd.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = StompConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StompConfig::default();
        assert_eq!(config.panel.mode, Mode::Dev);
        assert_eq!(config.engine.addr, "127.0.0.1:5555");
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_mode_parses_lowercase() {
        let config: StompConfig = toml::from_str("[engine]\nmode = \"real\"\n").unwrap();
        assert_eq!(config.engine.mode, Mode::Real);
        assert_eq!(config.panel.mode, Mode::Dev);
    }
}

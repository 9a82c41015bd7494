//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, EngineConfig, Mode, PanelConfig, PathsConfig, StompConfig, TelemetryConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/stompd/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("stompd/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("stompd.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<StompConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string, expanding `~` in paths.
fn parse_toml(contents: &str, path: &Path) -> Result<StompConfig, ConfigError> {
    let mut config: StompConfig =
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    config.paths.state_dir = expand_path(&config.paths.state_dir.to_string_lossy());
    config.panel.socket = expand_path(&config.panel.socket.to_string_lossy());

    Ok(config)
}

/// Merge two configs, with `overlay` taking precedence.
///
/// A field wins from the overlay when it differs from the compiled default,
/// so sparse files only override what they mention.
pub fn merge_configs(base: StompConfig, overlay: StompConfig) -> StompConfig {
    fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
        if overlay != default {
            overlay
        } else {
            base
        }
    }

    StompConfig {
        panel: PanelConfig {
            mode: pick(base.panel.mode, overlay.panel.mode, PanelConfig::default().mode),
            socket: pick(
                base.panel.socket,
                overlay.panel.socket,
                PanelConfig::default().socket,
            ),
        },
        engine: EngineConfig {
            mode: pick(
                base.engine.mode,
                overlay.engine.mode,
                EngineConfig::default().mode,
            ),
            addr: pick(
                base.engine.addr,
                overlay.engine.addr,
                EngineConfig::default().addr,
            ),
        },
        paths: PathsConfig {
            state_dir: pick(
                base.paths.state_dir,
                overlay.paths.state_dir,
                PathsConfig::default().state_dir,
            ),
        },
        telemetry: TelemetryConfig {
            log_level: pick(
                base.telemetry.log_level,
                overlay.telemetry.log_level,
                TelemetryConfig::default().log_level,
            ),
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut StompConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("STOMPD_STATE_DIR") {
        config.paths.state_dir = expand_path(&v);
        sources.env_overrides.push("STOMPD_STATE_DIR".to_string());
    }

    if let Ok(v) = env::var("STOMPD_PANEL_MODE") {
        if let Some(mode) = parse_mode(&v) {
            config.panel.mode = mode;
            sources.env_overrides.push("STOMPD_PANEL_MODE".to_string());
        }
    }
    if let Ok(v) = env::var("STOMPD_PANEL_SOCKET") {
        config.panel.socket = expand_path(&v);
        sources.env_overrides.push("STOMPD_PANEL_SOCKET".to_string());
    }

    if let Ok(v) = env::var("STOMPD_ENGINE_MODE") {
        if let Some(mode) = parse_mode(&v) {
            config.engine.mode = mode;
            sources.env_overrides.push("STOMPD_ENGINE_MODE".to_string());
        }
    }
    if let Ok(v) = env::var("STOMPD_ENGINE_ADDR") {
        config.engine.addr = v;
        sources.env_overrides.push("STOMPD_ENGINE_ADDR".to_string());
    }

    if let Ok(v) = env::var("STOMPD_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("STOMPD_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

fn parse_mode(v: &str) -> Option<Mode> {
    match v.to_ascii_lowercase().as_str() {
        "dev" => Some(Mode::Dev),
        "real" => Some(Mode::Real),
        _ => None,
    }
}

/// Expand ~ and leading environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        PathBuf::from(path)
    } else if let Some(stripped) = path.strip_prefix('$') {
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
            PathBuf::from(path)
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[engine]
addr = "10.0.0.2:5555"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.engine.addr, "10.0.0.2:5555");
        // Other values should be defaults
        assert_eq!(config.engine.mode, Mode::Dev);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[panel]
mode = "real"
socket = "/run/test/panel.sock"

[engine]
mode = "real"
addr = "127.0.0.1:6000"

[paths]
state_dir = "/data/stompd"

[telemetry]
log_level = "debug"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.panel.mode, Mode::Real);
        assert_eq!(config.panel.socket, PathBuf::from("/run/test/panel.sock"));
        assert_eq!(config.engine.mode, Mode::Real);
        assert_eq!(config.engine.addr, "127.0.0.1:6000");
        assert_eq!(config.paths.state_dir, PathBuf::from("/data/stompd"));
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_merge_sparse_overlay_keeps_base() {
        let base = parse_toml("[telemetry]\nlog_level = \"debug\"\n", Path::new("a")).unwrap();
        let overlay = parse_toml("[engine]\naddr = \"10.1.1.1:5555\"\n", Path::new("b")).unwrap();
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.telemetry.log_level, "debug");
        assert_eq!(merged.engine.addr, "10.1.1.1:5555");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[paths]\nstate_dir = \"/custom/state\"").unwrap();
        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.paths.state_dir, PathBuf::from("/custom/state"));
    }
}

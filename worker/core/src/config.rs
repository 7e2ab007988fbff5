//! Worker Configuration
//!
//! Layered configuration for the worker and its transports: built-in
//! defaults, then an optional TOML file, then environment variables, each
//! layer overriding the one below.
//!
//! Default file location follows XDG conventions:
//! `$XDG_CONFIG_HOME/terrapin/worker.toml` (usually
//! `~/.config/terrapin/worker.toml`). Environment overrides:
//! `TERRAPIN_QUEUE_DEPTH`, `TERRAPIN_EVENT_CAPACITY`, `TERRAPIN_SOCKET`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the expected shape.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but make no sense together.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Resolved worker configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    /// How many run requests may wait behind the one in flight before new
    /// ones are rejected.
    pub run_queue_depth: usize,
    /// Capacity of bounded inbound event channels.
    pub event_capacity: usize,
    /// Unix socket path override for the daemon transport.
    pub socket_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            run_queue_depth: 8,
            event_capacity: 256,
            socket_path: None,
        }
    }
}

/// On-disk shape: every section and field optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    worker: WorkerSection,
    #[serde(default)]
    transport: TransportSection,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerSection {
    run_queue_depth: Option<usize>,
    event_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TransportSection {
    socket_path: Option<PathBuf>,
}

impl WorkerConfig {
    /// Defaults overridden by environment variables only.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_from(|name| std::env::var(name).ok());
        config
    }

    /// Load from `path`, or from the default XDG location when `path` is
    /// `None`. An explicitly given file must exist; a missing default file
    /// silently yields defaults. Environment variables override either.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(ref path) if path.exists() => Self::from_file(path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_from(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse one specific TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&raw)?;

        let defaults = Self::default();
        Ok(Self {
            run_queue_depth: file
                .worker
                .run_queue_depth
                .unwrap_or(defaults.run_queue_depth),
            event_capacity: file
                .worker
                .event_capacity
                .unwrap_or(defaults.event_capacity),
            socket_path: file.transport.socket_path,
        })
    }

    /// Sanity-check the resolved values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_queue_depth == 0 {
            return Err(ConfigError::Validation(
                "run_queue_depth must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The XDG config file location, if a config directory exists at all.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("terrapin").join("worker.toml"))
    }

    /// The socket path to serve on: the configured override, or the runtime
    /// default under `$XDG_RUNTIME_DIR` (fallback `/tmp/terrapin-$UID`).
    #[must_use]
    pub fn resolved_socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(default_socket_path)
    }

    fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = var("TERRAPIN_QUEUE_DEPTH") {
            match raw.parse() {
                Ok(depth) => self.run_queue_depth = depth,
                Err(_) => warn!(value = %raw, "ignoring unparseable TERRAPIN_QUEUE_DEPTH"),
            }
        }
        if let Some(raw) = var("TERRAPIN_EVENT_CAPACITY") {
            match raw.parse() {
                Ok(capacity) => self.event_capacity = capacity,
                Err(_) => warn!(value = %raw, "ignoring unparseable TERRAPIN_EVENT_CAPACITY"),
            }
        }
        if let Some(path) = var("TERRAPIN_SOCKET") {
            self.socket_path = Some(PathBuf::from(path));
        }
    }
}

/// Runtime socket location for this user.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/terrapin-{uid}"))
        });
    dir.join("terrapin").join("worker.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.run_queue_depth, 8);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.socket_path, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[worker]\nrun_queue_depth = 2\n\n[transport]\nsocket_path = \"/tmp/t.sock\"\n"
        )
        .unwrap();

        let config = WorkerConfig::from_file(&path).unwrap();
        assert_eq!(config.run_queue_depth, 2);
        // Unset fields keep their defaults.
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.socket_path, Some(PathBuf::from("/tmp/t.sock")));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            WorkerConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        fs::write(&path, "worker = \"not a table\"").unwrap();
        assert!(matches!(
            WorkerConfig::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides_beat_defaults() {
        let mut config = WorkerConfig::default();
        config.apply_env_from(|name| match name {
            "TERRAPIN_QUEUE_DEPTH" => Some("3".to_string()),
            "TERRAPIN_SOCKET" => Some("/tmp/env.sock".to_string()),
            _ => None,
        });
        assert_eq!(config.run_queue_depth, 3);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.socket_path, Some(PathBuf::from("/tmp/env.sock")));
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        let mut config = WorkerConfig::default();
        config.apply_env_from(|name| {
            (name == "TERRAPIN_QUEUE_DEPTH").then(|| "lots".to_string())
        });
        assert_eq!(config.run_queue_depth, 8);
    }

    #[test]
    fn test_zero_depth_fails_validation() {
        let config = WorkerConfig {
            run_queue_depth: 0,
            ..WorkerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }
}

//! Relay settings.
//!
//! A value given on the command line (or through its environment variable)
//! wins over `[server]` in `~/.config/pairlink-relay/config.toml`, which wins
//! over the built-in default.

use std::path::{Path, PathBuf};

/// Default listen address.
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Default cap on one client text frame.
const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Why the relay could not assemble its settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// File that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_message_size: Option<usize>,
}

/// Command line of `pairlink-relay`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Pairlink signaling relay")]
pub struct RelayCliArgs {
    /// Listen address, e.g. `127.0.0.1:8080`.
    #[arg(short, long, env = "PAIRLINK_RELAY_ADDR")]
    pub bind: Option<String>,

    /// Settings file to read instead of the per-user one.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest client text frame accepted, in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Tracing filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "PAIRLINK_RELAY_LOG")]
    pub log_level: String,
}

/// Settings the relay runs with.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Largest client text frame accepted, in bytes.
    pub max_message_size: usize,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Read the settings file named by `--config` (or the per-user one, if
    /// present) and overlay the command line on it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an explicit `--config` is missing, a
    /// settings file is unreadable or malformed, or `max_message_size` is 0.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => read_settings(path)?,
            None => match dirs::config_dir() {
                Some(dir) => read_optional_settings(&dir.join("pairlink-relay").join("config.toml"))?,
                None => RelayConfigFile::default(),
            },
        };
        let config = Self::resolve(cli, file.server);
        if config.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    fn resolve(cli: &RelayCliArgs, server: ServerSection) -> Self {
        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(server.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_message_size: cli
                .max_message_size
                .or(server.max_message_size)
                .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE),
            log_level: cli.log_level.clone(),
        }
    }
}

fn read_settings(path: &Path) -> Result<RelayConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Like [`read_settings`], but a missing file means "no overrides".
fn read_optional_settings(path: &Path) -> Result<RelayConfigFile, ConfigError> {
    match read_settings(path) {
        Err(ConfigError::ReadFile { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(RelayConfigFile::default())
        }
        other => other,
    }
}

//! Configuration system for the `Pairlink` peer.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pairlink/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::transfer::TransferConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value was present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    signaling: SignalingFileConfig,
    transfer: TransferFileConfig,
}

/// `[signaling]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SignalingFileConfig {
    relay_url: Option<String>,
    connect_timeout_secs: Option<u64>,
}

/// `[transfer]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TransferFileConfig {
    chunk_size: Option<usize>,
    high_water_mark: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved peer configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the signaling relay.
    pub relay_url: String,
    /// Timeout for connecting to the relay and receiving its greeting.
    pub connect_timeout: Duration,
    /// Chunking and backpressure settings for file sends.
    pub transfer: TransferConfig,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:3000/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            transfer: TransferConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if a transfer setting is zero.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file).validate()
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            relay_url: cli
                .relay_url
                .clone()
                .or_else(|| file.signaling.relay_url.clone())
                .unwrap_or(defaults.relay_url),
            connect_timeout: file
                .signaling
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            transfer: TransferConfig {
                chunk_size: cli
                    .chunk_size
                    .or(file.transfer.chunk_size)
                    .unwrap_or(defaults.transfer.chunk_size),
                high_water_mark: cli
                    .high_water_mark
                    .or(file.transfer.high_water_mark)
                    .unwrap_or(defaults.transfer.high_water_mark),
            },
            log_level: cli.log_level.clone(),
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        self.transfer
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("transfer: {e}")))?;
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "signaling.connect_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the `pairlink` peer.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Pairlink peer: room signaling client and transfer demo")]
pub struct CliArgs {
    /// WebSocket URL of the signaling relay.
    #[arg(long, env = "PAIRLINK_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Path to config file (default: `~/.config/pairlink/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bytes per file chunk.
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Buffered bytes at which file sends pause.
    #[arg(long)]
    pub high_water_mark: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PAIRLINK_LOG")]
    pub log_level: String,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Peer subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the relay whether a room exists.
    Check {
        /// Room name.
        room: String,
    },
    /// Create or join a room and print relay events until it closes.
    Join {
        /// Room name.
        room: String,
    },
    /// Send a file across an in-process channel and report progress.
    Demo {
        /// File to send.
        path: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("pairlink").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

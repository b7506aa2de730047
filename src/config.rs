//! Configuration for the relay server and the stdin relay client.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::ConfigError;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// What the read handler does with a connection whose read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReadErrorPolicy {
    /// Log the failure and leave the connection registered.
    #[default]
    Keep,
    /// Log the failure and tear the connection down.
    Close,
}

/// Command-line arguments for the relay server
#[derive(Parser, Debug)]
#[command(name = "relay-reactor")]
#[command(version = "0.1.0")]
#[command(about = "Relays inbound TCP bytes to the console log", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8765)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen backlog passed to listen(2)
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Per-connection read buffer size in bytes
    #[arg(short = 'b', long)]
    pub buffer_size: Option<usize>,

    /// Maximum readiness events returned by one wait
    #[arg(long)]
    pub event_capacity: Option<usize>,

    /// What to do with a connection after a read error
    #[arg(long, value_enum)]
    pub read_error_policy: Option<ReadErrorPolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
        }
    }
}

/// Event loop configuration
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Per-connection read buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Capacity of the readiness event set
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub read_error_policy: ReadErrorPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            event_capacity: default_event_capacity(),
            read_error_policy: ReadErrorPolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8765".to_string()
}

fn default_backlog() -> u32 {
    1024
}

pub(crate) fn default_buffer_size() -> usize {
    1024
}

fn default_event_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub backlog: u32,
    pub buffer_size: usize,
    pub event_capacity: usize,
    pub read_error_policy: ReadErrorPolicy,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8765)),
            backlog: default_backlog(),
            buffer_size: default_buffer_size(),
            event_capacity: default_event_capacity(),
            read_error_policy: ReadErrorPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen: SocketAddr = listen
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(listen.clone()))?;

        let config = Config {
            listen,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            buffer_size: cli.buffer_size.unwrap_or(toml_config.runtime.buffer_size),
            event_capacity: cli
                .event_capacity
                .unwrap_or(toml_config.runtime.event_capacity),
            read_error_policy: cli
                .read_error_policy
                .unwrap_or(toml_config.runtime.read_error_policy),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::Zero { field: "backlog" });
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Zero {
                field: "buffer_size",
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "event_capacity",
            });
        }
        Ok(())
    }
}

/// Command-line arguments for the stdin relay client
#[derive(Parser, Debug, Clone)]
#[command(name = "relay-client")]
#[command(version = "0.1.0")]
#[command(about = "Writes standard input to a relay-reactor server", long_about = None)]
pub struct ClientArgs {
    /// Server address to connect to
    #[arg(short = 'c', long, default_value = "127.0.0.1:8765")]
    pub connect: SocketAddr,

    /// Maximum bytes read from stdin per write
    #[arg(short = 'b', long, default_value_t = default_buffer_size())]
    pub chunk_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

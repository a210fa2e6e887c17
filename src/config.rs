//! Configuration module for the chatline server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::ConfigError;
use crate::protocols::chat::DEFAULT_MAX_FRAME_SIZE;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the chat server
#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(author = "chatline authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-channel text chat server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host or address to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of simultaneous connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Largest accepted frame in bytes
    #[arg(long)]
    pub max_frame_size: Option<usize>,

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
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Readiness events handled per poll
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Scratch buffer used for each socket read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Unsent bytes tolerated for one client before it is dropped
    #[serde(default = "default_max_pending_output")]
    pub max_pending_output: usize,
    /// How long `stop` waits for the event loop to exit
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            event_capacity: default_event_capacity(),
            read_buffer_size: default_read_buffer_size(),
            max_pending_output: default_max_pending_output(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Wire protocol limits
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
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

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_max_connections() -> usize {
    1024
}

fn default_event_capacity() -> usize {
    256
}

fn default_read_buffer_size() -> usize {
    4 * 1024
}

fn default_max_pending_output() -> usize {
    1024 * 1024 // 1 MB
}

fn default_shutdown_grace_ms() -> u64 {
    1000
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub event_capacity: usize,
    pub read_buffer_size: usize,
    pub max_frame_size: usize,
    pub max_pending_output: usize,
    pub shutdown_grace: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(None, TomlConfig::default())
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

        Ok(Self::merge(Some(cli), toml_config))
    }

    /// Merge CLI args over TOML values.
    pub fn merge(cli: Option<CliArgs>, toml_config: TomlConfig) -> Self {
        let TomlConfig {
            server,
            protocol,
            logging,
        } = toml_config;

        let mut config = Config {
            host: server.host,
            port: server.port,
            max_connections: server.max_connections,
            event_capacity: server.event_capacity.max(1),
            read_buffer_size: server.read_buffer_size.max(1),
            max_frame_size: protocol.max_frame_size,
            max_pending_output: server.max_pending_output,
            shutdown_grace: Duration::from_millis(server.shutdown_grace_ms),
            log_level: logging.level,
        };

        if let Some(cli) = cli {
            if let Some(host) = cli.host {
                config.host = host;
            }
            if let Some(port) = cli.port {
                config.port = port;
            }
            if let Some(max_connections) = cli.max_connections {
                config.max_connections = max_connections;
            }
            if let Some(max_frame_size) = cli.max_frame_size {
                config.max_frame_size = max_frame_size;
            }
            if cli.log_level != "info" {
                config.log_level = cli.log_level;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7878);
        assert_eq!(config.max_frame_size, 64 * 1024);
        assert_eq!(config.shutdown_grace, Duration::from_millis(1000));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            max_connections = 16
            shutdown_grace_ms = 250

            [protocol]
            max_frame_size = 512

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.server.event_capacity, 256);
        assert_eq!(config.protocol.max_frame_size, 512);
        assert_eq!(config.logging.level, "debug");

        let config = Config::merge(None, config);
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();
        let cli = CliArgs::try_parse_from(["chatline", "--port", "9100", "--log-level", "trace"])
            .unwrap();

        let config = Config::merge(Some(cli), toml_config);
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_default_cli_level_keeps_toml_level() {
        let toml_config: TomlConfig = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let cli = CliArgs::try_parse_from(["chatline"]).unwrap();
        assert_eq!(Config::merge(Some(cli), toml_config).log_level, "warn");
    }
}

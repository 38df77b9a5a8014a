//! Configuration module for the rogue-mysql server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::ConfigError;
use crate::protocols::mysql::packet::MAX_PAYLOAD_LEN;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the honeypot
#[derive(Parser, Debug)]
#[command(name = "rogue-mysql")]
#[command(author = "rogue-mysql authors")]
#[command(version = "0.1.0")]
#[command(about = "A MySQL lookalike that asks clients for their local files", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:3306)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Maximum number of concurrent sessions
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// File path requested from clients that issue a query
    #[arg(short = 'f', long)]
    pub file: Option<String>,

    /// Close sessions idle for this many seconds (0 = never)
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Largest packet accepted from a client, in bytes
    #[arg(long)]
    pub max_packet_size: Option<usize>,

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
    pub honeypot: HoneypotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            max_connections: default_max_connections(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

/// Deception settings
#[derive(Debug, Deserialize)]
pub struct HoneypotConfig {
    /// Path sent in the LOCAL INFILE request
    #[serde(default = "default_file")]
    pub file: String,
    /// Largest packet the server will buffer from a client
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            file: default_file(),
            max_packet_size: default_max_packet_size(),
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
    "0.0.0.0:3306".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_file() -> String {
    "/etc/passwd".to_string()
}

fn default_max_packet_size() -> usize {
    MAX_PAYLOAD_LEN
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub workers: Option<usize>,
    pub max_connections: usize,
    pub idle_timeout: Option<Duration>,
    pub file: String,
    pub max_packet_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(
            CliArgs::parse_from(["rogue-mysql"]),
            TomlConfig::default(),
        )
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let idle_secs = cli.idle_timeout.unwrap_or(toml_config.server.idle_timeout);

        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            workers: cli.workers.or(toml_config.server.workers),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            file: cli.file.unwrap_or(toml_config.honeypot.file),
            max_packet_size: cli
                .max_packet_size
                .unwrap_or(toml_config.honeypot.max_packet_size),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be non-zero".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be non-zero".into(),
            ));
        }
        if self.max_packet_size == 0 || self.max_packet_size > MAX_PAYLOAD_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_packet_size must be between 1 and {MAX_PAYLOAD_LEN}"
            )));
        }
        if self.file.is_empty() {
            return Err(ConfigError::Invalid("file must not be empty".into()));
        }
        // The request marker byte and the path share one packet.
        if self.file.len() >= MAX_PAYLOAD_LEN {
            return Err(ConfigError::Invalid("file path is too long".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:3306");
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.server.idle_timeout, 300);
        assert_eq!(config.honeypot.file, "/etc/passwd");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:3307"
            workers = 4
            idle_timeout = 0

            [honeypot]
            file = "C:\\Windows\\win.ini"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:3307");
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(config.server.idle_timeout, 0);
        assert_eq!(config.honeypot.file, "C:\\Windows\\win.ini");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = CliArgs::parse_from([
            "rogue-mysql",
            "--listen",
            "127.0.0.1:4000",
            "--file",
            "/root/.ssh/id_rsa",
            "--log-level",
            "trace",
        ]);
        let file: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = "0.0.0.0:3306"
            max_connections = 8

            [honeypot]
            file = "/etc/shadow"

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let config = Config::merge(cli, file);
        assert_eq!(config.listen, "127.0.0.1:4000");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.file, "/root/.ssh/id_rsa");
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_zero_idle_timeout_disables() {
        let cli = CliArgs::parse_from(["rogue-mysql", "--idle-timeout", "0"]);
        let config = Config::merge(cli, TomlConfig::default());
        assert_eq!(config.idle_timeout, None);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.workers = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_max_packet_size_bounds() {
        let cli = CliArgs::parse_from(["rogue-mysql", "--max-packet-size", "4096"]);
        let config = Config::merge(cli, TomlConfig::default());
        assert_eq!(config.max_packet_size, 4096);
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        assert_eq!(config.max_packet_size, MAX_PAYLOAD_LEN);

        config.max_packet_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.max_packet_size = MAX_PAYLOAD_LEN + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}

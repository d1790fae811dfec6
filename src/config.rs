//! Configuration Module
//!
//! Handles configuration loading from a YAML file with command-line
//! overrides, plus validation of the resulting settings.

use crate::{Result, VaultError};
use clap::{Arg, Command};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Custom deserializer for Duration from string format like "30s", "5m", "1h"
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty duration string".to_string());
        }

        let mut num_end = 0;
        for (i, c) in s.chars().enumerate() {
            if c.is_ascii_digit() || c == '.' {
                num_end = i + 1;
            } else {
                break;
            }
        }

        if num_end == 0 {
            return Err(format!("No number found in duration string: {}", s));
        }

        let value: f64 = s[..num_end]
            .parse()
            .map_err(|e| format!("Failed to parse number '{}': {}", &s[..num_end], e))?;

        let duration = match s[num_end..].trim() {
            "s" | "sec" | "secs" | "second" | "seconds" | "" => Duration::from_secs_f64(value),
            "m" | "min" | "mins" | "minute" | "minutes" => Duration::from_secs_f64(value * 60.0),
            "h" | "hr" | "hrs" | "hour" | "hours" => Duration::from_secs_f64(value * 3600.0),
            "ms" | "millis" | "millisecond" | "milliseconds" => {
                Duration::from_secs_f64(value / 1000.0)
            }
            unit => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(duration)
    }
}

/// Vault proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the encrypted vault files
    pub vault_root: PathBuf,
    /// Address the HTTP gateway binds to
    pub bind_address: String,
    /// Port the HTTP gateway listens on
    pub port: u16,
    /// How long a verification cache entry stays live after insertion
    #[serde(deserialize_with = "duration_serde::deserialize")]
    pub verification_window: Duration,
    /// Interval between sweeps of expired verification entries
    #[serde(deserialize_with = "duration_serde::deserialize")]
    pub eviction_interval: Duration,
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Optional directory for rolling application log files
    pub app_log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_root: PathBuf::from("./vault"),
            bind_address: "127.0.0.1".to_string(),
            port: 8600,
            verification_window: Duration::from_secs(600),
            eviction_interval: Duration::from_secs(60),
            log_level: "info".to_string(),
            app_log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from file and command line
    pub fn load() -> Result<Self> {
        let matches = Self::build_cli().get_matches();

        let mut config = if let Some(config_path) = matches.get_one::<String>("config") {
            info!("Loading configuration from {}", config_path);
            Self::load_from_file(config_path)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(&matches)?;
        config.validate()?;
        Ok(config)
    }

    fn build_cli() -> Command {
        Command::new("vault-proxy")
            .version(env!("CARGO_PKG_VERSION"))
            .about("HTTP byte-range gateway for transparently encrypted vault files")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path"),
            )
            .arg(
                Arg::new("vault-root")
                    .long("vault-root")
                    .value_name("DIR")
                    .help("Directory holding the encrypted vault files"),
            )
            .arg(
                Arg::new("bind-address")
                    .long("bind-address")
                    .value_name("ADDR")
                    .help("Address to bind the HTTP gateway to (default: 127.0.0.1)"),
            )
            .arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Port to listen on (default: 8600)"),
            )
            .arg(
                Arg::new("verification-window")
                    .long("verification-window")
                    .value_name("DURATION")
                    .help("Verification cache window, e.g. 10m (default: 10m)"),
            )
            .arg(
                Arg::new("log-level")
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level: trace, debug, info, warn, error (default: info)"),
            )
    }

    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VaultError::ConfigError(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse config file {}: {}", path, e))
        })?;
        Ok(config)
    }

    fn apply_cli_overrides(&mut self, matches: &clap::ArgMatches) -> Result<()> {
        if let Some(vault_root) = matches.get_one::<String>("vault-root") {
            self.vault_root = PathBuf::from(vault_root);
        }
        if let Some(bind_address) = matches.get_one::<String>("bind-address") {
            self.bind_address = bind_address.clone();
        }
        if let Some(port) = matches.get_one::<String>("port") {
            self.port = port.parse().map_err(|_| {
                VaultError::ConfigError(format!("Invalid port: {}", port))
            })?;
        }
        if let Some(window) = matches.get_one::<String>("verification-window") {
            self.verification_window = duration_serde::parse_duration(window)
                .map_err(VaultError::ConfigError)?;
        }
        if let Some(log_level) = matches.get_one::<String>("log-level") {
            self.log_level = log_level.clone();
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.vault_root.as_os_str().is_empty() {
            return Err(VaultError::ConfigError(
                "vault_root cannot be empty".to_string(),
            ));
        }
        if self.bind_address.is_empty() {
            return Err(VaultError::ConfigError(
                "bind_address cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(VaultError::ConfigError("port cannot be 0".to_string()));
        }
        if self.verification_window.is_zero() {
            return Err(VaultError::ConfigError(
                "verification_window must be positive".to_string(),
            ));
        }
        if self.eviction_interval.is_zero() {
            return Err(VaultError::ConfigError(
                "eviction_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address the gateway binds to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                VaultError::ConfigError(format!(
                    "Invalid bind address {}:{}: {}",
                    self.bind_address, self.port, e
                ))
            })
    }
}

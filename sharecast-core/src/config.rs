//! Configuration management for Sharecast
//!
//! Handles CLI argument parsing, config file loading, and defaults.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the base directory for node stores
pub const HOME_ENV: &str = "SHARECAST_HOME";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A retrieval source the node can cascade through
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GetterKind {
    /// Squares already held in the local store
    Store,
    /// Squares and shares requested from peers
    Exchange,
}

impl GetterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GetterKind::Store => "store",
            GetterKind::Exchange => "exchange",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sharecast")]
#[command(about = "Data availability share retrieval node", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the node
    Start(StartCommand),
}

#[derive(Parser, Debug, Clone, Default)]
pub struct StartCommand {
    /// Root directory of the node store [default: $SHARECAST_HOME/.sharecast-<network>]
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to a node config TOML file [default: <data-dir>/config.toml if present]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Network the node belongs to
    #[arg(long)]
    pub network: Option<String>,

    /// Listen address for the REST API
    #[arg(long)]
    pub api_address: Option<String>,

    /// Listen port for the REST API
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Retrieval source, tried in the order given (can be specified multiple times)
    #[arg(long = "getter", value_enum)]
    pub getters: Vec<GetterKind>,

    /// Deadline for a whole API request in milliseconds
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Deadline for a single peer exchange request in milliseconds
    #[arg(long)]
    pub exchange_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            address: "0.0.0.0".to_string(),
            // Kept apart from the consensus node's RPC port so both can share a host
            port: 26658,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.address.parse::<IpAddr>().map_err(|_| {
            ConfigError::Invalid(format!("invalid api listen address: {}", self.address))
        })?;
        if self.port == 0 {
            return Err(ConfigError::Invalid("invalid api port: 0".to_string()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.address.parse().map_err(|_| {
            ConfigError::Invalid(format!("invalid api listen address: {}", self.address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resolved from the command line and environment, never from files
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub network: String,
    pub log_level: String,
    pub api: ApiConfig,
    pub getters: Vec<GetterKind>,
    pub request_timeout_ms: u64,
    pub exchange_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            network: "mocha".to_string(),
            log_level: "info".to_string(),
            api: ApiConfig::default(),
            getters: vec![GetterKind::Store, GetterKind::Exchange],
            request_timeout_ms: 60_000,
            exchange_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Create config from CLI arguments
    pub fn from_cli() -> Result<Self, ConfigError> {
        let cli = Cli::parse();

        match cli.command {
            Commands::Start(cmd) => Self::from_start(cmd),
        }
    }

    /// Resolve the data directory, load the config file and apply flag overrides
    pub fn from_start(cmd: StartCommand) -> Result<Self, ConfigError> {
        let network = cmd
            .network
            .clone()
            .unwrap_or_else(|| Config::default().network);
        let data_dir = match &cmd.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir(&network)?,
        };

        let mut config = match &cmd.config {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let path = data_dir.join("config.toml");
                if path.exists() {
                    Self::load_from_file(&path)?
                } else {
                    Config::default()
                }
            }
        };

        config.data_dir = data_dir;
        config.apply(cmd);
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply(&mut self, cmd: StartCommand) {
        if let Some(network) = cmd.network {
            self.network = network;
        }
        if let Some(address) = cmd.api_address {
            self.api.address = address;
        }
        if let Some(port) = cmd.api_port {
            self.api.port = port;
        }
        if let Some(level) = cmd.log_level {
            self.log_level = level;
        }
        if !cmd.getters.is_empty() {
            self.getters = cmd.getters;
        }
        if let Some(ms) = cmd.request_timeout_ms {
            self.request_timeout_ms = ms;
        }
        if let Some(ms) = cmd.exchange_timeout_ms {
            self.exchange_timeout_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;

        if self.getters.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one getter must be configured".to_string(),
            ));
        }
        for (i, kind) in self.getters.iter().enumerate() {
            if self.getters[..i].contains(kind) {
                return Err(ConfigError::Invalid(format!(
                    "getter '{}' listed more than once",
                    kind.as_str()
                )));
            }
        }

        if self.request_timeout_ms == 0 || self.exchange_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}

/// Default node store path for a network, based on `$SHARECAST_HOME` or the user's home
pub fn default_data_dir(network: &str) -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
        .ok_or_else(|| ConfigError::Invalid("cannot determine home directory".to_string()))?;
    Ok(data_dir_in(&home, network))
}

fn data_dir_in(home: &Path, network: &str) -> PathBuf {
    home.join(format!(".sharecast-{}", network.to_lowercase()))
}

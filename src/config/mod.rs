//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where rooms are persisted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Fs,
    Supabase,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "fs" => Ok(Self::Fs),
            "supabase" => Ok(Self::Supabase),
            _ => Err(ConfigError::Invalid("STORE_BACKEND")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// How long an empty room survives; zero keeps empty rooms forever
    pub room_ttl: Duration,
    /// Period of the idle-room sweep
    pub sweep_interval: Duration,

    pub store_backend: StoreBackend,
    /// Directory for the `fs` backend
    pub data_dir: PathBuf,

    /// Supabase project URL
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,
    /// Table holding `key`/`value` rows
    pub supabase_table: String,

    /// Allowed client origins for CORS, comma-separated; empty allows any
    pub client_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
            log_level: "info".to_string(),
            room_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(30),
            store_backend: StoreBackend::Fs,
            data_dir: PathBuf::from("./data"),
            supabase_url: None,
            supabase_service_role_key: None,
            supabase_table: "kv".to_string(),
            client_origin: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // PORT wins over SERVER_ADDR
        let server_addr = match env::var("PORT") {
            Ok(port) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            Err(_) => match env::var("SERVER_ADDR") {
                Ok(addr) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
                Err(_) => defaults.server_addr,
            },
        };

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.store_backend,
        };

        let config = Self {
            server_addr,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            room_ttl: secs_var("ROOM_TTL_SECS")?.unwrap_or(defaults.room_ttl),
            sweep_interval: secs_var("SWEEP_INTERVAL_SECS")?.unwrap_or(defaults.sweep_interval),
            store_backend,
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            supabase_url: env::var("SUPABASE_URL").ok(),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            supabase_table: env::var("SUPABASE_TABLE").unwrap_or(defaults.supabase_table),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_default(),
        };

        if config.store_backend == StoreBackend::Supabase {
            if config.supabase_url.is_none() {
                return Err(ConfigError::Missing("SUPABASE_URL"));
            }
            if config.supabase_service_role_key.is_none() {
                return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"));
            }
        }

        Ok(config)
    }
}

fn secs_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

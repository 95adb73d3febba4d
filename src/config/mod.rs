use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root for the SQLite file (when no URL is given) and uploaded documents
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Full sqlx connection string. Falls back to `<data_dir>/ridehail.db`.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing key for access tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
    /// Admin account created at startup when both fields are set
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_minutes: default_token_ttl_minutes(),
            admin_email: None,
            admin_password: None,
        }
    }
}

fn default_jwt_secret() -> String {
    // Tokens do not survive a restart unless a secret is configured
    uuid::Uuid::new_v4().to_string()
}

fn default_token_ttl_minutes() -> i64 {
    60 * 24
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_base_fare")]
    pub base_fare: f64,
    #[serde(default = "default_per_km")]
    pub per_km: f64,
    #[serde(default = "default_per_min")]
    pub per_min: f64,
    /// How far back the heatmap looks when counting rides
    #[serde(default = "default_surge_window_minutes")]
    pub surge_window_minutes: i64,
    #[serde(default = "default_surge_cap")]
    pub surge_cap: f64,
    /// Fixed credit applied by a wallet top-up
    #[serde(default = "default_topup_amount")]
    pub topup_amount: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fare: default_base_fare(),
            per_km: default_per_km(),
            per_min: default_per_min(),
            surge_window_minutes: default_surge_window_minutes(),
            surge_cap: default_surge_cap(),
            topup_amount: default_topup_amount(),
        }
    }
}

fn default_base_fare() -> f64 {
    5.0
}

fn default_per_km() -> f64 {
    0.6
}

fn default_per_min() -> f64 {
    0.12
}

fn default_surge_window_minutes() -> i64 {
    10
}

fn default_surge_cap() -> f64 {
    3.0
}

fn default_topup_amount() -> f64 {
    50.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound messages queued per socket before new ones are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Upper bound on a single socket write
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Require `?token=` on websocket upgrades
    #[serde(default)]
    pub require_token: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            require_token: false,
        }
    }
}

fn default_channel_capacity() -> usize {
    64
}

fn default_send_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
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

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Connection string for the pool, derived from `data_dir` when unset
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite:{}",
                self.server.data_dir.join("ridehail.db").display()
            ),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.server.data_dir.join("uploads")
    }
}

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub holds: HoldConfig,
    #[serde(default)]
    pub payment: Option<PaymentConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tombola.db")
}

/// Checkout hold configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HoldConfig {
    /// How long a hold lasts before expiring (renewable). Default: 10 minutes.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// How often the background sweep expires overdue holds. Default: 30 seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// Payment provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
    /// Payment backend type
    pub backend: PaymentBackend,
    /// HTTP gateway configuration (required when backend = "http")
    #[serde(default)]
    pub http: Option<HttpPaymentConfig>,
}

/// Available payment backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentBackend {
    Http,
    // Future: Stripe, Adyen
}

/// HTTP payment gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpPaymentConfig {
    /// Gateway base URL (e.g., "https://payments.example.com")
    pub url: String,
    /// Gateway API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub holds: HoldConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<SanitizedPaymentConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPaymentConfig {
    pub backend: PaymentBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<SanitizedHttpPaymentConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedHttpPaymentConfig {
    pub url: String,
    pub api_key_set: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            holds: config.holds.clone(),
            payment: config.payment.as_ref().map(|p| SanitizedPaymentConfig {
                backend: p.backend.clone(),
                http: p.http.as_ref().map(|h| SanitizedHttpPaymentConfig {
                    url: h.url.clone(),
                    api_key_set: h.api_key.is_some(),
                    timeout_secs: h.timeout_secs,
                }),
            }),
        }
    }
}

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    /// Read and validate every setting up front so a missing credential
    /// fails at startup, not on the first request.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_raw = or_default("BIND_ADDR", "0.0.0.0:3000");
        let bind: SocketAddr = bind_raw.parse().map_err(|e| ConfigError::Invalid {
            name: "BIND_ADDR",
            reason: format!("{e} (got {bind_raw:?})"),
        })?;

        Ok(Config {
            server: ServerConfig { bind },
            vision: VisionConfig {
                api_key: required("GEMINI_API_KEY")?,
                model: or_default("GEMINI_MODEL", "gemini-1.5-flash"),
                base_url: or_default(
                    "GEMINI_BASE_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                ),
            },
            store: StoreConfig {
                url: required("SUPABASE_URL")?,
                service_key: required("SUPABASE_SERVICE_KEY")?,
            },
        })
    }
}

//! Runtime configuration from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::auth::capability::DEFAULT_LINK_TTL_SECONDS;

const DEFAULT_CAPABILITY_SECRET: &str = "docgen-capability-secret-change-in-production";
const DEFAULT_TEMPLATE_CACHE_TTL_SECS: u64 = 10 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub template_root: PathBuf,
    pub storage_root: PathBuf,
    pub capability_secret: String,
    /// URL path under which download tokens are redeemed.
    pub download_root: String,
    pub bind_addr: String,
    pub template_cache_ttl: Duration,
    pub link_ttl_seconds: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let capability_secret = env::var("CAPABILITY_TOKEN_SECRET").unwrap_or_else(|_| {
            log::warn!("CAPABILITY_TOKEN_SECRET not set, using default secret. SET THIS IN PRODUCTION!");
            DEFAULT_CAPABILITY_SECRET.to_string()
        });

        Ok(Self {
            database_url,
            template_root: env_or("TEMPLATE_ROOT", "./templates").into(),
            storage_root: env_or("STORAGE_ROOT", "./storage").into(),
            capability_secret,
            download_root: env_or("DOWNLOAD_ROOT", "/download"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            template_cache_ttl: Duration::from_secs(parse_env(
                "TEMPLATE_CACHE_TTL_SECS",
                DEFAULT_TEMPLATE_CACHE_TTL_SECS,
            )?),
            link_ttl_seconds: parse_env("CAPABILITY_LINK_TTL_SECS", DEFAULT_LINK_TTL_SECONDS)?,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

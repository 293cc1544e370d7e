//! Configuration module for donation-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct DonationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub purchase_key_secret: Secret<String>,
    pub stripe: StripeConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    /// When unset, webhook signatures are not checked.
    pub webhook_secret: Option<Secret<String>>,
}

impl DonationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "donation-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
            },
            purchase_key_secret: env::var("PURCHASE_KEY_SECRET")
                .map(Secret::new)
                .map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("PURCHASE_KEY_SECRET is required"))
                })?,
            stripe: StripeConfig {
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(Secret::new),
            },
        })
    }
}

//! Application configuration loaded once at startup.
//!
//! The permit labor rate and base ZIP are passed by reference into the pricing
//! engine; nothing reads them from global state.

use std::net::SocketAddr;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::pricing::PricingError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Process-wide settings used by the pricing engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    /// Hourly labor rate for permit handling
    pub permit_labor_hourly_rate: Decimal,
    /// Origin ZIP for every distance calculation
    pub base_zip_code: String,
}

impl PricingConfig {
    pub fn new(
        permit_labor_hourly_rate: Decimal,
        base_zip_code: impl Into<String>,
    ) -> Result<Self, PricingError> {
        let config = Self {
            permit_labor_hourly_rate,
            base_zip_code: base_zip_code.into(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        if self.permit_labor_hourly_rate < Decimal::ZERO {
            return Err(PricingError::configuration(format!(
                "permit labor hourly rate must not be negative, got {}",
                self.permit_labor_hourly_rate
            )));
        }
        if self.base_zip_code.trim().is_empty() {
            return Err(PricingError::configuration("base ZIP code is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub pricing: PricingConfig,
}

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_app_config(|key| std::env::var(key))
}

/// Parse and validate configuration from an env-var lookup function.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .map(|v| v.trim().to_string())
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let bind_addr = parse_var("POOLCO_BIND_ADDR", &or_default("POOLCO_BIND_ADDR", "0.0.0.0:3000"))?;
    let log_level = or_default("POOLCO_LOG_LEVEL", "info");
    let db_max_connections = parse_var(
        "POOLCO_DB_MAX_CONNECTIONS",
        &or_default("POOLCO_DB_MAX_CONNECTIONS", "10"),
    )?;

    // No fallback for pricing settings: a missing rate must stop the process.
    let hourly_rate: Decimal = parse_var(
        "POOLCO_PERMIT_LABOR_HOURLY_RATE",
        &require("POOLCO_PERMIT_LABOR_HOURLY_RATE")?,
    )?;
    let base_zip_code = require("POOLCO_BASE_ZIP_CODE")?;

    let pricing =
        PricingConfig::new(hourly_rate, base_zip_code).map_err(|e| ConfigError::InvalidEnvVar {
            var: "POOLCO_PERMIT_LABOR_HOURLY_RATE".to_string(),
            reason: e.to_string(),
        })?;

    Ok(AppConfig {
        database_url,
        bind_addr,
        log_level,
        db_max_connections,
        pricing,
    })
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

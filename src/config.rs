use chrono::Weekday;
use std::time::Duration;

use crate::bookings::LifecycleSettings;
use crate::pricing::{RateResolver, DEFAULT_MAX_STAY_NIGHTS, DEFAULT_WEEKEND_DAYS};

/// Errors raised while reading configuration at startup
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration read from the environment (and `.env` via dotenv)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Without a database URL the service runs on the in-memory store
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub escrow_grace_hours: i64,
    pub weekend_days: Vec<Weekday>,
    /// Stay cap for listings that set no maximum of their own
    pub max_stay_nights: u32,
    pub sweep_interval: Duration,
    pub pending_payment_ttl_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let weekend_days = match lookup("WEEKEND_DAYS") {
            Some(value) => parse_weekdays(&value)?,
            None => DEFAULT_WEEKEND_DAYS.to_vec(),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            escrow_grace_hours: non_negative(parse_or(&lookup, "ESCROW_GRACE_HOURS", 48)?, "ESCROW_GRACE_HOURS")?,
            weekend_days,
            max_stay_nights: positive(
                parse_or(&lookup, "MAX_STAY_NIGHTS", DEFAULT_MAX_STAY_NIGHTS)?,
                "MAX_STAY_NIGHTS",
            )?,
            sweep_interval: Duration::from_secs(positive(
                parse_or(&lookup, "SWEEP_INTERVAL_SECS", 60)?,
                "SWEEP_INTERVAL_SECS",
            )?),
            pending_payment_ttl_minutes: non_negative(
                parse_or(&lookup, "PENDING_PAYMENT_TTL_MINUTES", 30)?,
                "PENDING_PAYMENT_TTL_MINUTES",
            )?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_resolver(&self) -> RateResolver {
        RateResolver::new(self.weekend_days.clone()).with_max_stay_nights(self.max_stay_nights)
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            escrow_grace: chrono::Duration::hours(self.escrow_grace_hours),
            pending_payment_ttl: chrono::Duration::minutes(self.pending_payment_ttl_minutes),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            value: value.clone(),
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn non_negative(value: i64, name: &'static str) -> Result<i64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(value)
}

fn positive<T>(value: T, name: &'static str) -> Result<T, ConfigError>
where
    T: Default + PartialEq + ToString,
{
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Parse a comma-separated weekday list such as `fri,sat`
pub fn parse_weekdays(value: &str) -> Result<Vec<Weekday>, ConfigError> {
    let mut days = Vec::new();
    for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let day: Weekday = part.parse().map_err(|_| ConfigError::Invalid {
            name: "WEEKEND_DAYS",
            value: value.to_string(),
            reason: format!("'{}' is not a weekday", part),
        })?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

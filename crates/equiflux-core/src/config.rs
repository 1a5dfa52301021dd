// crates/equiflux-core/src/config.rs

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

const DEFAULT_SUPPORT_CONTACT: &str = "equipment data support";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Lifetime of channel and mapping cache entries.
    pub cache_ttl_hours: u64,
    /// Trailing window used when a read names no period.
    pub default_window_hours: i64,
    /// Named in the error returned for writes to an inactive mapping.
    pub support_contact: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            default_window_hours: 24,
            support_contact: DEFAULT_SUPPORT_CONTACT.to_string(),
            database_url: None,
            max_connections: 5,
        }
    }
}

impl ServiceConfig {
    /// Loads `.env` if present, then reads `EQUIFLUX_*` variables over the
    /// defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(hours) = parse_var(&lookup, "EQUIFLUX_CACHE_TTL_HOURS")? {
            config.cache_ttl_hours = hours;
        }
        if let Some(hours) = parse_var(&lookup, "EQUIFLUX_DEFAULT_WINDOW_HOURS")? {
            config.default_window_hours = hours;
        }
        if let Some(contact) = lookup("EQUIFLUX_SUPPORT_CONTACT").filter(|v| !v.trim().is_empty()) {
            config.support_contact = contact;
        }
        config.database_url = lookup("DATABASE_URL")
            .or_else(|| lookup("EQUIFLUX_DATABASE_URL"))
            .filter(|v| !v.trim().is_empty());
        if let Some(max) = parse_var(&lookup, "EQUIFLUX_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|err| ServiceError::Config(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_window_hours <= 0 {
            return Err(ServiceError::Config(
                "default_window_hours must be positive".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ServiceError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServiceError::Config(format!("{key} has invalid value '{raw}'"))),
    }
}

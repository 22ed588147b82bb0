//! Environment parsing for [`AppConfig`].

use std::net::SocketAddr;

use kappa_access::{RateLimit, RateLimitPolicy};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{AdminSeed, AppConfig, LogFormatSetting};

const DEFAULT_APP_NAME: &str = "Kappa API";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:63342,http://127.0.0.1:3000";
const DEFAULT_LOG_LEVEL: &str = "info";

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value fails to parse.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::MissingEnv { name });

        let bind_raw = get("KAPPA_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidField {
                field: "KAPPA_BIND_ADDR",
                value: bind_raw.clone(),
                reason: "invalid socket address",
            })?;

        let defaults = RateLimitPolicy::default();
        let rate_limits = RateLimitPolicy {
            anonymous: rate_limit(&get, "KAPPA_RATELIMIT_ANONYMOUS", defaults.anonymous)?,
            general: rate_limit(&get, "KAPPA_RATELIMIT_GENERAL", defaults.general)?,
            private: rate_limit(&get, "KAPPA_RATELIMIT_PRIVATE", defaults.private)?,
            admin: rate_limit(&get, "KAPPA_RATELIMIT_ADMIN", defaults.admin)?,
            caregiver: rate_limit(&get, "KAPPA_RATELIMIT_CAREGIVER", defaults.caregiver)?,
        };

        let log_format = get("KAPPA_LOG_FORMAT")
            .map(|value| parse_log_format(&value))
            .transpose()?;

        let config = Self {
            app_name: get("KAPPA_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            bind_addr,
            database_url: get("DATABASE_URL"),
            admin: AdminSeed {
                username: require("ADMIN_USERNAME")?,
                password: require("ADMIN_PASSWORD")?,
            },
            rate_limits,
            cors_origins: parse_origins(
                &get("KAPPA_CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
            ),
            log_level: get("KAPPA_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format,
        };
        debug!(
            bind_addr = %config.bind_addr,
            persistent = config.database_url.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }
}

fn rate_limit(
    get: &impl Fn(&str) -> Option<String>,
    field: &'static str,
    default: RateLimit,
) -> ConfigResult<RateLimit> {
    get(field).map_or(Ok(default), |value| {
        RateLimit::parse(&value).map_err(|_| ConfigError::InvalidField {
            field,
            value,
            reason: "expected '<count>/<second|minute|hour|day>'",
        })
    })
}

fn parse_log_format(value: &str) -> ConfigResult<LogFormatSetting> {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormatSetting::Json),
        "pretty" | "text" => Ok(LogFormatSetting::Pretty),
        _ => Err(ConfigError::InvalidField {
            field: "KAPPA_LOG_FORMAT",
            value: value.to_string(),
            reason: "expected 'json' or 'pretty'",
        }),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

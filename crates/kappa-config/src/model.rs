//! Typed settings consumed by the bootstrap code.

use std::fmt;
use std::net::SocketAddr;

use kappa_access::RateLimitPolicy;

/// Credentials for the administrator seeded at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminSeed {
    /// Login name.
    pub username: String,
    /// Plaintext password; hashed before it is stored.
    pub password: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AdminSeed")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Requested log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatSetting {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name reported by the health endpoint.
    pub app_name: String,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Administrator seeded at startup.
    pub admin: AdminSeed,
    /// Rate limits per tier.
    pub rate_limits: RateLimitPolicy,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Default log level directive.
    pub log_level: String,
    /// Explicit log format; inferred from the build profile when unset.
    pub log_format: Option<LogFormatSetting>,
}

//! HTTP surface modules (router, middleware, handlers).

/// Ownership checks mapped onto HTTP statuses.
pub(crate) mod access;
/// Account endpoints: register, login, self-service.
pub(crate) mod account;
/// Admin user management.
pub(crate) mod admin;
/// Authentication and rate-limit middleware.
pub(crate) mod auth;
/// Shared constants and header names.
pub(crate) mod constants;
/// DoseGuard handlers.
pub(crate) mod doseguard;
/// Problem response helpers and error types.
pub(crate) mod errors;
/// Health and metrics endpoints.
pub(crate) mod health;
/// Portfolio posts.
pub(crate) mod portfolio;
/// Token-bucket limiter and header helpers.
pub(crate) mod rate_limit;
/// Router construction and server host.
pub mod router;
/// Metrics middleware for HTTP requests.
pub(crate) mod telemetry;
/// JSON body extraction and field validation.
pub(crate) mod validation;

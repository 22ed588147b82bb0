//! API-key authentication, permission gates, and rate limiting middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use kappa_access::{Permissions, RateTier, authorize};
use kappa_data::User;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::app::state::ApiState;
use crate::http::constants::HEADER_API_KEY;
use crate::http::errors::ApiError;
use crate::http::rate_limit::{RateLimitError, RateLimitHeaders, insert_rate_limit_headers};

/// Authenticated caller, inserted into request extensions by [`require_api_key`].
#[derive(Clone, Debug)]
pub(crate) struct AuthContext {
    pub(crate) user: User,
}

/// Requirements a route group places on its callers.
#[derive(Clone)]
pub(crate) struct AuthGate {
    pub(crate) state: Arc<ApiState>,
    pub(crate) required: Permissions,
    /// Fixed tier; `None` derives the tier from the caller's flags.
    pub(crate) tier: Option<RateTier>,
}

impl AuthGate {
    pub(crate) const fn new(state: Arc<ApiState>, required: Permissions) -> Self {
        Self {
            state,
            required,
            tier: None,
        }
    }

    pub(crate) const fn with_tier(mut self, tier: RateTier) -> Self {
        self.tier = Some(tier);
        self
    }
}

pub(crate) async fn require_api_key(
    State(gate): State<AuthGate>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let state = &gate.state;
    let Some(api_key) = extract_api_key(&req) else {
        state.telemetry.inc_auth_failure("missing_key");
        return Err(ApiError::unauthorized("Missing API key"));
    };

    let user = match state.store.user_by_api_key(&api_key).await? {
        Some(user) if user.is_active => user,
        _ => {
            state.telemetry.inc_auth_failure("invalid_key");
            warn!("rejected unknown or inactive API key");
            return Err(ApiError::unauthorized("Invalid API key"));
        }
    };
    state.store.touch_user(user.id, Utc::now()).await?;

    if !authorize(user.perms, gate.required) {
        state.telemetry.inc_auth_failure("insufficient_permissions");
        debug!(user_id = user.id, "caller lacks required permissions");
        return Err(ApiError::forbidden("Insufficient permissions"));
    }

    let tier = gate
        .tier
        .unwrap_or_else(|| RateTier::for_permissions(Some(user.perms)));
    let snapshot = state
        .enforce_rate_limit(tier, &api_key)
        .map_err(throttled)?;

    req.extensions_mut().insert(AuthContext { user });
    let mut response = next.run(req).await;
    insert_rate_limit_headers(
        response.headers_mut(),
        &RateLimitHeaders::from(snapshot),
    );
    Ok(response)
}

/// Rate-limit public routes by client address.
pub(crate) async fn throttle_anonymous(
    State(state): State<Arc<ApiState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());
    let snapshot = state
        .enforce_rate_limit(RateTier::Anonymous, &client)
        .map_err(throttled)?;

    let mut response = next.run(req).await;
    insert_rate_limit_headers(
        response.headers_mut(),
        &RateLimitHeaders::from(snapshot),
    );
    Ok(response)
}

fn throttled(err: RateLimitError) -> ApiError {
    ApiError::too_many_requests("rate limit exceeded; try again later").with_rate_limit(
        err.limit,
        0,
        err.retry_after,
    )
}

pub(crate) fn extract_api_key(req: &Request<Body>) -> Option<String> {
    let header = req
        .headers()
        .get(HEADER_API_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(value) = header {
        return Some(value.to_string());
    }

    Query::<ApiKeyQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(query)| query.api_key)
        .filter(|value| !value.is_empty())
}

/// Query-string fallback for clients that cannot set headers.
#[derive(Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, header: Option<&str>) -> anyhow::Result<Request<Body>> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = header {
            builder = builder.header(HEADER_API_KEY, value);
        }
        Ok(builder.body(Body::empty())?)
    }

    #[test]
    fn header_wins_over_query() -> anyhow::Result<()> {
        let req = request("/api/user?api_key=from-query", Some("from-header"))?;
        assert_eq!(extract_api_key(&req).as_deref(), Some("from-header"));
        Ok(())
    }

    #[test]
    fn query_is_the_fallback() -> anyhow::Result<()> {
        let req = request("/api/user?page=2&api_key=abc", None)?;
        assert_eq!(extract_api_key(&req).as_deref(), Some("abc"));

        let blank = request("/api/user?api_key=", Some("   "))?;
        assert_eq!(extract_api_key(&blank), None);

        let unrelated = request("/api/user?xapi_key=abc", None)?;
        assert_eq!(extract_api_key(&unrelated), None);
        Ok(())
    }

    #[test]
    fn query_key_is_percent_decoded() -> anyhow::Result<()> {
        let encoded = request("/api/user?api_key=k%2Fe%3Dy", None)?;
        assert_eq!(extract_api_key(&encoded).as_deref(), Some("k/e=y"));

        let name_encoded = request("/api/user?api%5Fkey=abc", None)?;
        assert_eq!(extract_api_key(&name_encoded).as_deref(), Some("abc"));
        Ok(())
    }
}

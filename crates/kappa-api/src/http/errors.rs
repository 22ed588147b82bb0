//! Problem-document errors returned by every handler.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kappa_api_models::{ProblemDetails, ProblemInvalidParam};
use kappa_data::DataError;
use kappa_telemetry::{current_request_id, current_route};
use tracing::{debug, error};

use crate::http::constants::{
    PROBLEM_BAD_REQUEST, PROBLEM_CONFLICT, PROBLEM_FORBIDDEN, PROBLEM_INTERNAL, PROBLEM_NOT_FOUND,
    PROBLEM_RATE_LIMITED, PROBLEM_UNAUTHORIZED,
};
use crate::http::rate_limit::{RateLimitHeaders, insert_rate_limit_headers};

/// Result alias used by handlers.
pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// Structured API error rendered as an RFC 9457 problem document.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    pub(crate) detail: Option<String>,
    pub(crate) invalid_params: Option<Vec<ProblemInvalidParam>>,
    pub(crate) rate_limit: Option<RateLimitHeaders>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
            invalid_params: None,
            rate_limit: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn with_invalid_params(mut self, params: Vec<ProblemInvalidParam>) -> Self {
        self.invalid_params = Some(params);
        self
    }

    pub(crate) const fn with_rate_limit(
        mut self,
        limit: u32,
        remaining: u32,
        retry_after: Duration,
    ) -> Self {
        self.rate_limit = Some(RateLimitHeaders {
            limit,
            remaining,
            retry_after: Some(retry_after),
        });
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(message)
    }

    pub(crate) fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            PROBLEM_UNAUTHORIZED,
            "authentication required",
        )
        .with_detail(detail)
    }

    pub(crate) fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, PROBLEM_FORBIDDEN, "forbidden").with_detail(detail)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            PROBLEM_NOT_FOUND,
            "resource not found",
        )
        .with_detail(detail)
    }

    pub(crate) fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, PROBLEM_CONFLICT, "conflict").with_detail(detail)
    }

    pub(crate) fn too_many_requests(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            PROBLEM_RATE_LIMITED,
            "rate limit exceeded",
        )
        .with_detail(detail)
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Conflict { entity, field } => {
                Self::conflict(format!("{entity} with this {field} already exists"))
            }
            DataError::MissingReference { .. } => Self::not_found(err.to_string()),
            DataError::InvalidRelation { .. } | DataError::KindMismatch { .. } => {
                error!(error = %err, "store rejected a malformed request");
                Self::internal(err.to_string())
            }
            other => {
                error!(error = %other, source = ?std::error::Error::source(&other), "store operation failed");
                Self::internal("database operation failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = current_request_id().filter(|id| !id.is_empty());
        debug!(
            status = self.status.as_u16(),
            kind = self.kind,
            route = current_route().as_deref().unwrap_or_default(),
            request_id = request_id.as_deref().unwrap_or_default(),
            "responding with problem document"
        );
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            invalid_params: self.invalid_params,
            request_id,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(rate) = self.rate_limit {
            insert_rate_limit_headers(response.headers_mut(), &rate);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::header::RETRY_AFTER;

    #[tokio::test]
    async fn problem_document_carries_detail_and_headers() -> anyhow::Result<()> {
        let response = ApiError::too_many_requests("slow down")
            .with_rate_limit(20, 0, Duration::from_millis(1_500))
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("2")
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let problem: ProblemDetails = serde_json::from_slice(&body)?;
        assert_eq!(problem.kind, PROBLEM_RATE_LIMITED);
        assert_eq!(problem.status, 429);
        assert_eq!(problem.detail.as_deref(), Some("slow down"));
        Ok(())
    }

    #[tokio::test]
    async fn problem_document_names_the_request() -> anyhow::Result<()> {
        let response = kappa_telemetry::with_request_context("req-7", "/api/user", async {
            ApiError::forbidden("Insufficient permissions").into_response()
        })
        .await;
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let problem: ProblemDetails = serde_json::from_slice(&body)?;
        assert_eq!(problem.request_id.as_deref(), Some("req-7"));

        let detached = ApiError::internal("boom").into_response();
        let body = to_bytes(detached.into_body(), usize::MAX).await?;
        let problem: ProblemDetails = serde_json::from_slice(&body)?;
        assert_eq!(problem.request_id, None);
        Ok(())
    }

    #[test]
    fn whole_second_waits_are_not_rounded_further() {
        let response = ApiError::too_many_requests("slow down")
            .with_rate_limit(20, 0, Duration::from_secs(3))
            .into_response();
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("3")
        );
    }

    #[test]
    fn data_errors_map_to_statuses() {
        let conflict = ApiError::from(DataError::Conflict {
            entity: "user",
            field: "username",
        });
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(
            conflict.detail.as_deref(),
            Some("user with this username already exists")
        );

        let missing = ApiError::from(DataError::MissingReference { entity: "dose" });
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let broken = ApiError::from(DataError::InvalidPermissions { value: 99 });
        assert_eq!(broken.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.detail.as_deref(), Some("database operation failed"));
    }
}

//! Portfolio posts.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use kappa_data::{DataError, NewPost, Post};

use crate::app::state::ApiState;
use crate::http::errors::{ApiError, ApiResult};
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const NEW_POST: &[FieldSpec] = &[
    FieldSpec::required("imageURL", FieldKind::Text),
    FieldSpec::required("title", FieldKind::Text),
    FieldSpec::required("description", FieldKind::Text),
    FieldSpec::required("category", FieldKind::Text),
];

pub(crate) async fn list_posts(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(state.store.list_posts().await?))
}

pub(crate) async fn create_post(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let fields = body.fields(NEW_POST)?;
    let post = state
        .store
        .create_post(NewPost {
            image_url: fields.require("imageURL")?,
            title: fields.require("title")?,
            description: fields.require("description")?,
            category: fields.require("category")?,
        })
        .await
        .map_err(|err| match err {
            DataError::Conflict { .. } => ApiError::conflict("A post with this imageURL already exists"),
            other => ApiError::from(other),
        })?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kappa_access::RateLimitPolicy;
    use kappa_data::MemoryStore;
    use kappa_telemetry::Metrics;
    use serde_json::json;

    #[tokio::test]
    async fn posts_are_created_once_per_image() -> anyhow::Result<()> {
        let state = Arc::new(ApiState::new(
            Arc::new(MemoryStore::new()),
            Metrics::new()?,
            RateLimitPolicy::default(),
            "Kappa API",
        ));
        let body = json!({
            "imageURL": "https://img.example/a.png",
            "title": "A",
            "description": "First",
            "category": "art"
        });
        let (status, Json(post)) = create_post(State(state.clone()), JsonBody(body.clone()))
            .await
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(status, StatusCode::CREATED);
        assert!(post.state);

        let again = create_post(State(state.clone()), JsonBody(body)).await;
        assert!(matches!(again, Err(err) if err.status == StatusCode::CONFLICT));

        let Json(posts) = list_posts(State(state))
            .await
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(posts.len(), 1);
        Ok(())
    }
}

//! Administrator user management.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use kappa_access::Permissions;
use kappa_api_models::{ProblemInvalidParam, UserView};
use kappa_data::{DataError, UserPatch};
use tracing::info;

use crate::app::state::ApiState;
use crate::http::errors::{ApiError, ApiResult};
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const USER_PATCH: &[FieldSpec] = &[
    FieldSpec::optional("username", FieldKind::Text),
    FieldSpec::optional("perms", FieldKind::Int),
];

pub(crate) async fn list_users(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Vec<UserView>>> {
    let users = state.store.list_users().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

pub(crate) async fn patch_user(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    body: JsonBody,
) -> ApiResult<Json<UserView>> {
    let fields = body.fields(USER_PATCH)?;
    let username = fields
        .get::<String>("username")?
        .filter(|name| !name.trim().is_empty());
    let perms = fields
        .get::<i64>("perms")?
        .map(|bits| {
            Permissions::try_from(bits).map_err(|_| {
                ApiError::bad_request("request body failed validation").with_invalid_params(vec![
                    ProblemInvalidParam {
                        pointer: "/perms".to_string(),
                        message: format!("{bits} is not a valid permission mask"),
                    },
                ])
            })
        })
        .transpose()?;

    if state.store.user(id).await?.is_none() {
        return Err(ApiError::not_found("User does not exist"));
    }
    if let Some(name) = &username
        && let Some(existing) = state.store.user_by_username(name).await?
        && existing.id != id
    {
        return Err(ApiError::conflict("Username already exists"));
    }

    let user = state
        .store
        .update_user(
            id,
            UserPatch {
                username,
                perms,
                ..UserPatch::default()
            },
        )
        .await
        .map_err(|err| match err {
            DataError::Conflict { .. } => ApiError::conflict("Username already exists"),
            other => ApiError::from(other),
        })?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    info!(user_id = id, perms = i64::from(user.perms), "user updated by admin");
    Ok(Json(UserView::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use kappa_access::RateLimitPolicy;
    use kappa_data::{MemoryStore, NewUser};
    use kappa_telemetry::Metrics;
    use serde_json::json;

    async fn seeded() -> anyhow::Result<(Arc<ApiState>, i64)> {
        let state = Arc::new(ApiState::new(
            Arc::new(MemoryStore::new()),
            Metrics::new()?,
            RateLimitPolicy::default(),
            "Kappa API",
        ));
        for name in ["root", "dave"] {
            state
                .store
                .create_user(NewUser {
                    username: name.into(),
                    password_hash: "hash".into(),
                    perms: Permissions::GENERAL,
                })
                .await?;
        }
        let dave = state
            .store
            .user_by_username("dave")
            .await?
            .ok_or_else(|| anyhow::anyhow!("dave should exist"))?;
        Ok((state, dave.id))
    }

    #[tokio::test]
    async fn patch_updates_name_and_flags() -> anyhow::Result<()> {
        let (state, dave) = seeded().await?;
        let Json(view) = patch_user(
            State(state.clone()),
            Path(dave),
            JsonBody(json!({ "username": "david", "perms": "3" })),
        )
        .await
        .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(view.username, "david");
        assert_eq!(view.perms, 3);

        let Json(users) = list_users(State(state))
            .await
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(users.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn patch_rejects_conflicts_and_bad_masks() -> anyhow::Result<()> {
        let (state, dave) = seeded().await?;
        let taken = patch_user(
            State(state.clone()),
            Path(dave),
            JsonBody(json!({ "username": "root" })),
        )
        .await;
        assert!(matches!(taken, Err(err) if err.status == StatusCode::CONFLICT));

        let bad = patch_user(
            State(state.clone()),
            Path(dave),
            JsonBody(json!({ "perms": 8 })),
        )
        .await;
        assert!(matches!(bad, Err(err) if err.status == StatusCode::BAD_REQUEST));

        let missing = patch_user(State(state), Path(9_999), JsonBody(json!({}))).await;
        assert!(matches!(missing, Err(err) if err.status == StatusCode::NOT_FOUND));
        Ok(())
    }
}

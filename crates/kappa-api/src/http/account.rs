//! Registration, login, and self-service account endpoints.

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode};
use kappa_access::{Permissions, hash_password, verify_password};
use kappa_api_models::UserView;
use kappa_data::{DataError, NewUser, User};
use serde_json::{Value, json};
use tokio::task;
use tracing::{error, info};

use crate::app::state::ApiState;
use crate::http::auth::AuthContext;
use crate::http::errors::{ApiError, ApiResult};
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const CREDENTIALS: &[FieldSpec] = &[
    FieldSpec::required("username", FieldKind::Text),
    FieldSpec::required("password", FieldKind::Text),
];

pub(crate) async fn register(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    let fields = body.fields(CREDENTIALS)?;
    let username: String = fields.require("username")?;
    let password: String = fields.require("password")?;

    if state.store.user_by_username(&username).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }
    let user = state
        .store
        .create_user(NewUser {
            username,
            password_hash: hash_secret(password).await?,
            perms: Permissions::GENERAL,
        })
        .await
        .map_err(|err| match err {
            DataError::Conflict { .. } => ApiError::conflict("User already exists"),
            other => ApiError::from(other),
        })?;
    info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

pub(crate) async fn login(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> ApiResult<Json<UserView>> {
    let fields = body.fields(CREDENTIALS)?;
    let username: String = fields.require("username")?;
    let password: String = fields.require("password")?;
    let user = authenticate(&state, &username, password).await?;
    Ok(Json(UserView::from(&user)))
}

pub(crate) async fn current_user(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserView>> {
    let user = state
        .store
        .user(auth.user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserView::from(&user)))
}

pub(crate) async fn delete_current_user(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_user(auth.user.id).await? {
        return Err(ApiError::not_found("User not found"));
    }
    info!(user_id = auth.user.id, "user deleted their account");
    Ok(Json(json!({})))
}

/// Check a username and password pair; 404 for unknown users, 401 for bad passwords.
pub(crate) async fn authenticate(
    state: &ApiState,
    username: &str,
    password: String,
) -> ApiResult<User> {
    let Some(user) = state.store.user_by_username(username).await? else {
        state.telemetry.inc_auth_failure("unknown_user");
        return Err(ApiError::not_found("User does not exist"));
    };
    if !user.is_active || !check_secret(user.password_hash.clone(), password).await? {
        state.telemetry.inc_auth_failure("bad_password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    Ok(user)
}

/// Argon2 is CPU-bound, so hashing runs on the blocking pool.
pub(crate) async fn hash_secret(password: String) -> ApiResult<String> {
    task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| {
            error!(error = %err, "password hashing task failed");
            ApiError::internal("failed to hash password")
        })?
        .map_err(|err| {
            error!(error = %err, "failed to hash password");
            ApiError::internal("failed to hash password")
        })
}

async fn check_secret(hash: String, password: String) -> ApiResult<bool> {
    task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .map_err(|err| {
            error!(error = %err, "password verification task failed");
            ApiError::internal("failed to verify password")
        })?
        .map_err(|err| {
            error!(error = %err, "failed to verify password");
            ApiError::internal("failed to verify password")
        })
}

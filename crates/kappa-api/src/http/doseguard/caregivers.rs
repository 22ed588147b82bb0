//! Caregiver accounts: registration, login, and profile management.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use kappa_access::{Permissions, ResourceKind};
use kappa_api_models::CaregiverLoginResponse;
use kappa_data::{Caregiver, CaregiverPatch, DataError, NewUser, RecordPatch, Relation, UserPatch};
use tracing::info;

use super::{ListResponse, RecordResponse, index, show, traverse, update};
use crate::app::state::ApiState;
use crate::http::access::Caller;
use crate::http::account::{authenticate, hash_secret};
use crate::http::auth::AuthContext;
use crate::http::errors::{ApiError, ApiResult};
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const REGISTRATION: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::Text).max_len(50),
    FieldSpec::required("username", FieldKind::Text),
    FieldSpec::required("password", FieldKind::Text),
];

const LOGIN: &[FieldSpec] = &[
    FieldSpec::required("username", FieldKind::Text),
    FieldSpec::required("password", FieldKind::Text),
];

const PROFILE_PATCH: &[FieldSpec] = &[
    FieldSpec::optional("name", FieldKind::Text).max_len(50),
    FieldSpec::optional("username", FieldKind::Text),
    FieldSpec::optional("password", FieldKind::Text),
];

/// Create a PRIVATE user together with its caregiver profile.
pub(crate) async fn register_caregiver(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> ApiResult<(StatusCode, Json<Caregiver>)> {
    let fields = body.fields(REGISTRATION)?;
    let name: String = fields.require("name")?;
    let username: String = fields.require("username")?;
    let password: String = fields.require("password")?;

    if state.store.user_by_username(&username).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }
    let user = NewUser {
        username,
        password_hash: hash_secret(password).await?,
        perms: Permissions::PRIVATE,
    };
    let (_, caregiver) = state
        .store
        .register_caregiver(user, name)
        .await
        .map_err(|err| match err {
            DataError::Conflict { .. } => ApiError::conflict("User already exists"),
            other => ApiError::from(other),
        })?;
    info!(caregiver_id = caregiver.audit.id, "caregiver registered");
    Ok((StatusCode::CREATED, Json(caregiver)))
}

pub(crate) async fn login_caregiver(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> ApiResult<Json<CaregiverLoginResponse>> {
    let fields = body.fields(LOGIN)?;
    let username: String = fields.require("username")?;
    let user = authenticate(&state, &username, fields.require("password")?).await?;
    let caregiver = state
        .store
        .caregiver_for_user(user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Caregiver not found"))?;
    Ok(Json(CaregiverLoginResponse {
        api_key: user.api_key,
        caregiver_id: caregiver.audit.id,
        username: user.username,
    }))
}

pub(crate) async fn list_caregivers(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ListResponse {
    index(&state, &auth, ResourceKind::Caregiver).await
}

pub(crate) async fn get_caregiver(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> RecordResponse {
    show(&state, &auth, ResourceKind::Caregiver, id).await
}

/// Update the profile name and, through the bound user, the login credentials.
pub(crate) async fn patch_caregiver(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    body: JsonBody,
) -> RecordResponse {
    let fields = body.fields(PROFILE_PATCH)?;
    let name: Option<String> = fields.get("name")?;
    let username: Option<String> = fields.get("username")?;
    let password: Option<String> = fields.get("password")?;

    let caller = Caller::resolve(&state, &auth).await?;
    caller.authorize(ResourceKind::Caregiver, id).await?;

    if let Some(wanted) = &username
        && let Some(existing) = state.store.user_by_username(wanted).await?
        && existing.id != auth.user.id
    {
        return Err(ApiError::conflict("Username already exists"));
    }
    let password_hash = match password {
        Some(password) => Some(hash_secret(password).await?),
        None => None,
    };
    let credentials = UserPatch {
        username,
        password_hash,
        perms: None,
    };
    if !credentials.is_empty() {
        state
            .store
            .update_user(auth.user.id, credentials)
            .await
            .map_err(|err| match err {
                DataError::Conflict { .. } => ApiError::conflict("Username already exists"),
                other => ApiError::from(other),
            })?;
    }
    update(
        &caller,
        ResourceKind::Caregiver,
        id,
        RecordPatch::Caregiver(CaregiverPatch { name }),
    )
    .await
}

pub(crate) async fn caregiver_patients(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> ListResponse {
    traverse(
        &state,
        &auth,
        ResourceKind::Caregiver,
        id,
        &[Relation::CaregiverPatients],
    )
    .await
}

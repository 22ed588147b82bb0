//! DoseGuard medication-tracking endpoints.
//!
//! Handlers validate their body, resolve the caller's caregiver profile, check that the
//! target exists (404) and belongs to the caller (403), and only then act.

pub(crate) mod caregivers;
pub(crate) mod doses;
pub(crate) mod history;
pub(crate) mod links;
pub(crate) mod patients;
pub(crate) mod pills;
pub(crate) mod schedules;

use axum::{Json, http::StatusCode};
use kappa_access::ResourceKind;
use kappa_api_models::MessageResponse;
use kappa_data::{NewRecord, Record, RecordPatch, Relation, Scope};
use tracing::info;

use crate::app::state::ApiState;
use crate::http::access::{Caller, not_found};
use crate::http::auth::AuthContext;
use crate::http::errors::ApiResult;

pub(crate) type RecordResponse = ApiResult<Json<Record>>;
pub(crate) type CreatedResponse = ApiResult<(StatusCode, Json<Record>)>;
pub(crate) type ListResponse = ApiResult<Json<Vec<Record>>>;
pub(crate) type DeletedResponse = ApiResult<Json<MessageResponse>>;

pub(super) async fn show(
    state: &ApiState,
    auth: &AuthContext,
    kind: ResourceKind,
    id: i64,
) -> RecordResponse {
    let caller = Caller::resolve(state, auth).await?;
    Ok(Json(caller.load(kind, id).await?))
}

/// Records of `kind` visible to the caller.
pub(super) async fn index(state: &ApiState, auth: &AuthContext, kind: ResourceKind) -> ListResponse {
    let caller = Caller::resolve(state, auth).await?;
    let records = caller
        .store()
        .list(kind, Scope::Caregiver(caller.caregiver_id()))
        .await?;
    Ok(Json(records))
}

pub(super) async fn create(caller: &Caller<'_>, record: NewRecord) -> CreatedResponse {
    let kind = record.kind();
    let record = caller
        .store()
        .insert(record, Some(caller.caregiver_id()))
        .await?;
    info!(
        caregiver_id = caller.caregiver_id(),
        resource = kind.as_str(),
        id = record.id(),
        "record created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// Persist a patch. Callers authorize the target first.
pub(super) async fn update(
    caller: &Caller<'_>,
    kind: ResourceKind,
    id: i64,
    patch: RecordPatch,
) -> RecordResponse {
    let record = caller
        .store()
        .update(id, patch)
        .await?
        .ok_or_else(|| not_found(kind))?;
    Ok(Json(record))
}

pub(super) async fn remove(
    state: &ApiState,
    auth: &AuthContext,
    kind: ResourceKind,
    id: i64,
) -> DeletedResponse {
    let caller = Caller::resolve(state, auth).await?;
    caller.authorize(kind, id).await?;
    if !caller.store().soft_delete(kind, id).await? {
        return Err(not_found(kind));
    }
    info!(
        caregiver_id = caller.caregiver_id(),
        resource = kind.as_str(),
        id,
        "record soft-deleted"
    );
    Ok(Json(MessageResponse::deleted()))
}

/// Follow `path` from an owned root.
pub(super) async fn traverse(
    state: &ApiState,
    auth: &AuthContext,
    kind: ResourceKind,
    id: i64,
    path: &[Relation],
) -> ListResponse {
    let caller = Caller::resolve(state, auth).await?;
    caller.authorize(kind, id).await?;
    caller
        .store()
        .traverse(kind, id, path)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(kind))
}

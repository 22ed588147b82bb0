//! Pill definitions.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};
use kappa_access::ResourceKind;
use kappa_data::{NewPill, NewRecord, PillPatch, RecordPatch, Relation};

use super::{
    CreatedResponse, DeletedResponse, ListResponse, RecordResponse, create, index, remove, show,
    traverse, update,
};
use crate::app::state::ApiState;
use crate::http::access::Caller;
use crate::http::auth::AuthContext;
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const NEW_PILL: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::Text).max_len(50),
    FieldSpec::required("strength", FieldKind::Float),
];

const PILL_PATCH: &[FieldSpec] = &[
    FieldSpec::optional("name", FieldKind::Text).max_len(50),
    FieldSpec::optional("strength", FieldKind::Float),
];

pub(crate) async fn create_pill(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> CreatedResponse {
    let fields = body.fields(NEW_PILL)?;
    let pill = NewPill {
        name: fields.require("name")?,
        strength: fields.require("strength")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    create(&caller, NewRecord::Pill(pill)).await
}

pub(crate) async fn list_pills(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ListResponse {
    index(&state, &auth, ResourceKind::Pill).await
}

pub(crate) async fn get_pill(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> RecordResponse {
    show(&state, &auth, ResourceKind::Pill, id).await
}

pub(crate) async fn patch_pill(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    body: JsonBody,
) -> RecordResponse {
    let fields = body.fields(PILL_PATCH)?;
    let patch = PillPatch {
        name: fields.get("name")?,
        strength: fields.get("strength")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    caller.authorize(ResourceKind::Pill, id).await?;
    update(&caller, ResourceKind::Pill, id, RecordPatch::Pill(patch)).await
}

pub(crate) async fn delete_pill(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> DeletedResponse {
    remove(&state, &auth, ResourceKind::Pill, id).await
}

pub(crate) async fn pill_doses(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> ListResponse {
    traverse(&state, &auth, ResourceKind::Pill, id, &[Relation::PillDoses]).await
}

pub(crate) async fn pill_history(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> ListResponse {
    traverse(
        &state,
        &auth,
        ResourceKind::Pill,
        id,
        &[Relation::PillDoses, Relation::DoseHistory],
    )
    .await
}

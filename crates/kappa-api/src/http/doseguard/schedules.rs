//! Named dose schedules.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};
use kappa_access::ResourceKind;
use kappa_data::{NewRecord, NewSchedule, RecordPatch, Relation, SchedulePatch};

use super::{
    CreatedResponse, DeletedResponse, ListResponse, RecordResponse, create, index, remove, show,
    traverse, update,
};
use crate::app::state::ApiState;
use crate::http::access::Caller;
use crate::http::auth::AuthContext;
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const NEW_SCHEDULE: &[FieldSpec] = &[FieldSpec::required("name", FieldKind::Text).max_len(50)];
const SCHEDULE_PATCH: &[FieldSpec] = &[FieldSpec::optional("name", FieldKind::Text).max_len(50)];

pub(crate) async fn create_schedule(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> CreatedResponse {
    let fields = body.fields(NEW_SCHEDULE)?;
    let schedule = NewSchedule {
        name: fields.require("name")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    create(&caller, NewRecord::Schedule(schedule)).await
}

pub(crate) async fn list_schedules(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ListResponse {
    index(&state, &auth, ResourceKind::Schedule).await
}

pub(crate) async fn get_schedule(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> RecordResponse {
    show(&state, &auth, ResourceKind::Schedule, id).await
}

pub(crate) async fn patch_schedule(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    body: JsonBody,
) -> RecordResponse {
    let fields = body.fields(SCHEDULE_PATCH)?;
    let patch = SchedulePatch {
        name: fields.get("name")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    caller.authorize(ResourceKind::Schedule, id).await?;
    update(&caller, ResourceKind::Schedule, id, RecordPatch::Schedule(patch)).await
}

pub(crate) async fn delete_schedule(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> DeletedResponse {
    remove(&state, &auth, ResourceKind::Schedule, id).await
}

pub(crate) async fn schedule_doses(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> ListResponse {
    traverse(
        &state,
        &auth,
        ResourceKind::Schedule,
        id,
        &[Relation::ScheduleDoses],
    )
    .await
}

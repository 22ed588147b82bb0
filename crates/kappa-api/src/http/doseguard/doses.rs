//! Doses of a pill at an interval.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};
use kappa_access::ResourceKind;
use kappa_data::{DosePatch, NewDose, NewRecord, RecordPatch};

use super::{
    CreatedResponse, DeletedResponse, ListResponse, RecordResponse, create, index, remove, show,
    update,
};
use crate::app::state::ApiState;
use crate::http::access::Caller;
use crate::http::auth::AuthContext;
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const NEW_DOSE: &[FieldSpec] = &[
    FieldSpec::required("pillId", FieldKind::Int),
    FieldSpec::required("interval", FieldKind::Int),
    FieldSpec::required("amount", FieldKind::Int),
];

const DOSE_PATCH: &[FieldSpec] = &[
    FieldSpec::optional("pillId", FieldKind::Int),
    FieldSpec::optional("interval", FieldKind::Int),
    FieldSpec::optional("amount", FieldKind::Int),
];

/// The referenced pill must belong to the caller.
pub(crate) async fn create_dose(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> CreatedResponse {
    let fields = body.fields(NEW_DOSE)?;
    let dose = NewDose {
        pill_id: fields.require("pillId")?,
        interval: fields.require("interval")?,
        amount: fields.require("amount")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    caller.authorize(ResourceKind::Pill, dose.pill_id).await?;
    create(&caller, NewRecord::Dose(dose)).await
}

pub(crate) async fn list_doses(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ListResponse {
    index(&state, &auth, ResourceKind::Dose).await
}

pub(crate) async fn get_dose(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> RecordResponse {
    show(&state, &auth, ResourceKind::Dose, id).await
}

pub(crate) async fn patch_dose(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    body: JsonBody,
) -> RecordResponse {
    let fields = body.fields(DOSE_PATCH)?;
    let patch = DosePatch {
        pill_id: fields.get("pillId")?,
        interval: fields.get("interval")?,
        amount: fields.get("amount")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    caller.authorize(ResourceKind::Dose, id).await?;
    if let Some(pill_id) = patch.pill_id {
        caller.authorize(ResourceKind::Pill, pill_id).await?;
    }
    update(&caller, ResourceKind::Dose, id, RecordPatch::Dose(patch)).await
}

pub(crate) async fn delete_dose(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> DeletedResponse {
    remove(&state, &auth, ResourceKind::Dose, id).await
}

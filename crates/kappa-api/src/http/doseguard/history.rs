//! Dose history entries: a patient taking or skipping a dose.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};
use kappa_access::ResourceKind;
use kappa_data::{DoseHistoryPatch, NewDoseHistory, NewRecord, RecordPatch};

use super::{
    CreatedResponse, DeletedResponse, ListResponse, RecordResponse, create, index, remove, show,
    update,
};
use crate::app::state::ApiState;
use crate::http::access::Caller;
use crate::http::auth::AuthContext;
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const NEW_ENTRY: &[FieldSpec] = &[
    FieldSpec::required("patientId", FieldKind::Int),
    FieldSpec::required("doseId", FieldKind::Int),
    FieldSpec::required("taken", FieldKind::Bool),
];

const ENTRY_PATCH: &[FieldSpec] = &[
    FieldSpec::optional("patientId", FieldKind::Int),
    FieldSpec::optional("doseId", FieldKind::Int),
    FieldSpec::optional("taken", FieldKind::Bool),
];

/// The patient must be linked to the caller and the dose owned by it.
pub(crate) async fn create_entry(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> CreatedResponse {
    let fields = body.fields(NEW_ENTRY)?;
    let entry = NewDoseHistory {
        patient_id: fields.require("patientId")?,
        dose_id: fields.require("doseId")?,
        taken: fields.require("taken")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    caller
        .authorize(ResourceKind::Patient, entry.patient_id)
        .await?;
    caller.authorize(ResourceKind::Dose, entry.dose_id).await?;
    create(&caller, NewRecord::DoseHistory(entry)).await
}

pub(crate) async fn list_entries(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ListResponse {
    index(&state, &auth, ResourceKind::DoseHistory).await
}

pub(crate) async fn get_entry(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> RecordResponse {
    show(&state, &auth, ResourceKind::DoseHistory, id).await
}

pub(crate) async fn patch_entry(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    body: JsonBody,
) -> RecordResponse {
    let fields = body.fields(ENTRY_PATCH)?;
    let patch = DoseHistoryPatch {
        patient_id: fields.get("patientId")?,
        dose_id: fields.get("doseId")?,
        taken: fields.get("taken")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    caller.authorize(ResourceKind::DoseHistory, id).await?;
    if let Some(patient_id) = patch.patient_id {
        caller.authorize(ResourceKind::Patient, patient_id).await?;
    }
    if let Some(dose_id) = patch.dose_id {
        caller.authorize(ResourceKind::Dose, dose_id).await?;
    }
    update(
        &caller,
        ResourceKind::DoseHistory,
        id,
        RecordPatch::DoseHistory(patch),
    )
    .await
}

pub(crate) async fn delete_entry(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> DeletedResponse {
    remove(&state, &auth, ResourceKind::DoseHistory, id).await
}

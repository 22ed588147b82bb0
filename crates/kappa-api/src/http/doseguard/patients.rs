//! Patients under care.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};
use kappa_access::ResourceKind;
use kappa_data::{NewPatient, NewRecord, PatientPatch, RecordPatch, Relation};

use super::{
    CreatedResponse, DeletedResponse, ListResponse, RecordResponse, create, index, remove, show,
    traverse, update,
};
use crate::app::state::ApiState;
use crate::http::access::Caller;
use crate::http::auth::AuthContext;
use crate::http::validation::{FieldKind, FieldSpec, JsonBody};

const NEW_PATIENT: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::Text).max_len(50),
    FieldSpec::optional("contact", FieldKind::Text).max_len(25),
    FieldSpec::optional("age", FieldKind::Int),
    FieldSpec::optional("weight", FieldKind::Float),
    FieldSpec::optional("height", FieldKind::Float),
];

const PATIENT_PATCH: &[FieldSpec] = &[
    FieldSpec::optional("name", FieldKind::Text).max_len(50),
    FieldSpec::optional("contact", FieldKind::Text).max_len(25),
    FieldSpec::optional("age", FieldKind::Int),
    FieldSpec::optional("weight", FieldKind::Float),
    FieldSpec::optional("height", FieldKind::Float),
];

/// Creating a patient does not link it; the creator may claim it afterwards.
pub(crate) async fn create_patient(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> CreatedResponse {
    let fields = body.fields(NEW_PATIENT)?;
    let patient = NewPatient {
        name: fields.require("name")?,
        contact: fields.get("contact")?,
        age: fields.get("age")?,
        weight: fields.get("weight")?,
        height: fields.get("height")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    create(&caller, NewRecord::Patient(patient)).await
}

pub(crate) async fn list_patients(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
) -> ListResponse {
    index(&state, &auth, ResourceKind::Patient).await
}

pub(crate) async fn get_patient(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> RecordResponse {
    show(&state, &auth, ResourceKind::Patient, id).await
}

pub(crate) async fn patch_patient(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    body: JsonBody,
) -> RecordResponse {
    let fields = body.fields(PATIENT_PATCH)?;
    let patch = PatientPatch {
        name: fields.get("name")?,
        contact: fields.get("contact")?,
        age: fields.get("age")?,
        weight: fields.get("weight")?,
        height: fields.get("height")?,
    };
    let caller = Caller::resolve(&state, &auth).await?;
    caller.authorize(ResourceKind::Patient, id).await?;
    update(&caller, ResourceKind::Patient, id, RecordPatch::Patient(patch)).await
}

pub(crate) async fn delete_patient(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> DeletedResponse {
    remove(&state, &auth, ResourceKind::Patient, id).await
}

pub(crate) async fn patient_schedules(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> ListResponse {
    traverse(
        &state,
        &auth,
        ResourceKind::Patient,
        id,
        &[Relation::PatientSchedules],
    )
    .await
}

pub(crate) async fn patient_doses(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> ListResponse {
    traverse(
        &state,
        &auth,
        ResourceKind::Patient,
        id,
        &[Relation::PatientSchedules, Relation::ScheduleDoses],
    )
    .await
}

pub(crate) async fn patient_history(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> ListResponse {
    traverse(
        &state,
        &auth,
        ResourceKind::Patient,
        id,
        &[Relation::PatientHistory],
    )
    .await
}

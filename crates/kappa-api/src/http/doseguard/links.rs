//! Attach and detach endpoints for the link tables.
//!
//! Links are hard-deleted. Attaching an existing link is a 409, detaching a missing one a 404.

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode};
use kappa_access::ResourceKind;
use kappa_api_models::MessageResponse;
use kappa_data::{DataError, Link};
use serde_json::{Value, json};
use tracing::info;

use crate::app::state::ApiState;
use crate::http::access::Caller;
use crate::http::auth::AuthContext;
use crate::http::errors::{ApiError, ApiResult};
use crate::http::validation::{FieldKind, FieldSpec, Fields, JsonBody};

const CAREGIVER_PATIENT: &[FieldSpec] = &[
    FieldSpec::required("caregiverId", FieldKind::Int),
    FieldSpec::required("patientId", FieldKind::Int),
];

const PATIENT_SCHEDULE: &[FieldSpec] = &[
    FieldSpec::required("patientId", FieldKind::Int),
    FieldSpec::required("scheduleId", FieldKind::Int),
];

const SCHEDULE_DOSE: &[FieldSpec] = &[
    FieldSpec::required("scheduleId", FieldKind::Int),
    FieldSpec::required("doseId", FieldKind::Int),
];

type AttachResponse = ApiResult<(StatusCode, Json<Value>)>;
type DetachResponse = ApiResult<Json<MessageResponse>>;

fn caregiver_patient(fields: &Fields) -> ApiResult<Link> {
    Ok(Link::CaregiverPatient {
        caregiver_id: fields.require("caregiverId")?,
        patient_id: fields.require("patientId")?,
    })
}

fn patient_schedule(fields: &Fields) -> ApiResult<Link> {
    Ok(Link::PatientSchedule {
        patient_id: fields.require("patientId")?,
        schedule_id: fields.require("scheduleId")?,
    })
}

fn schedule_dose(fields: &Fields) -> ApiResult<Link> {
    Ok(Link::ScheduleDose {
        schedule_id: fields.require("scheduleId")?,
        dose_id: fields.require("doseId")?,
    })
}

fn view(link: Link) -> Value {
    match link {
        Link::CaregiverPatient {
            caregiver_id,
            patient_id,
        } => json!({ "caregiverId": caregiver_id, "patientId": patient_id }),
        Link::PatientSchedule {
            patient_id,
            schedule_id,
        } => json!({ "patientId": patient_id, "scheduleId": schedule_id }),
        Link::ScheduleDose {
            schedule_id,
            dose_id,
        } => json!({ "scheduleId": schedule_id, "doseId": dose_id }),
    }
}

const fn missing_message(link: Link) -> &'static str {
    match link {
        Link::CaregiverPatient { .. } => "Caregiver-patient link not found",
        Link::PatientSchedule { .. } => "Patient-schedule link not found",
        Link::ScheduleDose { .. } => "Schedule-dose link not found",
    }
}

async fn attach(caller: &Caller<'_>, link: Link) -> AttachResponse {
    caller.store().link(link).await.map_err(|err| match err {
        DataError::Conflict { .. } => ApiError::conflict("Link already exists"),
        other => ApiError::from(other),
    })?;
    info!(
        caregiver_id = caller.caregiver_id(),
        table = link.table(),
        "link attached"
    );
    Ok((StatusCode::CREATED, Json(view(link))))
}

async fn detach(caller: &Caller<'_>, link: Link) -> DetachResponse {
    if !caller.store().unlink(link).await? {
        return Err(ApiError::not_found(missing_message(link)));
    }
    info!(
        caregiver_id = caller.caregiver_id(),
        table = link.table(),
        "link detached"
    );
    Ok(Json(MessageResponse::deleted()))
}

/// The caller must own the caregiver profile and have created or be linked to the patient.
pub(crate) async fn attach_patient(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> AttachResponse {
    let link = caregiver_patient(&body.fields(CAREGIVER_PATIENT)?)?;
    let [(_, caregiver_id), (_, patient_id)] = link.endpoints();
    let caller = Caller::resolve(&state, &auth).await?;
    caller
        .authorize(ResourceKind::Caregiver, caregiver_id)
        .await?;
    caller.authorize_patient_claim(patient_id).await?;
    attach(&caller, link).await
}

pub(crate) async fn detach_patient(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> DetachResponse {
    let link = caregiver_patient(&body.fields(CAREGIVER_PATIENT)?)?;
    let [(_, caregiver_id), _] = link.endpoints();
    let caller = Caller::resolve(&state, &auth).await?;
    caller
        .authorize(ResourceKind::Caregiver, caregiver_id)
        .await?;
    detach(&caller, link).await
}

pub(crate) async fn attach_schedule(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> AttachResponse {
    let link = patient_schedule(&body.fields(PATIENT_SCHEDULE)?)?;
    let caller = authorized(&state, &auth, link).await?;
    attach(&caller, link).await
}

pub(crate) async fn detach_schedule(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> DetachResponse {
    let link = patient_schedule(&body.fields(PATIENT_SCHEDULE)?)?;
    let caller = authorized(&state, &auth, link).await?;
    detach(&caller, link).await
}

pub(crate) async fn attach_dose(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> AttachResponse {
    let link = schedule_dose(&body.fields(SCHEDULE_DOSE)?)?;
    let caller = authorized(&state, &auth, link).await?;
    attach(&caller, link).await
}

pub(crate) async fn detach_dose(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthContext>,
    body: JsonBody,
) -> DetachResponse {
    let link = schedule_dose(&body.fields(SCHEDULE_DOSE)?)?;
    let caller = authorized(&state, &auth, link).await?;
    detach(&caller, link).await
}

/// Resolve the caller and authorize both endpoints of the link.
async fn authorized<'a>(
    state: &'a ApiState,
    auth: &AuthContext,
    link: Link,
) -> ApiResult<Caller<'a>> {
    let caller = Caller::resolve(state, auth).await?;
    for (kind, id) in link.endpoints() {
        caller.authorize(kind, id).await?;
    }
    Ok(caller)
}

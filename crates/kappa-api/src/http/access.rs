//! Ownership checks for DoseGuard handlers, mapped onto HTTP statuses.

use kappa_access::{AccessGuard, ResourceKind, Verdict};
use kappa_data::{Record, Store};
use tracing::debug;

use crate::app::state::ApiState;
use crate::http::auth::AuthContext;
use crate::http::errors::{ApiError, ApiResult};

/// Caller resolved to an active caregiver profile.
pub(crate) struct Caller<'a> {
    state: &'a ApiState,
    guard: AccessGuard<'a, dyn Store + 'a>,
}

impl<'a> Caller<'a> {
    /// Resolve the caregiver bound to the authenticated user; 403 when there is none.
    pub(crate) async fn resolve(state: &'a ApiState, auth: &AuthContext) -> ApiResult<Self> {
        let source: &'a (dyn Store + 'a) = state.store.as_ref();
        match AccessGuard::<'a, dyn Store + 'a>::resolve(source, auth.user.id).await? {
            Some(guard) => Ok(Self { state, guard }),
            None => {
                state.telemetry.inc_access_denied(ResourceKind::Caregiver.as_str());
                Err(ApiError::forbidden("Caregiver profile required"))
            }
        }
    }

    pub(crate) const fn caregiver_id(&self) -> i64 {
        self.guard.caregiver_id()
    }

    pub(crate) fn store(&self) -> &'a dyn Store {
        self.state.store.as_ref()
    }

    /// 404 when the record is missing, 403 when it belongs to someone else.
    pub(crate) async fn authorize(&self, kind: ResourceKind, id: i64) -> ApiResult<()> {
        let verdict = self.guard.verify(kind, id).await?;
        self.enforce(kind, id, verdict)
    }

    /// Like [`Self::authorize`] for patients, also admitting patients the caller created.
    pub(crate) async fn authorize_patient_claim(&self, patient_id: i64) -> ApiResult<()> {
        let verdict = self.guard.verify_patient_claim(patient_id).await?;
        self.enforce(ResourceKind::Patient, patient_id, verdict)
    }

    /// Authorize and then fetch the record.
    pub(crate) async fn load(&self, kind: ResourceKind, id: i64) -> ApiResult<Record> {
        self.authorize(kind, id).await?;
        self.store()
            .fetch(kind, id)
            .await?
            .ok_or_else(|| not_found(kind))
    }

    fn enforce(&self, kind: ResourceKind, id: i64, verdict: Verdict) -> ApiResult<()> {
        match verdict {
            Verdict::Granted => Ok(()),
            Verdict::Missing => Err(not_found(kind)),
            Verdict::Denied => {
                self.state.telemetry.inc_access_denied(kind.as_str());
                debug!(
                    caregiver_id = self.caregiver_id(),
                    resource = kind.as_str(),
                    id,
                    "ownership check failed"
                );
                Err(ApiError::forbidden(format!(
                    "Access to this {} is not allowed",
                    kind.display_name().to_lowercase()
                )))
            }
        }
    }
}

pub(crate) fn not_found(kind: ResourceKind) -> ApiError {
    ApiError::not_found(format!("{} not found", kind.display_name()))
}

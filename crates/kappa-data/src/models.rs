//! Entities, creation payloads, and patches persisted by the data layer.
//!
//! JSON field names are camelCase; column names are snake_case.

use chrono::{DateTime, Utc};
use kappa_access::{Permissions, ResourceKind};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{DataError, Result};

/// Registered account holding an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Primary key.
    pub id: i64,
    /// API key presented in `X-API-Key`.
    pub api_key: String,
    /// Unique login name.
    pub username: String,
    /// Argon2 PHC hash; never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Permission flags.
    pub perms: Permissions,
    /// Inactive users cannot authenticate.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_on: Option<DateTime<Utc>>,
    /// Last successful authentication.
    pub last_use: Option<DateTime<Utc>>,
}

/// Payload for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Argon2 PHC hash.
    pub password_hash: String,
    /// Initial permission flags.
    pub perms: Permissions,
}

/// Partial user update.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    /// New login name.
    pub username: Option<String>,
    /// New password hash.
    pub password_hash: Option<String>,
    /// New permission flags.
    pub perms: Option<Permissions>,
}

impl UserPatch {
    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none() && self.password_hash.is_none() && self.perms.is_none()
    }
}

/// Audit columns shared by every DoseGuard entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    /// Primary key.
    pub id: i64,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_on: Option<DateTime<Utc>>,
    /// Caregiver that created the record.
    pub created_by: Option<i64>,
    /// Soft-delete flag; inactive records are treated as absent.
    pub active: bool,
}

impl Audit {
    pub(crate) fn new(id: i64, created_by: Option<i64>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_on: now,
            updated_on: None,
            created_by,
            active: true,
        }
    }
}

/// Caregiver profile bound to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Caregiver {
    /// Audit columns.
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
    /// Owning user.
    pub user_id: i64,
    /// Display name.
    pub name: String,
}

/// Patient under care.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Audit columns.
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
    /// Display name.
    pub name: String,
    /// Contact details.
    pub contact: Option<String>,
    /// Age in years.
    pub age: Option<i32>,
    /// Weight.
    pub weight: Option<f64>,
    /// Height.
    pub height: Option<f64>,
}

/// Medication definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Pill {
    /// Audit columns.
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
    /// Medication name.
    pub name: String,
    /// Strength per pill.
    pub strength: f64,
}

/// Dose of a pill taken at an interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Dose {
    /// Audit columns.
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
    /// Pill being dosed.
    pub pill_id: i64,
    /// Interval between doses.
    pub interval: i32,
    /// Number of pills per dose.
    pub amount: i32,
}

/// Named collection of doses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Audit columns.
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
    /// Display name.
    pub name: String,
}

/// Record of a patient taking or skipping a dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DoseHistory {
    /// Audit columns.
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
    /// Patient the entry belongs to.
    pub patient_id: i64,
    /// Dose the entry refers to.
    pub dose_id: i64,
    /// Whether the dose was taken.
    pub taken: bool,
}

/// Any DoseGuard entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    /// Caregiver profile.
    Caregiver(Caregiver),
    /// Patient.
    Patient(Patient),
    /// Pill.
    Pill(Pill),
    /// Dose.
    Dose(Dose),
    /// Schedule.
    Schedule(Schedule),
    /// Dose history entry.
    DoseHistory(DoseHistory),
}

impl Record {
    /// Kind of the wrapped entity.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Caregiver(_) => ResourceKind::Caregiver,
            Self::Patient(_) => ResourceKind::Patient,
            Self::Pill(_) => ResourceKind::Pill,
            Self::Dose(_) => ResourceKind::Dose,
            Self::Schedule(_) => ResourceKind::Schedule,
            Self::DoseHistory(_) => ResourceKind::DoseHistory,
        }
    }

    /// Audit columns of the wrapped entity.
    #[must_use]
    pub const fn audit(&self) -> &Audit {
        match self {
            Self::Caregiver(record) => &record.audit,
            Self::Patient(record) => &record.audit,
            Self::Pill(record) => &record.audit,
            Self::Dose(record) => &record.audit,
            Self::Schedule(record) => &record.audit,
            Self::DoseHistory(record) => &record.audit,
        }
    }

    pub(crate) fn audit_mut(&mut self) -> &mut Audit {
        match self {
            Self::Caregiver(record) => &mut record.audit,
            Self::Patient(record) => &mut record.audit,
            Self::Pill(record) => &mut record.audit,
            Self::Dose(record) => &mut record.audit,
            Self::Schedule(record) => &mut record.audit,
            Self::DoseHistory(record) => &mut record.audit,
        }
    }

    /// Primary key of the wrapped entity.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.audit().id
    }

    /// False once the record has been soft-deleted.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.audit().active
    }

    /// Apply a patch in place and stamp `updated_on`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::KindMismatch`] when the patch targets another kind.
    pub fn apply(&mut self, patch: RecordPatch, now: DateTime<Utc>) -> Result<()> {
        let expected = self.kind();
        match (&mut *self, patch) {
            (Self::Caregiver(record), RecordPatch::Caregiver(patch)) => {
                set(&mut record.name, patch.name);
            }
            (Self::Patient(record), RecordPatch::Patient(patch)) => {
                set(&mut record.name, patch.name);
                set_some(&mut record.contact, patch.contact);
                set_some(&mut record.age, patch.age);
                set_some(&mut record.weight, patch.weight);
                set_some(&mut record.height, patch.height);
            }
            (Self::Pill(record), RecordPatch::Pill(patch)) => {
                set(&mut record.name, patch.name);
                set(&mut record.strength, patch.strength);
            }
            (Self::Dose(record), RecordPatch::Dose(patch)) => {
                set(&mut record.pill_id, patch.pill_id);
                set(&mut record.interval, patch.interval);
                set(&mut record.amount, patch.amount);
            }
            (Self::Schedule(record), RecordPatch::Schedule(patch)) => {
                set(&mut record.name, patch.name);
            }
            (Self::DoseHistory(record), RecordPatch::DoseHistory(patch)) => {
                set(&mut record.patient_id, patch.patient_id);
                set(&mut record.dose_id, patch.dose_id);
                set(&mut record.taken, patch.taken);
            }
            (_, patch) => {
                return Err(DataError::KindMismatch {
                    expected,
                    found: patch.kind(),
                });
            }
        }
        self.audit_mut().updated_on = Some(now);
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Payload for creating a patient.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewPatient {
    /// Display name.
    pub name: String,
    /// Contact details.
    pub contact: Option<String>,
    /// Age in years.
    pub age: Option<i32>,
    /// Weight.
    pub weight: Option<f64>,
    /// Height.
    pub height: Option<f64>,
}

/// Payload for creating a pill.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPill {
    /// Medication name.
    pub name: String,
    /// Strength per pill.
    pub strength: f64,
}

/// Payload for creating a dose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDose {
    /// Pill being dosed.
    pub pill_id: i64,
    /// Interval between doses.
    pub interval: i32,
    /// Number of pills per dose.
    pub amount: i32,
}

/// Payload for creating a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    /// Display name.
    pub name: String,
}

/// Payload for creating a dose history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDoseHistory {
    /// Patient the entry belongs to.
    pub patient_id: i64,
    /// Dose the entry refers to.
    pub dose_id: i64,
    /// Whether the dose was taken.
    pub taken: bool,
}

/// Creation payload for any DoseGuard entity except caregivers, which are
/// created together with their user.
#[derive(Debug, Clone, PartialEq)]
pub enum NewRecord {
    /// New patient.
    Patient(NewPatient),
    /// New pill.
    Pill(NewPill),
    /// New dose.
    Dose(NewDose),
    /// New schedule.
    Schedule(NewSchedule),
    /// New dose history entry.
    DoseHistory(NewDoseHistory),
}

impl NewRecord {
    /// Kind of entity being created.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Patient(_) => ResourceKind::Patient,
            Self::Pill(_) => ResourceKind::Pill,
            Self::Dose(_) => ResourceKind::Dose,
            Self::Schedule(_) => ResourceKind::Schedule,
            Self::DoseHistory(_) => ResourceKind::DoseHistory,
        }
    }

    pub(crate) fn into_record(self, audit: Audit) -> Record {
        match self {
            Self::Patient(new) => Record::Patient(Patient {
                audit,
                name: new.name,
                contact: new.contact,
                age: new.age,
                weight: new.weight,
                height: new.height,
            }),
            Self::Pill(new) => Record::Pill(Pill {
                audit,
                name: new.name,
                strength: new.strength,
            }),
            Self::Dose(new) => Record::Dose(Dose {
                audit,
                pill_id: new.pill_id,
                interval: new.interval,
                amount: new.amount,
            }),
            Self::Schedule(new) => Record::Schedule(Schedule {
                audit,
                name: new.name,
            }),
            Self::DoseHistory(new) => Record::DoseHistory(DoseHistory {
                audit,
                patient_id: new.patient_id,
                dose_id: new.dose_id,
                taken: new.taken,
            }),
        }
    }
}

/// Partial caregiver update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaregiverPatch {
    /// New display name.
    pub name: Option<String>,
}

/// Partial patient update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatientPatch {
    /// New display name.
    pub name: Option<String>,
    /// New contact details.
    pub contact: Option<String>,
    /// New age.
    pub age: Option<i32>,
    /// New weight.
    pub weight: Option<f64>,
    /// New height.
    pub height: Option<f64>,
}

/// Partial pill update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PillPatch {
    /// New name.
    pub name: Option<String>,
    /// New strength.
    pub strength: Option<f64>,
}

/// Partial dose update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DosePatch {
    /// New pill reference.
    pub pill_id: Option<i64>,
    /// New interval.
    pub interval: Option<i32>,
    /// New amount.
    pub amount: Option<i32>,
}

/// Partial schedule update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedulePatch {
    /// New display name.
    pub name: Option<String>,
}

/// Partial dose history update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DoseHistoryPatch {
    /// New patient reference.
    pub patient_id: Option<i64>,
    /// New dose reference.
    pub dose_id: Option<i64>,
    /// New taken flag.
    pub taken: Option<bool>,
}

/// Partial update for any DoseGuard entity.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPatch {
    /// Caregiver update.
    Caregiver(CaregiverPatch),
    /// Patient update.
    Patient(PatientPatch),
    /// Pill update.
    Pill(PillPatch),
    /// Dose update.
    Dose(DosePatch),
    /// Schedule update.
    Schedule(SchedulePatch),
    /// Dose history update.
    DoseHistory(DoseHistoryPatch),
}

impl RecordPatch {
    /// Kind of entity the patch applies to.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Caregiver(_) => ResourceKind::Caregiver,
            Self::Patient(_) => ResourceKind::Patient,
            Self::Pill(_) => ResourceKind::Pill,
            Self::Dose(_) => ResourceKind::Dose,
            Self::Schedule(_) => ResourceKind::Schedule,
            Self::DoseHistory(_) => ResourceKind::DoseHistory,
        }
    }
}

/// Portfolio post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Primary key.
    pub id: i64,
    /// Unique image location.
    #[serde(rename = "imageURL")]
    pub image_url: String,
    /// Title.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Category label.
    pub category: String,
    /// Visibility flag.
    pub state: bool,
    /// Creation timestamp.
    pub created_on: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_on: Option<DateTime<Utc>>,
}

/// Payload for creating a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    /// Unique image location.
    pub image_url: String,
    /// Title.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Category label.
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pill() -> Record {
        Record::Pill(Pill {
            audit: Audit::new(3, Some(1), Utc::now()),
            name: "Ibuprofen".into(),
            strength: 200.0,
        })
    }

    #[test]
    fn record_serializes_flat_camel_case() -> anyhow::Result<()> {
        let value = serde_json::to_value(pill())?;
        assert_eq!(value["id"], json!(3));
        assert_eq!(value["createdBy"], json!(1));
        assert_eq!(value["active"], json!(true));
        assert_eq!(value["name"], json!("Ibuprofen"));
        assert!(value.get("audit").is_none());
        Ok(())
    }

    #[test]
    fn apply_updates_only_supplied_fields() -> anyhow::Result<()> {
        let mut record = pill();
        let now = Utc::now();
        record.apply(
            RecordPatch::Pill(PillPatch {
                name: None,
                strength: Some(400.0),
            }),
            now,
        )?;
        let Record::Pill(pill) = record else {
            anyhow::bail!("kind changed");
        };
        assert_eq!(pill.name, "Ibuprofen");
        assert!((pill.strength - 400.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn apply_rejects_foreign_patch() {
        let mut record = pill();
        let result = record.apply(RecordPatch::Schedule(SchedulePatch::default()), Utc::now());
        assert!(matches!(
            result,
            Err(DataError::KindMismatch {
                expected: ResourceKind::Pill,
                found: ResourceKind::Schedule
            })
        ));
    }

    #[test]
    fn user_hides_password_hash() -> anyhow::Result<()> {
        let user = User {
            id: 1,
            api_key: "key".into(),
            username: "alice".into(),
            password_hash: "secret".into(),
            perms: Permissions::GENERAL,
            is_active: true,
            created_on: Utc::now(),
            updated_on: None,
            last_use: None,
        };
        let value = serde_json::to_value(&user)?;
        assert!(value.get("passwordHash").is_none());
        assert_eq!(value["apiKey"], json!("key"));
        assert_eq!(value["perms"], json!(1));
        Ok(())
    }
}

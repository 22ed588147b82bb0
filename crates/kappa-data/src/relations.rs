//! Link tables and the relation vocabulary used for traversal.

use std::fmt::{self, Display, Formatter};

use kappa_access::ResourceKind;

/// Row in one of the many-to-many link tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Link {
    /// Caregiver looks after a patient.
    CaregiverPatient {
        /// Caregiver side.
        caregiver_id: i64,
        /// Patient side.
        patient_id: i64,
    },
    /// Patient follows a schedule.
    PatientSchedule {
        /// Patient side.
        patient_id: i64,
        /// Schedule side.
        schedule_id: i64,
    },
    /// Schedule contains a dose.
    ScheduleDose {
        /// Schedule side.
        schedule_id: i64,
        /// Dose side.
        dose_id: i64,
    },
}

impl Link {
    /// Both endpoints as `(kind, id)` pairs, left side first.
    #[must_use]
    pub const fn endpoints(self) -> [(ResourceKind, i64); 2] {
        match self {
            Self::CaregiverPatient {
                caregiver_id,
                patient_id,
            } => [
                (ResourceKind::Caregiver, caregiver_id),
                (ResourceKind::Patient, patient_id),
            ],
            Self::PatientSchedule {
                patient_id,
                schedule_id,
            } => [
                (ResourceKind::Patient, patient_id),
                (ResourceKind::Schedule, schedule_id),
            ],
            Self::ScheduleDose {
                schedule_id,
                dose_id,
            } => [
                (ResourceKind::Schedule, schedule_id),
                (ResourceKind::Dose, dose_id),
            ],
        }
    }

    /// Backing table name.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::CaregiverPatient { .. } => "caregiver_patients",
            Self::PatientSchedule { .. } => "patient_schedules",
            Self::ScheduleDose { .. } => "schedule_doses",
        }
    }
}

/// Directed relation from one record kind to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Patients linked to a caregiver.
    CaregiverPatients,
    /// Caregivers linked to a patient.
    PatientCaregivers,
    /// Schedules followed by a patient.
    PatientSchedules,
    /// Patients following a schedule.
    SchedulePatients,
    /// Doses contained in a schedule.
    ScheduleDoses,
    /// Schedules containing a dose.
    DoseSchedules,
    /// Doses of a pill.
    PillDoses,
    /// History entries recorded for a dose.
    DoseHistory,
    /// History entries recorded for a patient.
    PatientHistory,
}

impl Relation {
    /// Kind the relation starts from.
    #[must_use]
    pub const fn source(self) -> ResourceKind {
        match self {
            Self::CaregiverPatients => ResourceKind::Caregiver,
            Self::PatientCaregivers | Self::PatientSchedules | Self::PatientHistory => {
                ResourceKind::Patient
            }
            Self::SchedulePatients | Self::ScheduleDoses => ResourceKind::Schedule,
            Self::DoseSchedules | Self::DoseHistory => ResourceKind::Dose,
            Self::PillDoses => ResourceKind::Pill,
        }
    }

    /// Kind the relation yields.
    #[must_use]
    pub const fn target(self) -> ResourceKind {
        match self {
            Self::CaregiverPatients | Self::SchedulePatients => ResourceKind::Patient,
            Self::PatientCaregivers => ResourceKind::Caregiver,
            Self::PatientSchedules | Self::DoseSchedules => ResourceKind::Schedule,
            Self::ScheduleDoses | Self::PillDoses => ResourceKind::Dose,
            Self::DoseHistory | Self::PatientHistory => ResourceKind::DoseHistory,
        }
    }

    /// Stable identifier used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CaregiverPatients => "caregiver_patients",
            Self::PatientCaregivers => "patient_caregivers",
            Self::PatientSchedules => "patient_schedules",
            Self::SchedulePatients => "schedule_patients",
            Self::ScheduleDoses => "schedule_doses",
            Self::DoseSchedules => "dose_schedules",
            Self::PillDoses => "pill_doses",
            Self::DoseHistory => "dose_history",
            Self::PatientHistory => "patient_history",
        }
    }

    /// Link matching the relation when `id` is the source and `other` the target,
    /// for relations backed by a link table.
    #[must_use]
    pub const fn link(self, id: i64, other: i64) -> Option<Link> {
        match self {
            Self::CaregiverPatients => Some(Link::CaregiverPatient {
                caregiver_id: id,
                patient_id: other,
            }),
            Self::PatientCaregivers => Some(Link::CaregiverPatient {
                caregiver_id: other,
                patient_id: id,
            }),
            Self::PatientSchedules => Some(Link::PatientSchedule {
                patient_id: id,
                schedule_id: other,
            }),
            Self::SchedulePatients => Some(Link::PatientSchedule {
                patient_id: other,
                schedule_id: id,
            }),
            Self::ScheduleDoses => Some(Link::ScheduleDose {
                schedule_id: id,
                dose_id: other,
            }),
            Self::DoseSchedules => Some(Link::ScheduleDose {
                schedule_id: other,
                dose_id: id,
            }),
            Self::PillDoses | Self::DoseHistory | Self::PatientHistory => None,
        }
    }
}

impl Display for Relation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Check that `path` chains from `root` with each relation starting where the previous ended.
pub(crate) fn validate_path(root: ResourceKind, path: &[Relation]) -> crate::DataResult<()> {
    let mut current = root;
    for relation in path {
        if relation.source() != current {
            return Err(crate::DataError::InvalidRelation {
                relation: *relation,
                found: current,
            });
        }
        current = relation.target();
    }
    Ok(())
}

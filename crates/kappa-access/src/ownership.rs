//! Ownership checks for DoseGuard resources.
//!
//! # Design
//! - Checks are a chain of direct lookups: resolve the caller's caregiver, then compare
//!   `created_by` or look up a link table.
//! - Outcomes are reported as [`Verdict`]s; mapping them to HTTP statuses is left to callers.
//! - Missing and soft-deleted records are indistinguishable and report [`Verdict::Missing`].

use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// DoseGuard entity families subject to ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Caregiver profile.
    Caregiver,
    /// Patient under care.
    Patient,
    /// Medication definition.
    Pill,
    /// Dose of a pill.
    Dose,
    /// Named collection of doses.
    Schedule,
    /// Record of a dose being taken or skipped.
    DoseHistory,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Caregiver,
        Self::Patient,
        Self::Pill,
        Self::Dose,
        Self::Schedule,
        Self::DoseHistory,
    ];

    /// Stable identifier used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caregiver => "caregiver",
            Self::Patient => "patient",
            Self::Pill => "pill",
            Self::Dose => "dose",
            Self::Schedule => "schedule",
            Self::DoseHistory => "dose_history",
        }
    }

    /// Human-readable name used in error messages.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Caregiver => "Caregiver",
            Self::Patient => "Patient",
            Self::Pill => "Pill",
            Self::Dose => "Dose",
            Self::Schedule => "Schedule",
            Self::DoseHistory => "Dose history",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Ownership facts for an active record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOwner {
    /// Caregiver that created the record, when known.
    pub created_by: Option<i64>,
}

/// Outcome of an ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The caller may act on the resource.
    Granted,
    /// The resource exists but belongs to someone else.
    Denied,
    /// The resource does not exist or was soft-deleted.
    Missing,
}

impl Verdict {
    /// True when access was granted.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    const fn from_match(matched: bool) -> Self {
        if matched { Self::Granted } else { Self::Denied }
    }
}

/// Lookup facts required to evaluate ownership.
#[async_trait]
pub trait OwnershipSource: Send + Sync {
    /// Error raised by the underlying lookups.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Active caregiver id bound to the user, if any.
    async fn caregiver_for_user(&self, user_id: i64) -> Result<Option<i64>, Self::Error>;

    /// Ownership facts for an active record; `None` when missing or inactive.
    async fn record_owner(
        &self,
        kind: ResourceKind,
        id: i64,
    ) -> Result<Option<RecordOwner>, Self::Error>;

    /// True when the caregiver is linked to the patient.
    async fn caregiver_has_patient(
        &self,
        caregiver_id: i64,
        patient_id: i64,
    ) -> Result<bool, Self::Error>;

    /// Patient referenced by an active dose-history entry; `None` when missing or inactive.
    async fn history_patient(&self, entry_id: i64) -> Result<Option<i64>, Self::Error>;
}

/// Ownership checks bound to one caregiver.
pub struct AccessGuard<'a, S: OwnershipSource + ?Sized> {
    source: &'a S,
    caregiver_id: i64,
}

impl<'a, S: OwnershipSource + ?Sized> AccessGuard<'a, S> {
    /// Bind checks to an already-resolved caregiver.
    #[must_use]
    pub const fn new(source: &'a S, caregiver_id: i64) -> Self {
        Self {
            source,
            caregiver_id,
        }
    }

    /// Resolve the caregiver bound to `user_id`; `None` when the user has no active profile.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the source.
    pub async fn resolve(source: &'a S, user_id: i64) -> Result<Option<Self>, S::Error> {
        Ok(source
            .caregiver_for_user(user_id)
            .await?
            .map(|caregiver_id| Self::new(source, caregiver_id)))
    }

    /// Caregiver the checks are evaluated for.
    #[must_use]
    pub const fn caregiver_id(&self) -> i64 {
        self.caregiver_id
    }

    /// The caller may only act on its own caregiver profile.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the source.
    pub async fn verify_caregiver(&self, caregiver_id: i64) -> Result<Verdict, S::Error> {
        if self
            .source
            .record_owner(ResourceKind::Caregiver, caregiver_id)
            .await?
            .is_none()
        {
            return Ok(Verdict::Missing);
        }
        Ok(Verdict::from_match(caregiver_id == self.caregiver_id))
    }

    /// The caller must be linked to the patient.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the source.
    pub async fn verify_patient(&self, patient_id: i64) -> Result<Verdict, S::Error> {
        if self
            .source
            .record_owner(ResourceKind::Patient, patient_id)
            .await?
            .is_none()
        {
            return Ok(Verdict::Missing);
        }
        let linked = self
            .source
            .caregiver_has_patient(self.caregiver_id, patient_id)
            .await?;
        Ok(Verdict::from_match(linked))
    }

    /// The caller created the patient or is already linked to it.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the source.
    pub async fn verify_patient_claim(&self, patient_id: i64) -> Result<Verdict, S::Error> {
        let Some(owner) = self
            .source
            .record_owner(ResourceKind::Patient, patient_id)
            .await?
        else {
            return Ok(Verdict::Missing);
        };
        if owner.created_by == Some(self.caregiver_id) {
            return Ok(Verdict::Granted);
        }
        let linked = self
            .source
            .caregiver_has_patient(self.caregiver_id, patient_id)
            .await?;
        Ok(Verdict::from_match(linked))
    }

    /// The caller created the record. Applies to pills, doses, and schedules.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the source.
    pub async fn verify_owned(&self, kind: ResourceKind, id: i64) -> Result<Verdict, S::Error> {
        Ok(match self.source.record_owner(kind, id).await? {
            None => Verdict::Missing,
            Some(owner) => Verdict::from_match(owner.created_by == Some(self.caregiver_id)),
        })
    }

    /// The entry is active and its patient is linked to the caller.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the source.
    pub async fn verify_dose_history(&self, entry_id: i64) -> Result<Verdict, S::Error> {
        let Some(patient_id) = self.source.history_patient(entry_id).await? else {
            return Ok(Verdict::Missing);
        };
        let linked = self
            .source
            .caregiver_has_patient(self.caregiver_id, patient_id)
            .await?;
        Ok(Verdict::from_match(linked))
    }

    /// Dispatch to the check matching `kind`.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the source.
    pub async fn verify(&self, kind: ResourceKind, id: i64) -> Result<Verdict, S::Error> {
        match kind {
            ResourceKind::Caregiver => self.verify_caregiver(id).await,
            ResourceKind::Patient => self.verify_patient(id).await,
            ResourceKind::DoseHistory => self.verify_dose_history(id).await,
            ResourceKind::Pill | ResourceKind::Dose | ResourceKind::Schedule => {
                self.verify_owned(kind, id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::convert::Infallible;

    #[derive(Default)]
    struct Facts {
        caregivers: HashMap<i64, i64>,
        records: HashMap<(ResourceKind, i64), Option<i64>>,
        links: HashSet<(i64, i64)>,
        history: HashMap<i64, i64>,
    }

    #[async_trait]
    impl OwnershipSource for Facts {
        type Error = Infallible;

        async fn caregiver_for_user(&self, user_id: i64) -> Result<Option<i64>, Infallible> {
            Ok(self.caregivers.get(&user_id).copied())
        }

        async fn record_owner(
            &self,
            kind: ResourceKind,
            id: i64,
        ) -> Result<Option<RecordOwner>, Infallible> {
            Ok(self
                .records
                .get(&(kind, id))
                .map(|created_by| RecordOwner {
                    created_by: *created_by,
                }))
        }

        async fn caregiver_has_patient(
            &self,
            caregiver_id: i64,
            patient_id: i64,
        ) -> Result<bool, Infallible> {
            Ok(self.links.contains(&(caregiver_id, patient_id)))
        }

        async fn history_patient(&self, entry_id: i64) -> Result<Option<i64>, Infallible> {
            Ok(self.history.get(&entry_id).copied())
        }
    }

    fn fixture() -> Facts {
        let mut facts = Facts::default();
        facts.caregivers.insert(10, 1);
        facts.caregivers.insert(20, 2);
        facts.records.insert((ResourceKind::Caregiver, 1), None);
        facts.records.insert((ResourceKind::Caregiver, 2), None);
        facts.records.insert((ResourceKind::Patient, 100), Some(1));
        facts.records.insert((ResourceKind::Patient, 101), Some(2));
        facts.records.insert((ResourceKind::Pill, 7), Some(1));
        facts.records.insert((ResourceKind::Schedule, 8), None);
        facts.links.insert((1, 100));
        facts.history.insert(500, 100);
        facts.history.insert(501, 101);
        facts
    }

    #[tokio::test]
    async fn resolve_returns_none_without_caregiver() -> anyhow::Result<()> {
        let facts = fixture();
        assert!(AccessGuard::resolve(&facts, 99).await?.is_none());
        let guard = AccessGuard::resolve(&facts, 10).await?;
        assert_eq!(guard.map(|guard| guard.caregiver_id()), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn caregiver_profile_is_private() -> anyhow::Result<()> {
        let facts = fixture();
        let guard = AccessGuard::new(&facts, 1);
        assert_eq!(guard.verify_caregiver(1).await?, Verdict::Granted);
        assert_eq!(guard.verify_caregiver(2).await?, Verdict::Denied);
        assert_eq!(guard.verify_caregiver(3).await?, Verdict::Missing);
        Ok(())
    }

    #[tokio::test]
    async fn patients_require_link() -> anyhow::Result<()> {
        let facts = fixture();
        let guard = AccessGuard::new(&facts, 1);
        assert_eq!(guard.verify_patient(100).await?, Verdict::Granted);
        assert_eq!(guard.verify_patient(101).await?, Verdict::Denied);
        assert_eq!(guard.verify_patient(102).await?, Verdict::Missing);

        let other = AccessGuard::new(&facts, 2);
        assert_eq!(other.verify_patient(101).await?, Verdict::Denied);
        assert_eq!(other.verify_patient_claim(101).await?, Verdict::Granted);
        assert_eq!(other.verify_patient_claim(100).await?, Verdict::Denied);
        Ok(())
    }

    #[tokio::test]
    async fn owned_records_compare_creator() -> anyhow::Result<()> {
        let facts = fixture();
        let guard = AccessGuard::new(&facts, 1);
        assert_eq!(guard.verify(ResourceKind::Pill, 7).await?, Verdict::Granted);
        assert_eq!(
            AccessGuard::new(&facts, 2)
                .verify(ResourceKind::Pill, 7)
                .await?,
            Verdict::Denied
        );
        assert_eq!(
            guard.verify(ResourceKind::Schedule, 8).await?,
            Verdict::Denied
        );
        assert_eq!(guard.verify(ResourceKind::Dose, 9).await?, Verdict::Missing);
        Ok(())
    }

    #[tokio::test]
    async fn dose_history_follows_patient_link() -> anyhow::Result<()> {
        let facts = fixture();
        let guard = AccessGuard::new(&facts, 1);
        assert_eq!(
            guard.verify(ResourceKind::DoseHistory, 500).await?,
            Verdict::Granted
        );
        assert_eq!(
            guard.verify(ResourceKind::DoseHistory, 501).await?,
            Verdict::Denied
        );
        assert_eq!(
            guard.verify(ResourceKind::DoseHistory, 502).await?,
            Verdict::Missing
        );
        Ok(())
    }
}

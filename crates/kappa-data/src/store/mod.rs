//! Persistence seam shared by the HTTP layer and the bootstrap code.
//!
//! # Design
//! - Every read treats soft-deleted records as absent.
//! - Creation, update, and soft delete are generic over [`ResourceKind`] so handlers stay uniform.
//! - Link rows are hard-deleted; entities never are, except users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kappa_access::{OwnershipSource, RecordOwner, ResourceKind};

use crate::error::{DataError, Result};
use crate::models::{
    Caregiver, NewPost, NewRecord, NewUser, Post, Record, RecordPatch, User, UserPatch,
};
use crate::relations::{Link, Relation, validate_path};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which records a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every active record.
    All,
    /// Active records visible to one caregiver: linked patients and their history,
    /// records it created, and its own profile.
    Caregiver(i64),
}

/// Storage backend for users, posts, and DoseGuard records.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create a user with a freshly generated API key.
    ///
    /// Returns [`DataError::Conflict`] when the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Look up a user by API key.
    async fn user_by_api_key(&self, api_key: &str) -> Result<Option<User>>;

    /// Look up a user by username.
    async fn user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Look up a user by id.
    async fn user(&self, id: i64) -> Result<Option<User>>;

    /// All users ordered by id.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Apply a partial update; `None` when the user does not exist.
    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<Option<User>>;

    /// Hard-delete a user together with its caregiver profile and links.
    async fn delete_user(&self, id: i64) -> Result<bool>;

    /// Record a successful authentication.
    async fn touch_user(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Create a user and its caregiver profile atomically.
    async fn register_caregiver(&self, user: NewUser, name: String) -> Result<(User, Caregiver)>;

    /// Active caregiver bound to the user.
    async fn caregiver_for_user(&self, user_id: i64) -> Result<Option<Caregiver>>;

    /// Persist a new DoseGuard record.
    ///
    /// Returns [`DataError::MissingReference`] when a referenced record does not exist.
    async fn insert(&self, record: NewRecord, created_by: Option<i64>) -> Result<Record>;

    /// Fetch an active record.
    async fn fetch(&self, kind: ResourceKind, id: i64) -> Result<Option<Record>>;

    /// Active records of a kind, ordered by id.
    async fn list(&self, kind: ResourceKind, scope: Scope) -> Result<Vec<Record>>;

    /// Apply a patch to an active record; `None` when missing or inactive.
    async fn update(&self, id: i64, patch: RecordPatch) -> Result<Option<Record>>;

    /// Mark an active record inactive; `false` when missing or already inactive.
    async fn soft_delete(&self, kind: ResourceKind, id: i64) -> Result<bool>;

    /// Insert a link row.
    ///
    /// Returns [`DataError::Conflict`] when the row exists and
    /// [`DataError::MissingReference`] when either side does not.
    async fn link(&self, link: Link) -> Result<()>;

    /// Delete a link row; `false` when it did not exist.
    async fn unlink(&self, link: Link) -> Result<bool>;

    /// True when the link row exists.
    async fn is_linked(&self, link: Link) -> Result<bool>;

    /// Active records reachable from `(kind, id)` through one relation, ordered by id.
    ///
    /// Returns [`DataError::InvalidRelation`] when the relation does not start at `kind`.
    async fn related(&self, kind: ResourceKind, id: i64, relation: Relation)
    -> Result<Vec<Record>>;

    /// Follow a chain of relations from an active root.
    ///
    /// Returns `None` when the root is missing or inactive. Children are collected level by
    /// level in path order without de-duplication, keeping only active records.
    async fn traverse(
        &self,
        kind: ResourceKind,
        id: i64,
        path: &[Relation],
    ) -> Result<Option<Vec<Record>>> {
        validate_path(kind, path)?;
        if self.fetch(kind, id).await?.is_none() {
            return Ok(None);
        }
        let mut frontier = vec![(kind, id)];
        let mut collected = Vec::new();
        for relation in path {
            collected = Vec::new();
            for (parent_kind, parent_id) in &frontier {
                collected.extend(self.related(*parent_kind, *parent_id, *relation).await?);
            }
            frontier = collected
                .iter()
                .map(|record| (record.kind(), record.id()))
                .collect();
        }
        Ok(Some(collected))
    }

    /// Create a portfolio post.
    ///
    /// Returns [`DataError::Conflict`] when the image URL is taken.
    async fn create_post(&self, post: NewPost) -> Result<Post>;

    /// All posts ordered by id.
    async fn list_posts(&self) -> Result<Vec<Post>>;
}

#[async_trait]
impl<'a> OwnershipSource for dyn Store + 'a {
    type Error = DataError;

    async fn caregiver_for_user(&self, user_id: i64) -> Result<Option<i64>> {
        Ok(Store::caregiver_for_user(self, user_id)
            .await?
            .map(|caregiver| caregiver.audit.id))
    }

    async fn record_owner(&self, kind: ResourceKind, id: i64) -> Result<Option<RecordOwner>> {
        Ok(self.fetch(kind, id).await?.map(|record| RecordOwner {
            created_by: record.audit().created_by,
        }))
    }

    async fn caregiver_has_patient(&self, caregiver_id: i64, patient_id: i64) -> Result<bool> {
        self.is_linked(Link::CaregiverPatient {
            caregiver_id,
            patient_id,
        })
        .await
    }

    async fn history_patient(&self, entry_id: i64) -> Result<Option<i64>> {
        Ok(
            match self.fetch(ResourceKind::DoseHistory, entry_id).await? {
                Some(Record::DoseHistory(entry)) => Some(entry.patient_id),
                _ => None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDose, NewPatient, NewPill, NewSchedule};
    use kappa_access::{AccessGuard, Permissions, Verdict};
    use std::sync::Arc;

    async fn seeded() -> anyhow::Result<(Arc<dyn Store>, i64, i64)> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (_, owner) = store
            .register_caregiver(
                NewUser {
                    username: "owner".into(),
                    password_hash: "hash".into(),
                    perms: Permissions::PRIVATE,
                },
                "Owner".into(),
            )
            .await?;
        let (_, other) = store
            .register_caregiver(
                NewUser {
                    username: "other".into(),
                    password_hash: "hash".into(),
                    perms: Permissions::PRIVATE,
                },
                "Other".into(),
            )
            .await?;
        Ok((store, owner.audit.id, other.audit.id))
    }

    #[tokio::test]
    async fn traverse_keeps_duplicates_and_skips_inactive() -> anyhow::Result<()> {
        let (store, owner, _) = seeded().await?;
        let patient = store
            .insert(
                NewRecord::Patient(NewPatient {
                    name: "Pat".into(),
                    ..NewPatient::default()
                }),
                Some(owner),
            )
            .await?;
        let pill = store
            .insert(
                NewRecord::Pill(NewPill {
                    name: "Aspirin".into(),
                    strength: 81.0,
                }),
                Some(owner),
            )
            .await?;
        let dose = store
            .insert(
                NewRecord::Dose(NewDose {
                    pill_id: pill.id(),
                    interval: 8,
                    amount: 1,
                }),
                Some(owner),
            )
            .await?;
        let retired = store
            .insert(
                NewRecord::Dose(NewDose {
                    pill_id: pill.id(),
                    interval: 12,
                    amount: 2,
                }),
                Some(owner),
            )
            .await?;
        let mut schedules = Vec::new();
        for name in ["Morning", "Evening"] {
            let schedule = store
                .insert(
                    NewRecord::Schedule(NewSchedule { name: name.into() }),
                    Some(owner),
                )
                .await?;
            store
                .link(Link::PatientSchedule {
                    patient_id: patient.id(),
                    schedule_id: schedule.id(),
                })
                .await?;
            for dose_id in [dose.id(), retired.id()] {
                store
                    .link(Link::ScheduleDose {
                        schedule_id: schedule.id(),
                        dose_id,
                    })
                    .await?;
            }
            schedules.push(schedule);
        }
        assert!(store.soft_delete(ResourceKind::Dose, retired.id()).await?);

        let doses = store
            .traverse(
                ResourceKind::Patient,
                patient.id(),
                &[Relation::PatientSchedules, Relation::ScheduleDoses],
            )
            .await?
            .ok_or_else(|| anyhow::anyhow!("patient should exist"))?;
        let ids: Vec<i64> = doses.iter().map(Record::id).collect();
        assert_eq!(ids, vec![dose.id(), dose.id()]);

        assert!(
            store
                .traverse(ResourceKind::Patient, 9_999, &[Relation::PatientSchedules])
                .await?
                .is_none()
        );
        assert!(matches!(
            store
                .traverse(ResourceKind::Patient, patient.id(), &[Relation::PillDoses])
                .await,
            Err(DataError::InvalidRelation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn ownership_source_backs_access_guard() -> anyhow::Result<()> {
        let (store, owner, other) = seeded().await?;
        let pill = store
            .insert(
                NewRecord::Pill(NewPill {
                    name: "Aspirin".into(),
                    strength: 81.0,
                }),
                Some(owner),
            )
            .await?;
        let source = store.as_ref();

        let guard = AccessGuard::new(source, owner);
        assert_eq!(
            guard.verify(ResourceKind::Pill, pill.id()).await?,
            Verdict::Granted
        );
        let intruder = AccessGuard::new(source, other);
        assert_eq!(
            intruder.verify(ResourceKind::Pill, pill.id()).await?,
            Verdict::Denied
        );

        store.soft_delete(ResourceKind::Pill, pill.id()).await?;
        assert_eq!(
            guard.verify(ResourceKind::Pill, pill.id()).await?,
            Verdict::Missing
        );
        Ok(())
    }
}

//! In-process store backed by ordered maps.
//!
//! Mirrors the Postgres schema: foreign keys check existence, deleting a user cascades to its
//! caregiver profile and links, and `created_by` references are cleared.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kappa_access::ResourceKind;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DataError, Result};
use crate::models::{
    Audit, Caregiver, NewPost, NewRecord, NewUser, Post, Record, RecordPatch, User, UserPatch,
};
use crate::relations::{Link, Relation};
use crate::store::{Scope, Store};

/// Store keeping every table in memory; contents are lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    records: BTreeMap<ResourceKind, BTreeMap<i64, Record>>,
    links: BTreeSet<Link>,
    posts: BTreeMap<i64, Post>,
    sequences: HashMap<&'static str, i64>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let sequence = self.sequences.entry(table).or_insert(0);
        *sequence += 1;
        *sequence
    }

    fn exists(&self, kind: ResourceKind, id: i64) -> bool {
        self.records
            .get(&kind)
            .is_some_and(|table| table.contains_key(&id))
    }

    fn active(&self, kind: ResourceKind, id: i64) -> Option<&Record> {
        self.records
            .get(&kind)?
            .get(&id)
            .filter(|record| record.is_active())
    }

    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|user| user.username == username && Some(user.id) != except)
    }

    fn insert_user(&mut self, new: NewUser, now: DateTime<Utc>) -> Result<User> {
        if self.username_taken(&new.username, None) {
            return Err(DataError::Conflict {
                entity: "user",
                field: "username",
            });
        }
        let user = User {
            id: self.next_id("users"),
            api_key: Uuid::new_v4().to_string(),
            username: new.username,
            password_hash: new.password_hash,
            perms: new.perms,
            is_active: true,
            created_on: now,
            updated_on: None,
            last_use: None,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn require(&self, kind: ResourceKind, id: i64, entity: &'static str) -> Result<()> {
        if self.exists(kind, id) {
            Ok(())
        } else {
            Err(DataError::MissingReference { entity })
        }
    }

    fn check_new_references(&self, record: &NewRecord) -> Result<()> {
        match record {
            NewRecord::Dose(dose) => self.require(ResourceKind::Pill, dose.pill_id, "dose"),
            NewRecord::DoseHistory(entry) => {
                self.require(ResourceKind::Patient, entry.patient_id, "dose_history")?;
                self.require(ResourceKind::Dose, entry.dose_id, "dose_history")
            }
            NewRecord::Patient(_) | NewRecord::Pill(_) | NewRecord::Schedule(_) => Ok(()),
        }
    }

    fn check_patch_references(&self, patch: &RecordPatch) -> Result<()> {
        match patch {
            RecordPatch::Dose(dose) => dose
                .pill_id
                .map_or(Ok(()), |id| self.require(ResourceKind::Pill, id, "dose")),
            RecordPatch::DoseHistory(entry) => {
                if let Some(id) = entry.patient_id {
                    self.require(ResourceKind::Patient, id, "dose_history")?;
                }
                entry
                    .dose_id
                    .map_or(Ok(()), |id| self.require(ResourceKind::Dose, id, "dose_history"))
            }
            RecordPatch::Caregiver(_)
            | RecordPatch::Patient(_)
            | RecordPatch::Pill(_)
            | RecordPatch::Schedule(_) => Ok(()),
        }
    }

    fn visible(&self, record: &Record, scope: Scope) -> bool {
        let Scope::Caregiver(caregiver_id) = scope else {
            return true;
        };
        let cares_for = |patient_id| {
            self.links.contains(&Link::CaregiverPatient {
                caregiver_id,
                patient_id,
            })
        };
        match record {
            Record::Caregiver(caregiver) => caregiver.audit.id == caregiver_id,
            Record::Patient(patient) => cares_for(patient.audit.id),
            Record::DoseHistory(entry) => cares_for(entry.patient_id),
            Record::Pill(_) | Record::Dose(_) | Record::Schedule(_) => {
                record.audit().created_by == Some(caregiver_id)
            }
        }
    }

    fn active_of(&self, kind: ResourceKind) -> impl Iterator<Item = &Record> {
        self.records
            .get(&kind)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|record| record.is_active())
    }

    fn remove_caregiver(&mut self, caregiver_id: i64) {
        if let Some(table) = self.records.get_mut(&ResourceKind::Caregiver) {
            table.remove(&caregiver_id);
        }
        self.links.retain(|link| {
            !matches!(link, Link::CaregiverPatient { caregiver_id: id, .. } if *id == caregiver_id)
        });
        for table in self.records.values_mut() {
            for record in table.values_mut() {
                let audit = record.audit_mut();
                if audit.created_by == Some(caregiver_id) {
                    audit.created_by = None;
                }
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.tables.write().await.insert_user(user, Utc::now())
    }

    async fn user_by_api_key(&self, api_key: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.api_key == api_key)
            .cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        if let Some(username) = &patch.username
            && tables.username_taken(username, Some(id))
        {
            return Err(DataError::Conflict {
                entity: "user",
                field: "username",
            });
        }
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(hash) = patch.password_hash {
            user.password_hash = hash;
        }
        if let Some(perms) = patch.perms {
            user.perms = perms;
        }
        user.updated_on = Some(Utc::now());
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        let caregiver_ids: Vec<i64> = tables
            .records
            .get(&ResourceKind::Caregiver)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter_map(|record| match record {
                Record::Caregiver(caregiver) if caregiver.user_id == id => {
                    Some(caregiver.audit.id)
                }
                _ => None,
            })
            .collect();
        for caregiver_id in caregiver_ids {
            tables.remove_caregiver(caregiver_id);
        }
        Ok(true)
    }

    async fn touch_user(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.last_use = Some(at);
        }
        Ok(())
    }

    async fn register_caregiver(&self, user: NewUser, name: String) -> Result<(User, Caregiver)> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let user = tables.insert_user(user, now)?;
        let caregiver = Caregiver {
            audit: Audit::new(tables.next_id(ResourceKind::Caregiver.as_str()), None, now),
            user_id: user.id,
            name,
        };
        tables
            .records
            .entry(ResourceKind::Caregiver)
            .or_default()
            .insert(caregiver.audit.id, Record::Caregiver(caregiver.clone()));
        Ok((user, caregiver))
    }

    async fn caregiver_for_user(&self, user_id: i64) -> Result<Option<Caregiver>> {
        let tables = self.tables.read().await;
        Ok(tables
            .active_of(ResourceKind::Caregiver)
            .find_map(|record| match record {
                Record::Caregiver(caregiver) if caregiver.user_id == user_id => {
                    Some(caregiver.clone())
                }
                _ => None,
            }))
    }

    async fn insert(&self, record: NewRecord, created_by: Option<i64>) -> Result<Record> {
        let mut tables = self.tables.write().await;
        tables.check_new_references(&record)?;
        if let Some(caregiver_id) = created_by {
            tables.require(ResourceKind::Caregiver, caregiver_id, record.kind().as_str())?;
        }
        let kind = record.kind();
        let id = tables.next_id(kind.as_str());
        let record = record.into_record(Audit::new(id, created_by, Utc::now()));
        tables
            .records
            .entry(kind)
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn fetch(&self, kind: ResourceKind, id: i64) -> Result<Option<Record>> {
        Ok(self.tables.read().await.active(kind, id).cloned())
    }

    async fn list(&self, kind: ResourceKind, scope: Scope) -> Result<Vec<Record>> {
        let tables = self.tables.read().await;
        Ok(tables
            .active_of(kind)
            .filter(|record| tables.visible(record, scope))
            .cloned()
            .collect())
    }

    async fn update(&self, id: i64, patch: RecordPatch) -> Result<Option<Record>> {
        let mut tables = self.tables.write().await;
        let kind = patch.kind();
        if tables.active(kind, id).is_none() {
            return Ok(None);
        }
        tables.check_patch_references(&patch)?;
        let Some(record) = tables
            .records
            .get_mut(&kind)
            .and_then(|table| table.get_mut(&id))
        else {
            return Ok(None);
        };
        record.apply(patch, Utc::now())?;
        Ok(Some(record.clone()))
    }

    async fn soft_delete(&self, kind: ResourceKind, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables
            .records
            .get_mut(&kind)
            .and_then(|table| table.get_mut(&id))
            .filter(|record| record.is_active())
        else {
            return Ok(false);
        };
        let audit = record.audit_mut();
        audit.active = false;
        audit.updated_on = Some(Utc::now());
        Ok(true)
    }

    async fn link(&self, link: Link) -> Result<()> {
        let mut tables = self.tables.write().await;
        for (kind, id) in link.endpoints() {
            tables.require(kind, id, link.table())?;
        }
        if !tables.links.insert(link) {
            return Err(DataError::Conflict {
                entity: link.table(),
                field: "link",
            });
        }
        Ok(())
    }

    async fn unlink(&self, link: Link) -> Result<bool> {
        Ok(self.tables.write().await.links.remove(&link))
    }

    async fn is_linked(&self, link: Link) -> Result<bool> {
        Ok(self.tables.read().await.links.contains(&link))
    }

    async fn related(
        &self,
        kind: ResourceKind,
        id: i64,
        relation: Relation,
    ) -> Result<Vec<Record>> {
        if relation.source() != kind {
            return Err(DataError::InvalidRelation {
                relation,
                found: kind,
            });
        }
        let tables = self.tables.read().await;
        let children = tables.active_of(relation.target());
        let related = children.filter(|record| match (relation, record) {
            (Relation::PillDoses, Record::Dose(dose)) => dose.pill_id == id,
            (Relation::DoseHistory, Record::DoseHistory(entry)) => entry.dose_id == id,
            (Relation::PatientHistory, Record::DoseHistory(entry)) => entry.patient_id == id,
            (relation, record) => relation
                .link(id, record.id())
                .is_some_and(|link| tables.links.contains(&link)),
        });
        Ok(related.cloned().collect())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let mut tables = self.tables.write().await;
        if tables
            .posts
            .values()
            .any(|existing| existing.image_url == post.image_url)
        {
            return Err(DataError::Conflict {
                entity: "post",
                field: "image_url",
            });
        }
        let post = Post {
            id: tables.next_id("posts"),
            image_url: post.image_url,
            title: post.title,
            description: post.description,
            category: post.category,
            state: true,
            created_on: Utc::now(),
            updated_on: None,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn list_posts(&self) -> Result<Vec<Post>> {
        Ok(self.tables.read().await.posts.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDose, NewDoseHistory, NewPatient, NewPill, PillPatch};
    use kappa_access::Permissions;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            password_hash: "hash".into(),
            perms: Permissions::GENERAL,
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice")).await?;
        assert!(matches!(
            store.create_user(new_user("alice")).await,
            Err(DataError::Conflict {
                field: "username",
                ..
            })
        ));
        let bob = store.create_user(new_user("bob")).await?;
        assert_ne!(alice.api_key, bob.api_key);
        let renamed = store
            .update_user(
                bob.id,
                UserPatch {
                    username: Some("alice".into()),
                    ..UserPatch::default()
                },
            )
            .await;
        assert!(matches!(renamed, Err(DataError::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn soft_deleted_records_disappear() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let pill = store
            .insert(
                NewRecord::Pill(NewPill {
                    name: "Aspirin".into(),
                    strength: 81.0,
                }),
                None,
            )
            .await?;
        assert!(store.soft_delete(ResourceKind::Pill, pill.id()).await?);
        assert!(!store.soft_delete(ResourceKind::Pill, pill.id()).await?);
        assert!(store.fetch(ResourceKind::Pill, pill.id()).await?.is_none());
        assert!(store.list(ResourceKind::Pill, Scope::All).await?.is_empty());
        let patched = store
            .update(
                pill.id(),
                RecordPatch::Pill(PillPatch {
                    name: Some("Renamed".into()),
                    strength: None,
                }),
            )
            .await?;
        assert!(patched.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn references_must_exist() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let dose = store
            .insert(
                NewRecord::Dose(NewDose {
                    pill_id: 42,
                    interval: 8,
                    amount: 1,
                }),
                None,
            )
            .await;
        assert!(matches!(dose, Err(DataError::MissingReference { .. })));
        let entry = store
            .insert(
                NewRecord::DoseHistory(NewDoseHistory {
                    patient_id: 1,
                    dose_id: 1,
                    taken: true,
                }),
                None,
            )
            .await;
        assert!(matches!(entry, Err(DataError::MissingReference { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn links_conflict_and_unlink() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let (_, caregiver) = store
            .register_caregiver(new_user("carer"), "Carer".into())
            .await?;
        let patient = store
            .insert(
                NewRecord::Patient(NewPatient {
                    name: "Pat".into(),
                    ..NewPatient::default()
                }),
                Some(caregiver.audit.id),
            )
            .await?;
        let link = Link::CaregiverPatient {
            caregiver_id: caregiver.audit.id,
            patient_id: patient.id(),
        };
        store.link(link).await?;
        assert!(matches!(
            store.link(link).await,
            Err(DataError::Conflict { .. })
        ));
        assert!(store.is_linked(link).await?);
        assert!(store.unlink(link).await?);
        assert!(!store.unlink(link).await?);
        assert!(matches!(
            store
                .link(Link::CaregiverPatient {
                    caregiver_id: caregiver.audit.id,
                    patient_id: 77,
                })
                .await,
            Err(DataError::MissingReference { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn scoped_lists_follow_ownership() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let (_, mine) = store.register_caregiver(new_user("a"), "A".into()).await?;
        let (_, theirs) = store.register_caregiver(new_user("b"), "B".into()).await?;
        let mine_id = mine.audit.id;
        let theirs_id = theirs.audit.id;
        for (owner, name) in [(mine_id, "Mine"), (theirs_id, "Theirs")] {
            store
                .insert(
                    NewRecord::Pill(NewPill {
                        name: name.into(),
                        strength: 1.0,
                    }),
                    Some(owner),
                )
                .await?;
        }
        let patient = store
            .insert(
                NewRecord::Patient(NewPatient {
                    name: "Shared".into(),
                    ..NewPatient::default()
                }),
                Some(theirs_id),
            )
            .await?;
        store
            .link(Link::CaregiverPatient {
                caregiver_id: mine_id,
                patient_id: patient.id(),
            })
            .await?;

        let pills = store
            .list(ResourceKind::Pill, Scope::Caregiver(mine_id))
            .await?;
        assert_eq!(pills.len(), 1);
        assert_eq!(pills[0].audit().created_by, Some(mine_id));

        let patients = store
            .list(ResourceKind::Patient, Scope::Caregiver(mine_id))
            .await?;
        assert_eq!(patients.len(), 1);
        assert!(
            store
                .list(ResourceKind::Patient, Scope::Caregiver(theirs_id))
                .await?
                .is_empty()
        );

        let caregivers = store
            .list(ResourceKind::Caregiver, Scope::Caregiver(mine_id))
            .await?;
        assert_eq!(caregivers.len(), 1);
        assert_eq!(caregivers[0].id(), mine_id);
        assert_eq!(
            store
                .list(ResourceKind::Caregiver, Scope::All)
                .await?
                .len(),
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_caregiver() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let (user, caregiver) = store
            .register_caregiver(new_user("carer"), "Carer".into())
            .await?;
        let patient = store
            .insert(
                NewRecord::Patient(NewPatient {
                    name: "Pat".into(),
                    ..NewPatient::default()
                }),
                Some(caregiver.audit.id),
            )
            .await?;
        let link = Link::CaregiverPatient {
            caregiver_id: caregiver.audit.id,
            patient_id: patient.id(),
        };
        store.link(link).await?;

        assert!(store.delete_user(user.id).await?);
        assert!(store.caregiver_for_user(user.id).await?.is_none());
        assert!(!store.is_linked(link).await?);
        let orphan = store
            .fetch(ResourceKind::Patient, patient.id())
            .await?
            .ok_or_else(|| anyhow::anyhow!("patient should survive"))?;
        assert_eq!(orphan.audit().created_by, None);
        assert!(!store.delete_user(user.id).await?);
        Ok(())
    }
}

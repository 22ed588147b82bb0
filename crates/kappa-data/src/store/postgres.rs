//! Postgres-backed store.
//!
//! Queries are runtime-checked `sqlx::query` calls; rows are decoded per record kind.
//! Unique and foreign-key violations surface as [`DataError::Conflict`] and
//! [`DataError::MissingReference`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kappa_access::{Permissions, ResourceKind};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DataError, Result};
use crate::models::{
    Caregiver, Dose, DoseHistory, NewPost, NewRecord, NewUser, Patient, Pill, Post, Record,
    RecordPatch, Schedule, User, UserPatch,
};
use crate::relations::{Link, Relation};
use crate::store::{Scope, Store};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const INSERT_USER: &str = r"
    INSERT INTO users (api_key, username, password_hash, perms)
    VALUES ($1, $2, $3, $4)
    RETURNING *
";
const SELECT_USER_BY_API_KEY: &str = "SELECT * FROM users WHERE api_key = $1";
const SELECT_USER_BY_USERNAME: &str = "SELECT * FROM users WHERE username = $1";
const SELECT_USER_BY_ID: &str = "SELECT * FROM users WHERE id = $1";
const SELECT_USERS: &str = "SELECT * FROM users ORDER BY id";
const UPDATE_USER: &str = r"
    UPDATE users SET
        username = COALESCE($2, username),
        password_hash = COALESCE($3, password_hash),
        perms = COALESCE($4, perms),
        updated_on = now()
    WHERE id = $1
    RETURNING *
";
const DELETE_USER: &str = "DELETE FROM users WHERE id = $1";
const TOUCH_USER: &str = "UPDATE users SET last_use = $2 WHERE id = $1";

const INSERT_CAREGIVER: &str =
    "INSERT INTO caregivers (user_id, name) VALUES ($1, $2) RETURNING *";
const SELECT_CAREGIVER_BY_USER: &str =
    "SELECT * FROM caregivers WHERE user_id = $1 AND active";

const INSERT_POST: &str = r"
    INSERT INTO posts (image_url, title, description, category)
    VALUES ($1, $2, $3, $4)
    RETURNING *
";
const SELECT_POSTS: &str = "SELECT * FROM posts ORDER BY id";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    api_key: String,
    username: String,
    password_hash: String,
    perms: i32,
    is_active: bool,
    created_on: DateTime<Utc>,
    updated_on: Option<DateTime<Utc>>,
    last_use: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = DataError;

    fn try_from(row: UserRow) -> Result<Self> {
        let perms = Permissions::try_from(row.perms)
            .map_err(|_| DataError::InvalidPermissions { value: row.perms })?;
        Ok(Self {
            id: row.id,
            api_key: row.api_key,
            username: row.username,
            password_hash: row.password_hash,
            perms,
            is_active: row.is_active,
            created_on: row.created_on,
            updated_on: row.updated_on,
            last_use: row.last_use,
        })
    }
}

/// Database-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let migrator = sqlx::migrate!("./migrations");
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Connect to `database_url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(query_err("pool.connect"))?;
        Self::new(pool).await
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_user(
        &self,
        sql: &'static str,
        operation: &'static str,
        value: &str,
    ) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err(operation))?
            .map(User::try_from)
            .transpose()
    }

    async fn fetch_records(
        &self,
        kind: ResourceKind,
        sql: &'static str,
        id: Option<i64>,
        operation: &'static str,
    ) -> Result<Vec<Record>> {
        let rows = sqlx::query(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err(operation))?;
        rows.iter()
            .map(|row| decode(kind, row).map_err(query_err(operation)))
            .collect()
    }

    async fn insert_record(&self, record: NewRecord, created_by: Option<i64>) -> Result<PgRow> {
        let entity = record.kind().as_str();
        let result = match record {
            NewRecord::Patient(new) => {
                sqlx::query(
                    r"INSERT INTO patients (name, contact, age, weight, height, created_by)
                      VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
                )
                .bind(new.name)
                .bind(new.contact)
                .bind(new.age)
                .bind(new.weight)
                .bind(new.height)
                .bind(created_by)
                .fetch_one(&self.pool)
                .await
            }
            NewRecord::Pill(new) => {
                sqlx::query(
                    r"INSERT INTO pills (name, strength, created_by)
                      VALUES ($1, $2, $3) RETURNING *",
                )
                .bind(new.name)
                .bind(new.strength)
                .bind(created_by)
                .fetch_one(&self.pool)
                .await
            }
            NewRecord::Dose(new) => {
                sqlx::query(
                    r#"INSERT INTO doses (pill_id, "interval", amount, created_by)
                      VALUES ($1, $2, $3, $4) RETURNING *"#,
                )
                .bind(new.pill_id)
                .bind(new.interval)
                .bind(new.amount)
                .bind(created_by)
                .fetch_one(&self.pool)
                .await
            }
            NewRecord::Schedule(new) => {
                sqlx::query("INSERT INTO schedules (name, created_by) VALUES ($1, $2) RETURNING *")
                    .bind(new.name)
                    .bind(created_by)
                    .fetch_one(&self.pool)
                    .await
            }
            NewRecord::DoseHistory(new) => {
                sqlx::query(
                    r"INSERT INTO dose_history (patient_id, dose_id, taken, created_by)
                      VALUES ($1, $2, $3, $4) RETURNING *",
                )
                .bind(new.patient_id)
                .bind(new.dose_id)
                .bind(new.taken)
                .bind(created_by)
                .fetch_one(&self.pool)
                .await
            }
        };
        result.map_err(write_err("record.insert", entity, "id"))
    }

    async fn update_record(&self, id: i64, patch: RecordPatch) -> Result<Option<PgRow>> {
        let entity = patch.kind().as_str();
        let result = match patch {
            RecordPatch::Caregiver(patch) => {
                sqlx::query(
                    r"UPDATE caregivers SET name = COALESCE($2, name), updated_on = now()
                      WHERE id = $1 AND active RETURNING *",
                )
                .bind(id)
                .bind(patch.name)
                .fetch_optional(&self.pool)
                .await
            }
            RecordPatch::Patient(patch) => {
                sqlx::query(
                    r"UPDATE patients SET
                        name = COALESCE($2, name),
                        contact = COALESCE($3, contact),
                        age = COALESCE($4, age),
                        weight = COALESCE($5, weight),
                        height = COALESCE($6, height),
                        updated_on = now()
                      WHERE id = $1 AND active RETURNING *",
                )
                .bind(id)
                .bind(patch.name)
                .bind(patch.contact)
                .bind(patch.age)
                .bind(patch.weight)
                .bind(patch.height)
                .fetch_optional(&self.pool)
                .await
            }
            RecordPatch::Pill(patch) => {
                sqlx::query(
                    r"UPDATE pills SET
                        name = COALESCE($2, name),
                        strength = COALESCE($3, strength),
                        updated_on = now()
                      WHERE id = $1 AND active RETURNING *",
                )
                .bind(id)
                .bind(patch.name)
                .bind(patch.strength)
                .fetch_optional(&self.pool)
                .await
            }
            RecordPatch::Dose(patch) => {
                sqlx::query(
                    r#"UPDATE doses SET
                        pill_id = COALESCE($2, pill_id),
                        "interval" = COALESCE($3, "interval"),
                        amount = COALESCE($4, amount),
                        updated_on = now()
                      WHERE id = $1 AND active RETURNING *"#,
                )
                .bind(id)
                .bind(patch.pill_id)
                .bind(patch.interval)
                .bind(patch.amount)
                .fetch_optional(&self.pool)
                .await
            }
            RecordPatch::Schedule(patch) => {
                sqlx::query(
                    r"UPDATE schedules SET name = COALESCE($2, name), updated_on = now()
                      WHERE id = $1 AND active RETURNING *",
                )
                .bind(id)
                .bind(patch.name)
                .fetch_optional(&self.pool)
                .await
            }
            RecordPatch::DoseHistory(patch) => {
                sqlx::query(
                    r"UPDATE dose_history SET
                        patient_id = COALESCE($2, patient_id),
                        dose_id = COALESCE($3, dose_id),
                        taken = COALESCE($4, taken),
                        updated_on = now()
                      WHERE id = $1 AND active RETURNING *",
                )
                .bind(id)
                .bind(patch.patient_id)
                .bind(patch.dose_id)
                .bind(patch.taken)
                .fetch_optional(&self.pool)
                .await
            }
        };
        result.map_err(write_err("record.update", entity, "id"))
    }
}

fn decode(kind: ResourceKind, row: &PgRow) -> sqlx::Result<Record> {
    Ok(match kind {
        ResourceKind::Caregiver => Record::Caregiver(Caregiver::from_row(row)?),
        ResourceKind::Patient => Record::Patient(Patient::from_row(row)?),
        ResourceKind::Pill => Record::Pill(Pill::from_row(row)?),
        ResourceKind::Dose => Record::Dose(Dose::from_row(row)?),
        ResourceKind::Schedule => Record::Schedule(Schedule::from_row(row)?),
        ResourceKind::DoseHistory => Record::DoseHistory(DoseHistory::from_row(row)?),
    })
}

const fn fetch_sql(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Caregiver => "SELECT * FROM caregivers WHERE id = $1 AND active",
        ResourceKind::Patient => "SELECT * FROM patients WHERE id = $1 AND active",
        ResourceKind::Pill => "SELECT * FROM pills WHERE id = $1 AND active",
        ResourceKind::Dose => "SELECT * FROM doses WHERE id = $1 AND active",
        ResourceKind::Schedule => "SELECT * FROM schedules WHERE id = $1 AND active",
        ResourceKind::DoseHistory => "SELECT * FROM dose_history WHERE id = $1 AND active",
    }
}

const fn list_sql(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Caregiver => {
            "SELECT * FROM caregivers WHERE active AND ($1::BIGINT IS NULL OR id = $1) ORDER BY id"
        }
        ResourceKind::Patient => {
            r"SELECT p.* FROM patients p
              WHERE p.active AND ($1::BIGINT IS NULL OR EXISTS (
                  SELECT 1 FROM caregiver_patients l
                  WHERE l.patient_id = p.id AND l.caregiver_id = $1))
              ORDER BY p.id"
        }
        ResourceKind::Pill => {
            "SELECT * FROM pills WHERE active AND ($1::BIGINT IS NULL OR created_by = $1) ORDER BY id"
        }
        ResourceKind::Dose => {
            "SELECT * FROM doses WHERE active AND ($1::BIGINT IS NULL OR created_by = $1) ORDER BY id"
        }
        ResourceKind::Schedule => {
            "SELECT * FROM schedules WHERE active AND ($1::BIGINT IS NULL OR created_by = $1) ORDER BY id"
        }
        ResourceKind::DoseHistory => {
            r"SELECT h.* FROM dose_history h
              WHERE h.active AND ($1::BIGINT IS NULL OR EXISTS (
                  SELECT 1 FROM caregiver_patients l
                  WHERE l.patient_id = h.patient_id AND l.caregiver_id = $1))
              ORDER BY h.id"
        }
    }
}

const fn soft_delete_sql(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Caregiver => {
            "UPDATE caregivers SET active = FALSE, updated_on = now() WHERE id = $1 AND active"
        }
        ResourceKind::Patient => {
            "UPDATE patients SET active = FALSE, updated_on = now() WHERE id = $1 AND active"
        }
        ResourceKind::Pill => {
            "UPDATE pills SET active = FALSE, updated_on = now() WHERE id = $1 AND active"
        }
        ResourceKind::Dose => {
            "UPDATE doses SET active = FALSE, updated_on = now() WHERE id = $1 AND active"
        }
        ResourceKind::Schedule => {
            "UPDATE schedules SET active = FALSE, updated_on = now() WHERE id = $1 AND active"
        }
        ResourceKind::DoseHistory => {
            "UPDATE dose_history SET active = FALSE, updated_on = now() WHERE id = $1 AND active"
        }
    }
}

const fn related_sql(relation: Relation) -> &'static str {
    match relation {
        Relation::CaregiverPatients => {
            r"SELECT p.* FROM patients p JOIN caregiver_patients l ON l.patient_id = p.id
              WHERE l.caregiver_id = $1 AND p.active ORDER BY p.id"
        }
        Relation::PatientCaregivers => {
            r"SELECT c.* FROM caregivers c JOIN caregiver_patients l ON l.caregiver_id = c.id
              WHERE l.patient_id = $1 AND c.active ORDER BY c.id"
        }
        Relation::PatientSchedules => {
            r"SELECT s.* FROM schedules s JOIN patient_schedules l ON l.schedule_id = s.id
              WHERE l.patient_id = $1 AND s.active ORDER BY s.id"
        }
        Relation::SchedulePatients => {
            r"SELECT p.* FROM patients p JOIN patient_schedules l ON l.patient_id = p.id
              WHERE l.schedule_id = $1 AND p.active ORDER BY p.id"
        }
        Relation::ScheduleDoses => {
            r"SELECT d.* FROM doses d JOIN schedule_doses l ON l.dose_id = d.id
              WHERE l.schedule_id = $1 AND d.active ORDER BY d.id"
        }
        Relation::DoseSchedules => {
            r"SELECT s.* FROM schedules s JOIN schedule_doses l ON l.schedule_id = s.id
              WHERE l.dose_id = $1 AND s.active ORDER BY s.id"
        }
        Relation::PillDoses => "SELECT * FROM doses WHERE pill_id = $1 AND active ORDER BY id",
        Relation::DoseHistory => {
            "SELECT * FROM dose_history WHERE dose_id = $1 AND active ORDER BY id"
        }
        Relation::PatientHistory => {
            "SELECT * FROM dose_history WHERE patient_id = $1 AND active ORDER BY id"
        }
    }
}

const fn link_sql(link: Link) -> (&'static str, &'static str, &'static str) {
    match link {
        Link::CaregiverPatient { .. } => (
            "INSERT INTO caregiver_patients (caregiver_id, patient_id) VALUES ($1, $2)",
            "DELETE FROM caregiver_patients WHERE caregiver_id = $1 AND patient_id = $2",
            "SELECT EXISTS (SELECT 1 FROM caregiver_patients WHERE caregiver_id = $1 AND patient_id = $2)",
        ),
        Link::PatientSchedule { .. } => (
            "INSERT INTO patient_schedules (patient_id, schedule_id) VALUES ($1, $2)",
            "DELETE FROM patient_schedules WHERE patient_id = $1 AND schedule_id = $2",
            "SELECT EXISTS (SELECT 1 FROM patient_schedules WHERE patient_id = $1 AND schedule_id = $2)",
        ),
        Link::ScheduleDose { .. } => (
            "INSERT INTO schedule_doses (schedule_id, dose_id) VALUES ($1, $2)",
            "DELETE FROM schedule_doses WHERE schedule_id = $1 AND dose_id = $2",
            "SELECT EXISTS (SELECT 1 FROM schedule_doses WHERE schedule_id = $1 AND dose_id = $2)",
        ),
    }
}

fn query_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}

fn write_err(
    operation: &'static str,
    entity: &'static str,
    field: &'static str,
) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| {
        if let sqlx::Error::Database(db) = &source {
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => return DataError::Conflict { entity, field },
                Some(FOREIGN_KEY_VIOLATION) => return DataError::MissingReference { entity },
                _ => {}
            }
        }
        DataError::QueryFailed { operation, source }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        sqlx::query_as::<_, UserRow>(INSERT_USER)
            .bind(Uuid::new_v4().to_string())
            .bind(user.username)
            .bind(user.password_hash)
            .bind(i32::from(user.perms))
            .fetch_one(&self.pool)
            .await
            .map_err(write_err("user.insert", "user", "username"))?
            .try_into()
    }

    async fn user_by_api_key(&self, api_key: &str) -> Result<Option<User>> {
        self.fetch_user(SELECT_USER_BY_API_KEY, "user.by_api_key", api_key)
            .await
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_user(SELECT_USER_BY_USERNAME, "user.by_username", username)
            .await
    }

    async fn user(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(SELECT_USER_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("user.by_id"))?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, UserRow>(SELECT_USERS)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err("user.list"))?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(UPDATE_USER)
            .bind(id)
            .bind(patch.username)
            .bind(patch.password_hash)
            .bind(patch.perms.map(i32::from))
            .fetch_optional(&self.pool)
            .await
            .map_err(write_err("user.update", "user", "username"))?
            .map(User::try_from)
            .transpose()
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(DELETE_USER)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_err("user.delete"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_user(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(TOUCH_USER)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(query_err("user.touch"))?;
        Ok(())
    }

    async fn register_caregiver(&self, user: NewUser, name: String) -> Result<(User, Caregiver)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_err("caregiver.register.begin"))?;
        let user: User = sqlx::query_as::<_, UserRow>(INSERT_USER)
            .bind(Uuid::new_v4().to_string())
            .bind(user.username)
            .bind(user.password_hash)
            .bind(i32::from(user.perms))
            .fetch_one(&mut *tx)
            .await
            .map_err(write_err("caregiver.register.user", "user", "username"))?
            .try_into()?;
        let caregiver = sqlx::query_as::<_, Caregiver>(INSERT_CAREGIVER)
            .bind(user.id)
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .map_err(write_err("caregiver.register.profile", "caregiver", "user_id"))?;
        tx.commit()
            .await
            .map_err(query_err("caregiver.register.commit"))?;
        debug!(user_id = user.id, caregiver_id = caregiver.audit.id, "caregiver registered");
        Ok((user, caregiver))
    }

    async fn caregiver_for_user(&self, user_id: i64) -> Result<Option<Caregiver>> {
        sqlx::query_as::<_, Caregiver>(SELECT_CAREGIVER_BY_USER)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("caregiver.by_user"))
    }

    async fn insert(&self, record: NewRecord, created_by: Option<i64>) -> Result<Record> {
        let kind = record.kind();
        let row = self.insert_record(record, created_by).await?;
        decode(kind, &row).map_err(query_err("record.insert.decode"))
    }

    async fn fetch(&self, kind: ResourceKind, id: i64) -> Result<Option<Record>> {
        let row = sqlx::query(fetch_sql(kind))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("record.fetch"))?;
        row.as_ref()
            .map(|row| decode(kind, row).map_err(query_err("record.fetch.decode")))
            .transpose()
    }

    async fn list(&self, kind: ResourceKind, scope: Scope) -> Result<Vec<Record>> {
        let caregiver = match scope {
            Scope::All => None,
            Scope::Caregiver(id) => Some(id),
        };
        self.fetch_records(kind, list_sql(kind), caregiver, "record.list")
            .await
    }

    async fn update(&self, id: i64, patch: RecordPatch) -> Result<Option<Record>> {
        let kind = patch.kind();
        let row = self.update_record(id, patch).await?;
        row.as_ref()
            .map(|row| decode(kind, row).map_err(query_err("record.update.decode")))
            .transpose()
    }

    async fn soft_delete(&self, kind: ResourceKind, id: i64) -> Result<bool> {
        let result = sqlx::query(soft_delete_sql(kind))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_err("record.soft_delete"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn link(&self, link: Link) -> Result<()> {
        let (insert, _, _) = link_sql(link);
        let [(_, left), (_, right)] = link.endpoints();
        sqlx::query(insert)
            .bind(left)
            .bind(right)
            .execute(&self.pool)
            .await
            .map_err(write_err("link.insert", link.table(), "link"))?;
        Ok(())
    }

    async fn unlink(&self, link: Link) -> Result<bool> {
        let (_, delete, _) = link_sql(link);
        let [(_, left), (_, right)] = link.endpoints();
        let result = sqlx::query(delete)
            .bind(left)
            .bind(right)
            .execute(&self.pool)
            .await
            .map_err(query_err("link.delete"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_linked(&self, link: Link) -> Result<bool> {
        let (_, _, exists) = link_sql(link);
        let [(_, left), (_, right)] = link.endpoints();
        sqlx::query_scalar::<_, bool>(exists)
            .bind(left)
            .bind(right)
            .fetch_one(&self.pool)
            .await
            .map_err(query_err("link.exists"))
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
        self.fetch_records(
            relation.target(),
            related_sql(relation),
            Some(id),
            "record.related",
        )
        .await
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        sqlx::query_as::<_, Post>(INSERT_POST)
            .bind(post.image_url)
            .bind(post.title)
            .bind(post.description)
            .bind(post.category)
            .fetch_one(&self.pool)
            .await
            .map_err(write_err("post.insert", "post", "image_url"))
    }

    async fn list_posts(&self) -> Result<Vec<Post>> {
        sqlx::query_as::<_, Post>(SELECT_POSTS)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err("post.list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_queries() {
        for kind in ResourceKind::ALL {
            assert!(fetch_sql(kind).contains("active"));
            assert!(list_sql(kind).contains("ORDER BY"));
            assert!(soft_delete_sql(kind).starts_with("UPDATE"));
        }
    }

    #[test]
    fn user_row_rejects_unknown_flags() {
        let row = UserRow {
            id: 1,
            api_key: "key".into(),
            username: "alice".into(),
            password_hash: "hash".into(),
            perms: 64,
            is_active: true,
            created_on: Utc::now(),
            updated_on: None,
            last_use: None,
        };
        assert!(matches!(
            User::try_from(row),
            Err(DataError::InvalidPermissions { value: 64 })
        ));
    }
}

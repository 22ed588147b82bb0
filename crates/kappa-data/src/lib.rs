#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Shared data access layer for Kappa: models, the `Store` seam, and its backends.
//! Layout: models.rs (entities and payloads), relations.rs (links and traversal vocabulary),
//! store/ (trait, in-memory and Postgres implementations), error.rs.

pub mod error;
pub mod models;
pub mod relations;
pub mod store;

pub use error::{DataError, Result as DataResult};
pub use models::{
    Audit, Caregiver, CaregiverPatch, Dose, DoseHistory, DoseHistoryPatch, DosePatch, NewDose,
    NewDoseHistory, NewPatient, NewPill, NewPost, NewRecord, NewSchedule, NewUser, Patient,
    PatientPatch, Pill, PillPatch, Post, Record, RecordPatch, Schedule, SchedulePatch, User,
    UserPatch,
};
pub use relations::{Link, Relation};
pub use store::{MemoryStore, PgStore, Scope, Store};

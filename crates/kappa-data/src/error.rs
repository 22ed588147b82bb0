//! Error types for the data access layer.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use kappa_access::ResourceKind;

use crate::relations::Relation;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug)]
pub enum DataError {
    /// Migration execution failed.
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A unique constraint rejected the write.
    Conflict {
        /// Entity being written.
        entity: &'static str,
        /// Field that collided.
        field: &'static str,
    },
    /// A foreign key pointed at a record that does not exist.
    MissingReference {
        /// Entity being written.
        entity: &'static str,
    },
    /// A relation was applied to a record of the wrong kind.
    InvalidRelation {
        /// Relation that could not be applied.
        relation: Relation,
        /// Kind the relation was applied to.
        found: ResourceKind,
    },
    /// A patch was applied to a record of a different kind.
    KindMismatch {
        /// Kind of the stored record.
        expected: ResourceKind,
        /// Kind carried by the patch.
        found: ResourceKind,
    },
    /// A stored permission mask was outside the known flags.
    InvalidPermissions {
        /// Raw stored value.
        value: i32,
    },
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationFailed { .. } => formatter.write_str("migration failed"),
            Self::QueryFailed { .. } => formatter.write_str("database operation failed"),
            Self::Conflict { .. } => formatter.write_str("record already exists"),
            Self::MissingReference { .. } => {
                formatter.write_str("referenced record does not exist")
            }
            Self::InvalidRelation { .. } => formatter.write_str("invalid relation path"),
            Self::KindMismatch { .. } => formatter.write_str("patch does not match record kind"),
            Self::InvalidPermissions { .. } => {
                formatter.write_str("stored permission mask is invalid")
            }
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MigrationFailed { source } => Some(source),
            Self::QueryFailed { source, .. } => Some(source),
            Self::Conflict { .. }
            | Self::MissingReference { .. }
            | Self::InvalidRelation { .. }
            | Self::KindMismatch { .. }
            | Self::InvalidPermissions { .. } => None,
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(source: sqlx::Error) -> Self {
        Self::QueryFailed {
            operation: "sqlx operation",
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_display_and_source() {
        let migration = DataError::MigrationFailed {
            source: sqlx::migrate::MigrateError::VersionMissing(1),
        };
        assert_eq!(migration.to_string(), "migration failed");
        assert!(migration.source().is_some());

        let query = DataError::QueryFailed {
            operation: "fetch",
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(query.to_string(), "database operation failed");
        assert!(query.source().is_some());

        let conflict = DataError::Conflict {
            entity: "user",
            field: "username",
        };
        assert_eq!(conflict.to_string(), "record already exists");
        assert!(conflict.source().is_none());

        let relation = DataError::InvalidRelation {
            relation: Relation::ScheduleDoses,
            found: ResourceKind::Patient,
        };
        assert_eq!(relation.to_string(), "invalid relation path");

        let from = DataError::from(sqlx::Error::RowNotFound);
        assert_eq!(from.to_string(), "database operation failed");
        assert!(from.source().is_some());
    }
}

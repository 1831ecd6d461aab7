//! Repository error shared by the unit of work and the read accessors.
//!
//! # Invariants
//! - SQLite constraint failures are classified, never folded into `Db`.
//! - "Not found" on lookups is `Ok(None)`; `NotFound` is reserved for
//!   mutations that address a missing row.

use crate::db::DbError;
use crate::repo::unit_of_work::UnitOfWorkState;
use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Constraint family reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Unique index or primary key clash.
    Unique,
    /// Missing referenced row.
    ForeignKey,
    Other,
}

/// Repository error for unit-of-work and read operations.
#[derive(Debug)]
pub enum RepoError {
    /// Transport, bootstrap or SQL failure.
    Db(DbError),
    /// Write rejected by a store constraint.
    ConstraintViolation {
        kind: ConstraintKind,
        message: String,
    },
    /// Mutation addressed a row that does not exist.
    NotFound { entity: &'static str, id: Uuid },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Unit-of-work call not allowed in its current state.
    InvalidTransition {
        from: UnitOfWorkState,
        to: UnitOfWorkState,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Returns whether this is a unique clash on `table.column`.
    pub fn is_unique_violation_on(&self, table_column: &str) -> bool {
        matches!(
            self,
            Self::ConstraintViolation {
                kind: ConstraintKind::Unique,
                message,
            } if message.contains(table_column)
        )
    }
}

impl RepoError {
    /// Returns whether the store could not be reached at all (file cannot be
    /// opened, or the lock wait timed out).
    pub fn is_unavailable(&self) -> bool {
        let Self::Db(DbError::Sqlite(err)) = self else {
            return false;
        };
        matches!(
            err.sqlite_error_code(),
            Some(
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
            )
        )
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ConstraintViolation { message, .. } => {
                write!(f, "constraint violation: {message}")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "unit of work cannot move from {from} to {to}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match constraint_kind(&value) {
            Some(kind) => Self::ConstraintViolation {
                kind,
                message: value.to_string(),
            },
            None => Self::Db(DbError::Sqlite(value)),
        }
    }
}

fn constraint_kind(err: &rusqlite::Error) -> Option<ConstraintKind> {
    let rusqlite::Error::SqliteFailure(failure, _) = err else {
        return None;
    };
    if failure.code != rusqlite::ErrorCode::ConstraintViolation {
        return None;
    }

    let kind = match failure.extended_code {
        code if code == ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
        code if code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::Unique,
        code if code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
        _ => ConstraintKind::Other,
    };
    Some(kind)
}

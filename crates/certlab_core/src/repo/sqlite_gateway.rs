//! SQLite implementation of the storage gateway.
//!
//! # Responsibility
//! - Open one dedicated, migrated connection per unit of work.
//! - Run every workflow read and write inside that connection's
//!   `BEGIN IMMEDIATE` transaction.
//!
//! # Invariants
//! - A handle owns its connection exclusively until `release`.
//! - Writes are refused unless the handle is `InProgress`.
//! - Competing writers wait up to [`crate::db::BUSY_TIMEOUT`] for the lock.

use crate::db::open_db;
use crate::model::certification::{Certification, CertificationDraft};
use crate::model::person::{Person, PersonDraft};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::schema::{format_issue_date, parse_person_row, PERSON_SELECT_SQL};
use crate::repo::unit_of_work::{StorageGateway, UnitOfWork, UnitOfWorkState};
use log::{debug, error};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Gateway over a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    path: PathBuf,
}

impl SqliteGateway {
    /// Creates a gateway for `path`. No connection is opened until `begin`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageGateway for SqliteGateway {
    type UnitOfWork = SqliteUnitOfWork;

    fn begin(&self) -> RepoResult<SqliteUnitOfWork> {
        let started_at = Instant::now();
        let conn = open_db(&self.path).map_err(|err| {
            error!(
                "event=uow_begin module=repo status=error duration_ms={} error_code=db_open_failed error={err}",
                started_at.elapsed().as_millis()
            );
            RepoError::from(err)
        })?;

        let mut uow = SqliteUnitOfWork {
            conn: Some(conn),
            state: UnitOfWorkState::Idle,
        };
        if let Err(err) = uow.start() {
            error!(
                "event=uow_begin module=repo status=error duration_ms={} error_code=begin_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }

        debug!(
            "event=uow_begin module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(uow)
    }
}

/// One open SQLite transaction and the connection that carries it.
#[derive(Debug)]
pub struct SqliteUnitOfWork {
    conn: Option<Connection>,
    state: UnitOfWorkState,
}

impl SqliteUnitOfWork {
    fn start(&mut self) -> RepoResult<()> {
        self.state.advance(UnitOfWorkState::InProgress)?;
        let conn = self.conn.as_ref().ok_or(RepoError::InvalidTransition {
            from: UnitOfWorkState::Released,
            to: UnitOfWorkState::InProgress,
        })?;
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    /// Connection of an in-progress handle.
    fn active_conn(&self) -> RepoResult<&Connection> {
        match (self.state, self.conn.as_ref()) {
            (UnitOfWorkState::InProgress, Some(conn)) => Ok(conn),
            (from, _) => Err(RepoError::InvalidTransition {
                from,
                to: UnitOfWorkState::InProgress,
            }),
        }
    }
}

impl UnitOfWork for SqliteUnitOfWork {
    fn state(&self) -> UnitOfWorkState {
        self.state
    }

    fn save_certification(&mut self, draft: &CertificationDraft) -> RepoResult<Certification> {
        let conn = self.active_conn()?;
        let id = Uuid::new_v4();
        let (created_at, updated_at) = conn.query_row(
            "INSERT INTO certifications (
                id,
                title,
                institution,
                issue_date,
                description,
                status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING created_at, updated_at;",
            params![
                id.to_string(),
                draft.title.as_str(),
                draft.institution.as_str(),
                format_issue_date(draft.issue_date),
                draft.description.as_deref(),
                draft.status.as_str(),
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        Ok(draft.clone().into_saved(id, created_at, updated_at))
    }

    fn save_person(&mut self, draft: &PersonDraft) -> RepoResult<Person> {
        let conn = self.active_conn()?;
        let id = Uuid::new_v4();
        let (created_at, updated_at) = conn.query_row(
            "INSERT INTO persons (
                id,
                full_name,
                email,
                role,
                certification_id
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING created_at, updated_at;",
            params![
                id.to_string(),
                draft.full_name.as_str(),
                draft.email.as_str(),
                draft.role.as_str(),
                draft.certification_id.to_string(),
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        Ok(draft.clone().into_saved(id, created_at, updated_at))
    }

    fn find_person_by_email(&self, email: &str) -> RepoResult<Option<Person>> {
        let conn = self.active_conn()?;
        let mut stmt = conn.prepare(&format!("{PERSON_SELECT_SQL} WHERE email = ?1 LIMIT 1;"))?;
        let mut rows = stmt.query([email])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_person_row(row)?));
        }

        Ok(None)
    }

    fn commit(&mut self) -> RepoResult<()> {
        let started_at = Instant::now();
        let conn = self.active_conn()?;
        if let Err(err) = conn.execute_batch("COMMIT;") {
            // The store may abort the transaction on its own when COMMIT fails.
            let aborted = conn.is_autocommit();
            if aborted {
                self.state = UnitOfWorkState::RolledBack;
            }
            error!(
                "event=uow_commit module=repo status=error duration_ms={} error_code=commit_failed aborted={aborted} error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err.into());
        }

        self.state.advance(UnitOfWorkState::Committed)?;
        debug!(
            "event=uow_commit module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn rollback(&mut self) -> RepoResult<()> {
        if self.state == UnitOfWorkState::RolledBack {
            return Ok(());
        }
        let started_at = Instant::now();
        let conn = self.active_conn()?;

        let outcome = if conn.is_autocommit() {
            Ok(())
        } else {
            conn.execute_batch("ROLLBACK;")
        };
        // Pending writes are discarded when the connection closes, so the
        // handle is finished either way.
        self.state.advance(UnitOfWorkState::RolledBack)?;

        match outcome {
            Ok(()) => {
                debug!(
                    "event=uow_rollback module=repo status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=uow_rollback module=repo status=error duration_ms={} error_code=rollback_failed error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }

    fn release(&mut self) -> RepoResult<()> {
        self.state.advance(UnitOfWorkState::Released)?;
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        match conn.close() {
            Ok(()) => {
                debug!("event=uow_release module=repo status=ok");
                Ok(())
            }
            Err((conn, err)) => {
                error!(
                    "event=uow_release module=repo status=error error_code=release_failed error={err}"
                );
                drop(conn);
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteGateway;
    use crate::model::certification::CertificationDraft;
    use crate::model::person::PersonDraft;
    use crate::repo::error::RepoError;
    use crate::repo::unit_of_work::{StorageGateway, UnitOfWork, UnitOfWorkState};
    use chrono::NaiveDate;
    use rusqlite::Connection;

    fn draft() -> CertificationDraft {
        CertificationDraft {
            title: "Rust Basics".to_string(),
            institution: "Academy".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: None,
            status: "active".to_string(),
        }
    }

    fn count(path: &std::path::Path, table: &str) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn committed_writes_are_visible_to_new_connections() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = SqliteGateway::new(dir.path().join("certlab.sqlite3"));

        let mut uow = gateway.begin().unwrap();
        assert_eq!(uow.state(), UnitOfWorkState::InProgress);
        let certification = uow.save_certification(&draft()).unwrap();
        let person = PersonDraft {
            full_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: "Student".to_string(),
            certification_id: certification.id,
        };
        let saved = uow.save_person(&person).unwrap();
        assert_eq!(saved.certification_id, certification.id);
        assert!(saved.created_at > 0);

        let found = uow.find_person_by_email("ada@example.com").unwrap();
        assert_eq!(found.map(|p| p.id), Some(saved.id));

        uow.commit().unwrap();
        uow.release().unwrap();
        uow.release().unwrap();
        assert_eq!(uow.state(), UnitOfWorkState::Released);

        assert_eq!(count(gateway.path(), "certifications"), 1);
        assert_eq!(count(gateway.path(), "persons"), 1);
    }

    #[test]
    fn rollback_discards_writes_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = SqliteGateway::new(dir.path().join("certlab.sqlite3"));

        let mut uow = gateway.begin().unwrap();
        uow.save_certification(&draft()).unwrap();
        uow.rollback().unwrap();
        uow.rollback().unwrap();
        uow.release().unwrap();

        assert_eq!(count(gateway.path(), "certifications"), 0);
    }

    #[test]
    fn finished_handle_refuses_writes_and_early_release() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = SqliteGateway::new(dir.path().join("certlab.sqlite3"));

        let mut uow = gateway.begin().unwrap();
        assert!(matches!(
            uow.release(),
            Err(RepoError::InvalidTransition {
                from: UnitOfWorkState::InProgress,
                to: UnitOfWorkState::Released,
            })
        ));

        uow.commit().unwrap();
        assert!(matches!(
            uow.save_certification(&draft()),
            Err(RepoError::InvalidTransition {
                from: UnitOfWorkState::Committed,
                ..
            })
        ));
        assert!(matches!(
            uow.rollback(),
            Err(RepoError::InvalidTransition { .. })
        ));
        uow.release().unwrap();
    }

    #[test]
    fn person_without_certification_is_a_foreign_key_violation() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = SqliteGateway::new(dir.path().join("certlab.sqlite3"));

        let mut uow = gateway.begin().unwrap();
        let orphan = PersonDraft {
            full_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: "Student".to_string(),
            certification_id: uuid::Uuid::new_v4(),
        };
        let err = uow.save_person(&orphan).unwrap_err();
        assert!(matches!(
            err,
            RepoError::ConstraintViolation {
                kind: crate::repo::error::ConstraintKind::ForeignKey,
                ..
            }
        ));
        uow.rollback().unwrap();
        uow.release().unwrap();
    }
}

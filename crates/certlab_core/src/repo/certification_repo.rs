//! Certification read accessors.
//!
//! # Responsibility
//! - Fetch certifications with their rosters outside any unit of work.
//! - Delete a certification together with its persons.
//!
//! # Invariants
//! - Lists are newest first (`created_at DESC`, insertion order breaks ties).
//! - Rosters are in insertion order.

use crate::model::certification::{Certification, CertificationId};
use crate::model::person::Person;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::schema::{
    ensure_connection_ready, parse_certification_row, parse_person_row, CERTIFICATION_SELECT_SQL,
    PERSON_SELECT_SQL,
};
use rusqlite::Connection;

/// Repository interface for certification reads.
pub trait CertificationRepository {
    /// Lists every certification with its persons, newest first.
    fn list_certifications(&self) -> RepoResult<Vec<Certification>>;
    /// Gets one certification with its persons. Missing ids yield `Ok(None)`.
    fn get_certification(&self, id: CertificationId) -> RepoResult<Option<Certification>>;
    /// Deletes one certification; its persons cascade.
    fn delete_certification(&self, id: CertificationId) -> RepoResult<()>;
}

/// SQLite-backed certification repository.
pub struct SqliteCertificationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCertificationRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl CertificationRepository for SqliteCertificationRepository<'_> {
    fn list_certifications(&self) -> RepoResult<Vec<Certification>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CERTIFICATION_SELECT_SQL} ORDER BY created_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut certifications = Vec::new();
        while let Some(row) = rows.next()? {
            certifications.push(parse_certification_row(row, "")?);
        }

        for certification in &mut certifications {
            certification.persons = persons_of(self.conn, certification.id)?;
        }
        Ok(certifications)
    }

    fn get_certification(&self, id: CertificationId) -> RepoResult<Option<Certification>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CERTIFICATION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut certification = parse_certification_row(row, "")?;
        certification.persons = persons_of(self.conn, id)?;
        Ok(Some(certification))
    }

    fn delete_certification(&self, id: CertificationId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM certifications WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "certification",
                id,
            });
        }
        Ok(())
    }
}

/// Persons of one certification in insertion order.
pub(crate) fn persons_of(conn: &Connection, id: CertificationId) -> RepoResult<Vec<Person>> {
    let mut stmt = conn.prepare(&format!(
        "{PERSON_SELECT_SQL}
         WHERE certification_id = ?1
         ORDER BY created_at ASC, rowid ASC;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut persons = Vec::new();
    while let Some(row) = rows.next()? {
        persons.push(parse_person_row(row)?);
    }
    Ok(persons)
}

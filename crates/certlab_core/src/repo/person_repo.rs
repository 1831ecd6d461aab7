//! Person read accessors.

use crate::model::certification::CertificationId;
use crate::model::person::{Person, PersonId, PersonWithCertification};
use crate::repo::certification_repo::persons_of;
use crate::repo::error::RepoResult;
use crate::repo::schema::{
    ensure_connection_ready, parse_certification_row, parse_person_row,
    PERSON_WITH_CERTIFICATION_SELECT_SQL,
};
use rusqlite::{Connection, OptionalExtension, Row};

/// Repository interface for person reads.
pub trait PersonRepository {
    /// Lists every person with its certification, newest first.
    fn list_persons(&self) -> RepoResult<Vec<PersonWithCertification>>;
    fn get_person(&self, id: PersonId) -> RepoResult<Option<PersonWithCertification>>;
    /// Lists the roster of one certification in insertion order.
    fn list_persons_by_certification(
        &self,
        certification_id: CertificationId,
    ) -> RepoResult<Vec<Person>>;
    /// Returns whether a committed person already uses `email`.
    fn email_exists(&self, email: &str) -> RepoResult<bool>;
}

/// SQLite-backed person repository.
pub struct SqlitePersonRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePersonRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl PersonRepository for SqlitePersonRepository<'_> {
    fn list_persons(&self) -> RepoResult<Vec<PersonWithCertification>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PERSON_WITH_CERTIFICATION_SELECT_SQL}
             ORDER BY p.created_at DESC, p.rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut persons = Vec::new();
        while let Some(row) = rows.next()? {
            persons.push(parse_person_with_certification_row(row)?);
        }
        Ok(persons)
    }

    fn get_person(&self, id: PersonId) -> RepoResult<Option<PersonWithCertification>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PERSON_WITH_CERTIFICATION_SELECT_SQL} WHERE p.id = ?1;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_person_with_certification_row(row)?));
        }
        Ok(None)
    }

    fn list_persons_by_certification(
        &self,
        certification_id: CertificationId,
    ) -> RepoResult<Vec<Person>> {
        persons_of(self.conn, certification_id)
    }

    fn email_exists(&self, email: &str) -> RepoResult<bool> {
        let hit = self
            .conn
            .query_row(
                "SELECT 1 FROM persons WHERE email = ?1 LIMIT 1;",
                [email],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }
}

fn parse_person_with_certification_row(row: &Row<'_>) -> RepoResult<PersonWithCertification> {
    Ok(PersonWithCertification {
        person: parse_person_row(row)?,
        certification: parse_certification_row(row, "cert_")?,
    })
}

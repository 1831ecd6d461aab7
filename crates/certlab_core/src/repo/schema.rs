//! Column lists, row parsers and schema readiness checks shared by the
//! unit of work and the read accessors.

use crate::db::migrations::latest_version;
use crate::model::certification::Certification;
use crate::model::person::Person;
use crate::repo::error::{RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use uuid::Uuid;

/// Storage format of `certifications.issue_date`.
pub(crate) const ISSUE_DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) const CERTIFICATION_SELECT_SQL: &str = "SELECT
    id,
    title,
    institution,
    issue_date,
    description,
    status,
    created_at,
    updated_at
FROM certifications";

pub(crate) const PERSON_SELECT_SQL: &str = "SELECT
    id,
    full_name,
    email,
    role,
    certification_id,
    created_at,
    updated_at
FROM persons";

/// Person columns plus the owning certification under a `cert_` prefix.
pub(crate) const PERSON_WITH_CERTIFICATION_SELECT_SQL: &str = "SELECT
    p.id AS id,
    p.full_name AS full_name,
    p.email AS email,
    p.role AS role,
    p.certification_id AS certification_id,
    p.created_at AS created_at,
    p.updated_at AS updated_at,
    c.id AS cert_id,
    c.title AS cert_title,
    c.institution AS cert_institution,
    c.issue_date AS cert_issue_date,
    c.description AS cert_description,
    c.status AS cert_status,
    c.created_at AS cert_created_at,
    c.updated_at AS cert_updated_at
FROM persons p
JOIN certifications c ON c.id = p.certification_id";

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "certifications",
        &[
            "id",
            "title",
            "institution",
            "issue_date",
            "description",
            "status",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "persons",
        &[
            "id",
            "full_name",
            "email",
            "role",
            "certification_id",
            "created_at",
            "updated_at",
        ],
    ),
];

/// Parses a certification row. `prefix` selects aliased join columns.
///
/// The returned roster is empty; callers attach persons separately.
pub(crate) fn parse_certification_row(row: &Row<'_>, prefix: &str) -> RepoResult<Certification> {
    let column = |name: &str| format!("{prefix}{name}");

    let id_text: String = row.get(column("id").as_str())?;
    let issue_date_text: String = row.get(column("issue_date").as_str())?;

    Ok(Certification {
        id: parse_uuid(&id_text, "certifications.id")?,
        title: row.get(column("title").as_str())?,
        institution: row.get(column("institution").as_str())?,
        issue_date: parse_issue_date(&issue_date_text)?,
        description: row.get(column("description").as_str())?,
        status: row.get(column("status").as_str())?,
        persons: Vec::new(),
        created_at: row.get(column("created_at").as_str())?,
        updated_at: row.get(column("updated_at").as_str())?,
    })
}

pub(crate) fn parse_person_row(row: &Row<'_>) -> RepoResult<Person> {
    let id_text: String = row.get("id")?;
    let certification_text: String = row.get("certification_id")?;

    Ok(Person {
        id: parse_uuid(&id_text, "persons.id")?,
        full_name: row.get("full_name")?,
        email: row.get("email")?,
        role: row.get("role")?,
        certification_id: parse_uuid(&certification_text, "persons.certification_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn format_issue_date(date: NaiveDate) -> String {
    date.format(ISSUE_DATE_FORMAT).to_string()
}

fn parse_issue_date(value: &str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(value, ISSUE_DATE_FORMAT).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid date `{value}` in certifications.issue_date"
        ))
    })
}

/// Rejects connections that did not go through `db::open_db*`.
pub(crate) fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

//! Demo data for exercising the create workflow.
//!
//! # Responsibility
//! - Provide the canonical five-person demo request.
//! - Seed it through the regular workflow and wipe all data on demand.

use crate::model::certification::Certification;
use crate::model::request::{CreateCertificationRequest, NewPerson};
use crate::repo::error::RepoResult;
use crate::repo::schema::ensure_connection_ready;
use crate::repo::unit_of_work::StorageGateway;
use crate::service::certification_service::{CertificationService, WorkflowResult};
use chrono::NaiveDate;
use log::{error, info};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::time::Instant;

/// Rows removed by [`clean_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanReport {
    pub persons_deleted: usize,
    pub certifications_deleted: usize,
}

/// The demo certification with its five participants.
///
/// Every email is distinct; the fifth person is "Laura Díaz".
pub fn demo_request() -> CreateCertificationRequest {
    CreateCertificationRequest {
        title: "Curso de NestJS Avanzado".to_string(),
        institution: "Academia Tech".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap_or_default(),
        description: Some(
            "Certificación del curso avanzado de NestJS con TypeORM y transacciones de base de datos"
                .to_string(),
        ),
        persons: vec![
            NewPerson::new("María González", "maria@email.com", "Estudiante"),
            NewPerson::new("Carlos López", "carlos@email.com", "Estudiante"),
            NewPerson::new("Ana Martínez", "ana@email.com", "Instructor"),
            NewPerson::new("Pedro Sánchez", "pedro@email.com", "Estudiante"),
            NewPerson::new("Laura Díaz", "laura@email.com", "Estudiante"),
        ],
    }
}

/// Creates the demo certification through the transactional workflow.
pub fn seed_demo_data<G: StorageGateway>(
    service: &CertificationService<G>,
) -> WorkflowResult<Certification> {
    let started_at = Instant::now();
    info!("event=seed_run module=seed status=start");
    let result = service.create_with_persons(&demo_request());
    match &result {
        Ok(certification) => info!(
            "event=seed_run module=seed status=ok duration_ms={} persons={}",
            started_at.elapsed().as_millis(),
            certification.persons.len()
        ),
        Err(err) => error!(
            "event=seed_run module=seed status=error duration_ms={} error_code={}",
            started_at.elapsed().as_millis(),
            err.error_code()
        ),
    }
    result
}

/// Deletes every person, then every certification, in one transaction.
pub fn clean_all(conn: &mut Connection) -> RepoResult<CleanReport> {
    ensure_connection_ready(conn)?;
    let started_at = Instant::now();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let persons_deleted = tx.execute("DELETE FROM persons;", [])?;
    let certifications_deleted = tx.execute("DELETE FROM certifications;", [])?;
    tx.commit()?;

    info!(
        "event=seed_clean module=seed status=ok duration_ms={} persons_deleted={persons_deleted} certifications_deleted={certifications_deleted}",
        started_at.elapsed().as_millis()
    );
    Ok(CleanReport {
        persons_deleted,
        certifications_deleted,
    })
}

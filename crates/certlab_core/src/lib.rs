//! Core domain logic for certlab.
//! Certifications and their rosters are written atomically through one unit of
//! work; this crate owns that invariant.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod seed;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget};
pub use model::certification::{Certification, CertificationDraft, CertificationId, DEFAULT_STATUS};
pub use model::person::{Person, PersonDraft, PersonId, PersonWithCertification};
pub use model::request::{CreateCertificationRequest, NewPerson, RequestValidationError};
pub use repo::{
    CertificationRepository, ConstraintKind, PersonRepository, RepoError, RepoResult,
    SqliteCertificationRepository, SqliteGateway, SqlitePersonRepository, SqliteUnitOfWork,
    StorageGateway, UnitOfWork, UnitOfWorkScope, UnitOfWorkState,
};
pub use seed::{clean_all, demo_request, seed_demo_data, CleanReport};
pub use service::certification_service::{
    CertificationService, WorkflowError, WorkflowResult, DEFAULT_SIMULATED_FAILURE_INDEX,
};
pub use service::email_guard::email_taken;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

//! Repository layer: unit-of-work gateway and read accessors.
//!
//! # Responsibility
//! - Define the transactional write contract (`StorageGateway`, `UnitOfWork`).
//! - Provide plain read accessors that need no transaction.
//! - Isolate SQLite query details from workflow orchestration.
//!
//! # Invariants
//! - Constraint failures surface as classified `RepoError::ConstraintViolation`.
//! - Read accessors only accept migrated connections.

pub mod certification_repo;
pub mod error;
pub mod person_repo;
pub(crate) mod schema;
pub mod sqlite_gateway;
pub mod unit_of_work;

pub use certification_repo::{CertificationRepository, SqliteCertificationRepository};
pub use error::{ConstraintKind, RepoError, RepoResult};
pub use person_repo::{PersonRepository, SqlitePersonRepository};
pub use sqlite_gateway::{SqliteGateway, SqliteUnitOfWork};
pub use unit_of_work::{StorageGateway, UnitOfWork, UnitOfWorkScope, UnitOfWorkState};

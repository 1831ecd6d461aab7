//! Transactional create workflow for a certification and its roster.
//!
//! # Responsibility
//! - Persist one certification plus its ordered persons inside a single unit
//!   of work: all rows become durable, or none do.
//! - Run the email uniqueness guard before each person insert.
//! - Optionally abort at a chosen roster index to exercise rollback.
//!
//! # Invariants
//! - Persons are checked and inserted strictly in request order; the first
//!   failure stops the loop.
//! - Any failure after `begin` rolls back before it is returned.
//! - The unit of work is released exactly once, after commit or rollback.
//! - Rollback and release failures are returned wrapped around the failure
//!   they followed, never swallowed.

use crate::model::certification::{Certification, CertificationDraft};
use crate::model::person::PersonDraft;
use crate::model::request::CreateCertificationRequest;
use crate::repo::error::RepoError;
use crate::repo::unit_of_work::{StorageGateway, UnitOfWork, UnitOfWorkScope};
use crate::service::email_guard::email_taken;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Roster index the demo fault-injection run aborts at (the fifth person).
pub const DEFAULT_SIMULATED_FAILURE_INDEX: usize = 4;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Failure of the create workflow.
#[derive(Debug)]
pub enum WorkflowError {
    /// A person's email is already stored, or repeats earlier in the request.
    DuplicateEmail { email: String },
    /// Injected abort before the person at `index`.
    SimulatedFailure { index: usize, full_name: String },
    /// Storage failure not attributable to caller data.
    Storage(RepoError),
    /// Rolling back after `original` failed as well.
    RollbackFailed {
        original: Box<WorkflowError>,
        cause: RepoError,
    },
    /// Releasing the unit of work failed. `original` is `None` when the
    /// writes had been committed.
    ReleaseFailed {
        original: Option<Box<WorkflowError>>,
        cause: RepoError,
    },
}

impl WorkflowError {
    /// Stable machine-readable code for logs and envelopes.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateEmail { .. } => "duplicate_email",
            Self::SimulatedFailure { .. } => "simulated_failure",
            Self::Storage(_) => "storage",
            Self::RollbackFailed { .. } => "rollback_failed",
            Self::ReleaseFailed { .. } => "release_failed",
        }
    }

    /// The condition that started the failure path, unwrapping cleanup errors.
    pub fn root(&self) -> &WorkflowError {
        match self {
            Self::RollbackFailed { original, .. } => original.root(),
            Self::ReleaseFailed {
                original: Some(original),
                ..
            } => original.root(),
            other => other,
        }
    }
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateEmail { email } => {
                write!(f, "email {email} already exists")
            }
            Self::SimulatedFailure { full_name, .. } => {
                write!(f, "simulated failure while processing person: {full_name}")
            }
            Self::Storage(err) => write!(f, "storage failure: {err}"),
            Self::RollbackFailed { original, cause } => {
                write!(f, "rollback failed ({cause}) after: {original}")
            }
            Self::ReleaseFailed {
                original: Some(original),
                cause,
            } => write!(f, "release failed ({cause}) after: {original}"),
            Self::ReleaseFailed {
                original: None,
                cause,
            } => write!(f, "release failed after commit: {cause}"),
        }
    }
}

impl Error for WorkflowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::RollbackFailed { cause, .. } | Self::ReleaseFailed { cause, .. } => Some(cause),
            Self::DuplicateEmail { .. } | Self::SimulatedFailure { .. } => None,
        }
    }
}

impl From<RepoError> for WorkflowError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

/// Use-case service for creating certifications with their persons.
pub struct CertificationService<G: StorageGateway> {
    gateway: G,
}

impl<G: StorageGateway> CertificationService<G> {
    /// Creates a service over the provided storage gateway.
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Creates the certification and every person of `request` atomically.
    ///
    /// # Errors
    /// - `DuplicateEmail` when a person's email is already taken; nothing is
    ///   persisted.
    /// - `Storage` on store failures; nothing is persisted.
    /// - `RollbackFailed` / `ReleaseFailed` when cleanup fails as well.
    pub fn create_with_persons(
        &self,
        request: &CreateCertificationRequest,
    ) -> WorkflowResult<Certification> {
        self.run_create(request, None)
    }

    /// Same as [`Self::create_with_persons`], but aborts with
    /// `SimulatedFailure` right before the person at `fail_at` is checked.
    ///
    /// An index past the roster end commits normally.
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn create_with_simulated_failure(
        &self,
        request: &CreateCertificationRequest,
        fail_at: usize,
    ) -> WorkflowResult<Certification> {
        self.run_create(request, Some(fail_at))
    }

    fn run_create(
        &self,
        request: &CreateCertificationRequest,
        abort_before: Option<usize>,
    ) -> WorkflowResult<Certification> {
        let started_at = Instant::now();
        let mode = if abort_before.is_some() {
            "simulated"
        } else {
            "standard"
        };
        info!(
            "event=cert_create module=service status=start mode={mode} persons={}",
            request.persons.len()
        );

        let outcome = self.create_in_unit_of_work(request, abort_before);
        match &outcome {
            Ok(certification) => info!(
                "event=cert_create module=service status=ok mode={mode} duration_ms={} certification_id={} persons={}",
                started_at.elapsed().as_millis(),
                certification.id,
                certification.persons.len()
            ),
            Err(err) => warn!(
                "event=cert_create module=service status=error mode={mode} duration_ms={} error_code={}",
                started_at.elapsed().as_millis(),
                err.error_code()
            ),
        }
        outcome
    }

    fn create_in_unit_of_work(
        &self,
        request: &CreateCertificationRequest,
        abort_before: Option<usize>,
    ) -> WorkflowResult<Certification> {
        let mut scope = UnitOfWorkScope::new(self.gateway.begin()?);

        let written = write_roster(scope.unit_of_work(), request, abort_before);
        let settled = settle(scope.unit_of_work(), written);

        match (settled, scope.release()) {
            (settled, Ok(())) => settled,
            (Ok(_), Err(cause)) => {
                error!(
                    "event=cert_create module=service status=error stage=release committed=true error_code=release_failed"
                );
                Err(WorkflowError::ReleaseFailed {
                    original: None,
                    cause,
                })
            }
            (Err(original), Err(cause)) => Err(WorkflowError::ReleaseFailed {
                original: Some(Box::new(original)),
                cause,
            }),
        }
    }
}

/// Saves the certification, then each person in order.
fn write_roster<U: UnitOfWork>(
    uow: &mut U,
    request: &CreateCertificationRequest,
    abort_before: Option<usize>,
) -> WorkflowResult<Certification> {
    let mut certification = uow.save_certification(&CertificationDraft::from_request(request))?;
    let total = request.persons.len();
    let mut persons = Vec::with_capacity(total);

    for (index, input) in request.persons.iter().enumerate() {
        if abort_before == Some(index) {
            warn!(
                "event=cert_create_person module=service status=error index={index} total={total} error_code=simulated_failure"
            );
            return Err(WorkflowError::SimulatedFailure {
                index,
                full_name: input.full_name.clone(),
            });
        }

        if email_taken(&*uow, &input.email)? {
            debug!(
                "event=cert_create_person module=service status=error index={index} total={total} error_code=duplicate_email"
            );
            return Err(WorkflowError::DuplicateEmail {
                email: input.email.clone(),
            });
        }

        let person = uow
            .save_person(&PersonDraft::new(certification.id, input))
            .map_err(|err| {
                if err.is_unique_violation_on("persons.email") {
                    WorkflowError::DuplicateEmail {
                        email: input.email.clone(),
                    }
                } else {
                    WorkflowError::Storage(err)
                }
            })?;
        debug!("event=cert_create_person module=service status=ok index={index} total={total}");
        persons.push(person);
    }

    certification.persons = persons;
    Ok(certification)
}

/// Commits a successful write, rolls back anything else.
fn settle<U: UnitOfWork>(
    uow: &mut U,
    written: WorkflowResult<Certification>,
) -> WorkflowResult<Certification> {
    match written {
        Ok(certification) => match uow.commit() {
            Ok(()) => Ok(certification),
            Err(err) => roll_back(uow, WorkflowError::Storage(err)),
        },
        Err(original) => roll_back(uow, original),
    }
}

fn roll_back<U: UnitOfWork>(uow: &mut U, original: WorkflowError) -> WorkflowResult<Certification> {
    match uow.rollback() {
        Ok(()) => Err(original),
        Err(cause) => Err(WorkflowError::RollbackFailed {
            original: Box::new(original),
            cause,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{CertificationService, WorkflowError, DEFAULT_SIMULATED_FAILURE_INDEX};
    use crate::db::open_db;
    use crate::model::certification::{Certification, CertificationDraft};
    use crate::model::person::{Person, PersonDraft};
    use crate::model::request::{CreateCertificationRequest, NewPerson};
    use crate::repo::error::{ConstraintKind, RepoError, RepoResult};
    use crate::repo::sqlite_gateway::SqliteGateway;
    use crate::repo::unit_of_work::{StorageGateway, UnitOfWork, UnitOfWorkScope, UnitOfWorkState};
    use crate::seed::demo_request;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use uuid::Uuid;

    #[derive(Debug, Default, Clone)]
    struct Script {
        fail_begin: bool,
        taken_emails: Vec<String>,
        unique_clash_on_save: Option<String>,
        fail_commit: bool,
        fail_rollback: bool,
        fail_release: bool,
    }

    type CallLog = Rc<RefCell<Vec<String>>>;

    struct FakeGateway {
        script: Script,
        calls: CallLog,
    }

    impl FakeGateway {
        fn new(script: Script) -> Self {
            Self {
                script,
                calls: Rc::default(),
            }
        }
    }

    struct FakeUnitOfWork {
        script: Script,
        calls: CallLog,
        state: UnitOfWorkState,
        saved_emails: Vec<String>,
    }

    fn store_error(message: &str) -> RepoError {
        RepoError::InvalidData(message.to_string())
    }

    impl StorageGateway for FakeGateway {
        type UnitOfWork = FakeUnitOfWork;

        fn begin(&self) -> RepoResult<FakeUnitOfWork> {
            self.calls.borrow_mut().push("begin".to_string());
            if self.script.fail_begin {
                return Err(store_error("connection refused"));
            }
            Ok(FakeUnitOfWork {
                script: self.script.clone(),
                calls: Rc::clone(&self.calls),
                state: UnitOfWorkState::InProgress,
                saved_emails: Vec::new(),
            })
        }
    }

    impl UnitOfWork for FakeUnitOfWork {
        fn state(&self) -> UnitOfWorkState {
            self.state
        }

        fn save_certification(&mut self, draft: &CertificationDraft) -> RepoResult<Certification> {
            self.calls.borrow_mut().push("save_certification".to_string());
            Ok(draft.clone().into_saved(Uuid::new_v4(), 1, 1))
        }

        fn save_person(&mut self, draft: &PersonDraft) -> RepoResult<Person> {
            self.calls
                .borrow_mut()
                .push(format!("save_person:{}", draft.email));
            if self.script.unique_clash_on_save.as_deref() == Some(draft.email.as_str()) {
                return Err(RepoError::ConstraintViolation {
                    kind: ConstraintKind::Unique,
                    message: "UNIQUE constraint failed: persons.email".to_string(),
                });
            }
            self.saved_emails.push(draft.email.clone());
            Ok(draft.clone().into_saved(Uuid::new_v4(), 2, 2))
        }

        fn find_person_by_email(&self, email: &str) -> RepoResult<Option<Person>> {
            self.calls.borrow_mut().push(format!("find:{email}"));
            let taken = self.script.taken_emails.iter().any(|e| e == email)
                || self.saved_emails.iter().any(|e| e == email);
            Ok(taken.then(|| Person {
                id: Uuid::new_v4(),
                full_name: "Existing".to_string(),
                email: email.to_string(),
                role: "Student".to_string(),
                certification_id: Uuid::new_v4(),
                created_at: 0,
                updated_at: 0,
            }))
        }

        fn commit(&mut self) -> RepoResult<()> {
            self.calls.borrow_mut().push("commit".to_string());
            if self.script.fail_commit {
                return Err(store_error("disk I/O error"));
            }
            self.state.advance(UnitOfWorkState::Committed)
        }

        fn rollback(&mut self) -> RepoResult<()> {
            self.calls.borrow_mut().push("rollback".to_string());
            self.state.advance(UnitOfWorkState::RolledBack)?;
            if self.script.fail_rollback {
                return Err(store_error("rollback refused"));
            }
            Ok(())
        }

        fn release(&mut self) -> RepoResult<()> {
            self.calls.borrow_mut().push("release".to_string());
            self.state.advance(UnitOfWorkState::Released)?;
            if self.script.fail_release {
                return Err(store_error("close failed"));
            }
            Ok(())
        }
    }

    fn request(emails: &[&str]) -> CreateCertificationRequest {
        CreateCertificationRequest {
            title: "Rust Basics".to_string(),
            institution: "Academy".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: None,
            persons: emails
                .iter()
                .enumerate()
                .map(|(i, email)| NewPerson::new(format!("Person {i}"), *email, "Student"))
                .collect(),
        }
    }

    fn calls(gateway: &FakeGateway) -> Vec<String> {
        gateway.calls.borrow().clone()
    }

    fn count_of(call_log: &[String], name: &str) -> usize {
        call_log.iter().filter(|call| *call == name).count()
    }

    #[test]
    fn success_checks_then_saves_each_person_in_order() {
        let service = CertificationService::new(FakeGateway::new(Script::default()));
        let certification = service
            .create_with_persons(&request(&["a@x.io", "b@x.io"]))
            .unwrap();

        let emails: Vec<_> = certification.persons.iter().map(|p| p.email.as_str()).collect();
        assert_eq!(emails, ["a@x.io", "b@x.io"]);
        assert!(certification
            .persons
            .iter()
            .all(|p| p.certification_id == certification.id));
        assert_eq!(certification.status, "active");
        assert_eq!(
            calls(service.gateway()),
            [
                "begin",
                "save_certification",
                "find:a@x.io",
                "save_person:a@x.io",
                "find:b@x.io",
                "save_person:b@x.io",
                "commit",
                "release",
            ]
        );
    }

    #[test]
    fn duplicate_stops_before_insert_and_rolls_back() {
        let script = Script {
            taken_emails: vec!["b@x.io".to_string()],
            ..Script::default()
        };
        let service = CertificationService::new(FakeGateway::new(script));
        let err = service
            .create_with_persons(&request(&["a@x.io", "b@x.io", "c@x.io"]))
            .unwrap_err();

        assert!(matches!(&err, WorkflowError::DuplicateEmail { email } if email == "b@x.io"));
        assert_eq!(err.error_code(), "duplicate_email");
        assert_eq!(
            calls(service.gateway()),
            [
                "begin",
                "save_certification",
                "find:a@x.io",
                "save_person:a@x.io",
                "find:b@x.io",
                "rollback",
                "release",
            ]
        );
    }

    #[test]
    fn repeated_email_within_one_request_is_a_duplicate() {
        let service = CertificationService::new(FakeGateway::new(Script::default()));
        let err = service
            .create_with_persons(&request(&["a@x.io", "a@x.io"]))
            .unwrap_err();

        assert!(matches!(err, WorkflowError::DuplicateEmail { .. }));
        assert_eq!(count_of(&calls(service.gateway()), "commit"), 0);
    }

    #[test]
    fn unique_clash_on_save_surfaces_as_duplicate_email() {
        let script = Script {
            unique_clash_on_save: Some("a@x.io".to_string()),
            ..Script::default()
        };
        let service = CertificationService::new(FakeGateway::new(script));
        let err = service
            .create_with_persons(&request(&["a@x.io"]))
            .unwrap_err();

        assert!(matches!(&err, WorkflowError::DuplicateEmail { email } if email == "a@x.io"));
        let log = calls(service.gateway());
        assert_eq!(count_of(&log, "rollback"), 1);
        assert_eq!(count_of(&log, "release"), 1);
    }

    #[test]
    fn simulated_failure_skips_guard_for_target_person() {
        let service = CertificationService::new(FakeGateway::new(Script::default()));
        let err = service
            .create_with_simulated_failure(&request(&["a@x.io", "b@x.io", "c@x.io"]), 1)
            .unwrap_err();

        assert!(matches!(
            &err,
            WorkflowError::SimulatedFailure { index: 1, full_name } if full_name == "Person 1"
        ));
        assert_eq!(
            calls(service.gateway()),
            [
                "begin",
                "save_certification",
                "find:a@x.io",
                "save_person:a@x.io",
                "rollback",
                "release",
            ]
        );
    }

    #[test]
    fn simulated_failure_at_first_index_saves_no_person() {
        let service = CertificationService::new(FakeGateway::new(Script::default()));
        let err = service
            .create_with_simulated_failure(&request(&["a@x.io"]), 0)
            .unwrap_err();

        assert_eq!(err.error_code(), "simulated_failure");
        assert!(!calls(service.gateway())
            .iter()
            .any(|call| call.starts_with("save_person") || call.starts_with("find")));
    }

    #[test]
    fn out_of_range_failure_index_commits_normally() {
        let service = CertificationService::new(FakeGateway::new(Script::default()));
        let certification = service
            .create_with_simulated_failure(&request(&["a@x.io", "b@x.io"]), 2)
            .unwrap();

        assert_eq!(certification.persons.len(), 2);
        assert_eq!(count_of(&calls(service.gateway()), "commit"), 1);
    }

    #[test]
    fn begin_failure_is_storage_without_cleanup_calls() {
        let script = Script {
            fail_begin: true,
            ..Script::default()
        };
        let service = CertificationService::new(FakeGateway::new(script));
        let err = service
            .create_with_persons(&request(&["a@x.io"]))
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Storage(_)));
        assert_eq!(calls(service.gateway()), ["begin"]);
    }

    #[test]
    fn failed_commit_rolls_back_and_releases_once() {
        let script = Script {
            fail_commit: true,
            ..Script::default()
        };
        let service = CertificationService::new(FakeGateway::new(script));
        let err = service
            .create_with_persons(&request(&["a@x.io"]))
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Storage(_)));
        let log = calls(service.gateway());
        assert_eq!(&log[log.len() - 3..], ["commit", "rollback", "release"]);
    }

    #[test]
    fn rollback_failure_keeps_original_error() {
        let script = Script {
            taken_emails: vec!["a@x.io".to_string()],
            fail_rollback: true,
            ..Script::default()
        };
        let service = CertificationService::new(FakeGateway::new(script));
        let err = service
            .create_with_persons(&request(&["a@x.io"]))
            .unwrap_err();

        match &err {
            WorkflowError::RollbackFailed { original, .. } => {
                assert!(matches!(**original, WorkflowError::DuplicateEmail { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root(), WorkflowError::DuplicateEmail { .. }));
        assert_eq!(count_of(&calls(service.gateway()), "release"), 1);
    }

    #[test]
    fn release_failure_after_commit_is_reported() {
        let script = Script {
            fail_release: true,
            ..Script::default()
        };
        let service = CertificationService::new(FakeGateway::new(script));
        let err = service
            .create_with_persons(&request(&["a@x.io"]))
            .unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::ReleaseFailed { original: None, .. }
        ));
        assert_eq!(count_of(&calls(service.gateway()), "release"), 1);
    }

    #[test]
    fn release_failure_wraps_the_failure_it_followed() {
        let script = Script {
            fail_release: true,
            ..Script::default()
        };
        let service = CertificationService::new(FakeGateway::new(script));
        let err = service
            .create_with_simulated_failure(&request(&["a@x.io"]), 0)
            .unwrap_err();

        assert_eq!(err.error_code(), "release_failed");
        assert!(matches!(
            err.root(),
            WorkflowError::SimulatedFailure { index: 0, .. }
        ));
        assert_eq!(count_of(&calls(service.gateway()), "release"), 1);
    }

    #[test]
    fn dropped_scope_rolls_back_and_releases() {
        let gateway = FakeGateway::new(Script::default());
        {
            let mut scope = UnitOfWorkScope::new(gateway.begin().unwrap());
            scope
                .unit_of_work()
                .save_certification(&CertificationDraft::from_request(&request(&["a@x.io"])))
                .unwrap();
        }
        assert_eq!(
            calls(&gateway),
            ["begin", "save_certification", "rollback", "release"]
        );
    }

    #[test]
    fn released_scope_is_not_released_again_on_drop() {
        let gateway = FakeGateway::new(Script::default());
        {
            let mut scope = UnitOfWorkScope::new(gateway.begin().unwrap());
            scope.unit_of_work().commit().unwrap();
            scope.release().unwrap();
            scope.release().unwrap();
        }
        assert_eq!(calls(&gateway), ["begin", "commit", "release"]);
    }

    fn row_counts(path: &Path) -> (i64, i64) {
        let conn = open_db(path).unwrap();
        let certifications = conn
            .query_row("SELECT COUNT(*) FROM certifications;", [], |row| row.get(0))
            .unwrap();
        let persons = conn
            .query_row("SELECT COUNT(*) FROM persons;", [], |row| row.get(0))
            .unwrap();
        (certifications, persons)
    }

    #[test]
    fn demo_abort_at_fifth_person_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certlab.sqlite3");
        let service = CertificationService::new(SqliteGateway::new(&path));

        let err = service
            .create_with_simulated_failure(&demo_request(), DEFAULT_SIMULATED_FAILURE_INDEX)
            .unwrap_err();

        assert!(matches!(
            &err,
            WorkflowError::SimulatedFailure { index: 4, full_name } if full_name == "Laura Díaz"
        ));
        assert!(err.to_string().contains("Laura Díaz"));
        assert_eq!(row_counts(&path), (0, 0));
    }

    #[test]
    fn abort_in_the_middle_undoes_earlier_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certlab.sqlite3");
        let service = CertificationService::new(SqliteGateway::new(&path));

        for fail_at in [0, 2] {
            let err = service
                .create_with_simulated_failure(&demo_request(), fail_at)
                .unwrap_err();
            assert!(matches!(err, WorkflowError::SimulatedFailure { index, .. } if index == fail_at));
            assert_eq!(row_counts(&path), (0, 0));
        }
    }

    #[test]
    fn out_of_range_index_commits_the_full_demo_roster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certlab.sqlite3");
        let service = CertificationService::new(SqliteGateway::new(&path));

        let certification = service
            .create_with_simulated_failure(&demo_request(), 10)
            .unwrap();

        assert_eq!(certification.persons.len(), 5);
        assert_eq!(row_counts(&path), (1, 5));
    }

    #[test]
    fn storage_duplicate_leaves_only_the_first_certification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certlab.sqlite3");
        let service = CertificationService::new(SqliteGateway::new(&path));

        service.create_with_persons(&demo_request()).unwrap();
        let err = service
            .create_with_simulated_failure(&demo_request(), 3)
            .unwrap_err();

        assert!(matches!(&err, WorkflowError::DuplicateEmail { email } if email == "maria@email.com"));
        assert_eq!(row_counts(&path), (1, 5));
    }
}

//! Unit-of-work contract for the transactional write path.
//!
//! # Responsibility
//! - Define the storage gateway seam (`StorageGateway`, `UnitOfWork`).
//! - Own the handle lifecycle state machine.
//! - Provide `UnitOfWorkScope`, which releases a handle exactly once.
//!
//! # Invariants
//! - `Idle -> InProgress -> {Committed | RolledBack} -> Released`.
//! - `Released` is terminal and only reachable after commit or rollback.
//! - Every read and write of a workflow goes through its own handle; handles
//!   are never shared between invocations.

use crate::model::certification::{Certification, CertificationDraft};
use crate::model::person::{Person, PersonDraft};
use crate::repo::error::{RepoError, RepoResult};
use log::error;
use std::fmt::{Display, Formatter};

/// Lifecycle state of one unit-of-work handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// Resource acquired, transaction not started.
    Idle,
    InProgress,
    Committed,
    RolledBack,
    Released,
}

impl UnitOfWorkState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InProgress => "in_progress",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Released => "released",
        }
    }

    /// Returns whether moving to `to` is a legal transition.
    ///
    /// Re-entering `RolledBack` or `Released` is accepted so that rollback and
    /// release stay idempotent.
    pub fn can_move_to(self, to: Self) -> bool {
        use UnitOfWorkState::*;
        matches!(
            (self, to),
            (Idle, InProgress)
                | (InProgress, Committed)
                | (InProgress, RolledBack)
                | (RolledBack, RolledBack)
                | (Committed, Released)
                | (RolledBack, Released)
                | (Released, Released)
        )
    }

    /// Validates and performs the transition to `to`.
    pub fn advance(&mut self, to: Self) -> RepoResult<()> {
        if !self.can_move_to(to) {
            return Err(RepoError::InvalidTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

impl Display for UnitOfWorkState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens units of work against a relational store.
pub trait StorageGateway {
    type UnitOfWork: UnitOfWork;

    /// Acquires a fresh handle in state `InProgress`.
    fn begin(&self) -> RepoResult<Self::UnitOfWork>;
}

/// Scoped reads and writes inside one open transaction.
pub trait UnitOfWork {
    fn state(&self) -> UnitOfWorkState;

    /// Persists a certification, assigning identity and timestamps.
    fn save_certification(&mut self, draft: &CertificationDraft) -> RepoResult<Certification>;

    /// Persists a person, assigning identity and timestamps.
    fn save_person(&mut self, draft: &PersonDraft) -> RepoResult<Person>;

    /// Looks up a person by exact email, seeing this handle's own writes.
    fn find_person_by_email(&self, email: &str) -> RepoResult<Option<Person>>;

    /// Makes all writes since begin durable. On failure the handle stays
    /// `InProgress` and must be rolled back.
    fn commit(&mut self) -> RepoResult<()>;

    /// Discards all writes since begin. Idempotent once rolled back.
    fn rollback(&mut self) -> RepoResult<()>;

    /// Returns the underlying connection. Idempotent once released.
    fn release(&mut self) -> RepoResult<()>;
}

/// Owns a handle and guarantees a single release.
///
/// The happy and failure paths call [`UnitOfWorkScope::release`] once after
/// the commit/rollback decision. When the scope is dropped without that call
/// (unwinding), it rolls back if needed and releases, logging any failure.
pub struct UnitOfWorkScope<U: UnitOfWork> {
    uow: U,
    released: bool,
}

impl<U: UnitOfWork> UnitOfWorkScope<U> {
    pub fn new(uow: U) -> Self {
        Self {
            uow,
            released: false,
        }
    }

    pub fn unit_of_work(&mut self) -> &mut U {
        &mut self.uow
    }

    /// Releases the handle. Later calls are no-ops.
    pub fn release(&mut self) -> RepoResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.uow.release()
    }
}

impl<U: UnitOfWork> Drop for UnitOfWorkScope<U> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.uow.state() == UnitOfWorkState::InProgress {
            if let Err(err) = self.uow.rollback() {
                error!(
                    "event=uow_rollback module=repo status=error trigger=drop error_code=rollback_failed error={err}"
                );
            }
        }
        if let Err(err) = self.release() {
            error!(
                "event=uow_release module=repo status=error trigger=drop error_code=release_failed error={err}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UnitOfWorkState::{self, *};

    #[test]
    fn lifecycle_follows_commit_and_rollback_paths() {
        let mut committed = Idle;
        committed.advance(InProgress).unwrap();
        committed.advance(Committed).unwrap();
        committed.advance(Released).unwrap();
        assert_eq!(committed, Released);

        let mut rolled_back = InProgress;
        rolled_back.advance(RolledBack).unwrap();
        rolled_back.advance(RolledBack).unwrap();
        rolled_back.advance(Released).unwrap();
        rolled_back.advance(Released).unwrap();
        assert_eq!(rolled_back, Released);
    }

    #[test]
    fn release_requires_a_finished_transaction() {
        for from in [Idle, InProgress] {
            let mut state = from;
            assert!(state.advance(Released).is_err());
            assert_eq!(state, from);
        }
    }

    #[test]
    fn terminal_and_decided_states_reject_new_work() {
        let illegal: [(UnitOfWorkState, UnitOfWorkState); 5] = [
            (Committed, RolledBack),
            (Committed, Committed),
            (RolledBack, Committed),
            (Released, InProgress),
            (Released, RolledBack),
        ];
        for (from, to) in illegal {
            assert!(!from.can_move_to(to), "{from} -> {to} must be rejected");
        }
    }
}

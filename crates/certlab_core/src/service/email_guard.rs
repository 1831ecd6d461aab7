//! Email uniqueness guard for the create workflow.
//!
//! The check runs through the caller's open unit of work, so it sees persons
//! saved earlier in the same transaction as well as committed ones.

use crate::repo::error::RepoResult;
use crate::repo::unit_of_work::UnitOfWork;

/// Returns whether any person already carries `email`.
pub fn email_taken<U: UnitOfWork + ?Sized>(uow: &U, email: &str) -> RepoResult<bool> {
    Ok(uow.find_person_by_email(email)?.is_some())
}

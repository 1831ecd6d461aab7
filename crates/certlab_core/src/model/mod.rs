//! Domain model for certifications and their participant rosters.
//!
//! # Responsibility
//! - Define persisted records (`Certification`, `Person`).
//! - Define not-yet-durable drafts handed to the storage gateway.
//! - Define the create request and its input rules.
//!
//! # Invariants
//! - Identity and timestamps are assigned on save, never by callers.
//! - A `Person` always carries the id of exactly one certification.

pub mod certification;
pub mod person;
pub mod request;

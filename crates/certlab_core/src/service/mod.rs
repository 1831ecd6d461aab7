//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate unit-of-work calls into the certification create workflow.
//! - Keep presentation layers decoupled from storage details.

pub mod certification_service;
pub mod email_guard;

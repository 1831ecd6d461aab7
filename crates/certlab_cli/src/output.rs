//! JSON envelope and error-to-status mapping for command results.
//!
//! Status codes follow HTTP semantics so the output can be relayed by a web
//! front end unchanged.

use certlab_core::{DbError, RepoError, RequestValidationError, WorkflowError};
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Printed result of every command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Envelope {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            error_code: None,
            status: None,
            details: None,
        }
    }

    pub fn failure(err: &CommandError) -> Self {
        Self {
            success: false,
            message: err.summary().to_string(),
            data: None,
            error: Some(err.to_string()),
            error_code: Some(err.error_code()),
            status: Some(err.status()),
            details: err.details().map(str::to_string),
        }
    }
}

/// Failure of one CLI command.
#[derive(Debug)]
pub enum CommandError {
    /// Input file missing, unreadable, or not a request document.
    InvalidInput(String),
    Validation(RequestValidationError),
    Workflow(WorkflowError),
    /// Read accessor failure.
    Storage(RepoError),
    /// Database could not be opened.
    Unavailable(DbError),
    NotFound { entity: &'static str, id: Uuid },
    /// Response could not be encoded.
    Internal(String),
}

impl CommandError {
    /// HTTP-style status code.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::Validation(_) => 400,
            Self::Workflow(err) => workflow_status(err),
            Self::Storage(err) => repo_status(err),
            Self::Unavailable(_) => 503,
            Self::NotFound { .. } => 404,
            Self::Internal(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Validation(_) => "validation_failed",
            Self::Workflow(err) => err.error_code(),
            Self::Storage(RepoError::NotFound { .. }) | Self::NotFound { .. } => "not_found",
            Self::Storage(_) => "storage",
            Self::Unavailable(_) => "store_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::Workflow(err) => match err.root() {
                WorkflowError::SimulatedFailure { .. } => {
                    "Simulated failure: transaction rolled back"
                }
                WorkflowError::DuplicateEmail { .. } => "Certification was not created",
                _ => "Storage failure",
            },
            Self::InvalidInput(_) | Self::Validation(_) => "Invalid request",
            Self::NotFound { .. } | Self::Storage(RepoError::NotFound { .. }) => "Not found",
            Self::Storage(_) => "Storage failure",
            Self::Internal(_) => "Internal failure",
            Self::Unavailable(_) => "Database unavailable",
        }
    }

    fn details(&self) -> Option<&'static str> {
        match self {
            Self::Workflow(
                WorkflowError::DuplicateEmail { .. }
                | WorkflowError::SimulatedFailure { .. }
                | WorkflowError::Storage(_),
            ) => Some("No data was saved: the transaction was rolled back"),
            Self::Workflow(WorkflowError::ReleaseFailed { original: None, .. }) => {
                Some("The data was committed before the connection failed to close")
            }
            _ => None,
        }
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) | Self::Internal(message) => write!(f, "{message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Workflow(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Unavailable(err) => write!(f, "cannot open database: {err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<RequestValidationError> for CommandError {
    fn from(value: RequestValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<WorkflowError> for CommandError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl From<RepoError> for CommandError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<DbError> for CommandError {
    fn from(value: DbError) -> Self {
        Self::Unavailable(value)
    }
}

/// Maps a workflow failure to a status code by the condition that started it.
pub fn workflow_status(err: &WorkflowError) -> u16 {
    match err {
        WorkflowError::DuplicateEmail { .. } | WorkflowError::SimulatedFailure { .. } => 400,
        WorkflowError::Storage(repo) => match repo_status(repo) {
            503 => 503,
            _ => 500,
        },
        WorkflowError::RollbackFailed { .. } | WorkflowError::ReleaseFailed { .. } => 500,
    }
}

pub fn repo_status(err: &RepoError) -> u16 {
    match err {
        RepoError::NotFound { .. } => 404,
        err if err.is_unavailable() => 503,
        _ => 500,
    }
}

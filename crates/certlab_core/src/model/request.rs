//! Create request for a certification and its roster.
//!
//! # Responsibility
//! - Define the wire shape accepted by presentation layers (camelCase JSON).
//! - Check input rules before a request reaches the create workflow.
//!
//! # Invariants
//! - Lengths are counted in characters, not bytes.
//! - `validate()` reports the first violation in field order, persons last.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const TITLE_MAX_CHARS: usize = 255;
pub const INSTITUTION_MAX_CHARS: usize = 255;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const FULL_NAME_MAX_CHARS: usize = 255;
pub const EMAIL_MAX_CHARS: usize = 255;
pub const ROLE_MAX_CHARS: usize = 100;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("valid email regex")
});

/// One roster entry of a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPerson {
    pub full_name: String,
    pub email: String,
    pub role: String,
}

impl NewPerson {
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            role: role.into(),
        }
    }
}

/// Certification fields plus the ordered roster to create with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificationRequest {
    pub title: String,
    pub institution: String,
    /// Calendar date, `YYYY-MM-DD` on the wire.
    pub issue_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Roster in submission order.
    pub persons: Vec<NewPerson>,
}

/// Input rule violation. `field` is a path such as `persons[2].email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestValidationError {
    /// Required text is empty or whitespace only.
    Blank { field: String },
    /// Text exceeds its character budget.
    TooLong { field: String, max_chars: usize },
    /// Email does not match address syntax.
    InvalidEmail { field: String, value: String },
    /// Request carries no persons.
    EmptyRoster,
}

impl Display for RequestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank { field } => write!(f, "`{field}` must not be blank"),
            Self::TooLong { field, max_chars } => {
                write!(f, "`{field}` must be at most {max_chars} characters")
            }
            Self::InvalidEmail { field, value } => {
                write!(f, "`{field}` is not a valid email address: `{value}`")
            }
            Self::EmptyRoster => write!(f, "`persons` must include at least one person"),
        }
    }
}

impl Error for RequestValidationError {}

impl CreateCertificationRequest {
    /// Checks every input rule, returning the first violation.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        require_text("title", &self.title, TITLE_MAX_CHARS)?;
        require_text("institution", &self.institution, INSTITUTION_MAX_CHARS)?;
        if let Some(description) = self.description.as_deref() {
            limit_text("description", description, DESCRIPTION_MAX_CHARS)?;
        }

        if self.persons.is_empty() {
            return Err(RequestValidationError::EmptyRoster);
        }
        for (index, person) in self.persons.iter().enumerate() {
            person.validate_at(index)?;
        }
        Ok(())
    }
}

impl NewPerson {
    fn validate_at(&self, index: usize) -> Result<(), RequestValidationError> {
        let field = |name: &str| format!("persons[{index}].{name}");

        require_text(&field("fullName"), &self.full_name, FULL_NAME_MAX_CHARS)?;
        require_text(&field("email"), &self.email, EMAIL_MAX_CHARS)?;
        if !is_valid_email(&self.email) {
            return Err(RequestValidationError::InvalidEmail {
                field: field("email"),
                value: self.email.clone(),
            });
        }
        require_text(&field("role"), &self.role, ROLE_MAX_CHARS)?;
        Ok(())
    }
}

/// Returns whether `value` has email address syntax.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

fn require_text(field: &str, value: &str, max_chars: usize) -> Result<(), RequestValidationError> {
    if value.trim().is_empty() {
        return Err(RequestValidationError::Blank {
            field: field.to_string(),
        });
    }
    limit_text(field, value, max_chars)
}

fn limit_text(field: &str, value: &str, max_chars: usize) -> Result<(), RequestValidationError> {
    if value.chars().count() > max_chars {
        return Err(RequestValidationError::TooLong {
            field: field.to_string(),
            max_chars,
        });
    }
    Ok(())
}

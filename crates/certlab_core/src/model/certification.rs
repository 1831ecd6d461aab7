//! Certification records and drafts.
//!
//! # Invariants
//! - New certifications start with status [`DEFAULT_STATUS`].
//! - `persons` is populated in roster order by reads and by the create
//!   workflow; it is empty on a freshly saved certification.

use crate::model::person::Person;
use crate::model::request::CreateCertificationRequest;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable certification identifier.
pub type CertificationId = Uuid;

/// Status assigned to every certification created by the workflow.
pub const DEFAULT_STATUS: &str = "active";

/// Persisted certification with its roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certification {
    pub id: CertificationId,
    pub title: String,
    pub institution: String,
    pub issue_date: NaiveDate,
    pub description: Option<String>,
    pub status: String,
    /// Participants in insertion order.
    pub persons: Vec<Person>,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// In-memory certification that has not been saved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationDraft {
    pub title: String,
    pub institution: String,
    pub issue_date: NaiveDate,
    pub description: Option<String>,
    pub status: String,
}

impl CertificationDraft {
    /// Builds the draft for a create request with status `active`.
    pub fn from_request(request: &CreateCertificationRequest) -> Self {
        Self {
            title: request.title.clone(),
            institution: request.institution.clone(),
            issue_date: request.issue_date,
            description: request.description.clone(),
            status: DEFAULT_STATUS.to_string(),
        }
    }

    /// Turns the draft into a record once the store assigned identity and
    /// timestamps.
    pub fn into_saved(self, id: CertificationId, created_at: i64, updated_at: i64) -> Certification {
        Certification {
            id,
            title: self.title,
            institution: self.institution,
            issue_date: self.issue_date,
            description: self.description,
            status: self.status,
            persons: Vec::new(),
            created_at,
            updated_at,
        }
    }
}

//! Person records and drafts.

use crate::model::certification::{Certification, CertificationId};
use crate::model::request::NewPerson;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable person identifier.
pub type PersonId = Uuid;

/// Persisted roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: PersonId,
    pub full_name: String,
    /// Unique across every person in the store.
    pub email: String,
    pub role: String,
    pub certification_id: CertificationId,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// In-memory person that has not been saved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonDraft {
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub certification_id: CertificationId,
}

impl PersonDraft {
    /// Builds the draft for one roster entry of `certification_id`.
    pub fn new(certification_id: CertificationId, input: &NewPerson) -> Self {
        Self {
            full_name: input.full_name.clone(),
            email: input.email.clone(),
            role: input.role.clone(),
            certification_id,
        }
    }

    pub fn into_saved(self, id: PersonId, created_at: i64, updated_at: i64) -> Person {
        Person {
            id,
            full_name: self.full_name,
            email: self.email,
            role: self.role,
            certification_id: self.certification_id,
            created_at,
            updated_at,
        }
    }
}

/// Person read model with its certification loaded eagerly.
///
/// The nested certification carries no roster to keep the shape flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonWithCertification {
    #[serde(flatten)]
    pub person: Person,
    pub certification: Certification,
}

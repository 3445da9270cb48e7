use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bound::Bound;
use crate::history::AccessType;

/// Identifier of a nominal-roll entry (candidate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub i64);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a recorded entry/exit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Site under which events are recorded; sent as a request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EstablishmentId(pub i64);

impl fmt::Display for EstablishmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateDocumentRequest {
    pub document_number: String,
}

/// Registration body; the registry expects the roll id as a string.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterEventRequest {
    #[serde(rename = "nominaId")]
    pub candidate_id: String,
}

impl RegisterEventRequest {
    pub fn for_candidate(candidate_id: CandidateId) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
        }
    }
}

/// Person bound to a roll entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub document_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

impl Operator {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub activity_name: Option<String>,
}

/// Nominal-roll entry returned when a document maps to several assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub income_type: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "actividad")]
    pub activity: Bound<Activity>,
    #[serde(default, rename = "operario")]
    pub operator: Bound<Operator>,
}

impl Candidate {
    pub fn has_bound_identity(&self) -> bool {
        self.operator.is_present()
    }
}

/// Event embedded in validation and registration responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredEvent {
    #[serde(default)]
    pub id: Option<EventId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub access_type: Option<AccessType>,
}

/// Body of the document-validation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationBody {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "nominas")]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default, rename = "ingreso", alias = "data")]
    pub event: Bound<RegisteredEvent>,
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bound::Bound;
use crate::registry::{Candidate, EventId};

/// Direction of a recorded event.
///
/// The registry reports re-entries as a separate code; they count as entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessType {
    Entry,
    Exit,
    Unknown(String),
}

impl AccessType {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "ENTRADA" | "RE_INGRESO" => AccessType::Entry,
            "SALIDA" => AccessType::Exit,
            _ => AccessType::Unknown(code.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            AccessType::Entry => "ENTRADA",
            AccessType::Exit => "SALIDA",
            AccessType::Unknown(code) => code,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccessType::Entry => "entry",
            AccessType::Exit => "exit",
            AccessType::Unknown(_) => "unknown",
        }
    }
}

impl Serialize for AccessType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for AccessType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(AccessType::from_code(&code))
    }
}

/// One row of the establishment's event history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: EventId,
    /// Registry timestamp, `yyyy-MM-ddTHH:mm:ss.ffffff` without offset.
    #[serde(default)]
    pub created_at: Option<String>,
    pub access_type: AccessType,
    #[serde(default)]
    pub pdf_name: Option<String>,
    #[serde(default, rename = "nomina")]
    pub candidate: Bound<Candidate>,
}

impl EventRecord {
    pub fn created_at_local(&self) -> Option<chrono::NaiveDateTime> {
        let raw = self.created_at.as_deref()?;
        chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub last: bool,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub has_previous: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub content: Vec<EventRecord>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_codes_map_to_direction() {
        assert_eq!(AccessType::from_code("ENTRADA"), AccessType::Entry);
        assert_eq!(AccessType::from_code("RE_INGRESO"), AccessType::Entry);
        assert_eq!(AccessType::from_code("SALIDA"), AccessType::Exit);
        assert_eq!(
            AccessType::from_code("VISITA"),
            AccessType::Unknown("VISITA".into())
        );
    }

    #[test]
    fn page_parses_with_missing_candidate() {
        let page: HistoryResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"id": 5, "createdAt": "2024-03-01T08:15:30.123456",
                     "accessType": "SALIDA", "pdfName": null, "nomina": null}
                ],
                "pagination": {"page": 0, "size": 10, "totalElements": 1,
                               "totalPages": 1, "first": true, "last": true,
                               "hasNext": false, "hasPrevious": false}
            }"#,
        )
        .unwrap();

        let record = &page.content[0];
        assert_eq!(record.access_type, AccessType::Exit);
        assert_eq!(record.candidate, Bound::Missing);
        assert!(record.created_at_local().is_some());
        assert!(!page.pagination.has_next);
    }
}

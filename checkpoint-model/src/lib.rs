//! Wire models shared across checkpoint crates.
//!
//! These types mirror the JSON exchanged with the access registry. Nested
//! identity data the registry may omit is carried as [`Bound`] so callers
//! filter it at the boundary instead of probing nullable fields.
#![allow(missing_docs)]

pub mod auth;
pub mod bound;
pub mod history;
pub mod registry;

pub use auth::{LoginRequest, RefreshRequest, TokenGrant};
pub use bound::Bound;
pub use history::{AccessType, EventRecord, HistoryResponse, Pagination};
pub use registry::{
    Activity, Candidate, CandidateId, EstablishmentId, EventId, Operator, RegisterEventRequest,
    RegisteredEvent, ValidateDocumentRequest, ValidationBody,
};

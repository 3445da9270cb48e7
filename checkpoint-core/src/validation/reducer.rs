//! Pure reduction of registry responses into outcomes.

use checkpoint_model::{Candidate, RegisteredEvent, ValidationBody};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CheckpointError;
use crate::gateway::{RegistryResponse, RequestError};

const REGISTERED_MESSAGE: &str = "entry registered";
const UNBOUND_CANDIDATES_MESSAGE: &str = "candidates without identity data";
const NOTHING_FOUND_MESSAGE: &str = "no candidates or events for this document";
const NOT_FOUND_MESSAGE: &str = "operator not found or without active assignments";

/// Status codes the registry uses for each validation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusContract {
    pub multi_candidate: u16,
    pub event_registered: u16,
    pub not_found: u16,
    pub unauthorized: u16,
}

impl Default for StatusContract {
    fn default() -> Self {
        Self {
            multi_candidate: 202,
            event_registered: 201,
            not_found: 404,
            unauthorized: 401,
        }
    }
}

/// Result of one validation or registration exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Exactly one assignment with identity data.
    SingleMatch(Candidate),
    MultipleCandidates(Vec<Candidate>),
    EventRegistered(String),
    Failure(CheckpointError),
}

impl ValidationOutcome {
    /// Outcomes that wait for the operator to pick a candidate.
    pub fn needs_selection(&self) -> bool {
        matches!(
            self,
            ValidationOutcome::SingleMatch(_) | ValidationOutcome::MultipleCandidates(_)
        )
    }
}

fn registered(message: Option<String>) -> ValidationOutcome {
    ValidationOutcome::EventRegistered(
        message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| REGISTERED_MESSAGE.to_string()),
    )
}

fn failure_for_status(
    contract: &StatusContract,
    status: u16,
    message: Option<String>,
) -> ValidationOutcome {
    let failure = if status == contract.not_found {
        CheckpointError::NotFound {
            status,
            message: message.unwrap_or_else(|| NOT_FOUND_MESSAGE.to_string()),
        }
    } else if status == contract.unauthorized {
        CheckpointError::LoggedOut
    } else {
        CheckpointError::ServerRejection {
            status,
            message: message.unwrap_or_else(|| format!("unexpected status {status}")),
        }
    };
    ValidationOutcome::Failure(failure)
}

pub fn reduce_validation(
    contract: &StatusContract,
    response: Result<RegistryResponse<ValidationBody>, RequestError>,
) -> ValidationOutcome {
    let response = match response {
        Ok(response) => response,
        Err(err) => return ValidationOutcome::Failure(err.into()),
    };

    if response.status == contract.event_registered {
        let message = response
            .body
            .and_then(|body| body.message)
            .or(response.message);
        return registered(message);
    }
    if response.status != contract.multi_candidate {
        return failure_for_status(contract, response.status, response.message);
    }

    let body = response.body.unwrap_or_default();
    let has_event = body.event.is_present();
    let candidates = body.candidates.unwrap_or_default();

    if candidates.is_empty() {
        return if has_event {
            registered(body.message)
        } else {
            ValidationOutcome::Failure(CheckpointError::ServerRejection {
                status: response.status,
                message: NOTHING_FOUND_MESSAGE.to_string(),
            })
        };
    }

    let total = candidates.len();
    let mut bound: Vec<Candidate> = candidates
        .into_iter()
        .filter(Candidate::has_bound_identity)
        .collect();
    if bound.len() < total {
        warn!(
            dropped = total - bound.len(),
            "candidates without identity data filtered"
        );
    }

    match bound.len() {
        0 if has_event => registered(body.message),
        0 => ValidationOutcome::Failure(CheckpointError::ServerRejection {
            status: response.status,
            message: UNBOUND_CANDIDATES_MESSAGE.to_string(),
        }),
        1 => ValidationOutcome::SingleMatch(bound.remove(0)),
        _ => ValidationOutcome::MultipleCandidates(bound),
    }
}

pub fn reduce_registration(
    contract: &StatusContract,
    response: Result<RegistryResponse<RegisteredEvent>, RequestError>,
) -> ValidationOutcome {
    match response {
        Ok(response) if response.is_success() => registered(response.message),
        Ok(response) => failure_for_status(contract, response.status, response.message),
        Err(err) => ValidationOutcome::Failure(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use checkpoint_model::{Bound, CandidateId, Operator};

    use super::*;
    use crate::auth::LoggedOut;
    use crate::gateway::TransportError;

    fn candidate(id: i64, bound: bool) -> Candidate {
        Candidate {
            id: CandidateId(id),
            status: "ACTIVO".into(),
            income_type: "OBRA".into(),
            created_at: None,
            activity: Bound::Missing,
            operator: if bound {
                Bound::Present(Operator {
                    id,
                    first_name: "Ana".into(),
                    last_name: "Diaz".into(),
                    document_type: "DNI".into(),
                    document_number: "30111222".into(),
                    email: None,
                    phone: None,
                    date_of_birth: None,
                })
            } else {
                Bound::Missing
            },
        }
    }

    fn validation(
        status: u16,
        candidates: Option<Vec<Candidate>>,
        event: Option<RegisteredEvent>,
    ) -> Result<RegistryResponse<ValidationBody>, RequestError> {
        Ok(RegistryResponse::new(
            status,
            Some(ValidationBody {
                success: Some(true),
                message: None,
                candidates,
                event: event.into(),
            }),
            None,
        ))
    }

    #[test]
    fn two_bound_candidates() {
        let outcome = reduce_validation(
            &StatusContract::default(),
            validation(202, Some(vec![candidate(1, true), candidate(2, true)]), None),
        );
        match outcome {
            ValidationOutcome::MultipleCandidates(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unbound_candidates_are_filtered() {
        let outcome = reduce_validation(
            &StatusContract::default(),
            validation(202, Some(vec![candidate(1, false), candidate(2, true)]), None),
        );
        assert_eq!(outcome, ValidationOutcome::SingleMatch(candidate(2, true)));
    }

    #[test]
    fn embedded_event_without_candidates() {
        let outcome = reduce_validation(
            &StatusContract::default(),
            validation(202, None, Some(RegisteredEvent::default())),
        );
        assert!(matches!(outcome, ValidationOutcome::EventRegistered(_)));
    }

    #[test]
    fn only_unbound_candidates_fail() {
        let outcome = reduce_validation(
            &StatusContract::default(),
            validation(202, Some(vec![candidate(1, false)]), None),
        );
        assert_eq!(
            outcome,
            ValidationOutcome::Failure(CheckpointError::ServerRejection {
                status: 202,
                message: UNBOUND_CANDIDATES_MESSAGE.into()
            })
        );
    }

    #[test]
    fn registered_status_and_not_found() {
        let contract = StatusContract::default();
        assert!(matches!(
            reduce_validation(&contract, validation(201, None, None)),
            ValidationOutcome::EventRegistered(_)
        ));
        let outcome = reduce_validation(&contract, Ok(RegistryResponse::new(404, None, None)));
        assert_eq!(
            outcome,
            ValidationOutcome::Failure(CheckpointError::NotFound {
                status: 404,
                message: NOT_FOUND_MESSAGE.into()
            })
        );
    }

    #[test]
    fn other_statuses_pass_message_through() {
        let outcome = reduce_validation(
            &StatusContract::default(),
            Ok(RegistryResponse::new(500, None, Some("boom".into()))),
        );
        assert_eq!(
            outcome,
            ValidationOutcome::Failure(CheckpointError::ServerRejection {
                status: 500,
                message: "boom".into()
            })
        );
    }

    #[test]
    fn legacy_contract_is_configurable() {
        let contract = StatusContract {
            multi_candidate: 200,
            ..StatusContract::default()
        };
        let outcome = reduce_validation(
            &contract,
            validation(200, Some(vec![candidate(1, true), candidate(2, true)]), None),
        );
        assert!(matches!(outcome, ValidationOutcome::MultipleCandidates(_)));
    }

    #[test]
    fn request_errors_become_failures() {
        let contract = StatusContract::default();
        assert_eq!(
            reduce_validation(&contract, Err(RequestError::from(LoggedOut))),
            ValidationOutcome::Failure(CheckpointError::LoggedOut)
        );
        assert_eq!(
            reduce_registration(&contract, Err(TransportError::Timeout.into())),
            ValidationOutcome::Failure(CheckpointError::Timeout)
        );
    }

    #[test]
    fn registration_accepts_any_success() {
        let contract = StatusContract::default();
        for status in [200, 201] {
            assert!(matches!(
                reduce_registration(&contract, Ok(RegistryResponse::new(status, None, None))),
                ValidationOutcome::EventRegistered(_)
            ));
        }
        assert!(matches!(
            reduce_registration(&contract, Ok(RegistryResponse::new(409, None, None))),
            ValidationOutcome::Failure(CheckpointError::ServerRejection { status: 409, .. })
        ));
    }
}

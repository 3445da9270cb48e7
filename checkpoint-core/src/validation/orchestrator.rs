//! Scan-to-outcome state machine.
//!
//! The orchestrator performs no I/O. Each [`OrchestratorCommand`] returns the
//! [`OrchestratorEffect`]s the session must carry out; completions come back
//! as commands tagged with the scan and timer they belong to, so responses
//! that outlived their cycle are dropped here.

use std::time::Instant;

use checkpoint_model::{Candidate, CandidateId};
use tracing::{debug, info, warn};

use super::gate::{ScanGate, ScanGateView, ScanId};
use super::reducer::ValidationOutcome;
use crate::error::CheckpointError;
use crate::payload::DocumentNumber;

/// Identifier of one armed timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingValidation {
        scan: ScanId,
        timer: TimerId,
        document: DocumentNumber,
    },
    /// The scan's timeout keeps running while the operator chooses.
    SelectingCandidate {
        scan: ScanId,
        timer: TimerId,
        candidates: Vec<Candidate>,
    },
    AwaitingRegistration {
        scan: ScanId,
        timer: TimerId,
        candidate: CandidateId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorCommand {
    DocumentScanned {
        document: DocumentNumber,
        at: Instant,
    },
    ValidationCompleted {
        scan: ScanId,
        outcome: ValidationOutcome,
    },
    CandidateChosen {
        candidate: CandidateId,
    },
    CandidatesDismissed,
    RegistrationCompleted {
        scan: ScanId,
        outcome: ValidationOutcome,
    },
    TimedOut {
        timer: TimerId,
    },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEffect {
    ArmTimeout { timer: TimerId },
    CancelTimeout { timer: TimerId },
    Validate { scan: ScanId, document: DocumentNumber },
    Register { scan: ScanId, candidate: CandidateId },
    Publish(ValidationOutcome),
    /// A new event exists; the history head should be refreshed.
    EventRecorded,
}

#[derive(Debug)]
pub struct Orchestrator {
    phase: Phase,
    gate: ScanGate,
    next_timer: u64,
}

impl Orchestrator {
    pub fn new(gate: ScanGate) -> Self {
        Self {
            phase: Phase::Idle,
            gate,
            next_timer: 0,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn gate_view(&self) -> ScanGateView {
        self.gate.view()
    }

    pub fn handle(&mut self, command: OrchestratorCommand) -> Vec<OrchestratorEffect> {
        use OrchestratorCommand as C;

        match command {
            C::DocumentScanned { document, at } => self.on_scanned(document, at),
            C::ValidationCompleted { scan, outcome } => self.on_validation(scan, outcome),
            C::CandidateChosen { candidate } => self.on_candidate(candidate),
            C::CandidatesDismissed => self.on_dismissed(),
            C::RegistrationCompleted { scan, outcome } => self.on_registration(scan, outcome),
            C::TimedOut { timer } => self.on_timeout(timer),
            C::Reset => self.reset(),
        }
    }

    fn arm_timer(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }

    fn on_scanned(&mut self, document: DocumentNumber, at: Instant) -> Vec<OrchestratorEffect> {
        if self.phase != Phase::Idle {
            debug!(document = %document, "scan ignored, cycle in progress");
            return Vec::new();
        }
        let scan = match self.gate.try_acquire(at) {
            Ok(scan) => scan,
            Err(refusal) => {
                debug!(?refusal, document = %document, "scan gate refused");
                return Vec::new();
            }
        };

        let timer = self.arm_timer();
        info!(scan = scan.0, document = %document, "validating document");
        self.phase = Phase::AwaitingValidation {
            scan,
            timer,
            document: document.clone(),
        };
        vec![
            OrchestratorEffect::ArmTimeout { timer },
            OrchestratorEffect::Validate { scan, document },
        ]
    }

    fn on_validation(&mut self, scan: ScanId, outcome: ValidationOutcome) -> Vec<OrchestratorEffect> {
        let timer = match &self.phase {
            Phase::AwaitingValidation {
                scan: current,
                timer,
                ..
            } if *current == scan => *timer,
            _ => {
                debug!(scan = scan.0, "stale validation response dropped");
                return Vec::new();
            }
        };

        let mut effects = Vec::new();
        match &outcome {
            ValidationOutcome::SingleMatch(candidate) => {
                self.phase = Phase::SelectingCandidate {
                    scan,
                    timer,
                    candidates: vec![candidate.clone()],
                };
            }
            ValidationOutcome::MultipleCandidates(candidates) => {
                self.phase = Phase::SelectingCandidate {
                    scan,
                    timer,
                    candidates: candidates.clone(),
                };
            }
            _ => {
                effects.push(OrchestratorEffect::CancelTimeout { timer });
                self.finish(scan, &outcome, &mut effects);
            }
        }
        effects.push(OrchestratorEffect::Publish(outcome));
        effects
    }

    fn on_candidate(&mut self, candidate: CandidateId) -> Vec<OrchestratorEffect> {
        let (scan, selection_timer) = match &self.phase {
            Phase::SelectingCandidate {
                scan,
                timer,
                candidates,
            } if candidates.iter().any(|c| c.id == candidate) => (*scan, *timer),
            Phase::SelectingCandidate { .. } => {
                warn!(candidate = %candidate, "candidate not offered for this scan");
                return Vec::new();
            }
            _ => {
                debug!(candidate = %candidate, "no candidate selection pending");
                return Vec::new();
            }
        };

        let timer = self.arm_timer();
        info!(scan = scan.0, candidate = %candidate, "registering event");
        self.phase = Phase::AwaitingRegistration {
            scan,
            timer,
            candidate,
        };
        vec![
            OrchestratorEffect::CancelTimeout {
                timer: selection_timer,
            },
            OrchestratorEffect::ArmTimeout { timer },
            OrchestratorEffect::Register { scan, candidate },
        ]
    }

    fn on_dismissed(&mut self) -> Vec<OrchestratorEffect> {
        let Phase::SelectingCandidate { scan, timer, .. } = self.phase else {
            return Vec::new();
        };
        debug!(scan = scan.0, "candidate selection dismissed");
        self.phase = Phase::Idle;
        self.gate.release();
        vec![OrchestratorEffect::CancelTimeout { timer }]
    }

    fn on_registration(
        &mut self,
        scan: ScanId,
        outcome: ValidationOutcome,
    ) -> Vec<OrchestratorEffect> {
        let timer = match &self.phase {
            Phase::AwaitingRegistration {
                scan: current,
                timer,
                ..
            } if *current == scan => *timer,
            _ => {
                debug!(scan = scan.0, "stale registration response dropped");
                return Vec::new();
            }
        };

        let mut effects = vec![OrchestratorEffect::CancelTimeout { timer }];
        self.finish(scan, &outcome, &mut effects);
        effects.push(OrchestratorEffect::Publish(outcome));
        effects
    }

    fn on_timeout(&mut self, fired: TimerId) -> Vec<OrchestratorEffect> {
        let scan = match &self.phase {
            Phase::AwaitingValidation { scan, timer, .. }
            | Phase::SelectingCandidate { scan, timer, .. }
            | Phase::AwaitingRegistration { scan, timer, .. }
                if *timer == fired =>
            {
                *scan
            }
            _ => return Vec::new(),
        };

        warn!(scan = scan.0, "scan timed out");
        let outcome = ValidationOutcome::Failure(CheckpointError::Timeout);
        let mut effects = Vec::new();
        self.finish(scan, &outcome, &mut effects);
        effects.push(OrchestratorEffect::Publish(outcome));
        effects
    }

    fn reset(&mut self) -> Vec<OrchestratorEffect> {
        let effects = match &self.phase {
            Phase::AwaitingValidation { timer, .. }
            | Phase::SelectingCandidate { timer, .. }
            | Phase::AwaitingRegistration { timer, .. } => {
                vec![OrchestratorEffect::CancelTimeout { timer: *timer }]
            }
            Phase::Idle => Vec::new(),
        };
        self.phase = Phase::Idle;
        self.gate.release();
        effects
    }

    /// Terminal outcome: back to idle with the gate re-armed.
    fn finish(
        &mut self,
        scan: ScanId,
        outcome: &ValidationOutcome,
        effects: &mut Vec<OrchestratorEffect>,
    ) {
        self.phase = Phase::Idle;
        self.gate.release();
        match outcome {
            ValidationOutcome::EventRegistered(message) => {
                info!(scan = scan.0, %message, "event registered");
                effects.push(OrchestratorEffect::EventRecorded);
            }
            ValidationOutcome::Failure(err) => {
                info!(scan = scan.0, error = %err, "scan failed");
            }
            _ => {}
        }
    }
}

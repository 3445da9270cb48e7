//! Checkpoint session: the control context.
//!
//! One task owns the [`Orchestrator`] and the [`HistoryFeed`] and is the only
//! writer of the scan gate. Callers talk to it through [`CheckpointSession`];
//! network calls and timers run as separate tasks that post their results
//! back as commands. Results arriving after teardown are dropped with the
//! channel.

use std::collections::HashMap;
use std::time::Duration;

use checkpoint_model::{CandidateId, EstablishmentId, HistoryResponse};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CheckpointError;
use crate::frame::{CameraSource, FramePipeline, PipelineEvent};
use crate::gateway::AuthorizedRegistry;
use crate::history::{DEFAULT_PAGE_SIZE, DEFAULT_SORT, HistoryFeed, HistoryFetch, HistorySnapshot};
use crate::payload::{self, DocumentNumber, ParseRejection};
use crate::validation::{
    Orchestrator, OrchestratorCommand, OrchestratorEffect, ScanGate, ScanGateView, ScanId,
    StatusContract, TimerId, ValidationOutcome, reduce_registration, reduce_validation,
};

/// Tuning of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub establishment: EstablishmentId,
    pub contract: StatusContract,
    pub scan_timeout: Duration,
    /// Minimum spacing between two validation cycles.
    pub scan_spacing: Duration,
    /// Delay before the history head is refreshed after a registration.
    pub history_refresh_delay: Duration,
    pub page_size: u32,
    pub sort: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            establishment: EstablishmentId(1),
            contract: StatusContract::default(),
            scan_timeout: Duration::from_secs(10),
            scan_spacing: Duration::from_millis(2000),
            history_refresh_delay: Duration::from_millis(500),
            page_size: DEFAULT_PAGE_SIZE,
            sort: DEFAULT_SORT.to_string(),
        }
    }
}

/// Published to whoever renders the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Outcome(ValidationOutcome),
    History(HistorySnapshot),
    DecodeFailed(String),
    /// The credential is gone; a new login is required.
    LoggedOut,
}

#[derive(Debug)]
enum SessionCommand {
    Scan(DocumentNumber),
    DecodeFailed(String),
    Choose(CandidateId),
    Dismiss,
    LoadInitial,
    LoadMore,
    PrependLatest,
    ValidationDone {
        scan: ScanId,
        outcome: ValidationOutcome,
    },
    RegistrationDone {
        scan: ScanId,
        outcome: ValidationOutcome,
    },
    TimedOut(TimerId),
    HistoryDone {
        fetch: HistoryFetch,
        result: Result<HistoryResponse, CheckpointError>,
    },
    Teardown,
}

struct AttachedScanner {
    camera: Box<dyn CameraSource>,
    pipeline: FramePipeline,
    forwarder: JoinHandle<()>,
}

/// Handle on a running session.
pub struct CheckpointSession {
    commands: UnboundedSender<SessionCommand>,
    gate: ScanGateView,
    control: Option<JoinHandle<()>>,
    scanner: Option<AttachedScanner>,
}

impl std::fmt::Debug for CheckpointSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointSession")
            .field("gate_busy", &self.gate.is_busy())
            .field("running", &self.control.is_some())
            .field("scanner_attached", &self.scanner.is_some())
            .finish()
    }
}

impl CheckpointSession {
    /// Spawns the control task. Must be called inside a tokio runtime.
    pub fn start(
        registry: AuthorizedRegistry,
        settings: SessionSettings,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        let orchestrator = Orchestrator::new(ScanGate::new(settings.scan_spacing));
        let gate = orchestrator.gate_view();
        let actor = SessionActor {
            feed: HistoryFeed::new(settings.page_size, settings.sort.clone()),
            orchestrator,
            registry,
            settings,
            events,
            commands: commands.clone(),
            timers: HashMap::new(),
            delayed_refresh: None,
        };
        let control = tokio::spawn(actor.run(command_rx));

        (
            Self {
                commands,
                gate,
                control: Some(control),
                scanner: None,
            },
            event_rx,
        )
    }

    /// Gate view for a frame pipeline feeding this session.
    pub fn gate_view(&self) -> ScanGateView {
        self.gate.clone()
    }

    /// Hands the camera and its pipeline to the session, which forwards
    /// pipeline events and stops both at teardown.
    pub fn attach_scanner(
        &mut self,
        camera: Box<dyn CameraSource>,
        pipeline: FramePipeline,
        mut pipeline_events: UnboundedReceiver<PipelineEvent>,
    ) {
        let commands = self.commands.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = pipeline_events.recv().await {
                if let Some(command) = command_for(event)
                    && commands.send(command).is_err()
                {
                    break;
                }
            }
        });
        self.scanner = Some(AttachedScanner {
            camera,
            pipeline,
            forwarder,
        });
    }

    pub fn pipeline(&self) -> Option<&FramePipeline> {
        self.scanner.as_ref().map(|scanner| &scanner.pipeline)
    }

    /// Typed-in or wedge-reader payload. Parse rejections are returned and
    /// leave the gate untouched.
    pub fn submit_payload(&self, raw: &str) -> Result<DocumentNumber, ParseRejection> {
        let document = payload::parse_lenient(raw)?.document_number().clone();
        self.send(SessionCommand::Scan(document.clone()));
        Ok(document)
    }

    pub fn handle_pipeline_event(&self, event: PipelineEvent) {
        if let Some(command) = command_for(event) {
            self.send(command);
        }
    }

    pub fn register_for_candidate(&self, candidate: CandidateId) {
        self.send(SessionCommand::Choose(candidate));
    }

    pub fn dismiss_candidates(&self) {
        self.send(SessionCommand::Dismiss);
    }

    pub fn load_initial(&self) {
        self.send(SessionCommand::LoadInitial);
    }

    pub fn load_more(&self) {
        self.send(SessionCommand::LoadMore);
    }

    pub fn prepend_latest(&self) {
        self.send(SessionCommand::PrependLatest);
    }

    /// Stops the camera, cancels pending timers and drops in-flight results.
    pub async fn teardown(mut self) {
        self.send(SessionCommand::Teardown);
        if let Some(control) = self.control.take()
            && let Err(err) = control.await
        {
            warn!(error = %err, "session control task failed");
        }

        if let Some(AttachedScanner {
            mut camera,
            mut pipeline,
            forwarder,
        }) = self.scanner.take()
        {
            camera.stop();
            forwarder.abort();
            if let Err(err) = tokio::task::spawn_blocking(move || pipeline.shutdown()).await {
                warn!(error = %err, "frame pipeline shutdown failed");
            }
        }
        info!("checkpoint session torn down");
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("session already stopped");
        }
    }
}

fn command_for(event: PipelineEvent) -> Option<SessionCommand> {
    match event {
        PipelineEvent::Decoded { raw, record } => {
            let document = match record {
                Some(record) => Ok(record.document_number().clone()),
                None => payload::parse_lenient(&raw).map(|parsed| parsed.document_number().clone()),
            };
            match document {
                Ok(document) => Some(SessionCommand::Scan(document)),
                Err(rejection) => {
                    debug!(%rejection, "decoded payload rejected");
                    None
                }
            }
        }
        PipelineEvent::DecodeFailed { message } => Some(SessionCommand::DecodeFailed(message)),
    }
}

struct SessionActor {
    orchestrator: Orchestrator,
    feed: HistoryFeed,
    registry: AuthorizedRegistry,
    settings: SessionSettings,
    events: UnboundedSender<SessionEvent>,
    commands: UnboundedSender<SessionCommand>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    delayed_refresh: Option<JoinHandle<()>>,
}

impl SessionActor {
    async fn run(mut self, mut commands: UnboundedReceiver<SessionCommand>) {
        while let Some(command) = commands.recv().await {
            if matches!(command, SessionCommand::Teardown) {
                self.shutdown();
                break;
            }
            self.handle(command);
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        use OrchestratorCommand as C;

        match command {
            SessionCommand::Scan(document) => {
                let at = tokio::time::Instant::now().into_std();
                self.drive(C::DocumentScanned { document, at });
            }
            SessionCommand::DecodeFailed(message) => {
                self.publish(SessionEvent::DecodeFailed(message));
            }
            SessionCommand::Choose(candidate) => self.drive(C::CandidateChosen { candidate }),
            SessionCommand::Dismiss => self.drive(C::CandidatesDismissed),
            SessionCommand::ValidationDone { scan, outcome } => {
                self.drive(C::ValidationCompleted { scan, outcome })
            }
            SessionCommand::RegistrationDone { scan, outcome } => {
                self.drive(C::RegistrationCompleted { scan, outcome })
            }
            SessionCommand::TimedOut(timer) => {
                self.timers.remove(&timer);
                self.drive(C::TimedOut { timer });
            }
            SessionCommand::LoadInitial => {
                let fetch = self.feed.begin_initial();
                self.publish(SessionEvent::History(self.feed.snapshot()));
                self.spawn_history(fetch);
            }
            SessionCommand::LoadMore => {
                if let Some(fetch) = self.feed.begin_more() {
                    self.spawn_history(fetch);
                }
            }
            SessionCommand::PrependLatest => {
                if let Some(fetch) = self.feed.begin_latest() {
                    self.spawn_history(fetch);
                }
            }
            SessionCommand::HistoryDone { fetch, result } => self.on_history(fetch, result),
            SessionCommand::Teardown => {}
        }
    }

    fn drive(&mut self, command: OrchestratorCommand) {
        for effect in self.orchestrator.handle(command) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: OrchestratorEffect) {
        match effect {
            OrchestratorEffect::ArmTimeout { timer } => {
                let commands = self.commands.clone();
                let budget = self.settings.scan_timeout;
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(budget).await;
                    let _ = commands.send(SessionCommand::TimedOut(timer));
                });
                self.timers.insert(timer, handle);
            }
            OrchestratorEffect::CancelTimeout { timer } => {
                if let Some(handle) = self.timers.remove(&timer) {
                    handle.abort();
                }
            }
            OrchestratorEffect::Validate { scan, document } => {
                let registry = self.registry.clone();
                let commands = self.commands.clone();
                let establishment = self.settings.establishment;
                let contract = self.settings.contract;
                tokio::spawn(async move {
                    let response = registry
                        .validate_document(establishment, document.as_str())
                        .await;
                    let outcome = reduce_validation(&contract, response);
                    let _ = commands.send(SessionCommand::ValidationDone { scan, outcome });
                });
            }
            OrchestratorEffect::Register { scan, candidate } => {
                let registry = self.registry.clone();
                let commands = self.commands.clone();
                let establishment = self.settings.establishment;
                let contract = self.settings.contract;
                tokio::spawn(async move {
                    let response = registry.register_event(establishment, candidate).await;
                    let outcome = reduce_registration(&contract, response);
                    let _ = commands.send(SessionCommand::RegistrationDone { scan, outcome });
                });
            }
            OrchestratorEffect::Publish(outcome) => {
                let logged_out =
                    matches!(&outcome, ValidationOutcome::Failure(CheckpointError::LoggedOut));
                self.publish(SessionEvent::Outcome(outcome));
                if logged_out {
                    self.publish(SessionEvent::LoggedOut);
                }
            }
            OrchestratorEffect::EventRecorded => {
                let commands = self.commands.clone();
                let delay = self.settings.history_refresh_delay;
                if let Some(previous) = self.delayed_refresh.take() {
                    previous.abort();
                }
                self.delayed_refresh = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = commands.send(SessionCommand::PrependLatest);
                }));
            }
        }
    }

    fn spawn_history(&self, fetch: HistoryFetch) {
        let registry = self.registry.clone();
        let commands = self.commands.clone();
        let establishment = self.settings.establishment;
        tokio::spawn(async move {
            let result = match registry.fetch_history(establishment, &fetch.query).await {
                Ok(response) if response.is_success() => {
                    Ok(response.body.unwrap_or_default())
                }
                Ok(response) => Err(CheckpointError::ServerRejection {
                    status: response.status,
                    message: response
                        .message
                        .unwrap_or_else(|| format!("history request failed: {}", response.status)),
                }),
                Err(err) => Err(CheckpointError::from(err)),
            };
            let _ = commands.send(SessionCommand::HistoryDone { fetch, result });
        });
    }

    fn on_history(
        &mut self,
        fetch: HistoryFetch,
        result: Result<HistoryResponse, CheckpointError>,
    ) {
        let changed = match result {
            Ok(response) => self.feed.complete(&fetch, response),
            Err(err) => {
                let logged_out = err == CheckpointError::LoggedOut;
                let changed = self.feed.fail(&fetch, err.to_string());
                if logged_out {
                    self.publish(SessionEvent::LoggedOut);
                }
                changed
            }
        };
        if changed {
            self.publish(SessionEvent::History(self.feed.snapshot()));
        }
    }

    fn shutdown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        if let Some(refresh) = self.delayed_refresh.take() {
            refresh.abort();
        }
        self.orchestrator.handle(OrchestratorCommand::Reset);
        debug!("session control loop stopped");
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("session event receiver dropped");
        }
    }
}

//! `checkpoint` command-line front end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use checkpoint_config::{CheckpointConfig, ConfigLoad, ConfigLoader};
use checkpoint_core::auth::CredentialManager;
use checkpoint_core::frame::{FrameDisposition, FramePipeline, start_camera};
use checkpoint_core::gateway::AuthorizedRegistry;
use checkpoint_core::history::{FeedStatus, HistorySnapshot};
use checkpoint_core::validation::ValidationOutcome;
use checkpoint_core::{CheckpointSession, SessionEvent};
use checkpoint_model::{Candidate, CandidateId, EventRecord};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password, Select};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::decoder::ExternalCommandDecoder;
use crate::frames::ImageDirectorySource;
use crate::host;
use crate::infrastructure::{ApiClient, ClientRoles};
use crate::storage::FileStore;

#[derive(Parser, Debug)]
#[command(name = "checkpoint")]
#[command(about = "Site-access checkpoint: scan IDs, validate and record entries")]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Environment file loaded before the configuration
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the credential
    Login {
        /// Email or document number; prompted when omitted
        #[arg(long)]
        identifier: Option<String>,
        /// Password; prompted when omitted
        #[arg(long, env = "CHECKPOINT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored credential
    Logout,
    /// Show configuration, credential and device tier
    Status,
    /// Validate payloads typed or sent by a keyboard-wedge reader (one per line)
    Scan {
        /// Single payload; stdin is read when omitted
        payload: Option<String>,
    },
    /// Decode frames from images dropped into a directory
    Watch {
        dir: PathBuf,
        /// Directory polling interval in milliseconds
        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },
    /// Print the establishment's event history
    History {
        /// Number of pages to print
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
}

struct Runtime {
    config: CheckpointConfig,
    client: Arc<ApiClient>,
    credentials: CredentialManager,
}

pub async fn run(cli: Cli) -> Result<()> {
    let runtime = bootstrap(&cli).await?;
    match cli.command {
        Command::Login {
            identifier,
            password,
        } => login(&runtime, identifier, password).await,
        Command::Logout => {
            runtime
                .credentials
                .logout()
                .await
                .context("failed to clear stored credential")?;
            println!("Logged out");
            Ok(())
        }
        Command::Status => status(&runtime),
        Command::Scan { payload } => scan(&runtime, payload).await,
        Command::Watch { dir, poll_ms } => watch(&runtime, dir, poll_ms).await,
        Command::History { pages } => history(&runtime, pages).await,
    }
}

async fn bootstrap(cli: &Cli) -> Result<Runtime> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad {
        config,
        source,
        env_file_loaded,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if env_file_loaded {
        info!("loaded .env file");
    }
    debug!(?source, "configuration source");
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }

    let roles = ClientRoles {
        guard: config.registry.guard_role.clone(),
        history: config.registry.history_role.clone(),
    };
    let client = Arc::new(
        ApiClient::new(
            config.registry.base_url()?,
            config.registry.request_timeout(),
            roles,
        )
        .context("failed to build registry client")?,
    );

    let store = match &config.storage.credential_path {
        Some(path) => FileStore::new(path),
        None => FileStore::in_data_dir()?,
    };
    debug!(path = %store.path().display(), "credential store");
    let credentials = CredentialManager::new(Arc::new(store), client.clone());
    credentials
        .restore()
        .await
        .context("failed to restore stored credential")?;

    Ok(Runtime {
        config,
        client,
        credentials,
    })
}

async fn login(
    runtime: &Runtime,
    identifier: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let identifier = match identifier {
        Some(identifier) => identifier,
        None => {
            prompt(|| {
                Input::<String>::new()
                    .with_prompt("Email or document number")
                    .interact_text()
            })
            .await?
        }
    };
    let password = match password {
        Some(password) => password,
        None => prompt(|| Password::new().with_prompt("Password").interact()).await?,
    };

    runtime
        .credentials
        .login(runtime.client.as_ref(), &identifier, &password)
        .await
        .context("login failed")?;
    println!("Logged in");
    Ok(())
}

fn status(runtime: &Runtime) -> Result<()> {
    let registry = &runtime.config.registry;
    println!("Registry:       {}", registry.base_url()?);
    println!("Establishment:  {}", registry.establishment());

    let credential = match (
        runtime.credentials.current_access_token(),
        runtime.credentials.is_logged_in(),
    ) {
        (None, _) => "not logged in",
        (Some(_), true) => "logged in",
        (Some(_), false) => "logged in (token expired, refreshed on next request)",
    };
    println!("Credential:     {credential}");

    let host = host::detect();
    let profile = runtime.config.scanner.pipeline_profile(&host);
    println!(
        "Device:         {} cores, {} {}",
        host.logical_cores, host.manufacturer, host.model
    );
    println!(
        "Pipeline:       {:?} tier, {} at {} ms",
        profile.tier,
        profile.resolution,
        profile.throttle.as_millis()
    );
    Ok(())
}

fn require_login(runtime: &Runtime) -> Result<()> {
    if runtime.credentials.current_access_token().is_none() {
        bail!("not logged in; run `checkpoint login` first");
    }
    Ok(())
}

fn start_session(runtime: &Runtime) -> (CheckpointSession, UnboundedReceiver<SessionEvent>) {
    let registry = AuthorizedRegistry::new(
        runtime.client.clone(),
        runtime.credentials.clone(),
        runtime.config.registry.statuses.unauthorized,
    );
    CheckpointSession::start(registry, runtime.config.session_settings())
}

/// What the front end does after one session event.
enum Flow {
    /// The scan cycle is still open.
    Pending,
    /// The cycle ended; ready for the next scan.
    Settled,
    /// The credential is gone.
    LoggedOut,
}

async fn on_event(session: &CheckpointSession, event: SessionEvent) -> Result<Flow> {
    match event {
        SessionEvent::Outcome(outcome) => on_outcome(session, outcome).await,
        SessionEvent::History(snapshot) => {
            if let Some(latest) = snapshot.page.items.first() {
                debug!(id = %latest.id, "history head updated");
            }
            Ok(Flow::Pending)
        }
        SessionEvent::DecodeFailed(message) => {
            debug!(%message, "frame decode failed");
            Ok(Flow::Pending)
        }
        SessionEvent::LoggedOut => {
            eprintln!("Session expired; run `checkpoint login` again");
            Ok(Flow::LoggedOut)
        }
    }
}

async fn on_outcome(session: &CheckpointSession, outcome: ValidationOutcome) -> Result<Flow> {
    match outcome {
        ValidationOutcome::SingleMatch(candidate) => {
            select_candidate(session, vec![candidate]).await
        }
        ValidationOutcome::MultipleCandidates(candidates) => {
            select_candidate(session, candidates).await
        }
        ValidationOutcome::EventRegistered(message) => {
            println!("✔ {message}");
            Ok(Flow::Settled)
        }
        ValidationOutcome::Failure(err) => {
            println!("✘ {err}");
            Ok(Flow::Settled)
        }
    }
}

async fn select_candidate(session: &CheckpointSession, candidates: Vec<Candidate>) -> Result<Flow> {
    match choose(candidates).await? {
        Some(candidate) => {
            session.register_for_candidate(candidate);
            Ok(Flow::Pending)
        }
        None => {
            session.dismiss_candidates();
            println!("Cancelled");
            Ok(Flow::Settled)
        }
    }
}

async fn choose(candidates: Vec<Candidate>) -> Result<Option<CandidateId>> {
    prompt(move || {
        let mut labels: Vec<String> = candidates.iter().map(candidate_label).collect();
        labels.push("Cancel".to_string());
        let choice = Select::new()
            .with_prompt("Select the assignment to register")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        Ok::<_, dialoguer::Error>(
            choice
                .filter(|index| *index < candidates.len())
                .map(|index| candidates[index].id),
        )
    })
    .await
}

fn candidate_label(candidate: &Candidate) -> String {
    let name = candidate
        .operator
        .as_present()
        .map(|operator| operator.full_name())
        .unwrap_or_else(|| "unknown operator".to_string());
    let activity = candidate
        .activity
        .as_present()
        .and_then(|activity| activity.activity_name.as_deref())
        .unwrap_or("no activity");
    format!(
        "{name} - {activity} - {} ({})",
        candidate.income_type, candidate.status
    )
}

/// Runs a blocking terminal prompt off the runtime threads.
async fn prompt<T, F, E>(interact: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    E: Into<anyhow::Error>,
{
    tokio::task::spawn_blocking(move || interact().map_err(Into::into))
        .await
        .map_err(|err| anyhow!("prompt task failed: {err}"))?
}

async fn scan(runtime: &Runtime, payload: Option<String>) -> Result<()> {
    require_login(runtime)?;
    let (session, mut events) = start_session(runtime);
    let settings = runtime.config.session_settings();
    // The session answers within its own timeout; silence means the gate refused.
    let quiet_limit = settings.scan_timeout + Duration::from_secs(1);

    let (lines_tx, mut lines) = mpsc::unbounded_channel();
    match payload {
        Some(payload) => {
            let _ = lines_tx.send(payload);
            drop(lines_tx);
        }
        None => {
            tokio::spawn(async move {
                let mut stdin = BufReader::new(tokio::io::stdin()).lines();
                while let Ok(Some(line)) = stdin.next_line().await {
                    if lines_tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
    }

    let mut logged_out = false;
    while let Some(line) = lines.recv().await {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        match session.submit_payload(line) {
            Ok(document) => println!("Validating {}", document.grouped()),
            Err(rejection) => {
                println!("✘ unreadable payload: {rejection}");
                continue;
            }
        }

        match run_cycle(&session, &mut events, quiet_limit).await {
            Ok(Flow::LoggedOut) => {
                logged_out = true;
                break;
            }
            Ok(_) => {}
            Err(err) => {
                session.teardown().await;
                return Err(err);
            }
        }
        // The gate stays closed for the spacing window after each cycle.
        tokio::time::sleep(settings.scan_spacing).await;
    }

    session.teardown().await;
    if logged_out {
        bail!("logged out");
    }
    Ok(())
}

async fn run_cycle(
    session: &CheckpointSession,
    events: &mut UnboundedReceiver<SessionEvent>,
    quiet_limit: Duration,
) -> Result<Flow> {
    loop {
        let event = match tokio::time::timeout(quiet_limit, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(anyhow!("session stopped unexpectedly")),
            Err(_) => {
                println!("✘ scan ignored, too soon after the previous one");
                return Ok(Flow::Settled);
            }
        };
        match on_event(session, event).await? {
            Flow::Pending => continue,
            flow => return Ok(flow),
        }
    }
}

async fn watch(runtime: &Runtime, dir: PathBuf, poll_ms: u64) -> Result<()> {
    require_login(runtime)?;
    let (mut session, mut events) = start_session(runtime);

    let host = host::detect();
    let profile = runtime.config.scanner.pipeline_profile(&host);
    let (source, mut frames) = ImageDirectorySource::new(&dir, Duration::from_millis(poll_ms));
    let mut camera = Box::new(source);
    let started = start_camera(camera.as_mut(), profile).context("failed to start frame source")?;
    if started.degraded {
        warn!(resolution = %started.profile.resolution, "running with the minimal camera profile");
    }

    let decoder = ExternalCommandDecoder::new(runtime.config.scanner.decoder.clone());
    let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
    let pipeline = FramePipeline::spawn(started.profile, decoder, session.gate_view(), pipeline_tx)
        .context("failed to start decode worker")?;
    session.attach_scanner(camera, pipeline, pipeline_rx);
    println!("Watching {} (Ctrl-C to stop)", dir.display());

    let mut logged_out = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(frame) = frames.recv() => {
                if let Some(pipeline) = session.pipeline()
                    && let FrameDisposition::Rejected(reason) = pipeline.on_frame(frame)
                {
                    debug!(?reason, "frame rejected");
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Flow::LoggedOut = on_event(&session, event).await? {
                    logged_out = true;
                    break;
                }
            }
        }
    }

    session.teardown().await;
    if logged_out {
        bail!("logged out");
    }
    Ok(())
}

async fn history(runtime: &Runtime, pages: u32) -> Result<()> {
    require_login(runtime)?;
    let (session, mut events) = start_session(runtime);

    session.load_initial();
    let mut snapshot = next_history(&mut events).await?;
    let mut printed = print_records(&snapshot, 0);

    for _ in 1..pages.max(1) {
        if !snapshot.page.has_more || matches!(snapshot.status, FeedStatus::Failed(_)) {
            break;
        }
        session.load_more();
        snapshot = next_history(&mut events).await?;
        printed = print_records(&snapshot, printed);
    }

    match &snapshot.status {
        FeedStatus::Empty => println!("No events recorded yet"),
        FeedStatus::Failed(message) if printed > 0 => {
            println!("✘ history incomplete after {printed} events: {message}")
        }
        FeedStatus::Failed(message) => println!("✘ history unavailable: {message}"),
        _ => println!(
            "{printed} of {} events{}",
            snapshot.page.total_count,
            if snapshot.page.has_more { ", more available" } else { "" }
        ),
    }

    session.teardown().await;
    Ok(())
}

async fn next_history(events: &mut UnboundedReceiver<SessionEvent>) -> Result<HistorySnapshot> {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::History(snapshot) if snapshot.status != FeedStatus::Loading => {
                return Ok(snapshot);
            }
            SessionEvent::LoggedOut => bail!("session expired; run `checkpoint login` again"),
            _ => {}
        }
    }
    Err(anyhow!("session stopped before the history arrived"))
}

fn print_records(snapshot: &HistorySnapshot, already_printed: usize) -> usize {
    for record in snapshot.page.items.iter().skip(already_printed) {
        println!("{}", record_line(record));
    }
    snapshot.page.items.len()
}

fn record_line(record: &EventRecord) -> String {
    let when = record
        .created_at_local()
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let candidate = record.candidate.as_present();
    let operator = candidate.and_then(|candidate| candidate.operator.as_present());
    let name = operator.map(|operator| operator.full_name()).unwrap_or_default();
    let document = operator
        .map(|operator| operator.document_number.as_str())
        .unwrap_or_default();
    let activity = candidate
        .and_then(|candidate| candidate.activity.as_present())
        .and_then(|activity| activity.activity_name.as_deref())
        .unwrap_or_default();
    format!(
        "#{:<6} {when}  {:<6} {name} ({document}) {activity}",
        record.id,
        record.access_type.label()
    )
}

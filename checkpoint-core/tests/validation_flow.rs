//! End-to-end scan cycles through the session control task.

mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use checkpoint_core::gateway::{AuthorizedRegistry, RegistryResponse};
use checkpoint_core::history::FeedStatus;
use checkpoint_core::payload::ParseRejection;
use checkpoint_core::validation::ValidationOutcome;
use checkpoint_core::{CheckpointError, CheckpointSession, SessionEvent, SessionSettings};
use checkpoint_model::{Bound, CandidateId, RegisteredEvent, ValidationBody};
use support::{
    Call, CountingRefresher, FakeRegistry, PAYLOAD, Reply, candidate, candidates_body, logged_in,
    page, record,
};
use tokio::sync::mpsc::UnboundedReceiver;

async fn session(api: Arc<FakeRegistry>) -> (CheckpointSession, UnboundedReceiver<SessionEvent>) {
    let credentials = logged_in(CountingRefresher::failing(), "token").await;
    let registry = AuthorizedRegistry::new(api, credentials, 401);
    let settings = SessionSettings {
        scan_spacing: Duration::ZERO,
        ..SessionSettings::default()
    };
    CheckpointSession::start(registry, settings)
}

async fn next_outcome(events: &mut UnboundedReceiver<SessionEvent>) -> Result<ValidationOutcome> {
    while let Some(event) = events.recv().await {
        if let SessionEvent::Outcome(outcome) = event {
            return Ok(outcome);
        }
    }
    bail!("session closed before an outcome")
}

#[tokio::test(start_paused = true)]
async fn multiple_candidates_then_registration() -> Result<()> {
    let api = Arc::new(
        FakeRegistry::default()
            .on_validate(|_, _| {
                Reply::status(
                    202,
                    Some(candidates_body(vec![candidate(1, true), candidate(2, true)])),
                )
            })
            .on_register(|_, _| Reply::status(201, Some(RegisteredEvent::default())))
            .on_history(|_, query| {
                assert_eq!(query.size, 1);
                Reply::status(200, Some(page(vec![record(77)], 0, true)))
            }),
    );
    let (session, mut events) = session(api.clone()).await;

    session.submit_payload(PAYLOAD)?;
    match next_outcome(&mut events).await? {
        ValidationOutcome::MultipleCandidates(candidates) => assert_eq!(candidates.len(), 2),
        other => bail!("unexpected outcome {other:?}"),
    }
    assert!(session.gate_view().is_busy(), "gate held during selection");

    session.register_for_candidate(CandidateId(2));
    assert!(matches!(
        next_outcome(&mut events).await?,
        ValidationOutcome::EventRegistered(_)
    ));
    assert!(!session.gate_view().is_busy());

    // The history head is refreshed shortly after a registration.
    match events.recv().await {
        Some(SessionEvent::History(snapshot)) => {
            assert_eq!(snapshot.status, FeedStatus::Ready);
            assert_eq!(snapshot.page.items[0].id.0, 77);
        }
        other => bail!("expected history update, got {other:?}"),
    }

    assert!(api.calls().contains(&Call::Register {
        token: "token".into(),
        candidate: CandidateId(2)
    }));
    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn embedded_event_is_registered() -> Result<()> {
    let api = Arc::new(FakeRegistry::default().on_validate(|_, _| {
        Reply::status(
            202,
            Some(ValidationBody {
                success: Some(true),
                message: Some("Ingreso registrado".into()),
                candidates: None,
                event: Bound::Present(RegisteredEvent::default()),
            }),
        )
    }));
    let (session, mut events) = session(api).await;

    session.submit_payload(PAYLOAD)?;
    assert_eq!(
        next_outcome(&mut events).await?,
        ValidationOutcome::EventRegistered("Ingreso registrado".into())
    );
    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn legacy_payload_validates_by_document_number() -> Result<()> {
    let api = Arc::new(FakeRegistry::default());
    let (session, mut events) = session(api.clone()).await;

    let document = session.submit_payload("00@DOE@JOHN@M@30111222")?;
    assert_eq!(document.as_str(), "30111222");
    assert!(matches!(
        next_outcome(&mut events).await?,
        ValidationOutcome::Failure(CheckpointError::NotFound { status: 404, .. })
    ));
    assert_eq!(
        api.calls(),
        vec![Call::Validate {
            token: "token".into(),
            document: "30111222".into()
        }]
    );
    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn rejected_payload_leaves_gate_open() -> Result<()> {
    let api = Arc::new(FakeRegistry::default());
    let (session, _events) = session(api.clone()).await;

    assert_eq!(
        session.submit_payload("not a barcode"),
        Err(ParseRejection::NoDelimiter)
    );
    assert!(!session.gate_view().is_busy());
    assert!(api.calls().is_empty());
    session.teardown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_registry_times_out_and_rearms() -> Result<()> {
    let api = Arc::new(FakeRegistry::default().on_validate(|_, _| {
        Reply::After(
            Duration::from_secs(60),
            RegistryResponse::new(202, Some(candidates_body(vec![candidate(1, true)])), None),
        )
    }));
    let (session, mut events) = session(api).await;

    session.submit_payload(PAYLOAD)?;
    assert_eq!(
        next_outcome(&mut events).await?,
        ValidationOutcome::Failure(CheckpointError::Timeout)
    );
    assert!(!session.gate_view().is_busy());

    // The late response belongs to a finished cycle and is dropped.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(events.try_recv().is_err());
    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn failed_refresh_surfaces_logged_out() -> Result<()> {
    let api = Arc::new(
        FakeRegistry::default().on_validate(|_, _| Reply::<ValidationBody>::status(401, None)),
    );
    let (session, mut events) = session(api.clone()).await;

    session.submit_payload(PAYLOAD)?;
    assert_eq!(
        next_outcome(&mut events).await?,
        ValidationOutcome::Failure(CheckpointError::LoggedOut)
    );
    assert_eq!(events.recv().await, Some(SessionEvent::LoggedOut));
    assert_eq!(api.calls().len(), 1);
    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn dismissing_candidates_rearms_gate() -> Result<()> {
    let api = Arc::new(FakeRegistry::default().on_validate(|_, _| {
        Reply::status(202, Some(candidates_body(vec![candidate(4, true)])))
    }));
    let (session, mut events) = session(api.clone()).await;

    session.submit_payload(PAYLOAD)?;
    assert_eq!(
        next_outcome(&mut events).await?,
        ValidationOutcome::SingleMatch(candidate(4, true))
    );
    session.dismiss_candidates();

    // A second scan only starts once the dismissal re-armed the gate.
    session.submit_payload(PAYLOAD)?;
    assert!(matches!(
        next_outcome(&mut events).await?,
        ValidationOutcome::SingleMatch(_)
    ));
    assert_eq!(api.count(|call| matches!(call, Call::Validate { .. })), 2);
    session.teardown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unattended_selection_times_out_and_rearms() -> Result<()> {
    let api = Arc::new(
        FakeRegistry::default()
            .on_validate(|_, _| {
                Reply::status(202, Some(candidates_body(vec![candidate(4, true)])))
            })
            .on_register(|_, _| Reply::status(201, Some(RegisteredEvent::default()))),
    );
    let (session, mut events) = session(api.clone()).await;

    session.submit_payload(PAYLOAD)?;
    assert_eq!(
        next_outcome(&mut events).await?,
        ValidationOutcome::SingleMatch(candidate(4, true))
    );
    assert!(session.gate_view().is_busy());

    // Nobody picks the candidate; the scan timeout ends the cycle.
    assert_eq!(
        next_outcome(&mut events).await?,
        ValidationOutcome::Failure(CheckpointError::Timeout)
    );
    assert!(!session.gate_view().is_busy());

    // A late choice no longer registers anything.
    session.register_for_candidate(CandidateId(4));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.count(|call| matches!(call, Call::Register { .. })), 0);
    session.teardown().await;
    Ok(())
}

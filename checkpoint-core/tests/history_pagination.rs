//! History feed driven through the session.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use checkpoint_core::gateway::{AuthorizedRegistry, RegistryResponse, TransportError};
use checkpoint_core::history::{FeedStatus, HistorySnapshot};
use checkpoint_core::{CheckpointSession, SessionEvent, SessionSettings};
use checkpoint_model::{Bound, HistoryResponse};
use support::{Call, CountingRefresher, FakeRegistry, Reply, logged_in, page, record};
use tokio::sync::mpsc::UnboundedReceiver;

async fn session(api: Arc<FakeRegistry>) -> (CheckpointSession, UnboundedReceiver<SessionEvent>) {
    let credentials = logged_in(CountingRefresher::failing(), "token").await;
    let registry = AuthorizedRegistry::new(api, credentials, 401);
    CheckpointSession::start(registry, SessionSettings::default())
}

async fn next_settled(events: &mut UnboundedReceiver<SessionEvent>) -> Result<HistorySnapshot> {
    while let Some(event) = events.recv().await {
        if let SessionEvent::History(snapshot) = event
            && snapshot.status != FeedStatus::Loading
        {
            return Ok(snapshot);
        }
    }
    bail!("session closed before a history update")
}

fn paged_history() -> FakeRegistry {
    FakeRegistry::default().on_history(|_, query| match query.page {
        0 => Reply::status(200, Some(page(vec![record(30), record(29)], 0, true))),
        1 => Reply::After(
            Duration::from_millis(100),
            RegistryResponse::new(200, Some(page(vec![record(28)], 1, false)), None),
        ),
        _ => Reply::status(200, Some(page(Vec::new(), query.page, false))),
    })
}

fn page_fetches(api: &FakeRegistry, wanted: u32) -> usize {
    api.count(|call| matches!(call, Call::History { page, size: 10, .. } if *page == wanted))
}

#[tokio::test(start_paused = true)]
async fn back_to_back_load_more_fetches_once() -> Result<()> {
    let api = Arc::new(paged_history());
    let (session, mut events) = session(api.clone()).await;

    session.load_initial();
    let first = next_settled(&mut events).await?;
    assert_eq!(first.page.items.len(), 2);
    assert!(first.page.has_more);
    assert_eq!(first.page.total_count, 42);

    session.load_more();
    session.load_more();
    let second = next_settled(&mut events).await?;
    let ids: Vec<i64> = second.page.items.iter().map(|r| r.id.0).collect();
    assert_eq!(ids, vec![30, 29, 28]);
    assert!(!second.page.has_more);
    assert_eq!(page_fetches(&api, 1), 1);

    // Nothing left to load.
    session.load_more();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(page_fetches(&api, 2), 0);

    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn incomplete_records_give_empty_feed() -> Result<()> {
    let api = Arc::new(FakeRegistry::default().on_history(|_, _| {
        let mut orphan = record(5);
        orphan.candidate = Bound::Missing;
        Reply::status(200, Some(page(vec![orphan], 0, false)))
    }));
    let (session, mut events) = session(api).await;

    session.load_initial();
    let snapshot = next_settled(&mut events).await?;
    assert_eq!(snapshot.status, FeedStatus::Empty);
    assert!(snapshot.page.items.is_empty());

    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn failed_initial_load_reports_failure() -> Result<()> {
    let api = Arc::new(
        FakeRegistry::default().on_history(|_, _| Reply::<HistoryResponse>::status(500, None)),
    );
    let (session, mut events) = session(api).await;

    session.load_initial();
    let snapshot = next_settled(&mut events).await?;
    assert!(matches!(snapshot.status, FeedStatus::Failed(_)));
    assert!(snapshot.page.items.is_empty());

    session.teardown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn prepend_latest_inserts_once() -> Result<()> {
    let api = Arc::new(FakeRegistry::default().on_history(|_, query| {
        if query.size == 1 {
            Reply::status(200, Some(page(vec![record(31)], 0, true)))
        } else {
            Reply::status(200, Some(page(vec![record(30), record(29)], 0, false)))
        }
    }));
    let (session, mut events) = session(api.clone()).await;

    session.load_initial();
    next_settled(&mut events).await?;

    session.prepend_latest();
    let snapshot = next_settled(&mut events).await?;
    let ids: Vec<i64> = snapshot.page.items.iter().map(|r| r.id.0).collect();
    assert_eq!(ids, vec![31, 30, 29]);

    // Same head again: nothing to publish.
    session.prepend_latest();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(
        api.count(|call| matches!(call, Call::History { size: 1, .. })),
        2
    );

    session.teardown().await;
    Ok(())
}

#[tokio::test]
async fn failed_page_keeps_items_and_can_be_retried() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let seen = attempts.clone();
    let api = Arc::new(FakeRegistry::default().on_history(move |_, query| match query.page {
        0 => Reply::status(200, Some(page(vec![record(30), record(29)], 0, true))),
        _ if seen.fetch_add(1, Ordering::SeqCst) == 0 => {
            Reply::Fail(TransportError::Connection("connection reset".into()))
        }
        _ => Reply::status(200, Some(page(vec![record(28)], 1, false))),
    }));
    let (session, mut events) = session(api.clone()).await;

    session.load_initial();
    next_settled(&mut events).await?;

    session.load_more();
    let failed = next_settled(&mut events).await?;
    assert!(matches!(
        failed.status,
        FeedStatus::Failed(ref message) if message.contains("connection reset")
    ));
    let ids: Vec<i64> = failed.page.items.iter().map(|r| r.id.0).collect();
    assert_eq!(ids, vec![30, 29]);
    assert!(failed.page.has_more);

    session.load_more();
    let retried = next_settled(&mut events).await?;
    assert_eq!(retried.status, FeedStatus::Ready);
    assert_eq!(retried.page.items.len(), 3);
    assert_eq!(page_fetches(&api, 1), 2);

    session.teardown().await;
    Ok(())
}

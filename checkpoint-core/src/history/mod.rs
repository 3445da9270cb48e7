//! Paginated event history of the establishment, newest first.
//!
//! The feed only tracks state. Callers ask it for a [`HistoryFetch`], run the
//! request, then hand the response back with [`HistoryFeed::complete`] or
//! [`HistoryFeed::fail`]. Failed fetches never touch the items.

use checkpoint_model::{EventRecord, EventId, HistoryResponse};
use tracing::{debug, warn};

use crate::gateway::HistoryQuery;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_SORT: &str = "id,DESC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Initial,
    More,
    Latest,
}

/// Request the caller must run for the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFetch {
    pub kind: FetchKind,
    pub query: HistoryQuery,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// Nothing requested yet.
    Idle,
    Loading,
    Ready,
    /// A fetch succeeded and left no usable records.
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryPage {
    pub items: Vec<EventRecord>,
    pub total_count: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySnapshot {
    pub status: FeedStatus,
    pub page: HistoryPage,
}

#[derive(Debug)]
pub struct HistoryFeed {
    page: HistoryPage,
    status: FeedStatus,
    next_page: u32,
    page_size: u32,
    sort: String,
    in_flight: Option<FetchKind>,
    latest_in_flight: bool,
    generation: u64,
}

impl Default for HistoryFeed {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_SORT)
    }
}

impl HistoryFeed {
    pub fn new(page_size: u32, sort: impl Into<String>) -> Self {
        Self {
            page: HistoryPage::default(),
            status: FeedStatus::Idle,
            next_page: 0,
            page_size: page_size.max(1),
            sort: sort.into(),
            in_flight: None,
            latest_in_flight: false,
            generation: 0,
        }
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    pub fn items(&self) -> &[EventRecord] {
        &self.page.items
    }

    pub fn has_more(&self) -> bool {
        self.page.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            status: self.status.clone(),
            page: self.page.clone(),
        }
    }

    /// Restarts from page 0. Supersedes any fetch still in flight.
    pub fn begin_initial(&mut self) -> HistoryFetch {
        self.generation += 1;
        self.in_flight = Some(FetchKind::Initial);
        self.latest_in_flight = false;
        self.status = FeedStatus::Loading;
        self.fetch(FetchKind::Initial, 0, self.page_size)
    }

    /// Next page, unless a page fetch is running or nothing is left.
    pub fn begin_more(&mut self) -> Option<HistoryFetch> {
        if self.in_flight.is_some() {
            debug!("history page fetch already in flight");
            return None;
        }
        if !self.page.has_more {
            return None;
        }
        self.in_flight = Some(FetchKind::More);
        Some(self.fetch(FetchKind::More, self.next_page, self.page_size))
    }

    /// Newest single record, for insertion at the head.
    pub fn begin_latest(&mut self) -> Option<HistoryFetch> {
        if self.latest_in_flight || self.in_flight == Some(FetchKind::Initial) {
            return None;
        }
        self.latest_in_flight = true;
        Some(self.fetch(FetchKind::Latest, 0, 1))
    }

    fn fetch(&self, kind: FetchKind, page: u32, size: u32) -> HistoryFetch {
        HistoryFetch {
            kind,
            query: HistoryQuery {
                page,
                size,
                sort: self.sort.clone(),
            },
            generation: self.generation,
        }
    }

    fn settle(&mut self, fetch: &HistoryFetch) -> bool {
        match fetch.kind {
            FetchKind::Latest => self.latest_in_flight = false,
            FetchKind::Initial | FetchKind::More => {
                if self.in_flight == Some(fetch.kind) && fetch.generation == self.generation {
                    self.in_flight = None;
                }
            }
        }
        if fetch.generation != self.generation {
            debug!(kind = ?fetch.kind, "superseded history response dropped");
            return false;
        }
        true
    }

    /// Applies a successful response. Returns whether the feed changed.
    pub fn complete(&mut self, fetch: &HistoryFetch, response: HistoryResponse) -> bool {
        if !self.settle(fetch) {
            return false;
        }

        let pagination = response.pagination;
        let usable = retain_usable(response.content);

        match fetch.kind {
            FetchKind::Initial => {
                self.page = HistoryPage {
                    items: usable,
                    total_count: pagination.total_elements,
                    has_more: pagination.has_next,
                };
                self.next_page = fetch.query.page + 1;
            }
            FetchKind::More => {
                if usable.is_empty() {
                    self.page.has_more = false;
                } else {
                    self.page.items.extend(usable);
                    self.page.has_more = pagination.has_next;
                    self.page.total_count = pagination.total_elements;
                }
                self.next_page = fetch.query.page + 1;
            }
            FetchKind::Latest => {
                let Some(latest) = usable.into_iter().next() else {
                    debug!("no usable latest record");
                    return false;
                };
                if self.contains(latest.id) {
                    return false;
                }
                self.page.items.insert(0, latest);
                self.page.total_count = pagination.total_elements.max(self.page.items.len() as u64);
            }
        }

        self.status = if self.page.items.is_empty() {
            FeedStatus::Empty
        } else {
            FeedStatus::Ready
        };
        true
    }

    /// Records a failed fetch. Items and `has_more` are kept as they were, so
    /// a failed page can be asked for again. Returns false only for a
    /// superseded fetch; every current one settles into a new snapshot.
    pub fn fail(&mut self, fetch: &HistoryFetch, message: impl Into<String>) -> bool {
        if !self.settle(fetch) {
            return false;
        }
        let message = message.into();
        warn!(kind = ?fetch.kind, page = fetch.query.page, %message, "history fetch failed");
        // A missed head refresh leaves the list usable as it is.
        if fetch.kind != FetchKind::Latest {
            self.status = FeedStatus::Failed(message);
        }
        true
    }

    fn contains(&self, id: EventId) -> bool {
        self.page.items.iter().any(|item| item.id == id)
    }
}

/// Whether a record carries everything the history rows show.
pub fn is_usable(record: &EventRecord) -> bool {
    let Some(candidate) = record.candidate.as_present() else {
        return false;
    };
    let Some(operator) = candidate.operator.as_present() else {
        return false;
    };
    !operator.document_number.trim().is_empty() && candidate.activity.is_present()
}

fn retain_usable(records: Vec<EventRecord>) -> Vec<EventRecord> {
    let total = records.len();
    let (usable, dropped): (Vec<_>, Vec<_>) = records.into_iter().partition(is_usable);
    if !dropped.is_empty() {
        let ids: Vec<i64> = dropped.iter().map(|record| record.id.0).collect();
        warn!(
            dropped = dropped.len(),
            total,
            ?ids,
            "history records missing identity data filtered"
        );
    }
    usable
}

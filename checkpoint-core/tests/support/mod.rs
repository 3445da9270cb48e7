#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use checkpoint_core::auth::{AuthApiError, CredentialManager, MemoryStore, TokenRefresher};
use checkpoint_core::gateway::{HistoryQuery, RegistryApi, RegistryResponse, TransportError};
use checkpoint_model::{
    AccessType, Activity, Bound, Candidate, CandidateId, EstablishmentId, EventId, EventRecord,
    HistoryResponse, Operator, Pagination, RegisteredEvent, TokenGrant, ValidationBody,
};
use parking_lot::Mutex;

pub const PAYLOAD: &str = "@DOE@JOHN@M@12345678@A@01/01/1990@01/01/2020@999";

/// What the fake registry does for one call.
pub enum Reply<T> {
    Now(RegistryResponse<T>),
    After(Duration, RegistryResponse<T>),
    Fail(TransportError),
}

impl<T> Reply<T> {
    pub fn status(status: u16, body: Option<T>) -> Self {
        Reply::Now(RegistryResponse::new(status, body, None))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Validate { token: String, document: String },
    Register { token: String, candidate: CandidateId },
    History { token: String, page: u32, size: u32 },
}

type Responder<A, T> = Box<dyn Fn(&str, &A) -> Reply<T> + Send + Sync>;

/// Registry double answering through per-endpoint closures.
pub struct FakeRegistry {
    validate: Responder<String, ValidationBody>,
    register: Responder<CandidateId, RegisteredEvent>,
    history: Responder<HistoryQuery, HistoryResponse>,
    calls: Mutex<Vec<Call>>,
}

impl Default for FakeRegistry {
    fn default() -> Self {
        Self {
            validate: Box::new(|_, _| Reply::status(404, None)),
            register: Box::new(|_, _| Reply::status(404, None)),
            history: Box::new(|_, _| Reply::status(200, Some(page(Vec::new(), 0, false)))),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRegistry {
    pub fn on_validate(
        mut self,
        responder: impl Fn(&str, &String) -> Reply<ValidationBody> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Box::new(responder);
        self
    }

    pub fn on_register(
        mut self,
        responder: impl Fn(&str, &CandidateId) -> Reply<RegisteredEvent> + Send + Sync + 'static,
    ) -> Self {
        self.register = Box::new(responder);
        self
    }

    pub fn on_history(
        mut self,
        responder: impl Fn(&str, &HistoryQuery) -> Reply<HistoryResponse> + Send + Sync + 'static,
    ) -> Self {
        self.history = Box::new(responder);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }
}

async fn play<T>(reply: Reply<T>) -> Result<RegistryResponse<T>, TransportError> {
    match reply {
        Reply::Now(response) => Ok(response),
        Reply::After(delay, response) => {
            tokio::time::sleep(delay).await;
            Ok(response)
        }
        Reply::Fail(err) => Err(err),
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn validate_document(
        &self,
        token: &str,
        _establishment: EstablishmentId,
        document_number: &str,
    ) -> Result<RegistryResponse<ValidationBody>, TransportError> {
        let document = document_number.to_string();
        self.calls.lock().push(Call::Validate {
            token: token.to_string(),
            document: document.clone(),
        });
        let reply = (self.validate)(token, &document);
        play(reply).await
    }

    async fn register_event(
        &self,
        token: &str,
        _establishment: EstablishmentId,
        candidate: CandidateId,
    ) -> Result<RegistryResponse<RegisteredEvent>, TransportError> {
        self.calls.lock().push(Call::Register {
            token: token.to_string(),
            candidate,
        });
        let reply = (self.register)(token, &candidate);
        play(reply).await
    }

    async fn fetch_history(
        &self,
        token: &str,
        _establishment: EstablishmentId,
        query: &HistoryQuery,
    ) -> Result<RegistryResponse<HistoryResponse>, TransportError> {
        self.calls.lock().push(Call::History {
            token: token.to_string(),
            page: query.page,
            size: query.size,
        });
        let reply = (self.history)(token, query);
        play(reply).await
    }
}

/// Refresher that counts calls and either rotates to `new-token` or fails.
pub struct CountingRefresher {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl CountingRefresher {
    pub fn rotating(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail || refresh_token.is_empty() {
            return Err(AuthApiError::Transport("connection refused".into()));
        }
        Ok(TokenGrant {
            access_token: "new-token".into(),
            refresh_token: "new-refresh".into(),
            expires_in: 900,
        })
    }
}

pub async fn logged_in(refresher: Arc<dyn TokenRefresher>, token: &str) -> CredentialManager {
    let manager = CredentialManager::new(Arc::new(MemoryStore::new()), refresher);
    manager
        .save(token, "refresh-token", 900)
        .await
        .expect("memory store never fails");
    manager
}

pub fn operator(id: i64, document: &str) -> Operator {
    Operator {
        id,
        first_name: "Ana".into(),
        last_name: "Diaz".into(),
        document_type: "DNI".into(),
        document_number: document.into(),
        email: None,
        phone: None,
        date_of_birth: None,
    }
}

pub fn candidate(id: i64, bound: bool) -> Candidate {
    Candidate {
        id: CandidateId(id),
        status: "ACTIVO".into(),
        income_type: "OBRA".into(),
        created_at: None,
        activity: Bound::Present(Activity {
            id: Some(3),
            activity_name: Some("Pintor".into()),
        }),
        operator: if bound {
            Bound::Present(operator(id, "12345678"))
        } else {
            Bound::Missing
        },
    }
}

pub fn record(id: i64) -> EventRecord {
    EventRecord {
        id: EventId(id),
        created_at: Some("2024-03-01T08:15:30.123456".into()),
        access_type: AccessType::Entry,
        pdf_name: None,
        candidate: Bound::Present(candidate(id, true)),
    }
}

pub fn page(content: Vec<EventRecord>, page: u32, has_next: bool) -> HistoryResponse {
    HistoryResponse {
        pagination: Pagination {
            page,
            size: 10,
            total_elements: 42,
            has_next,
            ..Pagination::default()
        },
        content,
    }
}

pub fn candidates_body(candidates: Vec<Candidate>) -> ValidationBody {
    ValidationBody {
        success: Some(true),
        message: Some("nominas".into()),
        candidates: Some(candidates),
        event: Bound::Missing,
    }
}

//! Credential-aware access to the registry.
//!
//! [`RegistryApi`] is the raw transport; it never retries. [`AuthorizedRegistry`]
//! attaches the current token and, on an unauthorized status, resolves it
//! through the [`CredentialManager`] and replays the call exactly once.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use checkpoint_model::{
    CandidateId, EstablishmentId, HistoryResponse, RegisteredEvent, ValidationBody,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{CredentialManager, LoggedOut};

/// Status plus optional decoded body of one registry exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryResponse<T> {
    pub status: u16,
    pub body: Option<T>,
    /// Server-provided message, from the body or the error payload.
    pub message: Option<String>,
}

impl<T> RegistryResponse<T> {
    pub fn new(status: u16, body: Option<T>, message: Option<String>) -> Self {
        Self {
            status,
            body,
            message,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    LoggedOut(#[from] LoggedOut),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub page: u32,
    pub size: u32,
    pub sort: String,
}

/// Authenticated registry endpoints. Implementations send exactly one request.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn validate_document(
        &self,
        token: &str,
        establishment: EstablishmentId,
        document_number: &str,
    ) -> Result<RegistryResponse<ValidationBody>, TransportError>;

    async fn register_event(
        &self,
        token: &str,
        establishment: EstablishmentId,
        candidate: CandidateId,
    ) -> Result<RegistryResponse<RegisteredEvent>, TransportError>;

    async fn fetch_history(
        &self,
        token: &str,
        establishment: EstablishmentId,
        query: &HistoryQuery,
    ) -> Result<RegistryResponse<HistoryResponse>, TransportError>;
}

#[derive(Clone)]
pub struct AuthorizedRegistry {
    api: Arc<dyn RegistryApi>,
    credentials: CredentialManager,
    unauthorized_status: u16,
}

impl std::fmt::Debug for AuthorizedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedRegistry")
            .field("credentials", &self.credentials)
            .field("unauthorized_status", &self.unauthorized_status)
            .finish_non_exhaustive()
    }
}

impl AuthorizedRegistry {
    pub fn new(
        api: Arc<dyn RegistryApi>,
        credentials: CredentialManager,
        unauthorized_status: u16,
    ) -> Self {
        Self {
            api,
            credentials,
            unauthorized_status,
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Runs `call` with the current token, replaying once after a refresh.
    pub async fn send<T, F, Fut>(&self, call: F) -> Result<RegistryResponse<T>, RequestError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<RegistryResponse<T>, TransportError>>,
    {
        let token = self.credentials.ensure_valid()?;
        let response = call(token.clone()).await?;
        if response.status != self.unauthorized_status {
            return Ok(response);
        }

        debug!("registry rejected token, resolving");
        let token = self.credentials.recover_from_unauthorized(&token).await?;
        let replay = call(token).await?;
        if replay.status == self.unauthorized_status {
            warn!("registry rejected refreshed token");
            if let Err(err) = self.credentials.clear().await {
                warn!(error = %err, "failed to remove stored credential");
            }
            return Err(LoggedOut.into());
        }
        Ok(replay)
    }

    pub async fn validate_document(
        &self,
        establishment: EstablishmentId,
        document_number: &str,
    ) -> Result<RegistryResponse<ValidationBody>, RequestError> {
        let api = &self.api;
        self.send(move |token| async move {
            api.validate_document(&token, establishment, document_number)
                .await
        })
        .await
    }

    pub async fn register_event(
        &self,
        establishment: EstablishmentId,
        candidate: CandidateId,
    ) -> Result<RegistryResponse<RegisteredEvent>, RequestError> {
        let api = &self.api;
        self.send(move |token| async move {
            api.register_event(&token, establishment, candidate).await
        })
        .await
    }

    pub async fn fetch_history(
        &self,
        establishment: EstablishmentId,
        query: &HistoryQuery,
    ) -> Result<RegistryResponse<HistoryResponse>, RequestError> {
        let api = &self.api;
        self.send(move |token| async move {
            api.fetch_history(&token, establishment, query).await
        })
        .await
    }
}

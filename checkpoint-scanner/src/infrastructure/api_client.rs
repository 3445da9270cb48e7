use std::time::Duration;

use async_trait::async_trait;
use checkpoint_core::auth::{AuthApiError, LoginApi, TokenRefresher, token_prefix};
use checkpoint_core::gateway::{HistoryQuery, RegistryApi, RegistryResponse, TransportError};
use checkpoint_model::{
    CandidateId, EstablishmentId, HistoryResponse, LoginRequest, RefreshRequest,
    RegisterEventRequest, RegisteredEvent, TokenGrant, ValidateDocumentRequest, ValidationBody,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::routes;

const MAX_MESSAGE_LEN: usize = 200;

/// `X-Rol` values sent per endpoint family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRoles {
    /// Validation and registration.
    pub guard: String,
    /// History feed.
    pub history: String,
}

impl Default for ClientRoles {
    fn default() -> Self {
        Self {
            guard: "GUARDIA".to_string(),
            history: "ADMINISTRADOR_BARRIO".to_string(),
        }
    }
}

/// HTTP client for the access registry.
///
/// Each call sends exactly one request. Token refresh and replay live in
/// [`checkpoint_core::gateway::AuthorizedRegistry`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    roles: ClientRoles,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("roles", &self.roles)
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        roles: ClientRoles,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Connection(err.to_string()))?;

        info!(base_url = %base_url, "creating registry client");

        Ok(Self {
            client,
            base_url,
            roles,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|err| TransportError::Connection(format!("invalid endpoint {path}: {err}")))
    }

    fn public_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
    }

    fn authorized_request(
        &self,
        method: Method,
        url: Url,
        token: &str,
        establishment: EstablishmentId,
        role: &str,
    ) -> RequestBuilder {
        self.public_request(method, url)
            .bearer_auth(token)
            .header(routes::headers::ESTABLISHMENT, establishment.to_string())
            .header(routes::headers::ROLE, role)
    }

    async fn grant(&self, path: &str, request: RequestBuilder) -> Result<TokenGrant, AuthApiError> {
        let response = request
            .send()
            .await
            .map_err(|err| AuthApiError::Transport(describe(&err)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| AuthApiError::Transport(describe(&err)))?;

        if !status.is_success() {
            let message = extract_message(&text).unwrap_or_else(|| status.to_string());
            warn!(path, status = status.as_u16(), "auth service rejected request");
            return Err(AuthApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|err| AuthApiError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl LoginApi for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<TokenGrant, AuthApiError> {
        let url = self
            .endpoint(routes::auth::LOGIN)
            .map_err(|err| AuthApiError::Transport(err.to_string()))?;
        let grant = self
            .grant(routes::auth::LOGIN, self.public_request(Method::POST, url).json(request))
            .await?;
        debug!(token = %token_prefix(&grant.access_token), "login granted");
        Ok(grant)
    }
}

#[async_trait]
impl TokenRefresher for ApiClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthApiError> {
        let url = self
            .endpoint(routes::auth::REFRESH)
            .map_err(|err| AuthApiError::Transport(err.to_string()))?;
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let grant = self
            .grant(routes::auth::REFRESH, self.public_request(Method::POST, url).json(&body))
            .await?;
        debug!(token = %token_prefix(&grant.access_token), "token refreshed");
        Ok(grant)
    }
}

#[async_trait]
impl RegistryApi for ApiClient {
    async fn validate_document(
        &self,
        token: &str,
        establishment: EstablishmentId,
        document_number: &str,
    ) -> Result<RegistryResponse<ValidationBody>, TransportError> {
        let url = self.endpoint(routes::workers::VALIDATE_DOCUMENT)?;
        let body = ValidateDocumentRequest {
            document_number: document_number.to_string(),
        };
        let request = self
            .authorized_request(Method::POST, url, token, establishment, &self.roles.guard)
            .json(&body);
        read_response(send(request).await?).await
    }

    async fn register_event(
        &self,
        token: &str,
        establishment: EstablishmentId,
        candidate: CandidateId,
    ) -> Result<RegistryResponse<RegisteredEvent>, TransportError> {
        let url = self.endpoint(routes::workers::REGISTER_EVENT)?;
        let request = self
            .authorized_request(Method::POST, url, token, establishment, &self.roles.guard)
            .json(&RegisterEventRequest::for_candidate(candidate));
        read_response(send(request).await?).await
    }

    async fn fetch_history(
        &self,
        token: &str,
        establishment: EstablishmentId,
        query: &HistoryQuery,
    ) -> Result<RegistryResponse<HistoryResponse>, TransportError> {
        let url = self.endpoint(routes::workers::HISTORY)?;
        let request = self
            .authorized_request(Method::GET, url, token, establishment, &self.roles.history)
            .query(&[
                ("sort", query.sort.clone()),
                ("page", query.page.to_string()),
                ("size", query.size.to_string()),
            ]);
        read_response(send(request).await?).await
    }
}

async fn send(request: RequestBuilder) -> Result<Response, TransportError> {
    request.send().await.map_err(transport_error)
}

/// Splits a response into status, typed body and server message.
///
/// Non-success statuses never carry a body; their message comes from a JSON
/// `message` field or, failing that, the raw text.
async fn read_response<T: DeserializeOwned>(
    response: Response,
) -> Result<RegistryResponse<T>, TransportError> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(transport_error)?;
    debug!(status, bytes = text.len(), "registry response");

    if !(200..300).contains(&status) {
        let message = extract_message(&text);
        return Ok(RegistryResponse::new(status, None, message));
    }

    if text.trim().is_empty() {
        return Ok(RegistryResponse::new(status, None, None));
    }

    let value: Value =
        serde_json::from_str(&text).map_err(|err| TransportError::Decode(err.to_string()))?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    let body = serde_json::from_value(value).map_err(|err| TransportError::Decode(err.to_string()))?;
    Ok(RegistryResponse::new(status, Some(body), message))
}

fn extract_message(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let from_json = serde_json::from_str::<Value>(trimmed).ok().and_then(|value| {
        ["message", "error", "detail"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
    });
    Some(from_json.unwrap_or_else(|| trimmed.chars().take(MAX_MESSAGE_LEN).collect()))
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Connection(describe(&err))
    }
}

fn describe(err: &reqwest::Error) -> String {
    match err.url() {
        Some(url) => format!("{} ({})", err, url.path()),
        None => err.to_string(),
    }
}

//! Credential lifecycle.
//!
//! ## Refresh protocol
//!
//! A refresh runs only after the registry rejected a token. The first caller
//! to report a rejection moves [`RefreshState`] to `Refreshing` and spawns
//! the single refresh call; every caller arriving while it runs parks a
//! oneshot waiter and receives the same outcome. A caller whose rejected
//! token has already been replaced gets the new token without any call.
//!
//! A failed refresh clears the credential. Callers then see [`LoggedOut`]
//! and must not retry.

use std::sync::Arc;

use async_trait::async_trait;
use checkpoint_model::{LoginRequest, TokenGrant};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::credential::{Credential, token_prefix};
use super::errors::{AuthApiError, LoggedOut, LoginError, StorageError};
use super::store::KeyValueStore;

/// Storage key of the persisted credential.
pub const CREDENTIAL_KEY: &str = "checkpoint.credential";

type RefreshOutcome = Result<String, LoggedOut>;

/// Exchanges a refresh token for a new grant.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthApiError>;
}

/// Unauthenticated login call.
#[async_trait]
pub trait LoginApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<TokenGrant, AuthApiError>;
}

#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    refresher: Arc<dyn TokenRefresher>,
    current: RwLock<Option<Credential>>,
    refresh: Mutex<RefreshState>,
}

/// Owns the current credential. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_credential = self.inner.current.read().is_some();
        let refresh_in_flight = self.refresh_in_flight();
        f.debug_struct("CredentialManager")
            .field("store", &self.inner.store)
            .field("has_credential", &has_credential)
            .field("refresh_in_flight", &refresh_in_flight)
            .finish()
    }
}

impl CredentialManager {
    pub fn new(store: Arc<dyn KeyValueStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                current: RwLock::new(None),
                refresh: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    /// Loads the persisted credential, if any. Corrupt entries are dropped.
    pub async fn restore(&self) -> Result<bool, StorageError> {
        let Some(raw) = self.inner.store.get(CREDENTIAL_KEY).await? else {
            debug!("no stored credential");
            return Ok(false);
        };

        match serde_json::from_str::<Credential>(&raw) {
            Ok(credential) => {
                info!(
                    token = %token_prefix(credential.access_token()),
                    expires_at = %credential.expires_at(),
                    "restored stored credential"
                );
                *self.inner.current.write() = Some(credential);
                Ok(true)
            }
            Err(err) => {
                warn!(error = %err, "stored credential is corrupted, discarding");
                self.inner.store.remove(CREDENTIAL_KEY).await?;
                Ok(false)
            }
        }
    }

    pub fn current_access_token(&self) -> Option<String> {
        self.inner
            .current
            .read()
            .as_ref()
            .map(|credential| credential.access_token().to_string())
    }

    /// Token present and expiry strictly in the future.
    pub fn is_valid(&self) -> bool {
        self.inner
            .current
            .read()
            .as_ref()
            .is_some_and(|credential| credential.is_valid_at(Utc::now()))
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_valid()
    }

    /// Replaces the credential with a new pair expiring `expires_in_secs` from now.
    pub async fn save(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in_secs: i64,
    ) -> Result<(), StorageError> {
        let credential = Credential::issue(access_token, refresh_token, expires_in_secs, Utc::now());
        let encoded = serde_json::to_string(&credential)
            .map_err(|err| StorageError::CorruptedData(err.to_string()))?;

        debug!(
            token = %token_prefix(access_token),
            expires_at = %credential.expires_at(),
            "credential replaced"
        );
        *self.inner.current.write() = Some(credential);
        self.inner.store.put(CREDENTIAL_KEY, &encoded).await
    }

    /// Removes the credential. Safe to call when already logged out.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let previous = self.inner.current.write().take();
        if previous.is_some() {
            info!("credential cleared");
        }
        self.inner.store.remove(CREDENTIAL_KEY).await
    }

    /// Token to attach to the next request.
    ///
    /// No expiry check happens here; an expired token is refreshed when the
    /// registry rejects it.
    pub fn ensure_valid(&self) -> Result<String, LoggedOut> {
        self.current_access_token().ok_or(LoggedOut)
    }

    /// Resolves an authorization failure for a request sent with `rejected_token`.
    pub async fn recover_from_unauthorized(&self, rejected_token: &str) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.refresh.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    debug!(waiters = waiters.len() + 1, "joining in-flight refresh");
                    waiters.push(tx);
                }
                RefreshState::Idle => {
                    match self.current_access_token() {
                        None => return Err(LoggedOut),
                        Some(current) if current != rejected_token => {
                            debug!("token already rotated, reusing");
                            return Ok(current);
                        }
                        Some(_) => {}
                    }
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    let manager = self.clone();
                    tokio::spawn(async move { manager.run_refresh().await });
                }
            }
        }

        rx.await.unwrap_or(Err(LoggedOut))
    }

    /// Whether a refresh call is outstanding.
    pub fn refresh_in_flight(&self) -> bool {
        matches!(*self.inner.refresh.lock(), RefreshState::Refreshing { .. })
    }

    pub async fn login(
        &self,
        api: &dyn LoginApi,
        identifier: &str,
        password: &str,
    ) -> Result<(), LoginError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let request = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let grant = api.login(&request).await?;
        self.save(&grant.access_token, &grant.refresh_token, grant.expires_in)
            .await?;
        info!(expires_in = grant.expires_in, "logged in");
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), StorageError> {
        self.clear().await
    }

    async fn run_refresh(self) {
        let mut settle = SettleWaiters {
            inner: self.inner.clone(),
            outcome: Err(LoggedOut),
        };
        settle.outcome = self.perform_refresh().await;
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let refresh_token = self
            .inner
            .current
            .read()
            .as_ref()
            .and_then(|credential| credential.refresh_token().map(str::to_string));

        let Some(refresh_token) = refresh_token else {
            warn!("no refresh token available");
            self.clear_after_failed_refresh().await;
            return Err(LoggedOut);
        };

        match self.inner.refresher.refresh(&refresh_token).await {
            Ok(grant) => {
                if let Err(err) = self
                    .save(&grant.access_token, &grant.refresh_token, grant.expires_in)
                    .await
                {
                    warn!(error = %err, "refreshed credential not persisted");
                }
                info!("access token refreshed");
                Ok(grant.access_token)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                self.clear_after_failed_refresh().await;
                Err(LoggedOut)
            }
        }
    }

    async fn clear_after_failed_refresh(&self) {
        if let Err(err) = self.clear().await {
            warn!(error = %err, "failed to remove stored credential");
        }
    }
}

/// Returns the refresh state to `Idle` and answers every waiter, also when
/// the refresh task unwinds.
struct SettleWaiters {
    inner: Arc<Inner>,
    outcome: RefreshOutcome,
}

impl Drop for SettleWaiters {
    fn drop(&mut self) {
        let waiters = match std::mem::take(&mut *self.inner.refresh.lock()) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        for waiter in waiters {
            let _ = waiter.send(self.outcome.clone());
        }
    }
}

//! Credential lifecycle management.

pub mod credential;
pub mod errors;
pub mod manager;
pub mod store;

pub use credential::{Credential, token_prefix};
pub use errors::{AuthApiError, LoggedOut, LoginError, StorageError};
pub use manager::{CREDENTIAL_KEY, CredentialManager, LoginApi, TokenRefresher};
pub use store::{KeyValueStore, MemoryStore};

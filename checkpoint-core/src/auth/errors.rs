//! Credential error types

use thiserror::Error;

/// Persistence failures of the key-value collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read from storage")]
    ReadFailed(#[source] std::io::Error),

    #[error("failed to write to storage")]
    WriteFailed(#[source] std::io::Error),

    #[error("corrupted storage data: {0}")]
    CorruptedData(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure of an unauthenticated auth-service call (login or refresh).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthApiError {
    #[error("auth service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("auth service unreachable: {0}")]
    Transport(String),

    #[error("invalid auth response: {0}")]
    InvalidResponse(String),
}

/// The credential is gone and cannot be recovered without a new login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session expired, log in again")]
pub struct LoggedOut;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("identifier and password are required")]
    MissingCredentials,

    #[error(transparent)]
    Api(#[from] AuthApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

use thiserror::Error;

use crate::frame::CameraError;
use crate::gateway::{RequestError, TransportError};
use crate::payload::ParseRejection;

/// Every failure a checkpoint session can report.
///
/// Most are local and transient: the gate re-arms and the operator scans
/// again. Only [`CheckpointError::is_blocking`] failures need the operator
/// to do something else first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("unreadable payload: {0}")]
    ParseRejection(#[from] ParseRejection),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("connection error: {0}")]
    Network(String),

    #[error("session expired, log in again")]
    LoggedOut,

    #[error("not found ({status}): {message}")]
    NotFound { status: u16, message: String },

    #[error("registry rejected the request ({status}): {message}")]
    ServerRejection { status: u16, message: String },

    #[error("no response within the scan timeout")]
    Timeout,

    #[error("incomplete record: {0}")]
    DataIntegrity(String),

    #[error(transparent)]
    Camera(#[from] CameraError),
}

impl CheckpointError {
    pub fn is_blocking(&self) -> bool {
        matches!(self, CheckpointError::LoggedOut | CheckpointError::Camera(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CheckpointError::NotFound { status, .. }
            | CheckpointError::ServerRejection { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RequestError> for CheckpointError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::LoggedOut(_) => CheckpointError::LoggedOut,
            RequestError::Transport(TransportError::Timeout) => CheckpointError::Timeout,
            RequestError::Transport(other) => CheckpointError::Network(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

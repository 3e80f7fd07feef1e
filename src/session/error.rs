//! Error types for the authenticated transport.

use std::io;

use thiserror::Error;

/// Failure below HTTP: the request never produced a status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Why a token refresh did not produce a new token.
///
/// Cloned to every request that was waiting on the refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("refresh rejected with status {status}")]
    Rejected { status: u16, message: Option<String> },
    #[error("refresh response carried no token")]
    MissingToken,
    #[error("session was cleared while refreshing")]
    SessionCleared,
    #[error("could not persist refreshed token: {0}")]
    Store(String),
    #[error("refresh task ended without an outcome")]
    Abandoned,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Error returned to callers of the authenticated transport.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session expired: {0}")]
    SessionExpired(#[source] RefreshError),

    #[error("not authenticated: {}", .message.as_deref().unwrap_or("unauthorized"))]
    Unauthorized { message: Option<String> },

    #[error("access denied: {}", .message.as_deref().unwrap_or("forbidden"))]
    Forbidden { message: Option<String> },

    #[error("not found: {}", .message.as_deref().unwrap_or("no such resource"))]
    NotFound { message: Option<String> },

    #[error("server error {status}: {}", .message.as_deref().unwrap_or("internal error"))]
    Server { status: u16, message: Option<String> },

    #[error("request rejected with status {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Rejected { status: u16, message: Option<String> },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Classify a non-success status.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::Forbidden { message },
            404 => ApiError::NotFound { message },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Rejected { status, message },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Server { status, .. } | ApiError::Rejected { status, .. } => Some(*status),
            ApiError::SessionExpired(_) | ApiError::Transport(_) | ApiError::Decode(_) => None,
        }
    }

    /// The backend's human-readable `message`, when it sent one.
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { message }
            | ApiError::Forbidden { message }
            | ApiError::NotFound { message }
            | ApiError::Server { message, .. }
            | ApiError::Rejected { message, .. } => message.as_deref(),
            ApiError::SessionExpired(RefreshError::Rejected { message, .. }) => message.as_deref(),
            _ => None,
        }
    }
}

/// Failure reading or writing the persisted session blob.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session storage io: {0}")]
    Io(#[from] io::Error),
    #[error("session storage format: {0}")]
    Format(#[from] serde_json::Error),
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Entity;

/// Machine-readable classification of a [`DssError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    VersionMismatch,
    MissingProof,
    Exhausted,
    DeadlineExceeded,
    Internal,
}

/// Body returned when a caller fails to prove knowledge of every relevant entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictResponse {
    pub message: String,
    pub missing_operational_intents: Vec<Entity>,
    pub missing_constraints: Vec<Entity>,
}

#[derive(Debug, Error)]
pub enum DssError {
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("already exists: {message}")]
    AlreadyExists { message: String },
    #[error("version mismatch: {message}")]
    VersionMismatch { message: String },
    #[error("missing proof: {}", .0.message)]
    MissingProof(Box<ConflictResponse>),
    #[error("exhausted: {message}")]
    Exhausted { message: String },
    #[error("deadline exceeded: {message}")]
    DeadlineExceeded { message: String },
    #[error("internal error: {message}")]
    Internal { message: String, retryable: bool },
}

impl DssError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    pub fn version_mismatch(message: impl Into<String>) -> Self {
        Self::VersionMismatch {
            message: message.into(),
        }
    }

    pub fn missing_proof(response: ConflictResponse) -> Self {
        Self::MissingProof(Box::new(response))
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::Exhausted {
            message: message.into(),
        }
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            retryable: false,
        }
    }

    /// A store contention failure; the whole transaction body may be re-run.
    pub fn contention(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::MissingProof(_) => ErrorKind::MissingProof,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Internal {
                retryable: true,
                ..
            }
        )
    }

    /// Message safe to hand back to a caller. Infrastructure detail is withheld.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn conflict_response(&self) -> Option<&ConflictResponse> {
        match self {
            Self::MissingProof(response) => Some(response),
            _ => None,
        }
    }
}

pub type DssResult<T> = Result<T, DssError>;

// SQLSTATE 40001 covers Postgres and CockroachDB; SQLite reports busy/locked.
const RETRYABLE_MARKERS: [&str; 6] = [
    "40001",
    "could not serialize access",
    "restart transaction",
    "database is locked",
    "database table is locked",
    "Deadlock found",
];

impl From<sea_orm::DbErr> for DssError {
    fn from(value: sea_orm::DbErr) -> Self {
        let message = value.to_string();
        if RETRYABLE_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            DssError::contention(message)
        } else {
            DssError::internal(message)
        }
    }
}

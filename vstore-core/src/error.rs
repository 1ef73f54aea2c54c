//! Error types shared by the pipeline and its ports.
//!
//! Three layers, matching how failures propagate through an upload run:
//! - [`PipelineError`]: fatal configuration/validation errors. Raised before any
//!   upload is attempted and surfaced to the CLI, which exits non-zero.
//! - [`FileError`]: per-file failures inside the batch engine. Never escapes
//!   the engine; recorded in [`crate::batch::UploadOutcome`] instead.
//! - [`ApiError`]: transport/HTTP failures from a [`crate::contract::StoreClient`],
//!   tagged with an [`ApiErrorKind`] and the HTTP status when there is one.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Classification of a remote API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    InternalServer,
    /// Any other non-success status.
    Http,
    /// The request never produced a response (connect, TLS, body stream).
    Transport,
    /// A response arrived but its body could not be decoded.
    Decode,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ApiErrorKind::BadRequest,
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            429 => ApiErrorKind::RateLimited,
            500..=599 => ApiErrorKind::InternalServer,
            _ => ApiErrorKind::Http,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApiErrorKind::BadRequest => "bad request",
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::Forbidden => "forbidden",
            ApiErrorKind::NotFound => "not found",
            ApiErrorKind::RateLimited => "rate limited",
            ApiErrorKind::InternalServer => "internal server error",
            ApiErrorKind::Http => "http error",
            ApiErrorKind::Transport => "transport error",
            ApiErrorKind::Decode => "decode error",
        };
        f.write_str(label)
    }
}

/// Error returned by every [`crate::contract::StoreClient`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Builds an error from a non-success HTTP status and the response body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.trim().is_empty() {
            "request failed".to_string()
        } else {
            body
        };
        Self {
            kind: ApiErrorKind::from_status(status),
            status: Some(status),
            message,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transport, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }
}

/// Fatal errors: reported before any upload starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid metadata in {source_name}: {reason}")]
    InvalidMetadata { source_name: String, reason: String },

    #[error("conflicting options: {0}")]
    ConflictingOptions(String),

    #[error("no file patterns or manifest given; nothing to upload")]
    NoInputs,

    #[error("--parallel must be at least 1, got {0}")]
    InvalidParallel(usize),

    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("failed to list existing files in {target}: {source}")]
    ExistingFiles {
        target: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-file failure inside the batch engine.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to delete previous remote file {file_id}: {source}")]
    Delete {
        file_id: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to stat file: {0}")]
    Stat(#[source] std::io::Error),

    #[error("failed to read file: {0}")]
    Read(#[source] std::io::Error),

    #[error("upload failed: {0}")]
    Upload(#[source] ApiError),
}

/// Completion cache persistence failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("completion cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("completion cache is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

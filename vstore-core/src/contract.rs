//! # contract: ports between the upload pipeline and the outside world
//!
//! This module defines the traits the pipeline depends on but does not implement:
//!
//! - [`StoreClient`]: the remote file operations (upload, delete, paginated listing)
//!   against a store or vector store.
//! - [`CompletionCache`]: the local cache of store names used for shell completion.
//!
//! Along with them live the plain data types crossing those seams ([`UploadTarget`],
//! [`FileUpload`], [`RemoteFile`], [`FilePage`]) and the per-target capabilities
//! ([`TargetKind`]).
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`, so tests (in this crate and downstream)
//! get `MockStoreClient` / `MockCompletionCache` with the default
//! `test-export-mocks` feature.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, CacheError};

/// Remote parsing mode for an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Fast,
    HighQuality,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Fast => "fast",
            Strategy::HighQuality => "high_quality",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy {0:?} (expected `fast` or `high_quality`)")]
pub struct ParseStrategyError(pub String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Strategy::Fast),
            "high_quality" | "high-quality" => Ok(Strategy::HighQuality),
            other => Err(ParseStrategyError(other.to_string())),
        }
    }
}

/// Which remote API surface a command targets.
///
/// The two surfaces overlap almost entirely; the differences are expressed as
/// capabilities here instead of as two copies of the upload path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Store,
    VectorStore,
}

impl TargetKind {
    /// Whether uploads to this surface accept the `contextualization` option.
    pub fn supports_contextualization(&self) -> bool {
        matches!(self, TargetKind::Store)
    }

    /// Upper bound for the per-window upload concurrency.
    pub fn max_parallel(&self) -> usize {
        match self {
            TargetKind::Store => 200,
            TargetKind::VectorStore => 20,
        }
    }

    /// Path segment used by the HTTP API.
    pub fn api_segment(&self) -> &'static str {
        match self {
            TargetKind::Store => "stores",
            TargetKind::VectorStore => "vector_stores",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::Store => "store",
            TargetKind::VectorStore => "vector store",
        }
    }
}

/// The container files are uploaded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub kind: TargetKind,
    /// Name or id, exactly as the user typed it.
    pub id: String,
}

impl UploadTarget {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.kind.label(), self.id)
    }
}

/// One file as sent to [`StoreClient::upload_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub content: Vec<u8>,
    pub content_type: String,
    /// Fully stamped metadata (includes `file_path` and `uploaded_at`).
    pub metadata: Map<String, Value>,
    pub strategy: Strategy,
    /// `None` when the target does not support contextualization.
    pub contextualization: Option<bool>,
}

/// A file attached to a store, as reported by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub usage_bytes: Option<u64>,
}

impl RemoteFile {
    /// The local path stamped on this file when it was uploaded, if any.
    pub fn stamped_path(&self) -> Option<&str> {
        self.metadata.get("file_path").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilesQuery {
    pub limit: usize,
    pub cursor: Option<String>,
}

/// One page of a store's file listing.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePage {
    pub data: Vec<RemoteFile>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// Remote file operations against a store or vector store.
///
/// Implemented by the HTTP client in the CLI crate and by mocks in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Upload a file and attach it to the target.
    async fn upload_file(
        &self,
        target: &UploadTarget,
        upload: FileUpload,
    ) -> Result<RemoteFile, ApiError>;

    /// Remove a file from the target.
    async fn delete_file(&self, target: &UploadTarget, file_id: &str) -> Result<(), ApiError>;

    /// Fetch one page of the target's file listing.
    async fn list_files(
        &self,
        target: &UploadTarget,
        query: ListFilesQuery,
    ) -> Result<FilePage, ApiError>;

    /// Names of all containers of the given kind (used to refresh completions).
    async fn list_store_names(&self, kind: TargetKind) -> Result<Vec<String>, ApiError>;
}

/// Local cache of container names for shell completion.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait CompletionCache: Send + Sync {
    /// Cached names, most recently used first.
    fn get(&self, kind: TargetKind) -> Vec<String>;

    /// Replace the cached names for `kind`.
    fn refresh(&self, kind: TargetKind, names: Vec<String>) -> Result<(), CacheError>;

    /// Record `name` as most recently used.
    fn update(&self, kind: TargetKind, name: &str) -> Result<(), CacheError>;
}

//! # HTTP client for the store API
//!
//! [`ApiClient`] implements the core [`StoreClient`] port over reqwest for both
//! stores and vector stores. The two surfaces share every route shape and only
//! differ in the path segment (`stores` / `vector_stores`), which comes from
//! [`TargetKind::api_segment`].
//!
//! - Authentication is a bearer token on every request.
//! - Any non-2xx response becomes an [`ApiError`] tagged with its status.
//! - Uploading is two requests: the raw bytes go to `/v1/files`, then the
//!   returned file id is attached to the store with its metadata and config.

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vstore_core::config::Config;
use vstore_core::contract::{
    FilePage, FileUpload, ListFilesQuery, RemoteFile, StoreClient, Strategy, TargetKind,
    UploadTarget,
};
use vstore_core::error::ApiError;

/// Page size for listing store names.
const STORE_LIST_LIMIT: usize = 100;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid base URL {base_url:?}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("invalid base URL {base_url:?}: cannot contain paths");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("vstore/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        tracing::info!(base_url = %base_url, "Initialized ApiClient");
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// Builds a client from the resolved config. An API key is required.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                tracing::error!("No API key configured");
                anyhow::anyhow!(
                    "no API key configured: pass --api-key, set VSTORE_API_KEY, or add api_key to the config file"
                )
            })?;
        Self::new(&config.base_url, api_key)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::transport(format!("base URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn store_files_endpoint(&self, target: &UploadTarget, extra: &[&str]) -> Result<Url, ApiError> {
        let mut segments = vec!["v1", target.kind.api_segment(), target.id.as_str(), "files"];
        segments.extend_from_slice(extra);
        self.endpoint(&segments)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), body = %body, "API request failed");
        Err(ApiError::from_status(status.as_u16(), error_message(&body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::decode(e.to_string()))
    }
}

/// Prefers the `detail`/`message`/`error` field of a JSON error body.
fn error_message(body: &str) -> String {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| match map.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) if !other.is_null() => Some(other.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Debug, Serialize)]
struct AttachFileRequest<'a> {
    file_id: &'a str,
    metadata: &'a Map<String, Value>,
    config: AttachConfig,
}

#[derive(Debug, Serialize)]
struct AttachConfig {
    parsing_strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    contextualization: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    data: Vec<RemoteFile>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreListResponse {
    #[serde(default)]
    data: Vec<StoreSummary>,
}

#[derive(Debug, Deserialize)]
struct StoreSummary {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl StoreClient for ApiClient {
    async fn upload_file(
        &self,
        target: &UploadTarget,
        upload: FileUpload,
    ) -> Result<RemoteFile, ApiError> {
        tracing::info!(
            store = %target,
            file_name = %upload.file_name,
            bytes = upload.content.len(),
            content_type = %upload.content_type,
            "Uploading file"
        );

        let part = Part::bytes(upload.content)
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| ApiError::transport(format!("invalid content type: {e}")))?;
        let form = Form::new().part("file", part);
        let uploaded: UploadedFile = self
            .send_json(self.http.post(self.endpoint(&["v1", "files"])?).multipart(form))
            .await?;

        let body = AttachFileRequest {
            file_id: &uploaded.id,
            metadata: &upload.metadata,
            config: AttachConfig {
                parsing_strategy: upload.strategy,
                contextualization: upload.contextualization,
            },
        };
        let attached: RemoteFile = self
            .send_json(self.http.post(self.store_files_endpoint(target, &[])?).json(&body))
            .await?;
        tracing::info!(
            store = %target,
            file_id = %attached.id,
            file_name = %upload.file_name,
            "Attached file to store"
        );
        Ok(attached)
    }

    async fn delete_file(&self, target: &UploadTarget, file_id: &str) -> Result<(), ApiError> {
        tracing::info!(store = %target, file_id, "Deleting file");
        self.send(self.http.delete(self.store_files_endpoint(target, &[file_id])?))
            .await?;
        Ok(())
    }

    async fn list_files(
        &self,
        target: &UploadTarget,
        query: ListFilesQuery,
    ) -> Result<FilePage, ApiError> {
        tracing::debug!(store = %target, limit = query.limit, cursor = ?query.cursor, "Listing files");
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(cursor) = query.cursor {
            params.push(("after", cursor));
        }
        let response: FileListResponse = self
            .send_json(self.http.get(self.store_files_endpoint(target, &[])?).query(&params))
            .await?;

        let next_cursor = if response.pagination.has_more {
            response.pagination.last_cursor
        } else {
            None
        };
        Ok(FilePage {
            data: response.data,
            next_cursor,
        })
    }

    async fn list_store_names(&self, kind: TargetKind) -> Result<Vec<String>, ApiError> {
        tracing::info!(kind = kind.label(), "Listing store names");
        let url = self.endpoint(&["v1", kind.api_segment()])?;
        let response: StoreListResponse = self
            .send_json(
                self.http
                    .get(url)
                    .query(&[("limit", STORE_LIST_LIMIT.to_string())]),
            )
            .await?;
        Ok(response
            .data
            .into_iter()
            .map(|store| store.name.filter(|n| !n.is_empty()).unwrap_or(store.id))
            .collect())
    }
}

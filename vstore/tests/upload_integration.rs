use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use vstore::upload::ApiClient;
use vstore_core::config::Config;
use vstore_core::contract::{
    FileUpload, ListFilesQuery, StoreClient, Strategy, TargetKind, UploadTarget,
};
use vstore_core::error::ApiErrorKind;
use vstore_core::existing::build_existing_index;
use vstore_core::metadata::FileUploadDescriptor;

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    auth: Option<String>,
    content_type: Option<String>,
    body: Bytes,
}

#[derive(Clone, Default)]
struct FakeApi {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeApi {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn stamped(id: &str, path: &str) -> Value {
    json!({ "id": id, "filename": path, "metadata": { "file_path": path } })
}

async fn handle(
    State(api): State<FakeApi>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    api.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        auth: header("authorization"),
        content_type: header("content-type"),
        body: body.clone(),
    });

    let query = uri.query().unwrap_or_default();
    match (method.as_str(), uri.path()) {
        ("POST", "/v1/files") => Json(json!({ "id": "file_1" })).into_response(),
        ("POST", "/v1/stores/kb/files") | ("POST", "/v1/vector_stores/kb/files") => {
            let request: Value = serde_json::from_slice(&body).unwrap_or_default();
            Json(json!({
                "id": request["file_id"],
                "filename": "a.md",
                "metadata": request["metadata"],
                "usage_bytes": 5
            }))
            .into_response()
        }
        ("DELETE", path) if path.starts_with("/v1/stores/kb/files/") => {
            StatusCode::NO_CONTENT.into_response()
        }
        ("GET", "/v1/stores/kb/files") if query.contains("after=c1") => Json(json!({
            "data": [stamped("id_b", "docs/b.md"), stamped("id_dup", "docs/a.md")],
            "pagination": { "has_more": false, "last_cursor": "c2" }
        }))
        .into_response(),
        ("GET", "/v1/stores/kb/files") => Json(json!({
            "data": [stamped("id_a", "docs/a.md"), stamped("id_x", "other.md")],
            "pagination": { "has_more": true, "last_cursor": "c1" }
        }))
        .into_response(),
        ("GET", "/v1/stores") => Json(json!({
            "data": [{ "id": "s1", "name": "kb" }, { "id": "s2", "name": "" }]
        }))
        .into_response(),
        ("GET", "/v1/stores/missing/files") => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "store not found" })),
        )
            .into_response(),
        ("GET", "/v1/stores/busy/files") => {
            (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response()
        }
        ("GET", "/v1/stores/garbled/files") => "not json".into_response(),
        _ => StatusCode::IM_A_TEAPOT.into_response(),
    }
}

async fn spawn_api() -> (String, FakeApi) {
    let api = FakeApi::default();
    let app = Router::new().fallback(handle).with_state(api.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), api)
}

fn upload(contextualization: Option<bool>) -> FileUpload {
    let mut metadata = Map::new();
    metadata.insert("file_path".into(), json!("docs/a.md"));
    FileUpload {
        file_name: "a.md".into(),
        content: b"hello".to_vec(),
        content_type: "text/markdown".into(),
        metadata,
        strategy: Strategy::HighQuality,
        contextualization,
    }
}

#[tokio::test]
async fn test_upload_file_sends_bytes_then_attaches() {
    let (base, api) = spawn_api().await;
    let client = ApiClient::new(&base, "test-key").unwrap();
    let target = UploadTarget::new(TargetKind::Store, "kb");

    let remote = client.upload_file(&target, upload(Some(true))).await.unwrap();
    assert_eq!(remote.id, "file_1");
    assert_eq!(remote.stamped_path(), Some("docs/a.md"));

    let requests = api.requests();
    assert_eq!(requests.len(), 2);

    let file = &requests[0];
    assert_eq!(file.path, "/v1/files");
    assert_eq!(file.auth.as_deref(), Some("Bearer test-key"));
    assert!(file
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));
    let multipart = String::from_utf8_lossy(&file.body);
    assert!(multipart.contains(r#"name="file"; filename="a.md""#), "{multipart}");
    assert!(multipart.contains("Content-Type: text/markdown"), "{multipart}");
    assert!(multipart.contains("hello"));

    let attach = &requests[1];
    assert_eq!(attach.method, Method::POST);
    assert_eq!(attach.path, "/v1/stores/kb/files");
    assert_eq!(attach.auth.as_deref(), Some("Bearer test-key"));
    let body: Value = serde_json::from_slice(&attach.body).unwrap();
    assert_eq!(
        body,
        json!({
            "file_id": "file_1",
            "metadata": { "file_path": "docs/a.md" },
            "config": { "parsing_strategy": "high_quality", "contextualization": true }
        })
    );
}

#[tokio::test]
async fn test_vector_store_attach_omits_contextualization() {
    let (base, api) = spawn_api().await;
    let client = ApiClient::new(&base, "test-key").unwrap();
    let target = UploadTarget::new(TargetKind::VectorStore, "kb");

    client.upload_file(&target, upload(None)).await.unwrap();

    let attach = &api.requests()[1];
    assert_eq!(attach.path, "/v1/vector_stores/kb/files");
    let body: Value = serde_json::from_slice(&attach.body).unwrap();
    assert_eq!(body["config"], json!({ "parsing_strategy": "high_quality" }));
}

#[tokio::test]
async fn test_delete_file_targets_the_file_route() {
    let (base, api) = spawn_api().await;
    let client = ApiClient::new(&base, "test-key").unwrap();
    let target = UploadTarget::new(TargetKind::Store, "kb");

    client.delete_file(&target, "old_1").await.unwrap();

    let requests = api.requests();
    assert_eq!(requests[0].method, Method::DELETE);
    assert_eq!(requests[0].path, "/v1/stores/kb/files/old_1");
}

#[tokio::test]
async fn test_list_files_maps_pagination_to_cursor() {
    let (base, api) = spawn_api().await;
    let client = ApiClient::new(&base, "test-key").unwrap();
    let target = UploadTarget::new(TargetKind::Store, "kb");

    let first = client
        .list_files(&target, ListFilesQuery { limit: 100, cursor: None })
        .await
        .unwrap();
    assert_eq!(first.data.len(), 2);
    assert_eq!(first.next_cursor.as_deref(), Some("c1"));

    let second = client
        .list_files(
            &target,
            ListFilesQuery {
                limit: 100,
                cursor: first.next_cursor,
            },
        )
        .await
        .unwrap();
    assert_eq!(second.next_cursor, None, "has_more=false ends the listing");

    let requests = api.requests();
    assert_eq!(requests[0].query.as_deref(), Some("limit=100"));
    assert_eq!(requests[1].query.as_deref(), Some("limit=100&after=c1"));
}

#[tokio::test]
async fn test_existing_index_built_over_http() {
    let (base, _api) = spawn_api().await;
    let client = ApiClient::new(&base, "test-key").unwrap();
    let target = UploadTarget::new(TargetKind::Store, "kb");
    let candidates: Vec<FileUploadDescriptor> = ["docs/a.md", "docs/b.md"]
        .into_iter()
        .map(|path| FileUploadDescriptor {
            path: path.into(),
            relative_path: path.to_string(),
            strategy: Strategy::Fast,
            contextualization: false,
            metadata: Map::new(),
        })
        .collect();

    let index = build_existing_index(&client, &target, &candidates)
        .await
        .unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.get("docs/a.md"), Some("id_a"));
    assert_eq!(index.get("docs/b.md"), Some("id_b"));
}

#[tokio::test]
async fn test_list_store_names_falls_back_to_id() {
    let (base, api) = spawn_api().await;
    let client = ApiClient::new(&base, "test-key").unwrap();

    let names = client.list_store_names(TargetKind::Store).await.unwrap();
    assert_eq!(names, vec!["kb", "s2"]);
    assert_eq!(api.requests()[0].query.as_deref(), Some("limit=100"));
}

#[tokio::test]
async fn test_error_statuses_map_to_kinds() {
    let (base, _api) = spawn_api().await;
    let client = ApiClient::new(&base, "test-key").unwrap();
    let query = || ListFilesQuery {
        limit: 10,
        cursor: None,
    };

    let missing = UploadTarget::new(TargetKind::Store, "missing");
    let err = client.list_files(&missing, query()).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::NotFound);
    assert_eq!(err.status, Some(404));
    assert_eq!(err.message, "store not found");

    let busy = UploadTarget::new(TargetKind::Store, "busy");
    let err = client.list_files(&busy, query()).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::RateLimited);
    assert_eq!(err.message, "slow down");

    let garbled = UploadTarget::new(TargetKind::Store, "garbled");
    let err = client.list_files(&garbled, query()).await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Decode);
    assert_eq!(err.status, None);
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ApiClient::new(&format!("http://{addr}"), "test-key").unwrap();
    let target = UploadTarget::new(TargetKind::Store, "kb");
    let err = client.delete_file(&target, "f1").await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Transport);
}

#[test]
fn test_client_requires_api_key() {
    let config = Config::default();
    let err = ApiClient::from_config(&config).err().expect("missing key must fail");
    assert!(err.to_string().contains("no API key configured"));

    let config = Config {
        api_key: Some("key".into()),
        base_url: "not a url".into(),
        ..Config::default()
    };
    assert!(ApiClient::from_config(&config).is_err());
}

/// Full binary run against the fake API: `--unique` replaces the stamped copy,
/// then the store lands in the completion cache.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cli_upload_replaces_existing_copy() {
    let (base, api) = spawn_api().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/a.md"), "fresh").unwrap();
    std::fs::write(dir.path().join("docs/empty.md"), "").unwrap();

    let cwd = dir.path().to_path_buf();
    let assert = tokio::task::spawn_blocking(move || {
        assert_cmd::Command::cargo_bin("vstore")
            .unwrap()
            .current_dir(&cwd)
            .env("HOME", &cwd)
            .env_remove("VSTORE_CONFIG")
            .env_remove("VSTORE_BASE_URL")
            .args(["--base-url", base.as_str(), "--api-key", "cli-key"])
            .args(["stores", "upload", "kb", "docs/*.md", "--parallel", "2", "--unique"])
            .assert()
    })
    .await
    .unwrap();

    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert.success();
    assert!(output.contains("Upload summary for store \"kb\":"), "{output}");
    assert!(output.contains("↻ 1 file updated"), "{output}");
    assert!(output.contains("○ 1 file skipped (empty)"), "{output}");
    assert!(output.contains("Total size: 5 B"), "{output}");

    let requests = api.requests();
    let deleted: Vec<_> = requests
        .iter()
        .filter(|r| r.method == Method::DELETE)
        .map(|r| r.path.as_str())
        .collect();
    assert_eq!(deleted, vec!["/v1/stores/kb/files/id_a"], "first stamped copy wins");
    let uploads = requests.iter().filter(|r| r.path == "/v1/files").count();
    assert_eq!(uploads, 1, "the empty file is never sent");
    assert!(requests.iter().all(|r| r.auth.as_deref() == Some("Bearer cli-key")));

    let cache = std::fs::read_to_string(dir.path().join(".cache/vstore/completion.json")).unwrap();
    let cache: Value = serde_json::from_str(&cache).unwrap();
    assert_eq!(cache["stores"], json!(["kb"]));
}

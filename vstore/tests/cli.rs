use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

/// A working directory with a couple of docs, doubling as `$HOME`.
fn workspace() -> TempDir {
    let dir = tempdir().expect("Creating temp dir failed");
    fs::create_dir_all(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/a.md"), "hello").unwrap();
    fs::write(dir.path().join("docs/empty.md"), "").unwrap();
    dir
}

fn vstore(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("vstore").expect("Binary exists");
    cmd.current_dir(cwd)
        .env("HOME", cwd)
        .env_remove("VSTORE_API_KEY")
        .env_remove("VSTORE_BASE_URL")
        .env_remove("VSTORE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn dry_run_previews_without_credentials() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb", "docs/*.md", "--dry-run"])
        .args(["--strategy", "high_quality", "--contextualization"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Dry run: 2 files would be uploaded to store \"kb\"",
        ))
        .stdout(predicate::str::contains(
            "docs/a.md (5 B) strategy: high_quality, contextualization: true",
        ))
        .stdout(predicate::str::contains("docs/empty.md (0 B)"));
}

#[test]
fn dry_run_for_vector_store_omits_contextualization() {
    let dir = workspace();
    vstore(dir.path())
        .args(["vector-stores", "upload", "kb", "docs/a.md", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vector store \"kb\""))
        .stdout(predicate::str::contains("contextualization").not());
}

#[test]
fn contextualization_value_needs_an_equals_sign() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb", "docs/a.md", "--contextualization", "false"])
        .arg("--dry-run")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--contextualization=false"));

    vstore(dir.path())
        .args(["stores", "upload", "kb", "docs/a.md", "--contextualization=false"])
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("contextualization: false"));
}

#[test]
fn no_matching_files_is_not_an_error() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb", "*.pdf"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "No files found matching the given patterns.",
        ));
}

#[test]
fn manifest_with_metadata_map_exits_with_error() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb", "--manifest", "m.yaml"])
        .args(["--metadata-map", "meta.yaml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("conflicting options"));
}

#[test]
fn missing_patterns_exit_with_error() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no file patterns"));
}

#[test]
fn invalid_metadata_json_exits_with_error() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb", "docs/a.md", "--metadata", "{oops"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid metadata in --metadata"));
}

#[test]
fn zero_parallel_exits_with_error() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb", "docs/a.md", "--parallel", "0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--parallel must be at least 1"));
}

#[test]
fn upload_without_api_key_exits_with_error() {
    let dir = workspace();
    vstore(dir.path())
        .args(["stores", "upload", "kb", "docs/a.md"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no API key configured"));
}

#[test]
fn missing_explicit_config_file_is_fatal() {
    let dir = workspace();
    vstore(dir.path())
        .args(["--config", "nope.yaml", "config", "show"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn config_show_redacts_the_api_key() {
    let dir = workspace();
    fs::write(
        dir.path().join("config.yaml"),
        "base_url: http://localhost:9000\napi_key: sk-secret-value-1234\ndefaults:\n  strategy: high_quality\n",
    )
    .unwrap();

    vstore(dir.path())
        .args(["--config", "config.yaml", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://localhost:9000"))
        .stdout(predicate::str::contains("****1234"))
        .stdout(predicate::str::contains("strategy: high_quality"))
        .stdout(predicate::str::contains("sk-secret").not());
}

#[test]
fn api_key_flag_beats_environment() {
    let dir = workspace();
    vstore(dir.path())
        .env("VSTORE_API_KEY", "env-key-aaaaaaaa")
        .args(["--api-key", "flag-key-bbbbbbbb", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("****bbbb"));
}

#[test]
fn completion_list_prints_cached_names() {
    let dir = workspace();
    fs::create_dir_all(dir.path().join(".cache/vstore")).unwrap();
    fs::write(
        dir.path().join(".cache/vstore/completion.json"),
        r#"{"stores": ["handbook", "archive"], "vector_stores": ["legacy"]}"#,
    )
    .unwrap();

    vstore(dir.path())
        .args(["completion", "list", "stores"])
        .assert()
        .success()
        .stdout("handbook\narchive\n");

    vstore(dir.path())
        .args(["completion", "list", "vector-stores"])
        .assert()
        .success()
        .stdout("legacy\n");
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

#[tokio::test]
async fn emits_loaded_config_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use vstore::cli::{run, Cli, Commands, ConfigCommands};

    let dir = workspace();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "base_url: http://localhost:9000\n").unwrap();

    let cli = Cli {
        config: Some(config_path),
        api_key: None,
        base_url: None,
        command: Commands::Config {
            command: ConfigCommands::Show,
        },
    };
    run(cli).await.expect("config show should succeed");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("Loaded Config")),
        "Expected a 'Loaded Config' trace event, got: {:?}",
        event_msgs
    );
}

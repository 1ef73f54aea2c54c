//! Upload batch engine: bounded-concurrency upload with partial-failure accounting.
//!
//! Descriptors are split into fixed-size windows. Inside a window every file
//! runs its whole state machine concurrently:
//!
//! ```text
//! [delete previous remote copy] -> stat -> (0 bytes: SKIPPED) -> read -> upload
//!                                                    success: UPLOADED / UPDATED
//!                                                    any error: FAILED
//! ```
//!
//! A window fully settles before the next one starts. One file's failure never
//! affects another file; every descriptor ends in exactly one bucket of
//! [`UploadOutcome`], and the engine itself never returns an error.

use std::fmt::Write as _;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info};

use crate::content_type::detect_content_type;
use crate::contract::{FileUpload, StoreClient, Strategy, UploadTarget};
use crate::error::FileError;
use crate::existing::ExistingFileIndex;
use crate::metadata::FileUploadDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Window size. Callers clamp it to the target's maximum.
    pub parallel: usize,
    /// List each successful file with its settings (manifest runs, where
    /// entries may differ) instead of one shared configuration line.
    pub inline_config: bool,
}

/// Terminal state of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Uploaded,
    Updated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub relative_path: String,
    pub status: FileStatus,
    pub size: u64,
    pub strategy: Strategy,
    pub contextualization: bool,
    pub error: Option<String>,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOutcome {
    pub uploaded: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Bytes of every file that ended `Uploaded` or `Updated`.
    pub successful_size: u64,
    /// Per-file reports, in descriptor order.
    pub files: Vec<FileReport>,
}

impl UploadOutcome {
    fn record(&mut self, report: FileReport) {
        match report.status {
            FileStatus::Uploaded => {
                self.uploaded += 1;
                self.successful_size += report.size;
            }
            FileStatus::Updated => {
                self.updated += 1;
                self.successful_size += report.size;
            }
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed => self.failed += 1,
        }
        self.files.push(report);
    }

    pub fn total(&self) -> usize {
        self.uploaded + self.updated + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Runs every descriptor through the upload state machine, window by window.
///
/// `existing` enables duplicate avoidance: a file whose path is indexed has the
/// indexed remote copy deleted before it is uploaded again.
pub async fn run_upload_batches<C>(
    client: &C,
    target: &UploadTarget,
    files: &[FileUploadDescriptor],
    existing: Option<&ExistingFileIndex>,
    options: &BatchOptions,
) -> UploadOutcome
where
    C: StoreClient + ?Sized,
{
    let window_size = options.parallel.max(1);
    let windows = files.len().div_ceil(window_size);
    let mut outcome = UploadOutcome::default();

    info!(
        store = %target,
        files = files.len(),
        window_size,
        windows,
        unique = existing.is_some(),
        "Starting batched upload"
    );

    for (index, window) in files.chunks(window_size).enumerate() {
        debug!(window = index + 1, windows, files = window.len(), "Upload window started");
        let reports = join_all(
            window
                .iter()
                .map(|file| upload_one(client, target, file, existing)),
        )
        .await;
        for report in reports {
            outcome.record(report);
        }
        debug!(window = index + 1, windows, "Upload window settled");
    }

    info!(
        uploaded = outcome.uploaded,
        updated = outcome.updated,
        skipped = outcome.skipped,
        failed = outcome.failed,
        bytes = outcome.successful_size,
        "Batched upload finished"
    );
    outcome
}

/// [`run_upload_batches`], then prints the summary to stdout.
pub async fn upload_files<C>(
    client: &C,
    target: &UploadTarget,
    files: &[FileUploadDescriptor],
    existing: Option<&ExistingFileIndex>,
    options: &BatchOptions,
) -> UploadOutcome
where
    C: StoreClient + ?Sized,
{
    let outcome = run_upload_batches(client, target, files, existing, options).await;
    print!("{}", render_summary(&outcome, target, options));
    outcome
}

async fn upload_one<C>(
    client: &C,
    target: &UploadTarget,
    file: &FileUploadDescriptor,
    existing: Option<&ExistingFileIndex>,
) -> FileReport
where
    C: StoreClient + ?Sized,
{
    let previous = existing.and_then(|index| index.get(&file.relative_path));
    let (status, size, error) = match attempt_upload(client, target, file, previous).await {
        Ok((status, size)) => {
            info!(path = %file.relative_path, ?status, size, "File settled");
            (status, size, None)
        }
        Err(e) => {
            error!(path = %file.relative_path, error = %e, "File upload failed");
            (FileStatus::Failed, 0, Some(e.to_string()))
        }
    };

    FileReport {
        relative_path: file.relative_path.clone(),
        status,
        size,
        strategy: file.strategy,
        contextualization: file.contextualization,
        error,
    }
}

async fn attempt_upload<C>(
    client: &C,
    target: &UploadTarget,
    file: &FileUploadDescriptor,
    previous: Option<&str>,
) -> Result<(FileStatus, u64), FileError>
where
    C: StoreClient + ?Sized,
{
    if let Some(file_id) = previous {
        debug!(path = %file.relative_path, file_id, "Deleting previous remote copy");
        client
            .delete_file(target, file_id)
            .await
            .map_err(|source| FileError::Delete {
                file_id: file_id.to_string(),
                source,
            })?;
    }

    let size = tokio::fs::metadata(&file.path)
        .await
        .map_err(FileError::Stat)?
        .len();
    if size == 0 {
        return Ok((FileStatus::Skipped, 0));
    }

    let content = tokio::fs::read(&file.path).await.map_err(FileError::Read)?;
    let file_name = file
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.relative_path.clone());

    let upload = FileUpload {
        file_name,
        content,
        content_type: detect_content_type(&file.path),
        metadata: file.stamped_metadata(Utc::now()),
        strategy: file.strategy,
        contextualization: target
            .kind
            .supports_contextualization()
            .then_some(file.contextualization),
    };
    client
        .upload_file(target, upload)
        .await
        .map_err(FileError::Upload)?;

    let status = if previous.is_some() {
        FileStatus::Updated
    } else {
        FileStatus::Uploaded
    };
    Ok((status, size))
}

/// Human-readable summary of a run.
pub fn render_summary(
    outcome: &UploadOutcome,
    target: &UploadTarget,
    options: &BatchOptions,
) -> String {
    let show_contextualization = target.kind.supports_contextualization();
    let mut out = String::new();

    for report in &outcome.files {
        match report.status {
            FileStatus::Failed => {
                let reason = report.error.as_deref().unwrap_or("unknown error");
                let _ = writeln!(out, "✗ {}: {reason}", report.relative_path);
            }
            FileStatus::Uploaded | FileStatus::Updated if options.inline_config => {
                let _ = writeln!(
                    out,
                    "✓ {} ({}) [{}]",
                    report.relative_path,
                    format_bytes(report.size),
                    describe_config(report.strategy, report.contextualization, show_contextualization)
                );
            }
            _ => {}
        }
    }

    let _ = writeln!(out, "Upload summary for {target}:");
    let lines = [
        (outcome.uploaded, "✓", "uploaded"),
        (outcome.updated, "↻", "updated"),
        (outcome.skipped, "○", "skipped (empty)"),
        (outcome.failed, "✗", "failed"),
    ];
    for (count, marker, label) in lines {
        if count > 0 {
            let _ = writeln!(out, "  {marker} {count} {} {label}", plural_files(count));
        }
    }
    let _ = writeln!(out, "  Total size: {}", format_bytes(outcome.successful_size));

    if !options.inline_config {
        if let Some((strategy, contextualization)) = shared_config(outcome) {
            let _ = writeln!(
                out,
                "  {}",
                describe_config(strategy, contextualization, show_contextualization)
            );
        }
    }
    out
}

/// The strategy/contextualization pair shared by every file, if there is one.
fn shared_config(outcome: &UploadOutcome) -> Option<(Strategy, bool)> {
    let first = outcome.files.first()?;
    let pair = (first.strategy, first.contextualization);
    outcome
        .files
        .iter()
        .all(|r| (r.strategy, r.contextualization) == pair)
        .then_some(pair)
}

fn describe_config(strategy: Strategy, contextualization: bool, show_contextualization: bool) -> String {
    if show_contextualization {
        let state = if contextualization { "enabled" } else { "disabled" };
        format!("strategy: {strategy}, contextualization: {state}")
    } else {
        format!("strategy: {strategy}")
    }
}

fn plural_files(count: usize) -> &'static str {
    if count == 1 {
        "file"
    } else {
        "files"
    }
}

/// Formats a byte count with binary units, e.g. `12 B`, `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

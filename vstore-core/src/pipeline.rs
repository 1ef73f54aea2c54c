//! Upload preparation: turns an upload request into descriptors.
//!
//! This is the orchestration step in front of the batch engine:
//!   - validates mutually exclusive inputs (fatal before anything else happens)
//!   - parses `--metadata` and loads the metadata mapping or manifest
//!   - resolves patterns and merges per-file settings
//!
//! Every error here is a [`PipelineError`]; callers print it and exit non-zero.
//! Nothing is uploaded and no remote call is made.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::batch::format_bytes;
use crate::config::{UploadDefaults, DEFAULT_PARALLEL};
use crate::contract::{Strategy, TargetKind, UploadTarget};
use crate::error::PipelineError;
use crate::manifest::load_manifest;
use crate::metadata::{
    load_metadata_map, merge_file_settings, parse_metadata_json, CliOverrides,
    FileUploadDescriptor,
};
use crate::resolve::resolve_patterns;

/// Everything the upload command received on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadRequest {
    pub patterns: Vec<String>,
    pub manifest: Option<PathBuf>,
    pub metadata_map: Option<PathBuf>,
    pub strategy: Option<Strategy>,
    pub contextualization: Option<bool>,
    /// Raw `--metadata` JSON.
    pub metadata: Option<String>,
    pub parallel: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedUpload {
    pub files: Vec<FileUploadDescriptor>,
    pub from_manifest: bool,
}

impl PreparedUpload {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Rejects contradictory or empty requests.
pub fn validate_request(request: &UploadRequest) -> Result<(), PipelineError> {
    if request.manifest.is_some() && request.metadata_map.is_some() {
        return Err(PipelineError::ConflictingOptions(
            "--manifest and --metadata-map cannot be used together".to_string(),
        ));
    }
    if request.manifest.is_some() && !request.patterns.is_empty() {
        return Err(PipelineError::ConflictingOptions(
            "file patterns cannot be combined with --manifest".to_string(),
        ));
    }
    if request.manifest.is_none() && request.patterns.is_empty() {
        return Err(PipelineError::NoInputs);
    }
    if request.parallel == Some(0) {
        return Err(PipelineError::InvalidParallel(0));
    }
    Ok(())
}

/// Validates `request` and builds the descriptor list.
///
/// An empty list is not an error: the caller reports "no files found".
pub fn prepare_uploads(
    request: &UploadRequest,
    base_dir: &Path,
    defaults: &UploadDefaults,
) -> Result<PreparedUpload, PipelineError> {
    validate_request(request)?;

    let cli = CliOverrides {
        strategy: request.strategy,
        contextualization: request.contextualization,
        metadata: match &request.metadata {
            Some(raw) => parse_metadata_json(raw, "--metadata")?,
            None => Default::default(),
        },
    };

    if let Some(manifest_path) = &request.manifest {
        let manifest = load_manifest(manifest_path)?;
        let files = manifest.descriptors(base_dir, &cli, defaults)?;
        info!(files = files.len(), "Prepared uploads from manifest");
        return Ok(PreparedUpload {
            files,
            from_manifest: true,
        });
    }

    let mapping = request
        .metadata_map
        .as_deref()
        .map(load_metadata_map)
        .transpose()?;

    let resolved = resolve_patterns(&request.patterns, base_dir)?;
    let files: Vec<FileUploadDescriptor> = resolved
        .iter()
        .map(|file| {
            let row = mapping.as_ref().and_then(|m| m.get(&file.relative_path));
            merge_file_settings(file, &cli, row, defaults)
        })
        .collect();

    if let Some(mapping) = &mapping {
        if mapping.is_empty() {
            warn!("Metadata mapping has no rows");
        }
        let matched = files
            .iter()
            .filter(|f| mapping.get(&f.relative_path).is_some())
            .count();
        if matched < mapping.len() {
            warn!(
                rows = mapping.len(),
                matched,
                "Some metadata mapping rows did not match any resolved file"
            );
        }
    }

    info!(files = files.len(), "Prepared uploads from patterns");
    Ok(PreparedUpload {
        files,
        from_manifest: false,
    })
}

/// Window size for a run: command line, then config, then the built-in
/// default, clamped to what the target allows.
pub fn resolve_parallel(
    requested: Option<usize>,
    defaults: &UploadDefaults,
    kind: TargetKind,
) -> Result<usize, PipelineError> {
    if requested == Some(0) {
        return Err(PipelineError::InvalidParallel(0));
    }
    let parallel = requested
        .or(defaults.parallel)
        .unwrap_or(DEFAULT_PARALLEL)
        .clamp(1, kind.max_parallel());
    Ok(parallel)
}

/// Dry-run listing of what would be uploaded.
pub fn render_preview(prepared: &PreparedUpload, target: &UploadTarget) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Dry run: {} {} would be uploaded to {target}",
        prepared.files.len(),
        if prepared.files.len() == 1 { "file" } else { "files" }
    );

    let mut total = 0u64;
    for file in &prepared.files {
        let size = std::fs::metadata(&file.path).map(|m| m.len()).ok();
        total += size.unwrap_or(0);
        let size_label = size.map(format_bytes).unwrap_or_else(|| "unreadable".to_string());
        let mut line = format!("  {} ({size_label}) strategy: {}", file.relative_path, file.strategy);
        if target.kind.supports_contextualization() {
            let _ = write!(line, ", contextualization: {}", file.contextualization);
        }
        if !file.metadata.is_empty() {
            let metadata = serde_json::Value::Object(file.metadata.clone());
            let _ = write!(line, ", metadata: {metadata}");
        }
        let _ = writeln!(out, "{line}");
    }
    let _ = writeln!(out, "Total size: {}", format_bytes(total));
    out
}

//! Upload manifests: a declarative JSON/YAML list of files with per-entry settings.
//!
//! ```yaml
//! version: "1.0"
//! defaults:
//!   strategy: fast
//!   metadata:
//!     project: handbook
//! files:
//!   - path: "docs/**/*.md"
//!     strategy: high_quality
//!     metadata:
//!       section: docs
//!   - path: README.md
//! ```
//!
//! Each entry's `path` is a glob pattern expanded like command-line patterns.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::UploadDefaults;
use crate::contract::Strategy;
use crate::error::PipelineError;
use crate::metadata::{
    merge_file_settings, parse_structured, read_source, CliOverrides, FileOverride,
    FileUploadDescriptor, Metadata,
};
use crate::resolve::expand_pattern;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub defaults: ManifestDefaults,
    pub files: Vec<ManifestEntry>,
}

/// The manifest's own defaults section. Unlike config defaults it has no
/// `parallel` setting.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDefaults {
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub contextualization: Option<bool>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub path: String,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub contextualization: Option<bool>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ManifestEntry {
    pub fn settings(&self) -> FileOverride {
        FileOverride {
            strategy: self.strategy,
            contextualization: self.contextualization,
            metadata: self.metadata.clone(),
        }
    }
}

impl Manifest {
    /// Manifest defaults with config defaults underneath.
    pub fn effective_defaults(&self, config_defaults: &UploadDefaults) -> UploadDefaults {
        UploadDefaults {
            strategy: self.defaults.strategy,
            contextualization: self.defaults.contextualization,
            parallel: None,
            metadata: self.defaults.metadata.clone(),
        }
        .layered_over(config_defaults)
    }

    /// Expands every entry and merges its settings.
    ///
    /// A file matched by several entries keeps the first entry's settings.
    pub fn descriptors(
        &self,
        base_dir: &Path,
        cli: &CliOverrides,
        config_defaults: &UploadDefaults,
    ) -> Result<Vec<FileUploadDescriptor>, PipelineError> {
        let defaults = self.effective_defaults(config_defaults);
        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();

        for entry in &self.files {
            let settings = entry.settings();
            let matches = expand_pattern(&entry.path, base_dir)?;
            if matches.is_empty() {
                warn!(pattern = %entry.path, "Manifest entry matched no files");
            }
            for file in matches {
                if !seen.insert(file.relative_path.clone()) {
                    debug!(path = %file.relative_path, "File already claimed by an earlier manifest entry");
                    continue;
                }
                descriptors.push(merge_file_settings(
                    &file,
                    cli,
                    Some(&settings),
                    &defaults,
                ));
            }
        }
        Ok(descriptors)
    }
}

/// Loads and validates a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, PipelineError> {
    info!(manifest = %path.display(), "Loading upload manifest");
    let text = read_source(path)?;
    let manifest: Manifest =
        parse_structured(&text, path).map_err(|reason| manifest_error(path, reason))?;

    if manifest.files.is_empty() {
        return Err(manifest_error(path, "`files` must list at least one entry"));
    }
    if let Some(index) = manifest.files.iter().position(|e| e.path.trim().is_empty()) {
        return Err(manifest_error(
            path,
            format!("entry {index} has an empty `path`"),
        ));
    }

    info!(
        manifest = %path.display(),
        version = manifest.version.as_deref().unwrap_or("unversioned"),
        entries = manifest.files.len(),
        "Manifest loaded"
    );
    Ok(manifest)
}

fn manifest_error(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::Manifest {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

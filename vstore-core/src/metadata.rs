//! Metadata merging: one [`FileUploadDescriptor`] per resolved file.
//!
//! Settings come from four tiers, highest precedence first:
//!
//! 1. command-line flags ([`CliOverrides`])
//! 2. per-file overrides (a manifest entry, or a metadata-mapping row)
//! 3. defaults (manifest `defaults` layered over config `defaults`)
//! 4. built-ins: `strategy = fast`, `contextualization = false`
//!
//! Metadata is a shallow per-key union applied lowest tier first, so a key set
//! on the command line wins over the same key anywhere else.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::UploadDefaults;
use crate::contract::Strategy;
use crate::error::PipelineError;
use crate::resolve::{strip_dot_prefix, ResolvedFile};

pub type Metadata = Map<String, Value>;

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub strategy: Option<Strategy>,
    pub contextualization: Option<bool>,
    pub metadata: Metadata,
}

/// Per-file settings from a manifest entry or a metadata-mapping row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileOverride {
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub contextualization: Option<bool>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A file queued for upload with its fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUploadDescriptor {
    pub path: PathBuf,
    pub relative_path: String,
    pub strategy: Strategy,
    pub contextualization: bool,
    /// User metadata, without the `file_path`/`uploaded_at` stamps.
    pub metadata: Metadata,
}

impl FileUploadDescriptor {
    /// Metadata as sent to the API: the merged metadata plus `file_path` and
    /// `uploaded_at`.
    pub fn stamped_metadata(&self, uploaded_at: DateTime<Utc>) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.insert(
            "file_path".to_string(),
            Value::String(self.relative_path.clone()),
        );
        metadata.insert(
            "uploaded_at".to_string(),
            Value::String(uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        metadata
    }
}

/// Resolves strategy, contextualization and metadata for one file.
pub fn merge_file_settings(
    file: &ResolvedFile,
    cli: &CliOverrides,
    file_override: Option<&FileOverride>,
    defaults: &UploadDefaults,
) -> FileUploadDescriptor {
    let strategy = cli
        .strategy
        .or_else(|| file_override.and_then(|o| o.strategy))
        .or(defaults.strategy)
        .unwrap_or_default();

    let contextualization = cli
        .contextualization
        .or_else(|| file_override.and_then(|o| o.contextualization))
        .or(defaults.contextualization)
        .unwrap_or(false);

    let mut metadata = defaults.metadata.clone();
    if let Some(o) = file_override {
        for (key, value) in &o.metadata {
            metadata.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &cli.metadata {
        metadata.insert(key.clone(), value.clone());
    }

    FileUploadDescriptor {
        path: file.path.clone(),
        relative_path: file.relative_path.clone(),
        strategy,
        contextualization,
        metadata,
    }
}

/// Parses the `--metadata` flag value. It must be a JSON object.
pub fn parse_metadata_json(text: &str, source_name: &str) -> Result<Metadata, PipelineError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| PipelineError::InvalidMetadata {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PipelineError::InvalidMetadata {
            source_name: source_name.to_string(),
            reason: format!("expected a JSON object, got {}", json_type_name(&other)),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Deserializes a JSON (`.json`) or YAML (anything else) document.
pub(crate) fn parse_structured<T: DeserializeOwned>(text: &str, path: &Path) -> Result<T, String> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(text).map_err(|e| format!("JSON parse error: {e}"))
    } else {
        serde_yaml::from_str(text).map_err(|e| format!("YAML parse error: {e}"))
    }
}

pub(crate) fn read_source(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|source| {
        error!(error = %source, path = %path.display(), "Failed to read input file");
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Per-file metadata keyed by normalized relative path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMap {
    entries: HashMap<String, FileOverride>,
}

impl MetadataMap {
    pub fn get(&self, relative_path: &str) -> Option<&FileOverride> {
        self.entries.get(relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Metadata)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (String, Metadata)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(path, metadata)| {
                (
                    strip_dot_prefix(&path).to_string(),
                    FileOverride {
                        metadata,
                        ..FileOverride::default()
                    },
                )
            })
            .collect();
        Self { entries }
    }
}

/// Loads a metadata-mapping file: an object whose keys are file paths and whose
/// values are metadata objects. Two keys naming the same path (`a.md` and
/// `./a.md`) are rejected.
///
/// ```yaml
/// docs/a.md:
///   author: jane
/// ./docs/b.md:
///   tags: [draft]
/// ```
pub fn load_metadata_map(path: &Path) -> Result<MetadataMap, PipelineError> {
    info!(path = %path.display(), "Loading metadata mapping");
    let text = read_source(path)?;
    let raw: HashMap<String, Value> =
        parse_structured(&text, path).map_err(|reason| PipelineError::InvalidMetadata {
            source_name: path.display().to_string(),
            reason,
        })?;

    let mut rows = Vec::with_capacity(raw.len());
    let mut seen = HashSet::with_capacity(raw.len());
    for (file, value) in raw {
        if !seen.insert(strip_dot_prefix(&file).to_string()) {
            return Err(PipelineError::InvalidMetadata {
                source_name: path.display().to_string(),
                reason: format!(
                    "path {:?} is listed more than once",
                    strip_dot_prefix(&file)
                ),
            });
        }
        match value {
            Value::Object(map) => rows.push((file, map)),
            other => {
                return Err(PipelineError::InvalidMetadata {
                    source_name: path.display().to_string(),
                    reason: format!(
                        "entry {file:?} must be an object, got {}",
                        json_type_name(&other)
                    ),
                })
            }
        }
    }

    let map: MetadataMap = rows.into_iter().collect();
    debug!(entries = map.len(), "Metadata mapping loaded");
    Ok(map)
}

//! On-disk completion cache: recently used store names, most recent first.
//!
//! Stored as JSON at `$HOME/.cache/vstore/completion.json`:
//!
//! ```json
//! { "stores": ["handbook"], "vector_stores": ["legacy-docs"] }
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vstore_core::contract::{CompletionCache, TargetKind};
use vstore_core::error::CacheError;

/// Maximum names kept per target kind.
pub const MAX_ENTRIES: usize = 50;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    stores: Vec<String>,
    #[serde(default)]
    vector_stores: Vec<String>,
}

impl CacheFile {
    fn names_mut(&mut self, kind: TargetKind) -> &mut Vec<String> {
        match kind {
            TargetKind::Store => &mut self.stores,
            TargetKind::VectorStore => &mut self.vector_stores,
        }
    }

    fn into_names(self, kind: TargetKind) -> Vec<String> {
        match kind {
            TargetKind::Store => self.stores,
            TargetKind::VectorStore => self.vector_stores,
        }
    }
}

/// [`CompletionCache`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCompletionCache {
    path: PathBuf,
}

impl FileCompletionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache at `$HOME/.cache/vstore/completion.json`, or `None` without `$HOME`.
    pub fn default_location() -> Option<Self> {
        env::var_os("HOME").map(|home| {
            Self::new(
                PathBuf::from(home)
                    .join(".cache")
                    .join("vstore")
                    .join("completion.json"),
            )
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CacheFile, CacheError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(CacheFile::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CacheFile::default()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn write(&self, cache: &CacheFile) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let text = serde_json::to_string_pretty(cache)?;
        fs::write(&self.path, text).map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), "Completion cache written");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CompletionCache for FileCompletionCache {
    fn get(&self, kind: TargetKind) -> Vec<String> {
        match self.read() {
            Ok(cache) => cache.into_names(kind),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Ignoring unreadable completion cache");
                Vec::new()
            }
        }
    }

    fn refresh(&self, kind: TargetKind, names: Vec<String>) -> Result<(), CacheError> {
        let mut cache = self.read().unwrap_or_default();
        let mut deduped: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !name.is_empty() && !deduped.contains(&name) {
                deduped.push(name);
            }
        }
        deduped.truncate(MAX_ENTRIES);
        *cache.names_mut(kind) = deduped;
        self.write(&cache)
    }

    fn update(&self, kind: TargetKind, name: &str) -> Result<(), CacheError> {
        let mut cache = self.read().unwrap_or_default();
        let names = cache.names_mut(kind);
        names.retain(|existing| existing != name);
        names.insert(0, name.to_string());
        names.truncate(MAX_ENTRIES);
        self.write(&cache)
    }
}

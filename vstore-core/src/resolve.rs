//! File resolution: glob patterns → deduplicated list of local files.
//!
//! Patterns are expanded relative to a base directory (the invocation's working
//! directory). Every match is keyed by its normalized relative path; that key is
//! what metadata-mapping files, manifests and the remote `file_path` stamp use.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::error::PipelineError;

/// A local file matched by a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path used for filesystem access.
    pub path: PathBuf,
    /// Normalized path relative to the base directory.
    pub relative_path: String,
}

/// Strips a single leading `./` (or `.\`).
pub fn strip_dot_prefix(path: &str) -> &str {
    path.strip_prefix("./")
        .or_else(|| path.strip_prefix(".\\"))
        .unwrap_or(path)
}

/// Path relative to `base_dir`, without a leading `./`.
///
/// Paths outside `base_dir` are kept as given.
pub fn normalize_relative_path(path: &Path, base_dir: &Path) -> String {
    let relative = path.strip_prefix(base_dir).unwrap_or(path);
    strip_dot_prefix(&relative.to_string_lossy()).to_string()
}

/// Expands `patterns` against `base_dir`.
///
/// Directories are dropped and duplicates (same normalized path) are removed,
/// keeping the first occurrence. No matches is not an error.
pub fn resolve_patterns(
    patterns: &[String],
    base_dir: &Path,
) -> Result<Vec<ResolvedFile>, PipelineError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        for file in expand_pattern(pattern, base_dir)? {
            if seen.insert(file.relative_path.clone()) {
                files.push(file);
            }
        }
    }

    debug!(
        patterns = patterns.len(),
        matched = files.len(),
        "Resolved file patterns"
    );
    Ok(files)
}

/// Expands a single pattern, in glob order. Does not deduplicate.
///
/// Wildcards skip dot-files and never descend into dot-directories.
pub fn expand_pattern(pattern: &str, base_dir: &Path) -> Result<Vec<ResolvedFile>, PipelineError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        warn!("Ignoring empty file pattern");
        return Ok(Vec::new());
    }

    let full_pattern = if Path::new(trimmed).is_absolute() {
        trimmed.to_string()
    } else {
        let escaped_base = Pattern::escape(&base_dir.to_string_lossy());
        Path::new(&escaped_base)
            .join(strip_dot_prefix(trimmed))
            .to_string_lossy()
            .into_owned()
    };

    // Hidden files and directories only match when the pattern spells out the dot.
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let entries =
        glob::glob_with(&full_pattern, options).map_err(|e| PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => {
                let relative_path = normalize_relative_path(&path, base_dir);
                files.push(ResolvedFile {
                    path,
                    relative_path,
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Skipping unreadable glob entry");
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_dot_prefix_only() {
        assert_eq!(strip_dot_prefix("./docs/a.md"), "docs/a.md");
        assert_eq!(strip_dot_prefix(".\\docs\\a.md"), "docs\\a.md");
        assert_eq!(strip_dot_prefix("././a.md"), "./a.md");
        assert_eq!(strip_dot_prefix("../a.md"), "../a.md");
    }

    #[test]
    fn normalizes_against_base_dir() {
        let base = Path::new("/work/project");
        assert_eq!(
            normalize_relative_path(Path::new("/work/project/docs/a.md"), base),
            "docs/a.md"
        );
        assert_eq!(
            normalize_relative_path(Path::new("./notes.txt"), base),
            "notes.txt"
        );
        assert_eq!(
            normalize_relative_path(Path::new("/elsewhere/b.md"), base),
            "/elsewhere/b.md"
        );
    }
}

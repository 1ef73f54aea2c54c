//! Index of files already present in the target, keyed by the local path
//! stamped on them at upload time. Only built when duplicate avoidance
//! (`--unique`) is requested.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use crate::contract::{ListFilesQuery, StoreClient, UploadTarget};
use crate::error::{ApiError, PipelineError};
use crate::metadata::FileUploadDescriptor;

/// Page size used when walking a store's file listing.
pub const LIST_PAGE_SIZE: usize = 100;

/// Normalized relative path → remote file id. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingFileIndex {
    entries: HashMap<String, String>,
}

impl ExistingFileIndex {
    pub fn get(&self, relative_path: &str) -> Option<&str> {
        self.entries.get(relative_path).map(String::as_str)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: Into<String>, I: Into<String>> FromIterator<(P, I)> for ExistingFileIndex {
    fn from_iter<T: IntoIterator<Item = (P, I)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(path, id)| (path.into(), id.into()))
                .collect(),
        }
    }
}

/// Walks every page of the target's file listing and indexes remote files whose
/// stamped `file_path` matches one of `candidates`.
///
/// Any listing failure is fatal: an incomplete index would turn replacements
/// into duplicates.
pub async fn build_existing_index<C>(
    client: &C,
    target: &UploadTarget,
    candidates: &[FileUploadDescriptor],
) -> Result<ExistingFileIndex, PipelineError>
where
    C: StoreClient + ?Sized,
{
    let wanted: HashSet<&str> = candidates
        .iter()
        .map(|d| d.relative_path.as_str())
        .collect();

    let mut entries = HashMap::new();
    let mut cursor: Option<String> = None;
    let mut seen_cursors = HashSet::new();
    let mut pages = 0usize;
    let mut listed = 0usize;

    loop {
        let query = ListFilesQuery {
            limit: LIST_PAGE_SIZE,
            cursor: cursor.clone(),
        };
        let page = client.list_files(target, query).await.map_err(|e| {
            error!(store = %target, page = pages, error = %e, "Listing existing files failed");
            listing_error(target, e)
        })?;
        pages += 1;
        listed += page.data.len();

        for file in &page.data {
            if let Some(path) = file.stamped_path() {
                if wanted.contains(path) && !entries.contains_key(path) {
                    entries.insert(path.to_string(), file.id.clone());
                }
            }
        }

        match page.next_cursor {
            Some(next) if !page.data.is_empty() => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(listing_error(
                        target,
                        ApiError::decode(format!("listing cursor {next:?} repeated")),
                    ));
                }
                debug!(page = pages, cursor = %next, "Fetching next page of existing files");
                cursor = Some(next);
            }
            _ => break,
        }
    }

    info!(
        store = %target,
        pages,
        listed,
        matched = entries.len(),
        "Built existing file index"
    );
    Ok(ExistingFileIndex { entries })
}

fn listing_error(target: &UploadTarget, source: ApiError) -> PipelineError {
    PipelineError::ExistingFiles {
        target: target.to_string(),
        source,
    }
}

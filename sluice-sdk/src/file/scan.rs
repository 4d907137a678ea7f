//! Sorted directory listing.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::filter::FileFilter;
use crate::error::SourceError;

/// A regular file found while listing a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    path: PathBuf,
    name: String,
    modified: Option<SystemTime>,
}

impl ScannedFile {
    pub fn new(path: PathBuf, modified: Option<SystemTime>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name, lossily converted to UTF-8.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

type Comparator = Arc<dyn Fn(&ScannedFile, &ScannedFile) -> Ordering + Send + Sync>;

/// The order in which eligible files are selected.
///
/// Sorting is stable: files the order considers equal keep the order the
/// filesystem listed them in, so a comparator does not need to be strict.
#[derive(Clone, Default)]
pub enum FileOrder {
    /// Lexicographic by file name.
    #[default]
    Name,
    /// Oldest modification time first. Files without one sort last.
    Modified,
    /// A caller-supplied comparator.
    Custom(Comparator),
}

impl FileOrder {
    /// Order files with a custom comparator.
    pub fn custom<F>(compare: F) -> Self
    where
        F: Fn(&ScannedFile, &ScannedFile) -> Ordering + Send + Sync + 'static,
    {
        FileOrder::Custom(Arc::new(compare))
    }

    pub fn compare(&self, a: &ScannedFile, b: &ScannedFile) -> Ordering {
        match self {
            FileOrder::Name => a.name.cmp(&b.name),
            FileOrder::Modified => match (a.modified, b.modified) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            FileOrder::Custom(compare) => compare(a, b),
        }
    }
}

impl fmt::Debug for FileOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOrder::Name => f.write_str("Name"),
            FileOrder::Modified => f.write_str("Modified"),
            FileOrder::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Lists the eligible regular files of a directory in selection order.
///
/// Directories and entries whose metadata cannot be read are skipped.
/// Symbolic links are followed. When `max_listed` is set, listing stops after
/// that many eligible files in enumeration order, and only those are sorted.
///
/// # Example
///
/// ```rust,no_run
/// use sluice_sdk::{DirectoryScanner, FileOrder, IgnoreHidden};
///
/// let scanner = DirectoryScanner::new()
///     .order(FileOrder::Modified)
///     .filter(IgnoreHidden)
///     .max_listed(100);
///
/// for file in scanner.scan("/var/spool/inbox".as_ref())? {
///     println!("{}", file.name());
/// }
/// # Ok::<(), sluice_sdk::SourceError>(())
/// ```
#[derive(Clone, Default)]
pub struct DirectoryScanner {
    order: FileOrder,
    filters: Vec<Arc<dyn FileFilter>>,
    max_listed: Option<usize>,
}

impl DirectoryScanner {
    /// A scanner with name order, no filters and no listing cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the selection order.
    pub fn order(mut self, order: FileOrder) -> Self {
        self.order = order;
        self
    }

    /// Add a filter. A file is eligible only if every filter accepts it.
    pub fn filter<F: FileFilter + 'static>(self, filter: F) -> Self {
        self.filter_shared(Arc::new(filter))
    }

    /// Add a filter the caller keeps a handle to.
    pub fn filter_shared(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Cap the number of files taken from one listing.
    pub fn max_listed(mut self, max: usize) -> Self {
        self.max_listed = Some(max);
        self
    }

    /// List eligible files of `dir`, sorted.
    pub fn scan(&self, dir: &Path) -> Result<Vec<ScannedFile>, SourceError> {
        let list_error = |source| SourceError::List {
            path: dir.to_path_buf(),
            source,
        };

        let limit = self.max_listed.unwrap_or(usize::MAX);
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(list_error)? {
            if files.len() >= limit {
                break;
            }
            let entry = entry.map_err(list_error)?;
            let path = entry.path();
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let file = ScannedFile::new(path, metadata.modified().ok());
            if self.filters.iter().all(|f| f.accept(&file)) {
                files.push(file);
            }
        }

        files.sort_by(|a, b| self.order.compare(a, b));
        Ok(files)
    }

    /// Tell the filters that `file` was taken in flight.
    pub fn mark_selected(&self, file: &ScannedFile) {
        for filter in &self.filters {
            filter.on_selected(file);
        }
    }
}

impl fmt::Debug for DirectoryScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryScanner")
            .field("order", &self.order)
            .field("filters", &self.filters.len())
            .field("max_listed", &self.max_listed)
            .finish()
    }
}

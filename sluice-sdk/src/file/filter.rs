//! File eligibility filters.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::scan::ScannedFile;

/// Decides whether a listed file may be selected.
///
/// `accept` is called for every file of every listing (including listings
/// made only to report state) and must not record anything. `on_selected`
/// is called only for the one file a source actually takes in flight.
pub trait FileFilter: Send + Sync {
    fn accept(&self, file: &ScannedFile) -> bool;

    fn on_selected(&self, _file: &ScannedFile) {}
}

/// Rejects dot-files.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreHidden;

impl FileFilter for IgnoreHidden {
    fn accept(&self, file: &ScannedFile) -> bool {
        !file.name().starts_with('.')
    }
}

/// Lets each path be selected once.
///
/// Once a file has been taken in flight it is rejected by later listings
/// until [`forget`](AcceptOnce::forget) releases it. Pair this with
/// `FileByFileSource::release` to skip a file that failed processing
/// without removing it from the directory.
///
/// State is in memory only.
///
/// ```rust
/// use std::sync::Arc;
/// use sluice_sdk::{AcceptOnce, FileByFileSource};
///
/// # let dir = tempfile::tempdir()?;
/// let seen = Arc::new(AcceptOnce::new());
/// let source = FileByFileSource::builder(dir.path())
///     .filter_shared(seen.clone())
///     .build()?;
/// # let _ = source;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct AcceptOnce {
    seen: Mutex<HashSet<PathBuf>>,
}

impl AcceptOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` selectable again. Returns true if it had been seen.
    pub fn forget(&self, path: &Path) -> bool {
        self.seen.lock().remove(path)
    }

    /// Forget every path.
    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl FileFilter for AcceptOnce {
    fn accept(&self, file: &ScannedFile) -> bool {
        !self.contains(file.path())
    }

    fn on_selected(&self, file: &ScannedFile) {
        self.seen.lock().insert(file.path().to_path_buf());
    }
}

impl fmt::Debug for AcceptOnce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptOnce")
            .field("seen", &self.len())
            .finish()
    }
}

/// A filter backed by a predicate closure.
pub struct FilterFn<F> {
    predicate: F,
}

/// Build a filter from a predicate.
pub fn filter_fn<F>(predicate: F) -> FilterFn<F>
where
    F: Fn(&ScannedFile) -> bool + Send + Sync,
{
    FilterFn { predicate }
}

impl<F> FileFilter for FilterFn<F>
where
    F: Fn(&ScannedFile) -> bool + Send + Sync,
{
    fn accept(&self, file: &ScannedFile) -> bool {
        (self.predicate)(file)
    }
}

impl<F> fmt::Debug for FilterFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FilterFn(..)")
    }
}

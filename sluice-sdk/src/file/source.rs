//! Single-flight directory source.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use sluice_types::{PollResult, SourceState};
use tracing::{debug, warn};

use super::filter::{FileFilter, IgnoreHidden};
use super::scan::{DirectoryScanner, FileOrder, ScannedFile};
use crate::error::SourceError;
use crate::source::PollSource;

/// In-flight bookkeeping, guarded by one lock.
#[derive(Debug, Default)]
struct InFlight {
    current: Option<PathBuf>,
    started_at: Option<SystemTime>,
    locked: bool,
}

impl InFlight {
    fn take(&mut self) -> Option<PathBuf> {
        self.started_at = None;
        self.current.take()
    }
}

/// Reads files from a directory one at a time.
///
/// Each poll that finds the source idle lists the directory, picks the first
/// eligible file in the configured order and returns it as an item whose
/// payload is the file path and whose correlation key is the file name. That
/// file is then *in flight*: every further poll returns `Empty` until the
/// caller resolves it with [`consume`](Self::consume),
/// [`relocate`](Self::relocate) or [`release`](Self::release).
///
/// Selection and resolution are serialized on an internal lock, so the
/// source can be shared across threads (typically as an `Arc`, keeping one
/// handle for resolution while a decorated pipeline polls another).
///
/// In-flight and locked state live in process memory only, and no lock is
/// taken against other processes: one source per directory is assumed.
///
/// # Example
///
/// ```rust
/// use sluice_sdk::{FileByFileSource, PollSource};
///
/// # let dir = tempfile::tempdir()?;
/// # std::fs::write(dir.path().join("a.txt"), "a")?;
/// # std::fs::write(dir.path().join("b.txt"), "b")?;
/// let source = FileByFileSource::new(dir.path())?;
///
/// let first = source.poll();
/// assert_eq!(first.correlation_key(), Some("a.txt"));
/// assert!(source.poll().is_empty()); // a.txt still in flight
///
/// source.consume()?;
/// assert_eq!(source.poll().correlation_key(), Some("b.txt"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct FileByFileSource {
    input_dir: PathBuf,
    target_dir: Option<PathBuf>,
    scanner: DirectoryScanner,
    state: Mutex<InFlight>,
}

impl FileByFileSource {
    /// A source over `input_dir` with default settings.
    ///
    /// The directory is created if missing.
    pub fn new(input_dir: impl Into<PathBuf>) -> Result<Self, SourceError> {
        Self::builder(input_dir).build()
    }

    /// Create a builder for configuring the source.
    pub fn builder(input_dir: impl Into<PathBuf>) -> FileByFileSourceBuilder {
        FileByFileSourceBuilder::new(input_dir)
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn target_dir(&self) -> Option<&Path> {
        self.target_dir.as_deref()
    }

    /// Delete the in-flight file and free the slot.
    ///
    /// A file that has already disappeared is not an error. The slot is
    /// freed even if deletion fails, so one stuck file cannot stall the
    /// source; the failure is still returned. Does nothing when no file is
    /// in flight.
    pub fn consume(&self) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        let Some(path) = state.take() else {
            return Ok(());
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "consumed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                warn!(file = %path.display(), "unable to delete in-flight file: {}", source);
                Err(SourceError::Delete { path, source })
            }
        }
    }

    /// Move the in-flight file into the configured target directory.
    ///
    /// Fails with [`SourceError::RelocationNotConfigured`], leaving the file
    /// in flight, if the source was built without a target directory.
    pub fn relocate(&self) -> Result<(), SourceError> {
        let target = self
            .target_dir
            .as_deref()
            .ok_or(SourceError::RelocationNotConfigured)?;
        self.relocate_to(target)
    }

    /// Move the in-flight file into `target_dir`, replacing a file of the
    /// same name, and free the slot.
    ///
    /// As with [`consume`](Self::consume), the slot is freed even if the
    /// move fails.
    pub fn relocate_to(&self, target_dir: &Path) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        let Some(path) = state.take() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let target = match path.file_name() {
            Some(name) => target_dir.join(name),
            None => target_dir.to_path_buf(),
        };
        match move_file(&path, &target) {
            Ok(()) => {
                debug!(file = %path.display(), target = %target.display(), "relocated");
                Ok(())
            }
            Err(source) => {
                warn!(file = %path.display(), "unable to relocate in-flight file: {}", source);
                Err(SourceError::Relocate {
                    path,
                    target,
                    source,
                })
            }
        }
    }

    /// Free the slot without touching the file.
    ///
    /// The file stays in the directory and is selectable again by the next
    /// poll unless a filter (such as [`AcceptOnce`](super::AcceptOnce))
    /// rejects it.
    pub fn release(&self) {
        if let Some(path) = self.state.lock().take() {
            debug!(file = %path.display(), "released");
        }
    }

    /// Stop selecting new files. An in-flight file stays in flight.
    pub fn lock(&self) {
        self.state.lock().locked = true;
    }

    /// Resume selecting files.
    pub fn unlock(&self) {
        self.state.lock().locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// True while a file is in flight.
    pub fn is_processing(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// Path of the in-flight file.
    pub fn current(&self) -> Option<PathBuf> {
        self.state.lock().current.clone()
    }

    /// When the in-flight file was selected.
    pub fn processing_since(&self) -> Option<SystemTime> {
        self.state.lock().started_at
    }

    /// Report the current state for operational tooling.
    ///
    /// Pending items are the eligible files behind the in-flight one, in
    /// selection order. A directory that cannot be listed reports none.
    pub fn snapshot(&self) -> SourceState {
        let (locked, current, started_at) = {
            let state = self.state.lock();
            (state.locked, state.current.clone(), state.started_at)
        };

        let pending = match self.scanner.scan(&self.input_dir) {
            Ok(files) => files
                .into_iter()
                .filter(|f| current.as_deref() != Some(f.path()))
                .map(|f| f.name().to_string())
                .collect(),
            Err(e) => {
                warn!("unable to list pending files: {}", e);
                Vec::new()
            }
        };

        let mut builder = SourceState::builder().locked(locked).pending(pending);
        if let Some(path) = current {
            builder = builder.current(file_name(&path), started_at.map_or(0, unix_millis));
        }
        builder.build()
    }

    fn select(&self, state: &mut InFlight) -> Option<ScannedFile> {
        let files = match self.scanner.scan(&self.input_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        let file = files.into_iter().next()?;
        self.scanner.mark_selected(&file);
        state.current = Some(file.path().to_path_buf());
        state.started_at = Some(SystemTime::now());
        Some(file)
    }
}

impl PollSource for FileByFileSource {
    type Item = PathBuf;

    fn poll(&self) -> PollResult<PathBuf> {
        let mut state = self.state.lock();
        if state.locked || state.current.is_some() {
            return PollResult::Empty;
        }

        match self.select(&mut state) {
            Some(file) => {
                debug!(file = %file.name(), "selected");
                let key = file.name().to_string();
                PollResult::item(file.into_path(), key)
            }
            None => PollResult::Empty,
        }
    }
}

/// Builder for configuring a [`FileByFileSource`].
#[derive(Debug)]
pub struct FileByFileSourceBuilder {
    input_dir: PathBuf,
    target_dir: Option<PathBuf>,
    scanner: DirectoryScanner,
}

impl FileByFileSourceBuilder {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            target_dir: None,
            scanner: DirectoryScanner::new(),
        }
    }

    /// Directory that [`FileByFileSource::relocate`] moves files into.
    /// Created at build time if missing.
    pub fn target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    /// Selection order. Defaults to [`FileOrder::Name`].
    pub fn order(mut self, order: FileOrder) -> Self {
        self.scanner = self.scanner.order(order);
        self
    }

    /// Add an eligibility filter.
    pub fn filter<F: FileFilter + 'static>(mut self, filter: F) -> Self {
        self.scanner = self.scanner.filter(filter);
        self
    }

    /// Add a filter the caller keeps a handle to.
    pub fn filter_shared(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.scanner = self.scanner.filter_shared(filter);
        self
    }

    /// Skip dot-files.
    pub fn ignore_hidden(self, ignore: bool) -> Self {
        if ignore {
            self.filter(IgnoreHidden)
        } else {
            self
        }
    }

    /// Cap how many files a single listing considers.
    pub fn max_listed(mut self, max: usize) -> Self {
        self.scanner = self.scanner.max_listed(max);
        self
    }

    /// Replace the scanner entirely.
    pub fn scanner(mut self, scanner: DirectoryScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Create missing directories and build the source.
    pub fn build(self) -> Result<FileByFileSource, SourceError> {
        ensure_directory(&self.input_dir)?;
        if let Some(target) = &self.target_dir {
            ensure_directory(target)?;
        }
        Ok(FileByFileSource {
            input_dir: self.input_dir,
            target_dir: self.target_dir,
            scanner: self.scanner,
            state: Mutex::new(InFlight::default()),
        })
    }
}

fn ensure_directory(path: &Path) -> Result<(), SourceError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(SourceError::NotADirectory(path.to_path_buf()));
        }
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| SourceError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })
}

/// Rename with replace; falls back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if fs::copy(from, to).is_err() {
                return Err(rename_err);
            }
            fs::remove_file(from)
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tempfile::TempDir;

    use super::*;
    use crate::file::AcceptOnce;

    fn dir_with(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        dir
    }

    fn key(result: &PollResult<PathBuf>) -> Option<&str> {
        result.correlation_key()
    }

    #[test]
    fn single_flight_until_consumed() {
        let dir = dir_with(&["a.txt", "b.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();

        let first = source.poll();
        assert_eq!(key(&first), Some("a.txt"));
        assert_eq!(first.payload(), Some(&dir.path().join("a.txt")));
        assert!(source.poll().is_empty());
        assert!(source.is_processing());

        source.consume().unwrap();
        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(key(&source.poll()), Some("b.txt"));
    }

    #[test]
    fn empty_directory_polls_empty() {
        let dir = TempDir::new().unwrap();
        let source = FileByFileSource::new(dir.path()).unwrap();
        assert!(source.poll().is_empty());
        assert!(!source.is_processing());
    }

    #[test]
    fn listing_is_reevaluated_each_poll() {
        let dir = TempDir::new().unwrap();
        let source = FileByFileSource::new(dir.path()).unwrap();
        assert!(source.poll().is_empty());

        fs::write(dir.path().join("late.txt"), "x").unwrap();
        assert_eq!(key(&source.poll()), Some("late.txt"));
    }

    #[test]
    fn new_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("in").join("box");

        let source = FileByFileSource::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(source.input_dir(), nested.as_path());
    }

    #[test]
    fn new_rejects_a_file_path() {
        let dir = dir_with(&["plain.txt"]);
        let err = FileByFileSource::new(dir.path().join("plain.txt")).unwrap_err();
        assert!(matches!(err, SourceError::NotADirectory(_)));
    }

    #[test]
    fn relocate_moves_into_target_and_frees_slot() {
        let dir = dir_with(&["a.txt", "b.txt"]);
        let archive = TempDir::new().unwrap();
        let source = FileByFileSource::builder(dir.path())
            .target_dir(archive.path())
            .build()
            .unwrap();

        assert_eq!(key(&source.poll()), Some("a.txt"));
        source.relocate().unwrap();

        assert!(archive.path().join("a.txt").exists());
        assert!(!dir.path().join("a.txt").exists());
        assert!(!source.is_processing());
        assert_eq!(key(&source.poll()), Some("b.txt"));
    }

    #[test]
    fn relocate_replaces_existing_destination() {
        let dir = dir_with(&["a.txt"]);
        let archive = dir_with(&["a.txt"]);
        fs::write(archive.path().join("a.txt"), "old").unwrap();
        fs::write(dir.path().join("a.txt"), "new").unwrap();

        let source = FileByFileSource::new(dir.path()).unwrap();
        source.poll();
        source.relocate_to(archive.path()).unwrap();

        assert_eq!(fs::read_to_string(archive.path().join("a.txt")).unwrap(), "new");
    }

    #[test]
    fn relocate_without_target_fails_fast_and_keeps_file_in_flight() {
        let dir = dir_with(&["a.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();
        source.poll();

        let err = source.relocate().unwrap_err();
        assert!(matches!(err, SourceError::RelocationNotConfigured));
        assert!(source.is_processing());
    }

    #[test]
    fn failed_relocation_still_frees_slot() {
        let dir = dir_with(&["a.txt", "b.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();
        source.poll();

        let missing = dir.path().join("no-such-dir");
        let err = source.relocate_to(&missing).unwrap_err();
        assert!(err.is_resolution_failure());
        assert!(!source.is_processing());
        assert_eq!(key(&source.poll()), Some("a.txt"));
    }

    #[test]
    fn consume_of_vanished_file_is_ok() {
        let dir = dir_with(&["a.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();
        source.poll();
        fs::remove_file(dir.path().join("a.txt")).unwrap();

        source.consume().unwrap();
        assert!(!source.is_processing());
    }

    #[test]
    fn resolution_without_flight_is_noop() {
        let dir = dir_with(&["a.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();

        source.consume().unwrap();
        source.relocate_to(dir.path()).unwrap();
        source.release();
        assert!(dir.path().join("a.txt").exists());
    }

    #[test]
    fn release_makes_file_selectable_again() {
        let dir = dir_with(&["a.txt", "b.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();

        assert_eq!(key(&source.poll()), Some("a.txt"));
        source.release();
        assert!(dir.path().join("a.txt").exists());
        assert_eq!(key(&source.poll()), Some("a.txt"));
    }

    #[test]
    fn release_with_accept_once_skips_file() {
        let dir = dir_with(&["a.txt", "b.txt"]);
        let seen = Arc::new(AcceptOnce::new());
        let source = FileByFileSource::builder(dir.path())
            .filter_shared(seen.clone())
            .build()
            .unwrap();

        assert_eq!(key(&source.poll()), Some("a.txt"));
        source.release();
        assert_eq!(key(&source.poll()), Some("b.txt"));
        source.release();
        assert!(source.poll().is_empty());

        seen.forget(&dir.path().join("a.txt"));
        assert_eq!(key(&source.poll()), Some("a.txt"));
    }

    #[test]
    fn lock_suspends_selection() {
        let dir = dir_with(&["a.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();

        source.lock();
        assert!(source.is_locked());
        assert!(source.poll().is_empty());

        source.unlock();
        assert_eq!(key(&source.poll()), Some("a.txt"));
    }

    #[test]
    fn snapshot_reports_flight_and_pending() {
        let dir = dir_with(&["c.txt", "a.txt", "b.txt"]);
        let source = FileByFileSource::new(dir.path()).unwrap();

        let idle = source.snapshot();
        assert!(!idle.processing);
        assert_eq!(idle.pending_items, vec!["a.txt", "b.txt", "c.txt"]);

        source.poll();
        source.lock();
        let busy = source.snapshot();
        assert!(busy.locked);
        assert!(busy.processing);
        assert_eq!(busy.current_item.as_deref(), Some("a.txt"));
        assert!(busy.processing_since_ms.is_some_and(|ms| ms > 0));
        assert_eq!(busy.pending_items, vec!["b.txt", "c.txt"]);
    }

    #[test]
    fn snapshot_does_not_mark_accept_once() {
        let dir = dir_with(&["a.txt"]);
        let seen = Arc::new(AcceptOnce::new());
        let source = FileByFileSource::builder(dir.path())
            .filter_shared(seen.clone())
            .build()
            .unwrap();

        source.snapshot();
        assert!(seen.is_empty());
        assert_eq!(key(&source.poll()), Some("a.txt"));
    }

    #[test]
    fn concurrent_pollers_never_share_a_file() {
        let names: Vec<String> = (0..20).map(|i| format!("f{i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = dir_with(&refs);
        let source = Arc::new(FileByFileSource::new(dir.path()).unwrap());
        let taken = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let source = Arc::clone(&source);
                let taken = Arc::clone(&taken);
                thread::spawn(move || loop {
                    let mut seen = taken.lock();
                    if seen.len() == 20 {
                        break;
                    }
                    drop(seen);
                    if let Some((path, name)) = source.poll().into_option() {
                        seen = taken.lock();
                        seen.push(name);
                        drop(seen);
                        assert!(path.exists());
                        source.consume().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut taken = taken.lock().clone();
        taken.sort();
        assert_eq!(taken, names);
    }
}

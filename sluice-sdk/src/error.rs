//! Error types for sources.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by source construction and item resolution.
///
/// Polling never returns an error: "nothing available" is
/// [`PollResult::Empty`](sluice_types::PollResult::Empty).
#[derive(Debug, Error)]
pub enum SourceError {
    /// A configured path exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A configured directory was missing and could not be created.
    #[error("unable to create directory {}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `relocate` was called on a source without a target directory.
    #[error("unable to relocate file, no target directory is configured")]
    RelocationNotConfigured,

    /// Deleting the in-flight file failed. The in-flight slot was still freed.
    #[error("unable to delete {}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving the in-flight file failed. The in-flight slot was still freed.
    #[error("unable to move {} to {}", path.display(), target.display())]
    Relocate {
        path: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Listing a directory failed.
    #[error("unable to list files from {}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// True for errors raised while resolving an in-flight item.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, SourceError::Delete { .. } | SourceError::Relocate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_paths() {
        let err = SourceError::Relocate {
            path: PathBuf::from("/in/a.txt"),
            target: PathBuf::from("/archive/a.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "unable to move /in/a.txt to /archive/a.txt");
        assert!(err.is_resolution_failure());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn configuration_errors_are_not_resolution_failures() {
        assert!(!SourceError::RelocationNotConfigured.is_resolution_failure());
        assert!(!SourceError::NotADirectory(PathBuf::from("x")).is_resolution_failure());
    }
}

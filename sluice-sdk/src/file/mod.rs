//! Directory-backed sources.
//!
//! [`FileByFileSource`] hands out the files of a directory one at a time.
//! Which files are eligible and in what order is decided by a
//! [`DirectoryScanner`], configured with [`FileFilter`]s and a [`FileOrder`].

mod filter;
mod scan;
mod source;

pub use filter::{filter_fn, AcceptOnce, FileFilter, FilterFn, IgnoreHidden};
pub use scan::{DirectoryScanner, FileOrder, ScannedFile};
pub use source::{FileByFileSource, FileByFileSourceBuilder};

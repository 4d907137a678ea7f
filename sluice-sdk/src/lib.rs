//! # sluice-sdk
//!
//! Composable decorators for pull-based message sources.
//!
//! A [`PollSource`] answers each `poll()` immediately with one item or
//! `Empty`. The decorators in this crate wrap any source and change *when*
//! it is polled or what happens around it, without knowing what it reads:
//!
//! - [`InactivityBackoff`]: skip polling for a while after an empty poll
//! - [`Gate`]: only poll while a predicate holds
//! - [`BatchBoundary`]: run an action before or after each batch of items
//! - [`FileByFileSource`]: hand out the files of a directory one at a time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sluice_sdk::{ExecutionMode, FileByFileSource, PollSource, PollSourceExt};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let files = Arc::new(
//!         FileByFileSource::builder("/var/spool/inbox")
//!             .target_dir("/var/spool/done")
//!             .build()?,
//!     );
//!
//!     // Outermost decorator sees every poll first
//!     let pipeline = Arc::clone(&files)
//!         .after_batch(|| println!("inbox drained"), ExecutionMode::Sync)
//!         .inactivity_backoff(Duration::from_secs(5));
//!
//!     loop {
//!         if let Some((path, name)) = pipeline.poll().into_option() {
//!             println!("processing {name} at {}", path.display());
//!             files.relocate()?;
//!         }
//!         std::thread::sleep(Duration::from_millis(200));
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - `tokio` (default): detached batch actions run on the runtime's
//!   blocking pool when called from inside a runtime
//! - `serde`: serialization for [`PollResult`] and [`SourceState`]

mod backoff;
mod batch;
mod clock;
mod error;
mod file;
mod gate;
mod source;

pub use backoff::InactivityBackoff;
pub use batch::{BatchAction, BatchBoundary, BatchEdge, ExecutionMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SourceError;
pub use file::{
    filter_fn, AcceptOnce, DirectoryScanner, FileByFileSource, FileByFileSourceBuilder,
    FileFilter, FileOrder, FilterFn, IgnoreHidden, ScannedFile,
};
pub use gate::{Gate, GateSwitch};
pub use source::{BoxedSource, FnSource, PollSource, PollSourceExt};

// Re-export types for convenience
pub use sluice_types::{PollResult, SourceState, SCHEMA_VERSION};

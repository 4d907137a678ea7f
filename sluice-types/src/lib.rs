//! # sluice-types
//!
//! Core types shared by pull-based message sources. A source is polled
//! repeatedly by an external scheduler and answers each poll with a
//! [`PollResult`]: either nothing, or one item together with a correlation
//! key that names the resource it came from.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` to export [`SourceState`] snapshots as JSON
//! - **Transport agnostic**: Payloads are plain values, no headers model is imposed
//! - **Schema number**: Snapshots say which layout they were written with
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: JSON/TOML/etc. serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use sluice_types::{PollResult, SourceState};
//!
//! let result = PollResult::item("payload", "a.txt");
//! assert_eq!(result.correlation_key(), Some("a.txt"));
//!
//! let state = SourceState::builder()
//!     .current("a.txt", 1703160000000)
//!     .pending(["b.txt", "c.txt"])
//!     .build();
//!
//! assert!(state.processing);
//! assert_eq!(state.pending_items.len(), 2);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. Serialized snapshots carry it in the
//! `schema` field; readers should reject a schema they do not know.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod poll;
mod state;

pub use poll::*;
pub use state::*;

/// Current snapshot schema. Bump on breaking changes to [`SourceState`].
pub const SCHEMA_VERSION: u32 = 1;

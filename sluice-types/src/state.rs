//! SourceState - a point-in-time view of a single-flight source.

use alloc::string::String;
use alloc::vec::Vec;

use crate::SCHEMA_VERSION;

/// A read-only snapshot of a single-flight source, for operational tooling.
///
/// The polling path never reads this; it exists so operators can see
/// whether a source is locked, what is in flight and since when, and what
/// is waiting behind it.
///
/// # Example
///
/// ```rust
/// use sluice_types::SourceState;
///
/// let state = SourceState::builder()
///     .locked(true)
///     .pending(["b.txt"])
///     .build();
///
/// assert!(state.locked);
/// assert!(!state.processing);
/// assert_eq!(state.current_item, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceState {
    /// Snapshot schema, [`SCHEMA_VERSION`] when produced by this crate.
    pub schema: u32,

    /// Whether selection of new items is suspended.
    pub locked: bool,

    /// Whether an item is in flight.
    pub processing: bool,

    /// Unix timestamp in milliseconds when the in-flight item was selected.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub processing_since_ms: Option<u64>,

    /// Name of the in-flight item.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub current_item: Option<String>,

    /// Names of the items waiting to be selected, in selection order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub pending_items: Vec<String>,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            locked: false,
            processing: false,
            processing_since_ms: None,
            current_item: None,
            pending_items: Vec::new(),
        }
    }
}

impl SourceState {
    /// A state with nothing in flight, unlocked, and nothing pending.
    pub fn idle() -> Self {
        Self::default()
    }

    /// True if this snapshot was written with a schema this crate reads.
    pub fn is_supported_schema(&self) -> bool {
        self.schema == SCHEMA_VERSION
    }

    /// Create a builder for source state.
    pub fn builder() -> SourceStateBuilder {
        SourceStateBuilder::new()
    }

    /// True if nothing is in flight and nothing is pending.
    pub fn is_idle(&self) -> bool {
        !self.processing && self.pending_items.is_empty()
    }

    /// Number of items waiting behind the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.pending_items.len()
    }

    /// How long the current item has been in flight, relative to `now_ms`.
    pub fn processing_for_ms(&self, now_ms: u64) -> Option<u64> {
        self.processing_since_ms
            .map(|since| now_ms.saturating_sub(since))
    }
}

/// Builder for constructing `SourceState` instances.
#[derive(Debug, Default)]
pub struct SourceStateBuilder {
    locked: bool,
    current: Option<(String, u64)>,
    pending: Vec<String>,
}

impl SourceStateBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the locked flag.
    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Mark an item as in flight since `since_ms` (Unix milliseconds).
    pub fn current(mut self, name: impl Into<String>, since_ms: u64) -> Self {
        self.current = Some((name.into(), since_ms));
        self
    }

    /// Set the pending items, in selection order.
    pub fn pending<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.pending = names.into_iter().map(Into::into).collect();
        self
    }

    /// Build the state.
    pub fn build(self) -> SourceState {
        let (current_item, processing_since_ms) = match self.current {
            Some((name, since)) => (Some(name), Some(since)),
            None => (None, None),
        };
        SourceState {
            schema: SCHEMA_VERSION,
            locked: self.locked,
            processing: current_item.is_some(),
            processing_since_ms,
            current_item,
            pending_items: self.pending,
        }
    }
}

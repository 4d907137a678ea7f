//! PollResult - the answer to a single poll.

use alloc::string::String;

/// The value returned by every poll of a message source.
///
/// A poll either finds nothing ([`PollResult::Empty`]) or yields exactly one
/// item. Emptiness is the normal "nothing available right now" answer and is
/// never an error.
///
/// The correlation key is derived from the identity of the originating
/// resource (a file name, for a directory source) so downstream consumers can
/// refer back to it.
///
/// # Example
///
/// ```rust
/// use sluice_types::PollResult;
///
/// let empty: PollResult<u32> = PollResult::Empty;
/// assert!(empty.is_empty());
///
/// let item = PollResult::item(42, "answer");
/// assert_eq!(item.payload(), Some(&42));
/// assert_eq!(item.map(|n| n * 2).into_payload(), Some(84));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum PollResult<T> {
    /// Nothing is available now.
    Empty,

    /// One item.
    Item {
        /// The produced value.
        payload: T,
        /// Identity of the resource the payload came from.
        correlation_key: String,
    },
}

impl<T> PollResult<T> {
    /// Create an item result.
    pub fn item(payload: T, correlation_key: impl Into<String>) -> Self {
        PollResult::Item {
            payload,
            correlation_key: correlation_key.into(),
        }
    }

    /// Returns true if the poll found nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, PollResult::Empty)
    }

    /// Returns true if the poll produced an item.
    pub fn is_item(&self) -> bool {
        !self.is_empty()
    }

    /// Borrow the payload, if any.
    pub fn payload(&self) -> Option<&T> {
        match self {
            PollResult::Item { payload, .. } => Some(payload),
            PollResult::Empty => None,
        }
    }

    /// Borrow the correlation key, if any.
    pub fn correlation_key(&self) -> Option<&str> {
        match self {
            PollResult::Item {
                correlation_key, ..
            } => Some(correlation_key),
            PollResult::Empty => None,
        }
    }

    /// Take the payload, dropping the correlation key.
    pub fn into_payload(self) -> Option<T> {
        self.into_option().map(|(payload, _)| payload)
    }

    /// Convert into `Some((payload, correlation_key))` or `None`.
    pub fn into_option(self) -> Option<(T, String)> {
        match self {
            PollResult::Item {
                payload,
                correlation_key,
            } => Some((payload, correlation_key)),
            PollResult::Empty => None,
        }
    }

    /// Transform the payload, keeping the correlation key.
    pub fn map<U, F>(self, f: F) -> PollResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            PollResult::Item {
                payload,
                correlation_key,
            } => PollResult::Item {
                payload: f(payload),
                correlation_key,
            },
            PollResult::Empty => PollResult::Empty,
        }
    }
}

impl<T> Default for PollResult<T> {
    fn default() -> Self {
        PollResult::Empty
    }
}

impl<T> From<Option<(T, String)>> for PollResult<T> {
    fn from(value: Option<(T, String)>) -> Self {
        match value {
            Some((payload, correlation_key)) => PollResult::Item {
                payload,
                correlation_key,
            },
            None => PollResult::Empty,
        }
    }
}

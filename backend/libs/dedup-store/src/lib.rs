//! # Dedup Store
//!
//! Process-local, capacity-bounded record of message identifiers a consumer
//! has already handled. Used to give at-most-once-per-process delivery on top
//! of a broadcast channel that may redeliver the same message.
//!
//! ## Semantics
//!
//! - **Membership**: O(1) lookup and insertion (hash set).
//! - **Bounded**: a fixed capacity (10,000 by default). Once full, new
//!   identifiers are *not* recorded and nothing is evicted. The caller keeps
//!   processing; those identifiers simply cannot be deduplicated.
//! - **Append-only**: there is no removal. The store is emptied only by
//!   [`DedupStore::release`] at shutdown.
//! - **Process-local**: every worker instance owns its own store; nothing is
//!   shared across processes.
//!
//! ## Usage
//!
//! ```
//! use dedup_store::{DedupStore, MessageId};
//!
//! let mut store = DedupStore::new();
//! let id = MessageId::new("11111111-1111-1111-1111-111111111111");
//!
//! assert!(!store.seen(&id));
//! store.record(id.clone()).unwrap();
//! assert!(store.seen(&id));
//! ```
//!
//! ## Identifier bounds
//!
//! Identifiers are canonically 36-character UUID strings. Longer inputs are
//! truncated to [`MESSAGE_ID_LEN`] bytes (on a character boundary) when the
//! [`MessageId`] is built, so a store entry never exceeds that size.

use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

mod error;

pub use error::{DedupError, DedupResult};

/// Canonical identifier length (a hyphenated UUID).
pub const MESSAGE_ID_LEN: usize = 36;

/// Default number of identifiers a store tracks before it stops recording.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Message identifier bounded to [`MESSAGE_ID_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    /// Build an identifier, truncating anything past [`MESSAGE_ID_LEN`] bytes.
    pub fn new(raw: &str) -> Self {
        let mut end = raw.len().min(MESSAGE_ID_LEN);
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        Self(raw[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Capacity-bounded set of handled message identifiers.
#[derive(Debug)]
pub struct DedupStore {
    ids: HashSet<MessageId>,
    capacity: usize,
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupStore {
    /// Create a store with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store that records at most `capacity` identifiers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// True iff `id` was recorded earlier.
    ///
    /// Identifiers offered after the store filled up were never recorded, so
    /// they report `false`.
    pub fn seen(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Record an identifier as handled.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the identifier was newly recorded
    /// - `Ok(false)` if it was already present (the store is unchanged)
    /// - `Err(CapacityExceeded)` if the store is full; nothing is recorded
    ///   and nothing is evicted
    pub fn record(&mut self, id: MessageId) -> DedupResult<bool> {
        if self.ids.contains(&id) {
            return Ok(false);
        }

        if self.ids.len() >= self.capacity {
            warn!(
                message_id = %id,
                capacity = self.capacity,
                "Processed message limit reached, identifier will not be tracked"
            );
            return Err(DedupError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        debug!(message_id = %id, tracked = self.ids.len() + 1, "Recorded message id");
        self.ids.insert(id);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.ids.len() >= self.capacity
    }

    /// Drop every recorded identifier and free the backing memory.
    ///
    /// Returns how many identifiers were released; a second call returns 0.
    pub fn release(&mut self) -> usize {
        let released = self.ids.len();
        self.ids = HashSet::new();
        released
    }
}

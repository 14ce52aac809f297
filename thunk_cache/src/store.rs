//! Persistent thunk storage for ahead-of-time compiles.
//!
//! Thunks generated for a persisted compile must outlive the producing
//! process, so they cannot be kept in the in-process trie: its entries point
//! at this process's memory. The cache hands them to a
//! [`PersistentThunkStore`] instead and never takes its own lock on that
//! path; the store provides whatever consistency it needs.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::handle::ThunkHandle;
use crate::shape::CallShape;

/// Cross-process storage keyed by [`CallShape`].
pub trait PersistentThunkStore: Send + Sync {
    /// Thunk previously stored for `shape`.
    fn lookup(&self, shape: &CallShape) -> Option<ThunkHandle>;

    /// Persist `handle` under `shape`.
    fn store(&self, handle: &ThunkHandle, shape: &CallShape);
}

/// Store backed by a concurrent map of relocated thunk copies.
///
/// Models a shared region: `store` copies the blob so the stored entry does
/// not reference the caller's allocation, and the first thunk stored for a
/// shape is kept.
#[derive(Debug, Default)]
pub struct SharedThunkStore {
    entries: DashMap<CallShape, ThunkHandle, FxBuildHasher>,
}

impl SharedThunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Number of persisted thunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistentThunkStore for SharedThunkStore {
    fn lookup(&self, shape: &CallShape) -> Option<ThunkHandle> {
        self.entries.get(shape).map(|entry| entry.value().clone())
    }

    fn store(&self, handle: &ThunkHandle, shape: &CallShape) {
        self.entries
            .entry(shape.clone())
            .or_insert_with(|| handle.relocated());
    }
}

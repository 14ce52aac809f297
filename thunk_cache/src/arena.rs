//! Index-addressed arena for trie nodes.
//!
//! The arena provides:
//! - **Durable IDs**: an [`Id`] is an index and stays valid for the arena's lifetime
//! - **Append-only growth**: items are never removed individually
//! - **Contiguous storage**: nodes live in one `Vec`, so growth relocates all of them
//!
//! Because growth moves the backing store, no `&T` obtained from the arena may
//! be held across an [`Arena::alloc`]. The borrow checker enforces this for
//! safe callers; code walking the arena re-derives each item from its ID
//! after every allocation.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

// =============================================================================
// Typed ID
// =============================================================================

/// Slot number of an item in an [`Arena<T>`].
///
/// Stored as `u32` to keep trie child links compact. Comparison and hashing
/// look only at the slot, so `T` needs no bounds.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Id<T> {
    /// Create an ID from a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Index as usize.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Append-only arena of homogeneous items.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
    /// Number of times an allocation found the backing store full.
    reallocations: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena.
    #[inline]
    pub fn new() -> Self {
        Arena {
            items: Vec::new(),
            reallocations: 0,
        }
    }

    /// Create an arena that can hold `capacity` items before growing.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            items: Vec::with_capacity(capacity),
            reallocations: 0,
        }
    }

    /// Allocate a new item and return its ID.
    ///
    /// May relocate every existing item.
    #[inline]
    pub fn alloc(&mut self, item: T) -> Id<T> {
        if self.items.len() == self.items.capacity() {
            self.reallocations += 1;
            tracing::trace!(
                len = self.items.len(),
                capacity = self.items.capacity(),
                "node arena growing"
            );
        }
        let index = self.items.len() as u32;
        self.items.push(item);
        Id::new(index)
    }

    /// Get an item by ID.
    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.as_usize())
    }

    /// Number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the arena is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items the backing store holds before it must grow.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Number of growth events so far.
    #[inline]
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    /// Iterate over all items with their IDs.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Id::new(i as u32), item))
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &Self::Output {
        &self.items[id.as_usize()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        &mut self.items[id.as_usize()]
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Thunk allocation.
//!
//! The cache never allocates code. A code generator asks a [`ThunkFactory`]
//! for a blob sized for the thunk it is about to emit, then registers the
//! resulting handle with the cache.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::handle::ThunkHandle;
use crate::shape::CallShape;

/// Filler for code bytes the emitter does not write (`int3`).
pub const TRAP_BYTE: u8 = 0xcc;

/// Produces thunk blobs.
pub trait ThunkFactory: Send + Sync {
    /// Allocate a thunk of `code_size` bytes for `shape`.
    fn allocate(&self, code_size: usize, shape: &CallShape) -> ThunkHandle;
}

/// Factory that allocates thunk code on the heap.
#[derive(Debug)]
pub struct HeapThunkFactory {
    next_id: AtomicU64,
}

impl HeapThunkFactory {
    /// Create a factory whose first thunk gets id 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a trap-filled buffer, let `emit` write the code, and wrap it.
    pub fn emit(
        &self,
        code_size: usize,
        shape: &CallShape,
        emit: impl FnOnce(&mut [u8]),
    ) -> ThunkHandle {
        let mut code = vec![TRAP_BYTE; code_size].into_boxed_slice();
        emit(&mut code);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id, %shape, code_size, "allocated thunk");
        ThunkHandle::new(id, shape.clone(), code)
    }

    /// Number of thunks allocated so far.
    pub fn allocated(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }
}

impl Default for HeapThunkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ThunkFactory for HeapThunkFactory {
    fn allocate(&self, code_size: usize, shape: &CallShape) -> ThunkHandle {
        self.emit(code_size, shape, |_| {})
    }
}

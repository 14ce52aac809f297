//! Signature-keyed cache of call-boundary thunks for the JIT.
//!
//! Compiled code that calls into the interpreter goes through a small
//! generated stub that moves arguments from the compiled calling convention
//! into the interpreter's. The stub depends only on the argument and return
//! classes, so stubs are shared between every descriptor that reduces to the
//! same [`CallShape`].
//!
//! - [`shape`]: descriptor → call shape reduction
//! - [`arena`] / [`trie`]: index-addressed node storage and the shape trie
//! - [`cache`]: the locked table, persisted-mode pass-through, diagnostics
//! - [`factory`] / [`store`] / [`sink`]: collaborators the cache talks to
#![deny(unsafe_op_in_unsafe_fn)]
pub mod arena;
pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod handle;
pub mod shape;
pub mod sink;
pub mod store;
pub mod trie;

pub use cache::{ThunkCache, ThunkCacheStats, ThunkMode};
pub use config::ThunkCacheConfig;
pub use error::{ConsistencyViolation, ThunkError, ThunkResult};
pub use factory::{HeapThunkFactory, ThunkFactory};
pub use handle::ThunkHandle;
pub use shape::{CallShape, PointerWidth, TypeClass, reduce, reduce_bounded};
pub use sink::{DiagnosticSink, TracingSink};
pub use store::{PersistentThunkStore, SharedThunkStore};

//! Signature-keyed thunk cache.
//!
//! The cache provides:
//! - At most one thunk per [`CallShape`] for the current run
//! - Insert-then-verify under a single table lock
//! - A lock-free pass-through to a [`PersistentThunkStore`] for persisted compiles
//! - Statistics and a diagnostic dump
//!
//! Callers own the cache and pass it to every compiler thread that needs
//! thunks; there is no global instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::ThunkCacheConfig;
use crate::error::{ConsistencyViolation, ThunkError, ThunkResult};
use crate::factory::ThunkFactory;
use crate::handle::ThunkHandle;
use crate::shape::{self, CallShape};
use crate::sink::DiagnosticSink;
use crate::store::PersistentThunkStore;
use crate::trie::SignatureTrie;

// =============================================================================
// Mode
// =============================================================================

/// Where a thunk lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThunkMode {
    /// In-process thunk, valid for the current run only.
    CurrentRun,
    /// Thunk for an ahead-of-time compile, kept in the persistent store.
    Persisted,
}

// =============================================================================
// Thunk Cache
// =============================================================================

/// Table of generated thunks keyed by call shape.
///
/// Thread-safe via internal locking.
pub struct ThunkCache {
    /// Display name used in diagnostics.
    name: String,
    /// Reducer and arena settings.
    config: ThunkCacheConfig,
    /// Trie of current-run thunks. Every current-run operation holds this
    /// lock for its whole duration.
    trie: Mutex<SignatureTrie>,
    /// Backing store for persisted mode.
    store: Option<Arc<dyn PersistentThunkStore>>,
    /// Lookup hit counter.
    hits: AtomicU64,
    /// Lookup miss counter.
    misses: AtomicU64,
    /// Insert counter.
    insertions: AtomicU64,
    /// Inserts that displaced an existing thunk.
    replacements: AtomicU64,
    /// Lookups forwarded to the persistent store.
    persisted_lookups: AtomicU64,
    /// Stores forwarded to the persistent store.
    persisted_stores: AtomicU64,
}

impl ThunkCache {
    /// Create a cache with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ThunkCacheConfig::default())
    }

    /// Create a cache with an explicit configuration.
    pub fn with_config(name: impl Into<String>, config: ThunkCacheConfig) -> Self {
        let name = name.into();
        tracing::debug!(cache = %name, ?config, "creating thunk cache");
        Self {
            trie: Mutex::new(SignatureTrie::with_capacity(config.initial_nodes)),
            name,
            config,
            store: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            replacements: AtomicU64::new(0),
            persisted_lookups: AtomicU64::new(0),
            persisted_stores: AtomicU64::new(0),
        }
    }

    /// Attach the store used for [`ThunkMode::Persisted`].
    pub fn with_store(mut self, store: Arc<dyn PersistentThunkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this cache was built with.
    #[inline]
    pub fn config(&self) -> &ThunkCacheConfig {
        &self.config
    }

    /// Reduce `descriptor` with this cache's pointer width and bound.
    #[inline]
    pub fn reduce(&self, descriptor: &str) -> ThunkResult<CallShape> {
        shape::reduce_bounded(descriptor, self.config.pointer_width, self.config.max_shape_len)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Look up the thunk for `descriptor`.
    pub fn find(&self, descriptor: &str, mode: ThunkMode) -> ThunkResult<Option<ThunkHandle>> {
        if mode == ThunkMode::Persisted {
            let shape = self.reduce(descriptor)?;
            return self.find_persisted(&shape);
        }

        let trie = self.trie.lock();
        let shape = self.reduce(descriptor)?;
        Ok(self.find_locked(&trie, &shape))
    }

    /// Look up the thunk for an already reduced shape.
    pub fn find_shape(
        &self,
        shape: &CallShape,
        mode: ThunkMode,
    ) -> ThunkResult<Option<ThunkHandle>> {
        self.check_bound(shape)?;
        match mode {
            ThunkMode::Persisted => self.find_persisted(shape),
            ThunkMode::CurrentRun => {
                let trie = self.trie.lock();
                Ok(self.find_locked(&trie, shape))
            }
        }
    }

    /// Look up a thunk the caller knows was already added.
    ///
    /// # Panics
    /// Panics if no thunk is stored for `descriptor`; another thread having
    /// added it is a precondition, so a miss means upstream state is broken.
    pub fn expect(&self, descriptor: &str, mode: ThunkMode) -> ThunkResult<ThunkHandle> {
        match self.find(descriptor, mode)? {
            Some(handle) => Ok(handle),
            None => {
                tracing::error!(
                    cache = %self.name,
                    descriptor,
                    ?mode,
                    "expected thunk is missing"
                );
                panic!(
                    "thunk cache {:?}: no thunk for {} ({:?}) although one was expected",
                    self.name, descriptor, mode
                );
            }
        }
    }

    fn find_locked(&self, trie: &SignatureTrie, shape: &CallShape) -> Option<ThunkHandle> {
        let result = trie
            .lookup(trie.root(), shape)
            .and_then(|node| trie.thunk(node))
            .cloned();

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn find_persisted(&self, shape: &CallShape) -> ThunkResult<Option<ThunkHandle>> {
        let store = self.persistent_store()?;
        self.persisted_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(store.lookup(shape))
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Record `handle` as the thunk for `descriptor`.
    ///
    /// # Panics
    /// Panics if `handle` was generated for a different shape than the one
    /// `descriptor` reduces to, or if it cannot be read back immediately
    /// after insertion.
    pub fn add(&self, handle: ThunkHandle, descriptor: &str, mode: ThunkMode) -> ThunkResult<()> {
        if mode == ThunkMode::Persisted {
            let shape = self.reduce(descriptor)?;
            return self.add_persisted(&handle, &shape);
        }

        let mut trie = self.trie.lock();
        let shape = self.reduce(descriptor)?;
        self.add_locked(&mut trie, handle, &shape);
        Ok(())
    }

    /// Record `handle` under an already reduced shape.
    pub fn add_shape(
        &self,
        handle: ThunkHandle,
        shape: &CallShape,
        mode: ThunkMode,
    ) -> ThunkResult<()> {
        self.check_bound(shape)?;
        match mode {
            ThunkMode::Persisted => self.add_persisted(&handle, shape),
            ThunkMode::CurrentRun => {
                let mut trie = self.trie.lock();
                self.add_locked(&mut trie, handle, shape);
                Ok(())
            }
        }
    }

    fn add_locked(&self, trie: &mut SignatureTrie, handle: ThunkHandle, shape: &CallShape) {
        self.check_handle_shape(&handle, shape);
        let root = trie.root();
        let leaf = trie.insert_path(root, shape);
        if let Some(previous) = trie.set_thunk(leaf, handle.clone()) {
            self.replacements.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                cache = %self.name,
                %shape,
                old = previous.id(),
                new = handle.id(),
                "replacing thunk"
            );
        }
        self.insertions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            cache = %self.name,
            %shape,
            thunk = handle.id(),
            nodes = trie.node_count(),
            "added thunk"
        );

        // Read back through a fresh walk from the root.
        let found = trie.lookup(root, shape).and_then(|node| trie.thunk(node));
        if found != Some(&handle) {
            self.violation(shape, handle.to_string(), found.map(ToString::to_string));
        }
    }

    /// A thunk may only be keyed by the shape it was generated for.
    fn check_handle_shape(&self, handle: &ThunkHandle, shape: &CallShape) {
        if handle.shape() != shape {
            self.violation(
                shape,
                format!("a thunk for {}", shape),
                Some(handle.to_string()),
            );
        }
    }

    fn violation(&self, shape: &CallShape, expected: String, found: Option<String>) -> ! {
        let violation = ConsistencyViolation {
            cache: self.name.clone(),
            shape: shape.clone(),
            expected,
            found,
        };
        tracing::error!(%violation, "thunk cache consistency violation");
        panic!("{}", violation);
    }

    fn check_bound(&self, shape: &CallShape) -> ThunkResult<()> {
        let required = shape.len() + 1;
        if required > self.config.max_shape_len {
            return Err(ThunkError::BufferTooSmall {
                required,
                available: self.config.max_shape_len,
            });
        }
        Ok(())
    }

    fn add_persisted(&self, handle: &ThunkHandle, shape: &CallShape) -> ThunkResult<()> {
        self.check_handle_shape(handle, shape);
        let store = self.persistent_store()?;
        self.persisted_stores.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache = %self.name, %shape, thunk = handle.id(), "persisting thunk");
        store.store(handle, shape);
        Ok(())
    }

    fn persistent_store(&self) -> ThunkResult<&Arc<dyn PersistentThunkStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| ThunkError::PersistenceUnavailable {
                cache: self.name.clone(),
            })
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Return the thunk for `descriptor`, generating it with `factory` on a miss.
    ///
    /// The blob is allocated outside the table lock. When two threads race on
    /// one shape either thunk may end up stored; both callers get the stored
    /// one.
    pub fn get_or_generate(
        &self,
        descriptor: &str,
        mode: ThunkMode,
        factory: &dyn ThunkFactory,
        code_size: usize,
    ) -> ThunkResult<ThunkHandle> {
        let shape = self.reduce(descriptor)?;
        if let Some(handle) = self.find_shape(&shape, mode)? {
            return Ok(handle);
        }

        let handle = factory.allocate(code_size, &shape);
        self.add_shape(handle, &shape, mode)?;
        self.expect(descriptor, mode)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Write every stored current-run thunk to `sink`, one line each.
    pub fn dump(&self, sink: &mut dyn DiagnosticSink) {
        let trie = self.trie.lock();
        let (thunks, nodes) = (trie.thunk_count(), trie.node_count());
        sink.line(&format!(
            "thunk cache {:?}: {} thunk{}, {} node{}",
            self.name,
            thunks,
            if thunks == 1 { "" } else { "s" },
            nodes,
            if nodes == 1 { "" } else { "s" },
        ));
        trie.for_each_thunk(trie.root(), |shape, handle| {
            sink.line(&format!("  {} -> {}", shape, handle));
        });
    }

    /// Number of trie nodes, root included.
    pub fn node_count(&self) -> usize {
        self.trie.lock().node_count()
    }

    /// Number of current-run thunks stored.
    pub fn thunk_count(&self) -> usize {
        self.trie.lock().thunk_count()
    }

    /// Number of times the node arena has grown.
    pub fn arena_reallocations(&self) -> usize {
        self.trie.lock().reallocations()
    }

    /// Get cache statistics.
    #[inline]
    pub fn stats(&self) -> ThunkCacheStats {
        ThunkCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            persisted_lookups: self.persisted_lookups.load(Ordering::Relaxed),
            persisted_stores: self.persisted_stores.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ThunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunkCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("persistent", &self.store.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics for the thunk cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThunkCacheStats {
    /// Current-run lookups that found a thunk.
    pub hits: u64,
    /// Current-run lookups that found nothing.
    pub misses: u64,
    /// Current-run insertions.
    pub insertions: u64,
    /// Insertions that displaced an existing thunk.
    pub replacements: u64,
    /// Lookups forwarded to the persistent store.
    pub persisted_lookups: u64,
    /// Stores forwarded to the persistent store.
    pub persisted_stores: u64,
}

impl ThunkCacheStats {
    /// Calculate hit rate.
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Thunk cache configuration.
//!
//! Pointer width and arena sizing are supplied by the hosting runtime. The
//! defaults describe the host process; [`ThunkCacheConfig::from_env`] lets a
//! deployment override them without a rebuild.

use crate::shape::{MAX_SHAPE_LEN, PointerWidth};

/// Environment variable selecting the target pointer width (`32` or `64`).
pub const ENV_POINTER_WIDTH: &str = "THUNK_CACHE_POINTER_WIDTH";
/// Environment variable with the initial node arena capacity.
pub const ENV_INITIAL_NODES: &str = "THUNK_CACHE_INITIAL_NODES";
/// Environment variable with the reducer's slot bound.
pub const ENV_MAX_SHAPE_LEN: &str = "THUNK_CACHE_MAX_SHAPE_LEN";

/// Default initial arena capacity (nodes).
const DEFAULT_INITIAL_NODES: usize = 256;

/// Configuration for a [`ThunkCache`](crate::ThunkCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThunkCacheConfig {
    /// Width of references in generated code.
    pub pointer_width: PointerWidth,
    /// Nodes the arena can hold before its first growth.
    pub initial_nodes: usize,
    /// Slot bound handed to the reducer.
    pub max_shape_len: usize,
}

impl Default for ThunkCacheConfig {
    fn default() -> Self {
        Self {
            pointer_width: PointerWidth::host(),
            initial_nodes: DEFAULT_INITIAL_NODES,
            max_shape_len: MAX_SHAPE_LEN,
        }
    }
}

impl ThunkCacheConfig {
    /// Configuration with an arena large enough for `nodes` nodes.
    pub fn presized(nodes: usize) -> Self {
        Self {
            initial_nodes: nodes,
            ..Self::default()
        }
    }

    /// Minimal configuration for testing: a one-node arena that grows early.
    pub fn for_testing() -> Self {
        Self {
            pointer_width: PointerWidth::Bits64,
            initial_nodes: 1,
            max_shape_len: MAX_SHAPE_LEN,
        }
    }

    /// Set the pointer width.
    pub fn with_pointer_width(mut self, width: PointerWidth) -> Self {
        self.pointer_width = width;
        self
    }

    /// Set the reducer's slot bound.
    pub fn with_max_shape_len(mut self, len: usize) -> Self {
        self.max_shape_len = len;
        self
    }

    /// Defaults overridden by `THUNK_CACHE_*` environment variables.
    ///
    /// Unset or unparsable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve settings through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let pointer_width = lookup(ENV_POINTER_WIDTH)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .and_then(PointerWidth::from_bits)
            .unwrap_or(defaults.pointer_width);

        let initial_nodes = Self::parse_usize(lookup(ENV_INITIAL_NODES))
            .filter(|&n| n > 0)
            .unwrap_or(defaults.initial_nodes);

        // Room for the return class and the terminator.
        let max_shape_len = Self::parse_usize(lookup(ENV_MAX_SHAPE_LEN))
            .filter(|&n| n >= 2)
            .unwrap_or(defaults.max_shape_len);

        let config = Self {
            pointer_width,
            initial_nodes,
            max_shape_len,
        };
        if config != defaults {
            tracing::debug!(?config, "thunk cache configuration overridden from environment");
        }
        config
    }

    #[inline]
    fn parse_usize(value: Option<String>) -> Option<usize> {
        value.and_then(|v| v.trim().parse().ok())
    }
}

//! Error types for thunk cache operations.
//!
//! Recoverable failures (bad descriptors, undersized bounds, a missing
//! persistent store) are reported through [`ThunkError`]. A failed
//! post-insert self-check is not recoverable: it is described by
//! [`ConsistencyViolation`] and raised as a panic.

use std::fmt;

use crate::shape::CallShape;

/// Result alias used throughout the crate.
pub type ThunkResult<T> = Result<T, ThunkError>;

/// Errors reported by the reducer and the cache front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThunkError {
    /// The caller-supplied bound cannot hold the computed shape.
    ///
    /// `required` counts one slot per parameter, one for the return class
    /// and one terminator slot.
    BufferTooSmall { required: usize, available: usize },
    /// The call descriptor does not follow `(params)return` notation.
    MalformedDescriptor {
        descriptor: String,
        offset: usize,
        reason: &'static str,
    },
    /// Persisted mode was requested on a cache without a persistent store.
    PersistenceUnavailable { cache: String },
}

impl fmt::Display for ThunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThunkError::BufferTooSmall {
                required,
                available,
            } => write!(
                f,
                "call shape needs {} slots but only {} are available",
                required, available
            ),
            ThunkError::MalformedDescriptor {
                descriptor,
                offset,
                reason,
            } => write!(
                f,
                "malformed call descriptor {:?} at offset {}: {}",
                descriptor, offset, reason
            ),
            ThunkError::PersistenceUnavailable { cache } => {
                write!(f, "thunk cache {:?} has no persistent store attached", cache)
            }
        }
    }
}

impl std::error::Error for ThunkError {}

/// The table entry for a shape does not hold the thunk it should.
///
/// Raised when a thunk generated for one shape is added under another, or
/// when a thunk cannot be read back immediately after insertion (the reducer
/// is not deterministic or the node arena is corrupted). The cache reports
/// it and panics.
#[derive(Debug, Clone)]
pub struct ConsistencyViolation {
    /// Name of the cache that detected the violation.
    pub cache: String,
    /// Shape the thunk was inserted under.
    pub shape: CallShape,
    /// What the entry should hold, rendered for diagnostics.
    pub expected: String,
    /// What the entry holds instead.
    pub found: Option<String>,
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thunk cache {:?}: entry for {} holds {} instead of {}",
            self.cache,
            self.shape,
            self.found.as_deref().unwrap_or("nothing"),
            self.expected
        )
    }
}

impl std::error::Error for ConsistencyViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_too_small_message() {
        let err = ThunkError::BufferTooSmall {
            required: 5,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "call shape needs 5 slots but only 3 are available"
        );
    }

    #[test]
    fn test_malformed_descriptor_message() {
        let err = ThunkError::MalformedDescriptor {
            descriptor: "(Q)V".to_string(),
            offset: 1,
            reason: "unknown type code",
        };
        let msg = err.to_string();
        assert!(msg.contains("\"(Q)V\""));
        assert!(msg.contains("offset 1"));
    }

    #[test]
    fn test_consistency_violation_message() {
        let violation = ConsistencyViolation {
            cache: "jit".to_string(),
            shape: "IV".parse().unwrap(),
            expected: "thunk#3".to_string(),
            found: None,
        };
        let msg = violation.to_string();
        assert!(msg.contains("IV"));
        assert!(msg.contains("nothing"));
        assert!(msg.contains("thunk#3"));
        assert!(msg.contains("instead of"));
    }
}

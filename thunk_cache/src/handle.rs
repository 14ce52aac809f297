//! Handles to generated thunks.

use std::fmt;
use std::sync::Arc;

use crate::shape::CallShape;

/// A generated thunk: executable bytes plus the shape they were built for.
#[derive(Debug)]
struct Thunk {
    /// Identifier assigned by the factory.
    id: u64,
    /// Shape the code was generated for.
    shape: CallShape,
    /// Machine code.
    code: Box<[u8]>,
    /// Whether this copy lives in a persistent store.
    persisted: bool,
}

/// Shared, cheaply clonable reference to a generated thunk.
///
/// Two handles are equal only when they refer to the same blob; a relocated
/// copy with identical bytes is a different thunk.
#[derive(Clone)]
pub struct ThunkHandle(Arc<Thunk>);

impl ThunkHandle {
    /// Wrap freshly generated code.
    pub fn new(id: u64, shape: CallShape, code: Box<[u8]>) -> Self {
        Self(Arc::new(Thunk {
            id,
            shape,
            code,
            persisted: false,
        }))
    }

    /// Identifier assigned by the factory.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Shape this thunk was generated for.
    #[inline]
    pub fn shape(&self) -> &CallShape {
        &self.0.shape
    }

    /// Machine code bytes.
    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.0.code
    }

    /// Size of the code in bytes.
    #[inline]
    pub fn code_size(&self) -> usize {
        self.0.code.len()
    }

    /// Address of the first code byte.
    #[inline]
    pub fn entry_point(&self) -> *const u8 {
        self.0.code.as_ptr()
    }

    /// Whether this handle refers to a persisted copy.
    #[inline]
    pub fn is_persisted(&self) -> bool {
        self.0.persisted
    }

    /// Copy the thunk into a fresh allocation owned by a persistent store.
    ///
    /// The copy keeps the id, shape and bytes but shares no memory with the
    /// original, so nothing in it refers to the producing process.
    pub fn relocated(&self) -> Self {
        Self(Arc::new(Thunk {
            id: self.0.id,
            shape: self.0.shape.clone(),
            code: self.0.code.clone(),
            persisted: true,
        }))
    }
}

impl PartialEq for ThunkHandle {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ThunkHandle {}

impl fmt::Debug for ThunkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThunkHandle")
            .field("id", &self.0.id)
            .field("shape", &self.0.shape)
            .field("entry", &self.entry_point())
            .field("size", &self.code_size())
            .field("persisted", &self.0.persisted)
            .finish()
    }
}

impl fmt::Display for ThunkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thunk#{} {} @{:p} ({} bytes)",
            self.0.id,
            self.0.shape,
            self.entry_point(),
            self.code_size()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u64) -> ThunkHandle {
        ThunkHandle::new(id, "IIV".parse().unwrap(), vec![0x90; 8].into_boxed_slice())
    }

    #[test]
    fn test_handle_accessors() {
        let h = handle(7);
        assert_eq!(h.id(), 7);
        assert_eq!(h.shape().to_string(), "IIV");
        assert_eq!(h.code_size(), 8);
        assert_eq!(h.code(), &[0x90u8; 8][..]);
        assert!(!h.is_persisted());
    }

    #[test]
    fn test_equality_is_identity() {
        let a = handle(1);
        let b = handle(1);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_relocated_copy() {
        let a = handle(3);
        let copy = a.relocated();
        assert_ne!(a, copy);
        assert_eq!(copy.id(), 3);
        assert_eq!(copy.shape(), a.shape());
        assert_eq!(copy.code(), a.code());
        assert_ne!(copy.entry_point(), a.entry_point());
        assert!(copy.is_persisted());
    }

    #[test]
    fn test_display_mentions_id_and_shape() {
        let text = handle(42).to_string();
        assert!(text.starts_with("thunk#42 IIV @"));
        assert!(text.ends_with("(8 bytes)"));
    }
}

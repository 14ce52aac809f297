//! Call shape reduction.
//!
//! A thunk only cares about how each argument travels through registers and
//! stack slots, not about the declared type. The reducer folds a full call
//! descriptor such as `(ZLjava/lang/String;[IJ)V` into a compact
//! [`CallShape`] over the alphabet `V I J F D L`, one symbol per parameter
//! followed by the return class. Descriptors that reduce to the same shape
//! share one generated thunk.
//!
//! | Descriptor code       | Class                          |
//! |-----------------------|--------------------------------|
//! | `Z` `B` `C` `S` `I`   | `I`                            |
//! | `J`                   | `J`                            |
//! | `F`                   | `F`                            |
//! | `D`                   | `D`                            |
//! | `L...;` and `[...`    | `L` (64-bit), `I` (32-bit)     |
//! | `V` (return only)     | `V`                            |

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{ThunkError, ThunkResult};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of shape slots, terminator slot included.
pub const MAX_SHAPE_LEN: usize = 260;

/// Number of distinct [`TypeClass`] symbols.
pub const ALPHABET_SIZE: usize = 6;

// =============================================================================
// Type Class
// =============================================================================

/// Calling-convention class of a single parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeClass {
    /// No value (return position only).
    Void = 0,
    /// 32-bit integer slot; also narrow references on 32-bit targets.
    Int = 1,
    /// 64-bit integer slot.
    Long = 2,
    /// Single-precision float.
    Float = 3,
    /// Double-precision float.
    Double = 4,
    /// Pointer-sized reference on 64-bit targets.
    Address = 5,
}

impl TypeClass {
    /// All classes in alphabet order.
    pub const ALL: [TypeClass; ALPHABET_SIZE] = [
        TypeClass::Void,
        TypeClass::Int,
        TypeClass::Long,
        TypeClass::Float,
        TypeClass::Double,
        TypeClass::Address,
    ];

    /// Position of this class in the trie's child array.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Terse symbol for this class.
    #[inline]
    pub const fn symbol(self) -> char {
        match self {
            TypeClass::Void => 'V',
            TypeClass::Int => 'I',
            TypeClass::Long => 'J',
            TypeClass::Float => 'F',
            TypeClass::Double => 'D',
            TypeClass::Address => 'L',
        }
    }

    /// Parse a terse symbol.
    #[inline]
    pub fn from_symbol(symbol: char) -> Option<Self> {
        TypeClass::ALL.into_iter().find(|class| class.symbol() == symbol)
    }

    /// Class used for object and array references.
    #[inline]
    pub const fn address(width: PointerWidth) -> Self {
        match width {
            PointerWidth::Bits64 => TypeClass::Address,
            PointerWidth::Bits32 => TypeClass::Int,
        }
    }
}

// =============================================================================
// Pointer Width
// =============================================================================

/// Width of a reference on the target the thunks are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    /// Pointer width of the host process.
    #[inline]
    pub const fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        }
    }

    /// Convert from a bit count (`32` or `64`).
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(PointerWidth::Bits32),
            64 => Some(PointerWidth::Bits64),
            _ => None,
        }
    }

    /// Bit count of this width.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            PointerWidth::Bits32 => 32,
            PointerWidth::Bits64 => 64,
        }
    }
}

impl Default for PointerWidth {
    fn default() -> Self {
        Self::host()
    }
}

// =============================================================================
// Call Shape
// =============================================================================

/// Canonical key for a thunk: parameter classes followed by the return class.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallShape {
    symbols: SmallVec<[TypeClass; 16]>,
}

impl CallShape {
    /// Build a shape from parameter classes and a return class.
    ///
    /// Fails with [`ThunkError::MalformedDescriptor`] for a `Void` parameter
    /// and with [`ThunkError::BufferTooSmall`] past [`MAX_SHAPE_LEN`].
    pub fn new(params: &[TypeClass], ret: TypeClass) -> ThunkResult<Self> {
        let required = params.len() + 2;
        if required > MAX_SHAPE_LEN {
            return Err(ThunkError::BufferTooSmall {
                required,
                available: MAX_SHAPE_LEN,
            });
        }
        if let Some(offset) = params.iter().position(|class| *class == TypeClass::Void) {
            let descriptor = params
                .iter()
                .chain(std::iter::once(&ret))
                .map(|class| class.symbol())
                .collect();
            return Err(ThunkError::MalformedDescriptor {
                descriptor,
                offset,
                reason: "void parameter",
            });
        }
        Ok(Self::from_parts(params, ret))
    }

    /// Build a shape from parts already known to be valid.
    pub(crate) fn from_parts(params: &[TypeClass], ret: TypeClass) -> Self {
        let mut symbols: SmallVec<[TypeClass; 16]> = SmallVec::with_capacity(params.len() + 1);
        symbols.extend_from_slice(params);
        symbols.push(ret);
        Self { symbols }
    }

    /// Every symbol, return class last.
    #[inline]
    pub fn symbols(&self) -> &[TypeClass] {
        &self.symbols
    }

    /// Parameter classes.
    #[inline]
    pub fn params(&self) -> &[TypeClass] {
        &self.symbols[..self.symbols.len() - 1]
    }

    /// Return class.
    #[inline]
    pub fn return_class(&self) -> TypeClass {
        self.symbols[self.symbols.len() - 1]
    }

    /// Number of parameters.
    #[inline]
    pub fn param_count(&self) -> usize {
        self.symbols.len() - 1
    }

    /// Number of symbols, return class included.
    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// A shape always carries a return class, so this is never true.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in &self.symbols {
            write!(f, "{}", class.symbol())?;
        }
        Ok(())
    }
}

impl fmt::Debug for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallShape({})", self)
    }
}

impl FromStr for CallShape {
    type Err = ThunkError;

    /// Parse the terse form produced by `Display`, e.g. `"IJV"`.
    fn from_str(terse: &str) -> Result<Self, Self::Err> {
        let malformed = |offset, reason| ThunkError::MalformedDescriptor {
            descriptor: terse.to_string(),
            offset,
            reason,
        };

        let mut symbols: SmallVec<[TypeClass; 16]> = SmallVec::new();
        for (offset, symbol) in terse.char_indices() {
            let class = TypeClass::from_symbol(symbol)
                .ok_or_else(|| malformed(offset, "unknown shape symbol"))?;
            symbols.push(class);
        }

        match symbols.len() {
            0 => return Err(malformed(0, "empty shape")),
            n if n + 1 > MAX_SHAPE_LEN => {
                return Err(ThunkError::BufferTooSmall {
                    required: n + 1,
                    available: MAX_SHAPE_LEN,
                });
            }
            _ => {}
        }
        if let Some(pos) = symbols[..symbols.len() - 1]
            .iter()
            .position(|class| *class == TypeClass::Void)
        {
            return Err(malformed(pos, "void parameter"));
        }

        Ok(Self { symbols })
    }
}

// =============================================================================
// Reduction
// =============================================================================

/// Reduce a call descriptor using the default [`MAX_SHAPE_LEN`] bound.
pub fn reduce(descriptor: &str, width: PointerWidth) -> ThunkResult<CallShape> {
    reduce_bounded(descriptor, width, MAX_SHAPE_LEN)
}

/// Reduce a call descriptor into a [`CallShape`].
///
/// `bound` is the number of slots the caller can hold and must be at least
/// the parameter count plus two (return class and terminator).
pub fn reduce_bounded(
    descriptor: &str,
    width: PointerWidth,
    bound: usize,
) -> ThunkResult<CallShape> {
    let bytes = descriptor.as_bytes();
    let malformed = |offset, reason| ThunkError::MalformedDescriptor {
        descriptor: descriptor.to_string(),
        offset,
        reason,
    };

    if bytes.first() != Some(&b'(') {
        return Err(malformed(0, "expected '('"));
    }

    let mut symbols: SmallVec<[TypeClass; 16]> = SmallVec::new();
    let mut pos = 1;
    loop {
        match bytes.get(pos) {
            None => return Err(malformed(pos, "unterminated parameter list")),
            Some(b')') => {
                pos += 1;
                break;
            }
            Some(_) => {
                let (class, next) =
                    parse_type(bytes, pos, width).map_err(|(at, why)| malformed(at, why))?;
                if class == TypeClass::Void {
                    return Err(malformed(pos, "void parameter"));
                }
                symbols.push(class);
                pos = next;
            }
        }
    }

    if pos >= bytes.len() {
        return Err(malformed(pos, "missing return type"));
    }
    let (ret, end) = parse_type(bytes, pos, width).map_err(|(at, why)| malformed(at, why))?;
    if end != bytes.len() {
        return Err(malformed(end, "trailing characters after return type"));
    }

    let required = symbols.len() + 2;
    if required > bound {
        return Err(ThunkError::BufferTooSmall {
            required,
            available: bound,
        });
    }

    symbols.push(ret);
    Ok(CallShape { symbols })
}

/// Parse one field type starting at `pos`, returning its class and the
/// offset just past it.
fn parse_type(
    bytes: &[u8],
    pos: usize,
    width: PointerWidth,
) -> Result<(TypeClass, usize), (usize, &'static str)> {
    let Some(&code) = bytes.get(pos) else {
        return Err((pos, "missing type"));
    };
    match code {
        b'V' => Ok((TypeClass::Void, pos + 1)),
        b'Z' | b'B' | b'C' | b'S' | b'I' => Ok((TypeClass::Int, pos + 1)),
        b'J' => Ok((TypeClass::Long, pos + 1)),
        b'F' => Ok((TypeClass::Float, pos + 1)),
        b'D' => Ok((TypeClass::Double, pos + 1)),
        b'L' => {
            let name_len = bytes[pos + 1..]
                .iter()
                .position(|&b| b == b';')
                .ok_or((pos, "unterminated object type"))?;
            if name_len == 0 {
                return Err((pos, "empty object type name"));
            }
            Ok((TypeClass::address(width), pos + name_len + 2))
        }
        b'[' => {
            let mut elem = pos + 1;
            while bytes.get(elem) == Some(&b'[') {
                elem += 1;
            }
            let (class, next) = parse_type(bytes, elem, width)?;
            if class == TypeClass::Void {
                return Err((elem, "array of void"));
            }
            Ok((TypeClass::address(width), next))
        }
        _ => Err((pos, "unknown type code")),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(descriptor: &str) -> String {
        reduce(descriptor, PointerWidth::Bits64).unwrap().to_string()
    }

    #[test]
    fn test_primitive_classes() {
        assert_eq!(shape("()V"), "V");
        assert_eq!(shape("(I)I"), "II");
        assert_eq!(shape("(J)J"), "JJ");
        assert_eq!(shape("(FD)F"), "FDF");
        assert_eq!(shape("(ZBCS)Z"), "IIIII");
    }

    #[test]
    fn test_reference_classes_follow_pointer_width() {
        let desc = "(Ljava/lang/String;[I[[Ljava/lang/Object;)Ljava/lang/Object;";
        assert_eq!(reduce(desc, PointerWidth::Bits64).unwrap().to_string(), "LLLL");
        assert_eq!(reduce(desc, PointerWidth::Bits32).unwrap().to_string(), "IIII");
    }

    #[test]
    fn test_narrow_integers_collapse() {
        let a = reduce("(IJ)V", PointerWidth::Bits64).unwrap();
        let b = reduce("(ZJ)V", PointerWidth::Bits64).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "IJV");
    }

    #[test]
    fn test_long_and_int_stay_distinct() {
        assert_ne!(
            reduce("(I)I", PointerWidth::Bits64).unwrap(),
            reduce("(J)J", PointerWidth::Bits64).unwrap()
        );
    }

    #[test]
    fn test_deterministic() {
        for desc in ["(IJLfoo;[D)V", "()J", "([[[Z)[B"] {
            for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
                assert_eq!(reduce(desc, width).unwrap(), reduce(desc, width).unwrap());
            }
        }
    }

    #[test]
    fn test_shape_accessors() {
        let s = reduce("(IJF)D", PointerWidth::Bits64).unwrap();
        assert_eq!(s.param_count(), 3);
        assert_eq!(s.len(), 4);
        assert_eq!(s.params(), &[TypeClass::Int, TypeClass::Long, TypeClass::Float]);
        assert_eq!(s.return_class(), TypeClass::Double);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_bound_contract() {
        // Three parameters need five slots.
        assert!(reduce_bounded("(III)V", PointerWidth::Bits64, 5).is_ok());
        assert_eq!(
            reduce_bounded("(III)V", PointerWidth::Bits64, 4),
            Err(ThunkError::BufferTooSmall {
                required: 5,
                available: 4
            })
        );
    }

    #[test]
    fn test_default_bound_rejects_oversized_descriptor() {
        let desc = format!("({})V", "I".repeat(MAX_SHAPE_LEN));
        assert!(matches!(
            reduce(&desc, PointerWidth::Bits64),
            Err(ThunkError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_malformed_descriptors() {
        let bad = [
            "",
            "I)V",
            "(I",
            "(I)",
            "(V)V",
            "(Q)V",
            "(Ljava/lang/String)V",
            "(L;)V",
            "(I)VV",
            "([V)V",
        ];
        for desc in bad {
            assert!(
                matches!(
                    reduce(desc, PointerWidth::Bits64),
                    Err(ThunkError::MalformedDescriptor { .. })
                ),
                "expected {:?} to be rejected",
                desc
            );
        }
    }

    #[test]
    fn test_malformed_offset_points_at_bad_code() {
        match reduce("(IQ)V", PointerWidth::Bits64) {
            Err(ThunkError::MalformedDescriptor { offset, .. }) => assert_eq!(offset, 2),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_terse_round_trip() {
        let s: CallShape = "LIJFDV".parse().unwrap();
        assert_eq!(s.to_string(), "LIJFDV");
        assert_eq!(s, CallShape::new(s.params(), TypeClass::Void).unwrap());
    }

    #[test]
    fn test_new_rejects_void_parameter() {
        match CallShape::new(&[TypeClass::Int, TypeClass::Void], TypeClass::Void) {
            Err(ThunkError::MalformedDescriptor {
                descriptor, offset, ..
            }) => {
                assert_eq!(descriptor, "IVV");
                assert_eq!(offset, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_new_rejects_oversized_shape() {
        let params = vec![TypeClass::Long; MAX_SHAPE_LEN];
        assert_eq!(
            CallShape::new(&params, TypeClass::Void),
            Err(ThunkError::BufferTooSmall {
                required: MAX_SHAPE_LEN + 2,
                available: MAX_SHAPE_LEN,
            })
        );

        let params = vec![TypeClass::Long; MAX_SHAPE_LEN - 2];
        assert_eq!(CallShape::new(&params, TypeClass::Void).unwrap().len(), MAX_SHAPE_LEN - 1);
    }

    #[test]
    fn test_terse_rejects_bad_input() {
        assert!("".parse::<CallShape>().is_err());
        assert!("IQ".parse::<CallShape>().is_err());
        assert!("VI".parse::<CallShape>().is_err());
    }

    #[test]
    fn test_class_index_matches_alphabet() {
        for (i, class) in TypeClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
            assert_eq!(TypeClass::from_symbol(class.symbol()), Some(*class));
        }
    }

    #[test]
    fn test_pointer_width_bits() {
        assert_eq!(PointerWidth::from_bits(32), Some(PointerWidth::Bits32));
        assert_eq!(PointerWidth::from_bits(64).map(PointerWidth::bits), Some(64));
        assert_eq!(PointerWidth::from_bits(16), None);
    }
}

//! The value codec for pocketjs.
//!
//! Every runtime value fits in one 64-bit word. Plain doubles are stored as-is;
//! all other kinds live inside the quiet-NaN space with a 4-bit tag and a 48-bit payload.

use std::fmt;

const BOX_PREFIX: u64 = 0x7ff0 << 48;
const PAYLOAD_MASK: u64 = 0xffff_ffff_ffff;
const CODE_REF_MASK: u64 = 0xff_ffff;

/// The one NaN that arithmetic is allowed to produce. Its sign bit keeps it
/// outside the boxed range, so `0/0` can never alias an object reference.
const CANONICAL_NAN: u64 = 0xfff8_0000_0000_0000;

/// Longest code region a deferred identifier can point into.
pub const MAX_CODE_LEN: usize = CODE_REF_MASK as usize;

/// The kind of a [`Value`].
///
/// The discriminant doubles as the tag stored in the word (offset by one so
/// that an all-zero tag nibble stays a number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Object,
    Prop,
    Str,
    Undefined,
    Null,
    Number,
    Bool,
    Func,
    CodeRef,
    Native,
    Err,
}

impl Kind {
    const ALL: [Kind; 11] = [
        Kind::Object,
        Kind::Prop,
        Kind::Str,
        Kind::Undefined,
        Kind::Null,
        Kind::Number,
        Kind::Bool,
        Kind::Func,
        Kind::CodeRef,
        Kind::Native,
        Kind::Err,
    ];

    /// Whether values of this kind carry an arena offset.
    #[inline]
    pub fn is_heap(self) -> bool {
        matches!(self, Kind::Object | Kind::Prop | Kind::Str | Kind::Func)
    }

    /// The name `typeof` reports for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Prop => "prop",
            Kind::Str => "string",
            Kind::Undefined => "undefined",
            Kind::Null => "null",
            Kind::Number => "number",
            Kind::Bool => "boolean",
            Kind::Func | Kind::Native => "function",
            Kind::CodeRef => "coderef",
            Kind::Err => "error",
        }
    }
}

/// A tagged-NaN encoded runtime value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    pub const UNDEFINED: Value = Value::boxed(Kind::Undefined, 0);
    pub const NULL: Value = Value::boxed(Kind::Null, 0);
    pub const TRUE: Value = Value::boxed(Kind::Bool, 1);
    pub const FALSE: Value = Value::boxed(Kind::Bool, 0);
    pub(crate) const ERR: Value = Value::boxed(Kind::Err, 0);

    /// Wraps a double. NaNs are folded into a single canonical pattern.
    #[inline]
    pub fn number(n: f64) -> Self {
        if n.is_nan() { Value(CANONICAL_NAN) } else { Value(n.to_bits()) }
    }

    #[inline]
    pub fn boolean(b: bool) -> Self {
        if b { Value::TRUE } else { Value::FALSE }
    }

    #[inline]
    pub(crate) const fn boxed(kind: Kind, payload: u64) -> Self {
        Value(BOX_PREFIX | ((kind as u64 + 1) << 48) | (payload & PAYLOAD_MASK))
    }

    #[inline]
    pub(crate) fn code_ref(off: u32, len: u32) -> Self {
        let payload = (off as u64 & CODE_REF_MASK) | ((len as u64 & CODE_REF_MASK) << 24);
        Value::boxed(Kind::CodeRef, payload)
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Value(bits)
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// True if the word sits in the quiet-NaN range used for tagged values.
    #[inline]
    pub const fn is_boxed(self) -> bool {
        let tag = (self.0 >> 48) & 0xf;
        self.0 >> 52 == 0x7ff && tag != 0 && tag <= Kind::ALL.len() as u64
    }

    #[inline]
    pub fn kind(self) -> Kind {
        if self.is_boxed() { Kind::ALL[((self.0 >> 48) & 0xf) as usize - 1] } else { Kind::Number }
    }

    #[inline]
    pub const fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    /// Arena offset (or native table index) carried by the payload.
    #[inline]
    pub(crate) const fn offset(self) -> u32 {
        self.payload() as u32
    }

    #[inline]
    pub(crate) fn code_ref_parts(self) -> (u32, u32) {
        let p = self.payload();
        ((p & CODE_REF_MASK) as u32, ((p >> 24) & CODE_REF_MASK) as u32)
    }

    #[inline]
    pub fn is_err(self) -> bool {
        self.kind() == Kind::Err
    }

    #[inline]
    pub fn as_number(self) -> Option<f64> {
        (self.kind() == Kind::Number).then(|| f64::from_bits(self.0))
    }

    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        (self.kind() == Kind::Bool).then_some(self.payload() != 0)
    }

    /// Raw double view, only meaningful for numbers.
    #[inline]
    pub(crate) fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Kind::Number => write!(f, "Number({})", self.to_f64()),
            Kind::Bool => write!(f, "Bool({})", self.payload() != 0),
            Kind::CodeRef => {
                let (off, len) = self.code_ref_parts();
                write!(f, "CodeRef({off}, {len})")
            }
            kind => write!(f, "{kind:?}@{}", self.payload()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_pass_through() {
        for n in [0.0, -0.0, 1.5, -7.25, f64::MAX, f64::MIN_POSITIVE, 1e-310] {
            let v = Value::number(n);
            assert_eq!(v.kind(), Kind::Number);
            assert_eq!(v.as_number().unwrap().to_bits(), n.to_bits());
        }
    }

    #[test]
    fn nan_and_infinity_never_alias_tags() {
        let inf = f64::INFINITY;
        for n in [f64::NAN, -f64::NAN, 0.0 / 0.0, inf - inf, inf, -inf, inf * 0.0] {
            let v = Value::number(n);
            assert_eq!(v.kind(), Kind::Number, "{n} classified as {:?}", v.kind());
            assert!(!v.is_boxed());
        }
        // a hand-built quiet NaN that looks like an object reference is rejected by `number`
        let forged = f64::from_bits(Value::boxed(Kind::Object, 0).to_bits());
        assert_eq!(Value::number(forged).kind(), Kind::Number);
    }

    #[test]
    fn boxed_kinds_round_trip() {
        for kind in Kind::ALL {
            if kind == Kind::Number {
                continue;
            }
            let v = Value::boxed(kind, 0x1234_5678);
            assert_eq!(v.kind(), kind);
            assert_eq!(v.payload(), 0x1234_5678);
        }
    }

    #[test]
    fn code_ref_packs_offset_and_length() {
        let v = Value::code_ref(0xab_cdef, 0x12);
        assert_eq!(v.kind(), Kind::CodeRef);
        assert_eq!(v.code_ref_parts(), (0xab_cdef, 0x12));
    }

    #[test]
    fn booleans() {
        assert_eq!(Value::boolean(true).as_bool(), Some(true));
        assert_eq!(Value::FALSE.as_bool(), Some(false));
        assert_eq!(Value::NULL.as_bool(), None);
    }
}

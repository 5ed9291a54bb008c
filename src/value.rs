//! Runtime values and their 64-bit encodings.
//!
//! A [`Value`] is the term-level representation of any Datalog value before
//! boxing: a closed tagged union over the primitive kinds plus type-erased
//! objects. Objects carry an explicit comparator so the boxing tables can
//! deduplicate them without relying on `Hash` or host identity.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Total order over two type-erased payloads of the same concrete type.
///
/// Comparing payloads of different concrete types is an internal error;
/// the type unifier guarantees one concrete type per boxing position.
pub type Comparator = fn(&dyn Any, &dyn Any) -> Ordering;

/// A type-erased object value bundled with its comparator.
#[derive(Clone)]
pub struct BoxedObject {
    payload: Arc<dyn Any + Send + Sync>,
    cmp: Comparator,
}

impl BoxedObject {
    pub fn new(payload: Arc<dyn Any + Send + Sync>, cmp: Comparator) -> Self {
        Self { payload, cmp }
    }

    /// Wrap an `Ord` value with the comparator derived from its `Ord` impl.
    pub fn from_ord<T: Any + Ord + Send + Sync>(value: T) -> Self {
        Self::new(Arc::new(value), ord_comparator::<T>())
    }

    pub fn payload(&self) -> &(dyn Any + Send + Sync) {
        &*self.payload
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Compare with another object using this object's comparator.
    pub fn compare(&self, other: &BoxedObject) -> Ordering {
        (self.cmp)(&*self.payload, &*other.payload)
    }
}

impl fmt::Debug for BoxedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<obj>")
    }
}

/// Build a [`Comparator`] from a concrete type's `Ord` impl.
pub fn ord_comparator<T: Any + Ord>() -> Comparator {
    |a, b| {
        let a = a
            .downcast_ref::<T>()
            .unwrap_or_else(|| panic!("internal error: comparator applied to foreign payload"));
        let b = b
            .downcast_ref::<T>()
            .unwrap_or_else(|| panic!("internal error: comparator applied to foreign payload"));
        a.cmp(b)
    }
}

/// A runtime Datalog value.
///
/// `Absent` is the sentinel "no value"; unboxing it is a fatal internal
/// error, it only exists so optional slots have a well-typed filler.
#[derive(Clone, Debug)]
pub enum Value {
    Absent,
    Bool(bool),
    Char(char),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Obj(BoxedObject),
}

/// The primitive kind recorded per boxing position on first use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Bool,
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Obj,
}

impl Value {
    /// The tag of this value, or `None` for the `Absent` sentinel.
    pub fn tag(&self) -> Option<ValueTag> {
        match self {
            Value::Absent => None,
            Value::Bool(_) => Some(ValueTag::Bool),
            Value::Char(_) => Some(ValueTag::Char),
            Value::Int8(_) => Some(ValueTag::Int8),
            Value::Int16(_) => Some(ValueTag::Int16),
            Value::Int32(_) => Some(ValueTag::Int32),
            Value::Int64(_) => Some(ValueTag::Int64),
            Value::Float32(_) => Some(ValueTag::Float32),
            Value::Float64(_) => Some(ValueTag::Float64),
            Value::Obj(_) => Some(ValueTag::Obj),
        }
    }

    /// Raw 64-bit pattern of a primitive value.
    ///
    /// Objects have no intrinsic bit pattern; their encoding is the dense id
    /// assigned by the boxing table. Calling this on `Obj` or `Absent` is a
    /// fatal internal error.
    pub fn to_bits(&self) -> i64 {
        match self {
            Value::Bool(b) => *b as i64,
            Value::Char(c) => *c as u32 as i64,
            Value::Int8(i) => *i as i64,
            Value::Int16(i) => *i as i64,
            Value::Int32(i) => *i as i64,
            Value::Int64(i) => *i,
            Value::Float32(f) => f.to_bits() as i64,
            Value::Float64(f) => f.to_bits() as i64,
            Value::Obj(_) => panic!("internal error: to_bits on object value"),
            Value::Absent => panic!("internal error: to_bits on absent value"),
        }
    }

    /// Reconstruct a primitive value bit-for-bit from its tag and pattern.
    pub fn from_bits(tag: ValueTag, bits: i64) -> Value {
        match tag {
            ValueTag::Bool => Value::Bool(bits != 0),
            ValueTag::Char => Value::Char(
                char::from_u32(bits as u32)
                    .unwrap_or_else(|| panic!("internal error: invalid char encoding {bits}")),
            ),
            ValueTag::Int8 => Value::Int8(bits as i8),
            ValueTag::Int16 => Value::Int16(bits as i16),
            ValueTag::Int32 => Value::Int32(bits as i32),
            ValueTag::Int64 => Value::Int64(bits),
            ValueTag::Float32 => Value::Float32(f32::from_bits(bits as u32)),
            ValueTag::Float64 => Value::Float64(f64::from_bits(bits as u64)),
            ValueTag::Obj => panic!("internal error: from_bits on object tag"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            // Bit equality, so NaN compares equal to itself and the
            // round-trip property holds for every float.
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::Obj(a), Value::Obj(b)) => a.compare(b) == Ordering::Equal,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Render a value for program dumps. Objects render opaquely.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Absent => "<absent>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => format!("{c:?}"),
        Value::Int8(i) => i.to_string(),
        Value::Int16(i) => i.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float32(f) => f.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::Obj(_) => "<obj>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== BIT ROUND-TRIPS ==========

    #[test]
    fn roundtrip_bool() {
        for b in [true, false] {
            let v = Value::Bool(b);
            let back = Value::from_bits(ValueTag::Bool, v.to_bits());
            assert_eq!(back, v, "bool should round-trip through bits");
        }
    }

    #[test]
    fn roundtrip_char() {
        for c in ['a', 'λ', '\0', '\u{10FFFF}'] {
            let v = Value::Char(c);
            assert_eq!(Value::from_bits(ValueTag::Char, v.to_bits()), v);
        }
    }

    #[test]
    fn roundtrip_signed_ints() {
        let v = Value::Int8(-1);
        assert_eq!(Value::from_bits(ValueTag::Int8, v.to_bits()), v);
        let v = Value::Int16(i16::MIN);
        assert_eq!(Value::from_bits(ValueTag::Int16, v.to_bits()), v);
        let v = Value::Int32(i32::MIN);
        assert_eq!(Value::from_bits(ValueTag::Int32, v.to_bits()), v);
        let v = Value::Int64(i64::MIN);
        assert_eq!(Value::from_bits(ValueTag::Int64, v.to_bits()), v);
    }

    #[test]
    fn roundtrip_floats_bit_identical() {
        for f in [0.0f64, -0.0, 1.5, f64::NAN, f64::INFINITY] {
            let v = Value::Float64(f);
            let back = Value::from_bits(ValueTag::Float64, v.to_bits());
            assert_eq!(back, v, "f64 should round-trip bit-identically");
        }
        let v = Value::Float32(f32::NAN);
        assert_eq!(Value::from_bits(ValueTag::Float32, v.to_bits()), v);
    }

    #[test]
    fn negative_zero_distinct_from_zero() {
        // Bit equality, not numeric equality.
        assert_ne!(Value::Float64(0.0), Value::Float64(-0.0));
    }

    // ========== OBJECTS ==========

    #[test]
    fn object_comparator_equality() {
        let a = BoxedObject::from_ord("hello".to_string());
        let b = BoxedObject::from_ord("hello".to_string());
        let c = BoxedObject::from_ord("world".to_string());
        assert_eq!(a.compare(&b), Ordering::Equal);
        assert_eq!(a.compare(&c), Ordering::Less);
        assert_eq!(Value::Obj(a), Value::Obj(b));
    }

    #[test]
    fn object_downcast() {
        let a = BoxedObject::from_ord(42u64);
        assert_eq!(a.downcast_ref::<u64>(), Some(&42));
        assert_eq!(a.downcast_ref::<String>(), None);
    }

    // ========== FATAL PATHS ==========

    #[test]
    #[should_panic(expected = "internal error")]
    fn to_bits_on_absent_panics() {
        let _ = Value::Absent.to_bits();
    }

    #[test]
    #[should_panic(expected = "internal error")]
    fn to_bits_on_object_panics() {
        let _ = Value::Obj(BoxedObject::from_ord(0i64)).to_bits();
    }
}

//! Shared fixtures for the test suites.

use crate::lattice::LatticeOps;
use crate::value::{BoxedObject, Value};

fn int(value: &Value) -> i64 {
    match value {
        Value::Int64(x) => *x,
        other => panic!("expected Int64, got {other:?}"),
    }
}

fn text(value: &Value) -> &str {
    match value {
        Value::Obj(obj) => obj
            .downcast_ref::<String>()
            .unwrap_or_else(|| panic!("expected String payload, got {obj:?}")),
        other => panic!("expected Obj, got {other:?}"),
    }
}

/// A word as an object-boxed lattice element.
pub(crate) fn word(s: &str) -> Value {
    Value::Obj(BoxedObject::from_ord(s.to_string()))
}

/// The minimum lattice over Int64 distances: smaller is more informative,
/// bottom is "unreachable".
pub(crate) fn min_lattice() -> LatticeOps {
    LatticeOps::new(
        Value::Int64(i64::MAX),
        |a, b| int(a) >= int(b),
        |a, b| Value::Int64(int(a).min(int(b))),
        |a, b| Value::Int64(int(a).max(int(b))),
    )
}

/// The maximum lattice over object-boxed words: lexicographically larger is
/// more informative, bottom is the empty word.
pub(crate) fn word_lattice() -> LatticeOps {
    LatticeOps::new(
        word(""),
        |a, b| text(a) <= text(b),
        |a, b| {
            if text(a) >= text(b) {
                a.clone()
            } else {
                b.clone()
            }
        },
        |a, b| {
            if text(a) <= text(b) {
                a.clone()
            } else {
                b.clone()
            }
        },
    )
}

/// The flat lattice over Int64: bottom 0, top -1, everything else
/// incomparable. Two distinct proper elements meet at bottom.
pub(crate) fn flat_lattice() -> LatticeOps {
    const BOT: i64 = 0;
    const TOP: i64 = -1;
    LatticeOps::new(
        Value::Int64(BOT),
        |a, b| {
            let (a, b) = (int(a), int(b));
            a == BOT || b == TOP || a == b
        },
        |a, b| {
            let (a, b) = (int(a), int(b));
            Value::Int64(if a == BOT {
                b
            } else if b == BOT || a == b {
                a
            } else {
                TOP
            })
        },
        |a, b| {
            let (a, b) = (int(a), int(b));
            Value::Int64(if a == TOP {
                b
            } else if b == TOP || a == b {
                a
            } else {
                BOT
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_lattice_meets_distinct_elements_at_bottom() {
        let ops = flat_lattice();
        assert_eq!((ops.glb)(&Value::Int64(5), &Value::Int64(7)), Value::Int64(0));
        assert_eq!((ops.glb)(&Value::Int64(5), &Value::Int64(5)), Value::Int64(5));
        assert_eq!((ops.lub)(&Value::Int64(5), &Value::Int64(7)), Value::Int64(-1));
        assert!(ops.is_bottom(&Value::Int64(0)));
        assert!(!ops.is_bottom(&Value::Int64(5)));
    }
}

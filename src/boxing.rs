//! Value boxing: dense 64-bit encodings per unified type position.
//!
//! Each [`TypePos`] owns one table. Primitives record their tag on first use
//! and encode as their raw bit pattern; objects get dense ids from an
//! append-only list with a comparator-ordered reverse index. The insert path
//! follows the read-fast-path / write-lock-recheck discipline, so two racing
//! unboxes of equal objects converge to one id.
//!
//! Tables grow monotonically for one evaluation's lifetime and are dropped
//! with it.

use crate::datalog::FactTables;
use crate::ram::{RamProgram, RamSym};
use crate::store::Tuple;
use crate::symbol::RelSym;
use crate::unify::{compute_mapping, SlotId, TypePos};
use crate::value::{BoxedObject, Value, ValueTag};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// One heterogeneous value table per unified type position.
pub struct BoxingStore {
    tables: Vec<PositionTable>,
}

#[derive(Default)]
struct PositionTable {
    inner: RwLock<PositionInner>,
}

#[derive(Default)]
struct PositionInner {
    /// Primitive tag recorded on first use; a later mismatch is fatal.
    tag: Option<ValueTag>,
    /// Objects by dense id, append-only.
    objects: Vec<BoxedObject>,
    /// Object ids ordered by the installed comparator, for reverse lookup.
    sorted: Vec<usize>,
}

impl BoxingStore {
    /// A store with `positions` empty tables.
    pub fn with_positions(positions: usize) -> Self {
        let mut tables = Vec::with_capacity(positions);
        tables.resize_with(positions, PositionTable::default);
        Self { tables }
    }

    pub fn positions(&self) -> usize {
        self.tables.len()
    }

    /// Number of objects interned at a position.
    pub fn object_count(&self, pos: TypePos) -> usize {
        self.table(pos).inner.read().objects.len()
    }

    fn table(&self, pos: TypePos) -> &PositionTable {
        self.tables
            .get(pos.0)
            .unwrap_or_else(|| panic!("internal error: boxing position {pos:?} out of range"))
    }
}

/// Compress a value into its 64-bit encoding at a position.
///
/// Unboxing the `Absent` sentinel is a fatal internal error; the first sight
/// of a new object is expected absence, resolved by inserting.
pub fn unbox_with(value: &Value, pos: TypePos, store: &BoxingStore) -> i64 {
    let tag = value
        .tag()
        .unwrap_or_else(|| panic!("internal error: unboxing absent value at {pos:?}"));
    let table = store.table(pos);
    check_tag(table, tag, pos);

    match value {
        Value::Obj(obj) => intern_object(table, obj, pos),
        primitive => primitive.to_bits(),
    }
}

/// Reconstruct a value from its 64-bit encoding at a position.
pub fn box_with(bits: i64, pos: TypePos, store: &BoxingStore) -> Value {
    let inner = store.table(pos).inner.read();
    let tag = inner
        .tag
        .unwrap_or_else(|| panic!("internal error: boxing at untouched position {pos:?}"));
    match tag {
        ValueTag::Obj => {
            let obj = inner.objects.get(bits as usize).unwrap_or_else(|| {
                panic!("internal error: object id {bits} out of range at {pos:?}")
            });
            Value::Obj(obj.clone())
        }
        primitive => Value::from_bits(primitive, bits),
    }
}

fn check_tag(table: &PositionTable, tag: ValueTag, pos: TypePos) {
    {
        let inner = table.inner.read();
        match inner.tag {
            Some(recorded) if recorded == tag => return,
            Some(recorded) => panic!(
                "internal error: tag mismatch at {pos:?}: recorded {recorded:?}, got {tag:?}"
            ),
            None => {}
        }
    }
    let mut inner = table.inner.write();
    match inner.tag {
        None => inner.tag = Some(tag),
        Some(recorded) if recorded == tag => {}
        Some(recorded) => panic!(
            "internal error: tag mismatch at {pos:?}: recorded {recorded:?}, got {tag:?}"
        ),
    }
}

fn lookup_sorted(inner: &PositionInner, obj: &BoxedObject) -> Result<usize, usize> {
    inner
        .sorted
        .binary_search_by(|&id| inner.objects[id].compare(obj))
}

fn intern_object(table: &PositionTable, obj: &BoxedObject, pos: TypePos) -> i64 {
    {
        let inner = table.inner.read();
        if let Ok(rank) = lookup_sorted(&inner, obj) {
            return inner.sorted[rank] as i64;
        }
    }
    let mut inner = table.inner.write();
    // Re-check: another thread may have inserted while we waited.
    match lookup_sorted(&inner, obj) {
        Ok(rank) => inner.sorted[rank] as i64,
        Err(rank) => {
            let id = inner.objects.len();
            inner.objects.push(obj.clone());
            inner.sorted.insert(rank, id);
            #[cfg(feature = "tracing")]
            trace!(position = pos.0, id, "boxing_object_interned");
            let _ = pos;
            id as i64
        }
    }
}

/// Int64-encoded fact tables keyed by relation symbol.
pub type EncodedFacts = FxHashMap<RelSym, Vec<Tuple>>;

/// Everything the evaluator needs from the boxing pass.
pub struct BoxingInit {
    pub store: BoxingStore,
    pub given_facts: EncodedFacts,
    pub new_facts: EncodedFacts,
    pub mapping: FxHashMap<SlotId, TypePos>,
}

/// Run unification, build the boxing store, and encode both fact tables.
///
/// Every Latticenal relation's bottom element is unboxed first at its
/// trailing-column position, so bottom always occupies id 0 in that
/// column's object table.
pub fn initialize(with_provenance: bool, program: &RamProgram) -> BoxingInit {
    let mapping = compute_mapping(program, with_provenance);
    let positions = mapping.values().map(|p| p.0 + 1).max().unwrap_or(0);
    let store = BoxingStore::with_positions(positions);

    for sym in program.relations.syms() {
        let denotation = program.relations.denotation(sym);
        if let Some(ops) = denotation.lattice() {
            let arity = program.relations.arity(sym);
            let pos = column_position(&mapping, sym, arity - 1);
            let encoded = unbox_with(&ops.bottom, pos, &store);
            if matches!(ops.bottom, Value::Obj(_)) {
                debug_assert_eq!(encoded, 0, "bottom must take id 0");
            }
        }
    }

    let given_facts = encode_facts(&program.given_facts, &mapping, &store);
    let new_facts = encode_facts(&program.new_facts, &mapping, &store);

    BoxingInit {
        store,
        given_facts,
        new_facts,
        mapping,
    }
}

/// Position of a logical relation's column, via its Full variant.
pub fn column_position(
    mapping: &FxHashMap<SlotId, TypePos>,
    sym: RelSym,
    col: usize,
) -> TypePos {
    let slot = SlotId::RelCol(RamSym::full(sym), col);
    *mapping
        .get(&slot)
        .unwrap_or_else(|| panic!("internal error: unmapped relation column {slot:?}"))
}

fn encode_facts(
    tables: &FactTables,
    mapping: &FxHashMap<SlotId, TypePos>,
    store: &BoxingStore,
) -> EncodedFacts {
    let mut encoded = EncodedFacts::default();
    for (&sym, rows) in tables {
        let out: Vec<Tuple> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(col, value)| {
                        unbox_with(value, column_position(mapping, sym, col), store)
                    })
                    .collect()
            })
            .collect();
        encoded.insert(sym, out);
    }
    encoded
}

/// Ordering of two encoded lattice elements is not meaningful; expose the
/// comparator-backed object compare for diagnostics and tests.
pub fn compare_objects(a: &BoxedObject, b: &BoxedObject) -> Ordering {
    a.compare(b)
}

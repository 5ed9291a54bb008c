//! Tuple storage: ordered relations over encoded rows.
//!
//! Rows are fixed-width `i64` tuples produced by the boxing pass. A
//! [`Relation`] is either a plain ordered set or a lattice map from key
//! columns to a merged trailing element. Each logical relation exists in
//! three versions ([`VersionedRelation`]); the [`Database`] owns the triple
//! for every registered symbol.
//!
//! Iteration order is the lexicographic tuple order, always. Callers that
//! snapshot twice without writes in between see identical sequences.

use crate::boxing::{box_with, column_position, unbox_with, BoxingStore};
use crate::lattice::LatticeOps;
use crate::ram::{RamProgram, RamSym, Version};
use crate::symbol::RelSym;
use crate::unify::{SlotId, TypePos};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// An encoded row. Inline up to eight columns.
pub type Tuple = SmallVec<[i64; 8]>;

enum RelInner {
    Set(BTreeSet<Tuple>),
    /// Key columns to merged trailing element. `pos` is the boxing position
    /// of the trailing column, shared by all three versions.
    Lat {
        rows: BTreeMap<Tuple, i64>,
        ops: LatticeOps,
        pos: TypePos,
    },
}

/// One version of one relation. Interior-mutable so parallel loop bodies can
/// insert through a shared reference.
pub struct Relation {
    inner: RwLock<RelInner>,
}

impl Relation {
    pub fn relational() -> Self {
        Self {
            inner: RwLock::new(RelInner::Set(BTreeSet::new())),
        }
    }

    pub fn latticenal(ops: LatticeOps, pos: TypePos) -> Self {
        Self {
            inner: RwLock::new(RelInner::Lat {
                rows: BTreeMap::new(),
                ops,
                pos,
            }),
        }
    }

    /// Insert a row. Returns whether the relation changed.
    ///
    /// Lattice relations merge on key collision: the stored element is
    /// raised to `lub(old, new)`, and rows whose element is below or equal
    /// to bottom are dropped outright.
    pub fn insert(&self, tuple: Tuple, boxing: &BoxingStore) -> bool {
        let mut inner = self.inner.write();
        match &mut *inner {
            RelInner::Set(rows) => rows.insert(tuple),
            RelInner::Lat { rows, ops, pos } => {
                let (key, bits) = split_lat(tuple);
                let value = box_with(bits, *pos, boxing);
                if ops.is_bottom(&value) {
                    return false;
                }
                match rows.get_mut(&key) {
                    None => {
                        rows.insert(key, bits);
                        true
                    }
                    Some(stored_bits) => {
                        let stored = box_with(*stored_bits, *pos, boxing);
                        let merged = (ops.lub)(&stored, &value);
                        if merged == stored {
                            false
                        } else {
                            *stored_bits = unbox_with(&merged, *pos, boxing);
                            true
                        }
                    }
                }
            }
        }
    }

    /// Membership test. Lattice relations use subsumption: the row is a
    /// member when its key is present and its element is `leq` the stored
    /// element.
    pub fn contains(&self, tuple: &Tuple, boxing: &BoxingStore) -> bool {
        let inner = self.inner.read();
        match &*inner {
            RelInner::Set(rows) => rows.contains(tuple),
            RelInner::Lat { rows, ops, pos } => {
                let (key, bits) = split_lat_ref(tuple);
                match rows.get(&key) {
                    None => false,
                    Some(&stored_bits) => {
                        if bits == stored_bits {
                            return true;
                        }
                        let value = box_with(bits, *pos, boxing);
                        let stored = box_with(stored_bits, *pos, boxing);
                        (ops.leq)(&value, &stored)
                    }
                }
            }
        }
    }

    /// All rows in lexicographic order. Lattice rows rebuild key + element.
    pub fn snapshot(&self) -> Vec<Tuple> {
        let inner = self.inner.read();
        match &*inner {
            RelInner::Set(rows) => rows.iter().cloned().collect(),
            RelInner::Lat { rows, .. } => rows.iter().map(|(k, &v)| join_lat(k, v)).collect(),
        }
    }

    /// Rows whose leading columns equal `prefix`, in order.
    pub fn scan_prefix(&self, prefix: &[i64]) -> Vec<Tuple> {
        if prefix.is_empty() {
            return self.snapshot();
        }
        let start: Tuple = prefix.iter().copied().collect();
        let inner = self.inner.read();
        match &*inner {
            RelInner::Set(rows) => rows
                .range(start..)
                .take_while(|row| row.starts_with(prefix))
                .cloned()
                .collect(),
            RelInner::Lat { rows, .. } => {
                // The prefix may reach into the trailing element column; clip
                // the range to key columns and filter the rebuilt rows.
                let key_prefix = &prefix[..prefix.len().min(key_len(rows))];
                let start: Tuple = key_prefix.iter().copied().collect();
                rows.range(start..)
                    .take_while(|(k, _)| k.starts_with(key_prefix))
                    .map(|(k, &v)| join_lat(k, v))
                    .filter(|row| row.starts_with(prefix))
                    .collect()
            }
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        match &*inner {
            RelInner::Set(rows) => rows.len(),
            RelInner::Lat { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        match &mut *inner {
            RelInner::Set(rows) => rows.clear(),
            RelInner::Lat { rows, .. } => rows.clear(),
        }
    }

    /// Merge every row of `self` into `target`. Returns whether `target`
    /// changed.
    pub fn merge_into(&self, target: &Relation, boxing: &BoxingStore) -> bool {
        let rows = self.snapshot();
        let mut changed = false;
        for row in rows {
            changed |= target.insert(row, boxing);
        }
        changed
    }

    /// Exchange contents with `other`. Locks are taken in address order so
    /// concurrent swaps over the same pair cannot deadlock.
    pub fn swap(&self, other: &Relation) {
        let (first, second) = if (self as *const Relation) < (other as *const Relation) {
            (self, other)
        } else {
            (other, self)
        };
        let mut a = first.inner.write();
        let mut b = second.inner.write();
        std::mem::swap(&mut *a, &mut *b);
    }
}

fn key_len(rows: &BTreeMap<Tuple, i64>) -> usize {
    rows.keys().next().map(|k| k.len()).unwrap_or(usize::MAX)
}

fn split_lat(mut tuple: Tuple) -> (Tuple, i64) {
    let bits = tuple
        .pop()
        .unwrap_or_else(|| panic!("internal error: zero-arity lattice row"));
    (tuple, bits)
}

fn split_lat_ref(tuple: &Tuple) -> (Tuple, i64) {
    let (last, key) = tuple
        .split_last()
        .unwrap_or_else(|| panic!("internal error: zero-arity lattice row"));
    (key.iter().copied().collect(), *last)
}

fn join_lat(key: &Tuple, bits: i64) -> Tuple {
    let mut row = key.clone();
    row.push(bits);
    row
}

/// The Full/Delta/New triple of one logical relation.
pub struct VersionedRelation {
    full: Relation,
    delta: Relation,
    new: Relation,
}

impl VersionedRelation {
    fn relational() -> Self {
        Self {
            full: Relation::relational(),
            delta: Relation::relational(),
            new: Relation::relational(),
        }
    }

    fn latticenal(ops: &LatticeOps, pos: TypePos) -> Self {
        Self {
            full: Relation::latticenal(ops.clone(), pos),
            delta: Relation::latticenal(ops.clone(), pos),
            new: Relation::latticenal(ops.clone(), pos),
        }
    }

    pub fn version(&self, version: Version) -> &Relation {
        match version {
            Version::Full => &self.full,
            Version::Delta => &self.delta,
            Version::New => &self.new,
        }
    }
}

/// All relation versions for one evaluation.
pub struct Database {
    relations: FxHashMap<RelSym, VersionedRelation>,
}

impl Database {
    /// Build an empty triple for every relation the program registers.
    ///
    /// Lattice relations need the boxing position of their trailing column,
    /// resolved through `mapping` against the Full variant.
    pub fn for_program(program: &RamProgram, mapping: &FxHashMap<SlotId, TypePos>) -> Self {
        let mut relations = FxHashMap::default();
        for sym in program.relations.syms() {
            let denotation = program.relations.denotation(sym);
            let versioned = match denotation.lattice() {
                None => VersionedRelation::relational(),
                Some(ops) => {
                    let arity = program.relations.arity(sym);
                    let pos = column_position(mapping, sym, arity - 1);
                    VersionedRelation::latticenal(ops, pos)
                }
            };
            relations.insert(sym, versioned);
        }
        #[cfg(feature = "tracing")]
        trace!(relations = relations.len(), "database_initialized");
        Self { relations }
    }

    pub fn relation(&self, sym: RamSym) -> &Relation {
        self.versioned(sym.sym).version(sym.version)
    }

    pub fn versioned(&self, sym: RelSym) -> &VersionedRelation {
        self.relations
            .get(&sym)
            .unwrap_or_else(|| panic!("internal error: unknown relation symbol {sym:?}"))
    }

    pub fn syms(&self) -> impl Iterator<Item = RelSym> + '_ {
        self.relations.keys().copied()
    }
}

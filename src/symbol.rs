//! Relation symbols: interned names plus arity and denotation.
//!
//! A [`RelSym`] is a stable dense id. The [`RelationStore`] maps ids back to
//! their interned name, arity and [`Denotation`]; symbol resolution backs
//! the debug/dump surface only, evaluation works on ids.

use crate::lattice::Denotation;
use hashbrown::HashMap;
use lasso::{Spur, ThreadedRodeo};
use parking_lot::RwLock;

/// Stable identifier of a logical relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelSym(u32);

impl RelSym {
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Clone)]
struct RelInfo {
    name: Spur,
    arity: usize,
    denotation: Denotation,
}

/// Thread-safe registry of relation symbols.
///
/// Guarantees:
/// - Registering the same name twice returns the same `RelSym`
/// - A `RelSym` resolves back to its name, arity and denotation
/// - Ids are dense and assigned in registration order
pub struct RelationStore {
    rodeo: ThreadedRodeo,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    infos: Vec<RelInfo>,
    by_name: HashMap<Spur, RelSym>,
}

impl RelationStore {
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a relation, returning its symbol.
    ///
    /// Re-registering an existing name returns the existing symbol; a
    /// conflicting arity is a fatal internal error (the upstream frontend
    /// owns declaration checking).
    pub fn register(&self, name: &str, arity: usize, denotation: Denotation) -> RelSym {
        let spur = self.rodeo.get_or_intern(name);
        let mut inner = self.inner.write();
        if let Some(&sym) = inner.by_name.get(&spur) {
            let existing = &inner.infos[sym.0 as usize];
            if existing.arity != arity {
                panic!(
                    "internal error: relation {name} re-registered with arity {arity}, had {}",
                    existing.arity
                );
            }
            return sym;
        }
        let sym = RelSym(inner.infos.len() as u32);
        inner.infos.push(RelInfo {
            name: spur,
            arity,
            denotation,
        });
        inner.by_name.insert(spur, sym);
        sym
    }

    /// Look up a symbol by name without registering.
    pub fn get(&self, name: &str) -> Option<RelSym> {
        let spur = self.rodeo.get(name)?;
        self.inner.read().by_name.get(&spur).copied()
    }

    pub fn arity(&self, sym: RelSym) -> usize {
        self.info(sym).arity
    }

    pub fn denotation(&self, sym: RelSym) -> Denotation {
        self.info(sym).denotation
    }

    /// Resolve a symbol's name. `None` if the symbol is foreign to this store.
    pub fn name(&self, sym: RelSym) -> Option<String> {
        let inner = self.inner.read();
        let info = inner.infos.get(sym.0 as usize)?;
        Some(self.rodeo.resolve(&info.name).to_string())
    }

    /// All registered symbols, in registration order.
    pub fn syms(&self) -> Vec<RelSym> {
        let inner = self.inner.read();
        (0..inner.infos.len() as u32).map(RelSym).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn info(&self, sym: RelSym) -> RelInfo {
        self.inner
            .read()
            .infos
            .get(sym.0 as usize)
            .cloned()
            .unwrap_or_else(|| panic!("internal error: unknown relation symbol {sym:?}"))
    }
}

impl Default for RelationStore {
    fn default() -> Self {
        Self::new()
    }
}

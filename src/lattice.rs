//! Predicate denotations and lattice operation bundles.
//!
//! A predicate's trailing argument either has set semantics (`Relational`)
//! or lattice-merge semantics (`Latticenal`): inserting a tuple whose key
//! already exists merges the trailing value upward via `lub`, and membership
//! is decided by `leq` against the stored value.

use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Binary operation over lattice elements (`lub`, `glb`).
pub type BinOpFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Partial-order test over lattice elements.
pub type LeqFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// The operation bundle of a lattice-valued predicate.
///
/// Obligations on the caller (not checked here): `leq` is a partial order
/// with least element `bottom`, `lub`/`glb` are its join/meet, and every
/// rule body is monotone in lattice arguments. The fixpoint loop terminates
/// only if the lattice has no infinite ascending chains.
#[derive(Clone)]
pub struct LatticeOps {
    pub bottom: Value,
    pub leq: LeqFn,
    pub lub: BinOpFn,
    pub glb: BinOpFn,
}

impl LatticeOps {
    pub fn new(
        bottom: Value,
        leq: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
        lub: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
        glb: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            bottom,
            leq: Arc::new(leq),
            lub: Arc::new(lub),
            glb: Arc::new(glb),
        }
    }

    /// Whether `value` carries no information, i.e. `value <= bottom`.
    pub fn is_bottom(&self, value: &Value) -> bool {
        (self.leq)(value, &self.bottom)
    }
}

impl fmt::Debug for LatticeOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatticeOps")
            .field("bottom", &self.bottom)
            .finish_non_exhaustive()
    }
}

/// Whether a relation is plain-relational or lattice-valued.
#[derive(Clone, Debug)]
pub enum Denotation {
    Relational,
    Latticenal(LatticeOps),
}

impl Denotation {
    pub fn is_lattice(&self) -> bool {
        matches!(self, Denotation::Latticenal(_))
    }

    pub fn lattice(&self) -> Option<&LatticeOps> {
        match self {
            Denotation::Relational => None,
            Denotation::Latticenal(ops) => Some(ops),
        }
    }
}

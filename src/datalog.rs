//! The Datalog surface model: facts, rules, terms, stratification input.
//!
//! A [`Program`] is ground facts plus Horn-clause [`Constraint`]s. Body
//! predicates are positive/negative atoms, host-function extensions
//! ([`BodyPredicate::Functional`]) or boolean guards. Applications take
//! variable-arity argument vectors; there is no arity ceiling.

use crate::symbol::{RelSym, RelationStore};
use crate::value::{format_value, Value};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt::Write as _;
use std::sync::Arc;

/// A Datalog rule variable. Ids are scoped to one rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarSym(pub u32);

/// Host function computing one value from argument values.
pub type ValueFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Host predicate used as a rule guard.
pub type PredFn = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// Host function producing a stream of output rows (functional extension).
pub type RowFn = Arc<dyn Fn(&[Value]) -> Vec<Vec<Value>> + Send + Sync>;

/// Fact tables keyed by relation symbol.
pub type FactTables = FxHashMap<RelSym, Vec<SmallVec<[Value; 4]>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

/// Whether an atom may be focused on the delta relation during incremental
/// evaluation. `Fixed` atoms always read the full relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fixity {
    Loose,
    Fixed,
}

/// A term in a rule head.
#[derive(Clone)]
pub enum HeadTerm {
    Var(VarSym),
    Lit(Value),
    /// Host-computed value from bound variables.
    App(ValueFn, SmallVec<[VarSym; 4]>),
}

/// A term in a body atom.
#[derive(Clone, Debug, PartialEq)]
pub enum BodyTerm {
    Var(VarSym),
    Lit(Value),
}

/// The head predicate of a rule: target relation and output terms.
#[derive(Clone)]
pub struct HeadAtom {
    pub sym: RelSym,
    pub terms: SmallVec<[HeadTerm; 4]>,
}

/// One predicate of a rule body, in body order.
#[derive(Clone)]
pub enum BodyPredicate {
    Atom {
        sym: RelSym,
        polarity: Polarity,
        fixity: Fixity,
        terms: SmallVec<[BodyTerm; 4]>,
    },
    /// Binds `outs` from each row the host function yields for `args`.
    Functional {
        outs: SmallVec<[VarSym; 2]>,
        f: RowFn,
        args: SmallVec<[BodyTerm; 4]>,
    },
    Guard {
        f: PredFn,
        args: SmallVec<[BodyTerm; 4]>,
    },
}

impl BodyPredicate {
    /// Positive loose atom, the common case.
    pub fn atom(sym: RelSym, terms: impl Into<SmallVec<[BodyTerm; 4]>>) -> Self {
        BodyPredicate::Atom {
            sym,
            polarity: Polarity::Positive,
            fixity: Fixity::Loose,
            terms: terms.into(),
        }
    }

    pub fn negated(sym: RelSym, terms: impl Into<SmallVec<[BodyTerm; 4]>>) -> Self {
        BodyPredicate::Atom {
            sym,
            polarity: Polarity::Negative,
            fixity: Fixity::Loose,
            terms: terms.into(),
        }
    }
}

/// A ground fact.
#[derive(Clone)]
pub struct Fact {
    pub sym: RelSym,
    pub terms: SmallVec<[Value; 4]>,
}

/// A rule: head plus ordered body predicates. Join order follows body order.
#[derive(Clone)]
pub struct Constraint {
    pub head: HeadAtom,
    pub body: Vec<BodyPredicate>,
}

/// A full program: facts and rules over registered relations.
#[derive(Clone, Default)]
pub struct Program {
    pub facts: Vec<Fact>,
    pub rules: Vec<Constraint>,
}

/// Precomputed predicate placement, supplied by an external stratification
/// analysis. Pseudostrata run sequentially; strata inside one pseudostratum
/// are certified independent and run in parallel.
#[derive(Clone, Debug, Default)]
pub struct Stratification {
    map: FxHashMap<RelSym, (usize, usize)>,
}

impl Stratification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, sym: RelSym, pseudostratum: usize, stratum: usize) {
        self.map.insert(sym, (pseudostratum, stratum));
    }

    /// Placement of a predicate; unassigned predicates land in the first
    /// stratum of the first pseudostratum.
    pub fn of(&self, sym: RelSym) -> (usize, usize) {
        self.map.get(&sym).copied().unwrap_or((0, 0))
    }
}

/// Render a rule as source-like text, e.g. for `Comment` statements.
pub fn format_constraint(
    constraint: &Constraint,
    relations: &RelationStore,
) -> Result<String, String> {
    let mut out = String::new();
    render_head(&constraint.head, relations, &mut out)?;
    if !constraint.body.is_empty() {
        out.push_str(" :- ");
        for (i, pred) in constraint.body.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            render_body_predicate(pred, relations, &mut out)?;
        }
    }
    out.push('.');
    Ok(out)
}

fn rel_name(sym: RelSym, relations: &RelationStore) -> Result<String, String> {
    relations
        .name(sym)
        .ok_or_else(|| format!("unknown relation symbol {sym:?}"))
}

fn render_head(head: &HeadAtom, relations: &RelationStore, out: &mut String) -> Result<(), String> {
    out.push_str(&rel_name(head.sym, relations)?);
    let lattice = relations.denotation(head.sym).is_lattice();
    out.push('(');
    for (i, term) in head.terms.iter().enumerate() {
        if i > 0 {
            out.push_str(if lattice && i == head.terms.len() - 1 { "; " } else { ", " });
        }
        match term {
            HeadTerm::Var(v) => {
                let _ = write!(out, "x{}", v.0);
            }
            HeadTerm::Lit(value) => out.push_str(&format_value(value)),
            HeadTerm::App(_, args) => {
                out.push_str("<fn>(");
                for (j, a) in args.iter().enumerate() {
                    if j > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "x{}", a.0);
                }
                out.push(')');
            }
        }
    }
    out.push(')');
    Ok(())
}

fn render_body_terms(
    terms: &[BodyTerm],
    lattice_trailing: bool,
    out: &mut String,
) {
    out.push('(');
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            out.push_str(if lattice_trailing && i == terms.len() - 1 { "; " } else { ", " });
        }
        match term {
            BodyTerm::Var(v) => {
                let _ = write!(out, "x{}", v.0);
            }
            BodyTerm::Lit(value) => out.push_str(&format_value(value)),
        }
    }
    out.push(')');
}

fn render_body_predicate(
    pred: &BodyPredicate,
    relations: &RelationStore,
    out: &mut String,
) -> Result<(), String> {
    match pred {
        BodyPredicate::Atom {
            sym,
            polarity,
            terms,
            ..
        } => {
            if *polarity == Polarity::Negative {
                out.push_str("not ");
            }
            out.push_str(&rel_name(*sym, relations)?);
            render_body_terms(terms, relations.denotation(*sym).is_lattice(), out);
        }
        BodyPredicate::Functional { outs, args, .. } => {
            out.push('(');
            for (i, v) in outs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "x{}", v.0);
            }
            out.push_str(") <- <fn>");
            render_body_terms(args, false, out);
        }
        BodyPredicate::Guard { args, .. } => {
            out.push_str("if <guard>");
            render_body_terms(args, false, out);
        }
    }
    Ok(())
}

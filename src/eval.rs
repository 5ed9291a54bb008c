//! Execution of compiled RAM programs.
//!
//! The [`Machine`] walks the statement tree directly. `Par` children and
//! large `Search` scans fan out onto the rayon pool; everything else runs in
//! program order. The `Until` loop re-tests its conjunctive emptiness
//! condition before each round, so the merge/swap of one round is always a
//! barrier before the next round's reads.
//!
//! All value traffic stays in the 64-bit encoding; host functions and
//! lattice operations are the only points where values are reconstructed.

use crate::boxing::{box_with, unbox_with, BoxingStore, EncodedFacts};
use crate::ram::{BoolExpr, RamProgram, RamStmt, RamSym, RamTerm, RowVar};
use crate::store::{Database, Tuple};
use crate::unify::{term_slot, SlotId, TypePos};
use crate::value::Value;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::metrics::EvalMetrics;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Evaluator knobs.
#[derive(Clone, Copy, Debug)]
pub struct EvalConfig {
    /// Minimum row count before a `Search` scan fans out in parallel.
    pub parallel_scan_threshold: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            parallel_scan_threshold: 128,
        }
    }
}

/// Row bindings live for one loop-nest path.
type Frame = FxHashMap<RowVar, Tuple>;

/// Executes one compiled program against one database.
pub struct Machine<'a> {
    program: &'a RamProgram,
    db: &'a Database,
    boxing: &'a BoxingStore,
    mapping: &'a FxHashMap<SlotId, TypePos>,
    config: EvalConfig,
    /// No-op unless the `metrics` feature is enabled.
    pub metrics: EvalMetrics,
}

impl<'a> Machine<'a> {
    pub fn new(
        program: &'a RamProgram,
        db: &'a Database,
        boxing: &'a BoxingStore,
        mapping: &'a FxHashMap<SlotId, TypePos>,
        config: EvalConfig,
    ) -> Self {
        Self {
            program,
            db,
            boxing,
            mapping,
            config,
            metrics: EvalMetrics::default(),
        }
    }

    /// Insert encoded facts into each relation's Full variant.
    pub fn load_facts(&self, facts: &EncodedFacts) {
        for (&sym, rows) in facts {
            let rel = self.db.relation(RamSym::full(sym));
            for row in rows {
                rel.insert(row.clone(), self.boxing);
            }
        }
    }

    /// Run the program to completion.
    pub fn run(&self) {
        let frame = Frame::default();
        self.exec(&self.program.stmt, &frame);
    }

    fn position(&self, slot: SlotId) -> TypePos {
        *self
            .mapping
            .get(&slot)
            .unwrap_or_else(|| panic!("internal error: unmapped slot {slot:?}"))
    }

    /// Reconstruct a term's value from its encoding, for host calls.
    fn boxed(&self, term: &RamTerm, frame: &Frame) -> Value {
        let bits = self.eval_term(term, frame);
        box_with(bits, self.position(term_slot(term)), self.boxing)
    }

    fn eval_term(&self, term: &RamTerm, frame: &Frame) -> i64 {
        match term {
            RamTerm::Lit(value, id) => {
                unbox_with(value, self.position(SlotId::Lit(*id)), self.boxing)
            }
            RamTerm::RowLoad(row, col) => {
                let tuple = frame
                    .get(row)
                    .unwrap_or_else(|| panic!("internal error: unbound row variable $r{}", row.0));
                tuple[*col]
            }
            RamTerm::Meet(glb, a, b, id) => {
                let left = self.boxed(a, frame);
                let right = self.boxed(b, frame);
                let met = glb(&left, &right);
                unbox_with(&met, self.position(SlotId::Meet(*id)), self.boxing)
            }
            RamTerm::App(f, args, id) => {
                let values: Vec<Value> = args.iter().map(|a| self.boxed(a, frame)).collect();
                let out = f(&values);
                unbox_with(&out, self.position(SlotId::AppOut(*id, 0)), self.boxing)
            }
        }
    }

    fn eval_bool(&self, cond: &BoolExpr, frame: &Frame) -> bool {
        match cond {
            // Operands share a unified position, so encodings compare raw.
            BoolExpr::Eq(a, b) => self.eval_term(a, frame) == self.eval_term(b, frame),
            BoolExpr::Leq(leq, a, b) => {
                let left = self.boxed(a, frame);
                let right = self.boxed(b, frame);
                leq(&left, &right)
            }
            BoolExpr::NotBot { leq, bottom, term } => {
                let value = self.boxed(term, frame);
                !leq(&value, bottom)
            }
            BoolExpr::NotMemberOf(terms, rel) => {
                let tuple: Tuple = terms.iter().map(|t| self.eval_term(t, frame)).collect();
                !self.db.relation(*rel).contains(&tuple, self.boxing)
            }
            BoolExpr::Guard(f, args, _) => {
                let values: Vec<Value> = args.iter().map(|a| self.boxed(a, frame)).collect();
                f(&values)
            }
            BoolExpr::IsEmpty(rel) => self.db.relation(*rel).is_empty(),
        }
    }

    fn eval_conds(&self, conds: &[BoolExpr], frame: &Frame) -> bool {
        conds.iter().all(|c| self.eval_bool(c, frame))
    }

    fn exec(&self, stmt: &RamStmt, frame: &Frame) {
        match stmt {
            RamStmt::Search { row, rel, body } => {
                let rows = self.db.relation(*rel).snapshot();
                self.metrics.search(rows.len());
                if !rows.is_empty() && rows.len() >= self.config.parallel_scan_threshold {
                    rows.par_iter().for_each(|tuple| {
                        let mut inner = frame.clone();
                        inner.insert(*row, tuple.clone());
                        self.exec(body, &inner);
                    });
                } else {
                    let mut inner = frame.clone();
                    for tuple in rows {
                        inner.insert(*row, tuple);
                        self.exec(body, &inner);
                    }
                }
            }
            RamStmt::Query {
                row,
                rel,
                prefix,
                body,
            } => {
                let bound: Vec<i64> = prefix.iter().map(|t| self.eval_term(t, frame)).collect();
                let rows = self.db.relation(*rel).scan_prefix(&bound);
                self.metrics.search(rows.len());
                let mut inner = frame.clone();
                for tuple in rows {
                    inner.insert(*row, tuple);
                    self.exec(body, &inner);
                }
            }
            RamStmt::Functional {
                row,
                f,
                args,
                app: _,
                arity,
                body,
            } => {
                let values: Vec<Value> = args.iter().map(|a| self.boxed(a, frame)).collect();
                let mut inner = frame.clone();
                for yielded in f(&values) {
                    if yielded.len() != *arity {
                        panic!(
                            "internal error: functional row arity {} where {arity} declared",
                            yielded.len()
                        );
                    }
                    let tuple: Tuple = yielded
                        .iter()
                        .enumerate()
                        .map(|(col, v)| {
                            unbox_with(v, self.position(SlotId::RowCol(*row, col)), self.boxing)
                        })
                        .collect();
                    inner.insert(*row, tuple);
                    self.exec(body, &inner);
                }
            }
            RamStmt::If { conds, then } => {
                if self.eval_conds(conds, frame) {
                    self.exec(then, frame);
                }
            }
            RamStmt::Project { terms, rel } => {
                let tuple: Tuple = terms.iter().map(|t| self.eval_term(t, frame)).collect();
                let changed = self.db.relation(*rel).insert(tuple, self.boxing);
                self.metrics.project(changed);
            }
            RamStmt::MergeInto { src, dst } => {
                self.db
                    .relation(*src)
                    .merge_into(self.db.relation(*dst), self.boxing);
                self.metrics.merge();
            }
            RamStmt::Swap { a, b } => self.db.relation(*a).swap(self.db.relation(*b)),
            RamStmt::Purge { rel } => self.db.relation(*rel).clear(),
            RamStmt::Seq(stmts) => {
                for s in stmts {
                    self.exec(s, frame);
                }
            }
            RamStmt::Par(stmts) => {
                rayon::scope(|scope| {
                    for s in stmts {
                        scope.spawn(move |_| self.exec(s, frame));
                    }
                });
            }
            RamStmt::Until { conds, body } => {
                while !self.eval_conds(conds, frame) {
                    self.metrics.round();
                    #[cfg(feature = "tracing")]
                    trace!("fixpoint_round");
                    self.exec(body, frame);
                }
            }
            RamStmt::Comment(_) => {}
        }
    }
}

//! The solver: compile, box, evaluate, decode.
//!
//! [`Solver`] is the embedding surface. Callers register relations, supply
//! facts and rules plus a precomputed stratification, and receive the final
//! model decoded back into [`Value`] rows.

use crate::boxing::{box_with, column_position, initialize};
use crate::compiler::{compile, CompileOptions};
use crate::datalog::{Constraint, Fact, FactTables, Program, Stratification};
use crate::eval::{EvalConfig, Machine};
use crate::lattice::Denotation;
use crate::ram::{RamProgram, RamSym};
use crate::store::Database;
use crate::symbol::{RelSym, RelationStore};
use crate::value::Value;
use smallvec::SmallVec;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// One evaluation problem: relations, facts, rules, stratification.
pub struct Solver {
    relations: Arc<RelationStore>,
    program: Program,
    given: FactTables,
    strat: Stratification,
    pub options: CompileOptions,
    pub config: EvalConfig,
}

impl Solver {
    pub fn new() -> Self {
        Self {
            relations: Arc::new(RelationStore::new()),
            program: Program::default(),
            given: FactTables::default(),
            strat: Stratification::new(),
            options: CompileOptions::default(),
            config: EvalConfig::default(),
        }
    }

    pub fn relations(&self) -> &Arc<RelationStore> {
        &self.relations
    }

    /// Register a relation by name.
    pub fn register(&self, name: &str, arity: usize, denotation: Denotation) -> RelSym {
        self.relations.register(name, arity, denotation)
    }

    /// Add a ground fact to the program text.
    pub fn fact(&mut self, sym: RelSym, terms: impl Into<SmallVec<[Value; 4]>>) {
        self.program.facts.push(Fact {
            sym,
            terms: terms.into(),
        });
    }

    /// Add a row to the pre-existing fact database.
    pub fn given(&mut self, sym: RelSym, terms: impl Into<SmallVec<[Value; 4]>>) {
        self.given.entry(sym).or_default().push(terms.into());
    }

    pub fn rule(&mut self, rule: Constraint) {
        self.program.rules.push(rule);
    }

    /// Place a predicate in the supplied stratification.
    pub fn stratify(&mut self, sym: RelSym, pseudostratum: usize, stratum: usize) {
        self.strat.assign(sym, pseudostratum, stratum);
    }

    /// Lower the current program without running it.
    pub fn compiled(&self) -> RamProgram {
        compile(
            &self.program,
            &self.given,
            &self.strat,
            &self.relations,
            self.options,
        )
    }

    /// Compile, evaluate to fixpoint, and decode every relation's Full
    /// contents back into values.
    pub fn solve(&self) -> FactTables {
        let ram = self.compiled();
        let init = initialize(false, &ram);
        let db = Database::for_program(&ram, &init.mapping);
        let machine = Machine::new(&ram, &db, &init.store, &init.mapping, self.config);
        machine.load_facts(&init.given_facts);
        machine.load_facts(&init.new_facts);
        machine.run();

        #[cfg(feature = "tracing")]
        debug!("fixpoint_reached");

        let mut model = FactTables::default();
        for sym in self.relations.syms() {
            let rows = db.relation(RamSym::full(sym)).snapshot();
            let decoded = rows
                .into_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(col, &bits)| {
                            box_with(bits, column_position(&init.mapping, sym, col), &init.store)
                        })
                        .collect()
                })
                .collect();
            model.insert(sym, decoded);
        }
        model
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

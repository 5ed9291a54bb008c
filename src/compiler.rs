//! Lowering from Datalog rules to RAM loop nests.
//!
//! Each rule becomes one nest of `Search`/`Functional` loops (body order,
//! outer to inner) around an `If` guarding a `Project` into the head
//! relation's New variant. A stratum becomes the semi-naive round structure:
//! a parallel full pass, merge/swap bookkeeping, then a fixpoint loop of
//! incremental variants that each focus one recursive atom on Delta.
//!
//! Compilation is single-threaded and side-effect-free; all fallible
//! lookups here are internal invariants, violated only by upstream analysis
//! bugs, and therefore fatal.

use crate::datalog::{
    format_constraint, BodyPredicate, BodyTerm, Constraint, FactTables, Fixity, HeadTerm,
    Polarity, Program, RowFn, Stratification, VarSym,
};
use crate::lattice::LatticeOps;
use crate::ram::{
    AppId, BoolExpr, LitId, MeetId, RamProgram, RamStmt, RamSym, RamTerm, RowVar,
};
use crate::symbol::{RelSym, RelationStore};
use crate::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Presentation switches for compiled output.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompileOptions {
    /// Emit a `Comment` carrying the source rule before each compiled loop.
    pub emit_comments: bool,
}

/// Pass-local id counters, threaded explicitly through compilation.
#[derive(Debug, Default)]
pub struct IdGen {
    row: u32,
    lit: u32,
    app: u32,
    meet: u32,
}

impl IdGen {
    fn row(&mut self) -> RowVar {
        let id = RowVar(self.row);
        self.row += 1;
        id
    }

    fn lit(&mut self) -> LitId {
        let id = LitId(self.lit);
        self.lit += 1;
        id
    }

    fn app(&mut self) -> AppId {
        let id = AppId(self.app);
        self.app += 1;
        id
    }

    fn meet(&mut self) -> MeetId {
        let id = MeetId(self.meet);
        self.meet += 1;
        id
    }
}

/// Compile a full program against a precomputed stratification.
///
/// `given` is the pre-existing fact database; the program's own facts land
/// in the compiled program's `new_facts`. Pseudostrata compile to sequential
/// blocks in ascending order; independent strata inside one pseudostratum
/// become a `Par` block.
pub fn compile(
    program: &Program,
    given: &FactTables,
    strat: &Stratification,
    relations: &Arc<RelationStore>,
    options: CompileOptions,
) -> RamProgram {
    let mut ids = IdGen::default();

    let mut grouped: BTreeMap<usize, BTreeMap<usize, Vec<&Constraint>>> = BTreeMap::new();
    for rule in &program.rules {
        let (pseudo, stratum) = strat.of(rule.head.sym);
        grouped
            .entry(pseudo)
            .or_default()
            .entry(stratum)
            .or_default()
            .push(rule);
    }

    let mut blocks = Vec::new();
    for strata in grouped.values() {
        let mut stmts: Vec<RamStmt> = strata
            .values()
            .map(|rules| compile_stratum(rules, relations, &mut ids, options))
            .collect();
        blocks.push(if stmts.len() == 1 {
            stmts.swap_remove(0)
        } else {
            RamStmt::Par(stmts)
        });
    }

    #[cfg(feature = "tracing")]
    debug!(
        rules = program.rules.len(),
        pseudostrata = grouped.len(),
        "program_compiled"
    );

    RamProgram {
        stmt: RamStmt::Seq(blocks),
        given_facts: fold_facts(fact_rows(given), relations),
        new_facts: fold_facts(
            program.facts.iter().map(|f| (f.sym, f.terms.clone())),
            relations,
        ),
        relations: Arc::clone(relations),
    }
}

/// Compile one stratum's rules into its full pass plus fixpoint loop.
///
/// An empty stratum is an upstream stratification defect and fatal.
pub fn compile_stratum(
    rules: &[&Constraint],
    relations: &RelationStore,
    ids: &mut IdGen,
    options: CompileOptions,
) -> RamStmt {
    if rules.is_empty() {
        panic!("internal error: empty stratum");
    }
    let idb: FxHashSet<RelSym> = rules.iter().map(|r| r.head.sym).collect();
    let mut idb_syms: Vec<RelSym> = idb.iter().copied().collect();
    idb_syms.sort();

    let mut full_loops = Vec::new();
    for rule in rules {
        if let Some(stmt) = compile_rule(rule, None, false, relations, ids) {
            full_loops.push(commented(stmt, rule, relations, options));
        }
    }

    let mut incr_loops = Vec::new();
    for rule in rules {
        for (focus, (sym, fixity)) in scan_atoms(rule).into_iter().enumerate() {
            if fixity == Fixity::Loose && idb.contains(&sym) {
                if let Some(stmt) = compile_rule(rule, Some(focus), true, relations, ids) {
                    incr_loops.push(commented(stmt, rule, relations, options));
                }
            }
        }
    }

    let mut steps = Vec::new();
    if !full_loops.is_empty() {
        steps.push(RamStmt::Par(full_loops));
    }
    steps.push(merge_swap(&idb_syms));
    if !incr_loops.is_empty() {
        let conds = idb_syms
            .iter()
            .map(|&sym| BoolExpr::IsEmpty(RamSym::delta(sym)))
            .collect();
        steps.push(RamStmt::Until {
            conds,
            body: Box::new(RamStmt::Seq(vec![
                RamStmt::Par(incr_loops),
                merge_swap(&idb_syms),
            ])),
        });
    }
    RamStmt::Seq(steps)
}

/// The end-of-round bookkeeping for every relation a stratum defines:
/// publish New into Full, rotate New into Delta, discard the old Delta.
/// Groups for distinct relations touch disjoint tables, so they run in
/// parallel.
fn merge_swap(idb_syms: &[RelSym]) -> RamStmt {
    let mut groups = Vec::with_capacity(idb_syms.len());
    for &sym in idb_syms {
        groups.push(RamStmt::Seq(vec![
            RamStmt::MergeInto {
                src: RamSym::new_rel(sym),
                dst: RamSym::full(sym),
            },
            RamStmt::Swap {
                a: RamSym::new_rel(sym),
                b: RamSym::delta(sym),
            },
            RamStmt::Purge {
                rel: RamSym::new_rel(sym),
            },
        ]));
    }
    if groups.len() == 1 {
        groups.remove(0)
    } else {
        RamStmt::Par(groups)
    }
}

fn commented(
    stmt: RamStmt,
    rule: &Constraint,
    relations: &RelationStore,
    options: CompileOptions,
) -> RamStmt {
    if !options.emit_comments {
        return stmt;
    }
    let text = format_constraint(rule, relations)
        .unwrap_or_else(|err| panic!("internal error: {err}"));
    RamStmt::Seq(vec![RamStmt::Comment(text), stmt])
}

/// Positive atoms that compile to `Search` loops, in body order.
fn scan_atoms(rule: &Constraint) -> Vec<(RelSym, Fixity)> {
    rule.body
        .iter()
        .filter_map(|pred| match pred {
            BodyPredicate::Atom {
                sym,
                polarity: Polarity::Positive,
                fixity,
                ..
            } => Some((*sym, *fixity)),
            _ => None,
        })
        .collect()
}

enum LoopSpec<'a> {
    Scan {
        row: RowVar,
        sym: RelSym,
    },
    Stream {
        row: RowVar,
        f: &'a RowFn,
        args: &'a [BodyTerm],
        app: AppId,
        arity: usize,
    },
}

struct RuleCx<'a> {
    relations: &'a RelationStore,
    env: FxHashMap<VarSym, RamTerm>,
    /// Occurrences that define a variable; skipped when emitting tests.
    def_sites: FxHashSet<(RowVar, usize)>,
    /// Variables whose first occurrence is a lattice trailing column.
    lattice_vars: FxHashSet<VarSym>,
}

impl RuleCx<'_> {
    fn is_lat_trailing(&self, sym: RelSym, col: usize) -> bool {
        self.relations.denotation(sym).is_lattice() && col == self.relations.arity(sym) - 1
    }

    fn lookup(&self, var: VarSym) -> RamTerm {
        self.env
            .get(&var)
            .cloned()
            .unwrap_or_else(|| panic!("internal error: unbound variable x{}", var.0))
    }

    fn term(&self, term: &BodyTerm, ids: &mut IdGen) -> RamTerm {
        match term {
            BodyTerm::Var(v) => self.lookup(*v),
            BodyTerm::Lit(value) => RamTerm::Lit(value.clone(), ids.lit()),
        }
    }
}

/// Compile one rule into a loop nest, or `None` if a zero-argument guard is
/// statically false.
///
/// `focus` selects which positive atom scans Delta instead of Full;
/// `suppress` adds a "not already in Full" guard on the projected tuple.
fn compile_rule(
    rule: &Constraint,
    focus: Option<usize>,
    suppress: bool,
    relations: &RelationStore,
    ids: &mut IdGen,
) -> Option<RamStmt> {
    for pred in &rule.body {
        if let BodyPredicate::Guard { f, args } = pred {
            if args.is_empty() && !f(&[]) {
                return None;
            }
        }
    }

    let mut cx = RuleCx {
        relations,
        env: FxHashMap::default(),
        def_sites: FxHashSet::default(),
        lattice_vars: FxHashSet::default(),
    };

    // First walk: assign row variables, pick each variable's defining
    // occurrence, and collect every lattice trailing-column occurrence.
    let mut loops = Vec::new();
    let mut rows: Vec<Option<RowVar>> = Vec::with_capacity(rule.body.len());
    let mut lat_order: Vec<VarSym> = Vec::new();
    let mut lat_occs: FxHashMap<VarSym, Vec<(RowVar, usize, RelSym)>> = FxHashMap::default();
    let mut seen: FxHashSet<VarSym> = FxHashSet::default();

    for pred in &rule.body {
        match pred {
            BodyPredicate::Atom {
                sym,
                polarity: Polarity::Positive,
                terms,
                ..
            } => {
                let row = ids.row();
                rows.push(Some(row));
                loops.push(LoopSpec::Scan { row, sym: *sym });
                for (col, term) in terms.iter().enumerate() {
                    let BodyTerm::Var(v) = term else { continue };
                    if cx.is_lat_trailing(*sym, col) {
                        if seen.insert(*v) {
                            cx.lattice_vars.insert(*v);
                            lat_order.push(*v);
                        }
                        if cx.lattice_vars.contains(v) {
                            lat_occs.entry(*v).or_default().push((row, col, *sym));
                        }
                    } else if seen.insert(*v) {
                        cx.env.insert(*v, RamTerm::RowLoad(row, col));
                        cx.def_sites.insert((row, col));
                    }
                }
            }
            BodyPredicate::Functional { outs, f, args } => {
                let row = ids.row();
                rows.push(Some(row));
                loops.push(LoopSpec::Stream {
                    row,
                    f,
                    args,
                    app: ids.app(),
                    arity: outs.len(),
                });
                for (col, v) in outs.iter().enumerate() {
                    if seen.insert(*v) {
                        cx.env.insert(*v, RamTerm::RowLoad(row, col));
                        cx.def_sites.insert((row, col));
                    }
                }
            }
            _ => rows.push(None),
        }
    }

    // A lattice variable denotes the glb of all its trailing occurrences.
    // With a single occurrence the stored element is already above bottom;
    // a meet of several can collapse to bottom and needs the explicit test.
    let mut meet_conds = Vec::new();
    for v in &lat_order {
        let occs = &lat_occs[v];
        let ops = lattice_ops(relations, occs[0].2);
        let mut term = RamTerm::RowLoad(occs[0].0, occs[0].1);
        for &(row, col, sym) in &occs[1..] {
            let glb = lattice_ops(relations, sym).glb.clone();
            term = RamTerm::Meet(
                glb,
                Box::new(term),
                Box::new(RamTerm::RowLoad(row, col)),
                ids.meet(),
            );
        }
        if occs.len() > 1 {
            meet_conds.push(BoolExpr::NotBot {
                leq: ops.leq.clone(),
                bottom: ops.bottom.clone(),
                term: term.clone(),
            });
        }
        cx.env.insert(*v, term);
    }

    // Second walk: with the environment complete, translate the remaining
    // body into boolean tests in body order.
    let mut conds = Vec::new();
    for (pred, row) in rule.body.iter().zip(&rows) {
        match pred {
            BodyPredicate::Atom {
                sym,
                polarity: Polarity::Positive,
                terms,
                ..
            } => {
                let row = row.unwrap_or_else(|| panic!("internal error: atom without row"));
                for (col, term) in terms.iter().enumerate() {
                    let trailing = cx.is_lat_trailing(*sym, col);
                    match term {
                        BodyTerm::Var(v) => {
                            if cx.def_sites.contains(&(row, col)) && cx.env.get(v).map_or(false, |t| matches!(t, RamTerm::RowLoad(r, c) if *r == row && *c == col)) {
                                continue;
                            }
                            if trailing && cx.lattice_vars.contains(v) {
                                continue;
                            }
                            let bound = cx.lookup(*v);
                            let load = RamTerm::RowLoad(row, col);
                            conds.push(if trailing {
                                let ops = lattice_ops(relations, *sym);
                                BoolExpr::Leq(ops.leq.clone(), bound, load)
                            } else {
                                BoolExpr::Eq(bound, load)
                            });
                        }
                        BodyTerm::Lit(value) => {
                            let lit = RamTerm::Lit(value.clone(), ids.lit());
                            let load = RamTerm::RowLoad(row, col);
                            conds.push(if trailing {
                                let ops = lattice_ops(relations, *sym);
                                BoolExpr::Leq(ops.leq.clone(), lit, load)
                            } else {
                                BoolExpr::Eq(lit, load)
                            });
                        }
                    }
                }
            }
            BodyPredicate::Atom {
                sym,
                polarity: Polarity::Negative,
                terms,
                ..
            } => {
                let args = terms.iter().map(|t| cx.term(t, ids)).collect();
                conds.push(BoolExpr::NotMemberOf(args, RamSym::full(*sym)));
            }
            BodyPredicate::Functional { outs, .. } => {
                let row = row.unwrap_or_else(|| panic!("internal error: loop without row"));
                for (col, v) in outs.iter().enumerate() {
                    if cx.def_sites.contains(&(row, col)) && matches!(cx.env.get(v), Some(RamTerm::RowLoad(r, c)) if *r == row && *c == col) {
                        continue;
                    }
                    conds.push(BoolExpr::Eq(cx.lookup(*v), RamTerm::RowLoad(row, col)));
                }
            }
            BodyPredicate::Guard { f, args } => {
                if args.is_empty() {
                    // Statically true, checked above.
                    continue;
                }
                let args = args.iter().map(|t| cx.term(t, ids)).collect();
                conds.push(BoolExpr::Guard(f.clone(), args, ids.app()));
            }
        }
    }
    conds.extend(meet_conds);

    let head_terms: Vec<RamTerm> = rule
        .head
        .terms
        .iter()
        .map(|term| match term {
            HeadTerm::Var(v) => cx.lookup(*v),
            HeadTerm::Lit(value) => RamTerm::Lit(value.clone(), ids.lit()),
            HeadTerm::App(f, args) => RamTerm::App(
                f.clone(),
                args.iter().map(|&v| cx.lookup(v)).collect(),
                ids.app(),
            ),
        })
        .collect();

    if suppress {
        conds.push(BoolExpr::NotMemberOf(
            head_terms.clone(),
            RamSym::full(rule.head.sym),
        ));
    }

    let project = RamStmt::Project {
        terms: head_terms,
        rel: RamSym::new_rel(rule.head.sym),
    };
    let mut stmt = if conds.is_empty() {
        project
    } else {
        RamStmt::If {
            conds,
            then: Box::new(project),
        }
    };

    // Wrap loops innermost-first, so body order runs outer to inner.
    let mut scan_index = loops
        .iter()
        .filter(|l| matches!(l, LoopSpec::Scan { .. }))
        .count();
    for spec in loops.iter().rev() {
        stmt = match spec {
            LoopSpec::Scan { row, sym } => {
                scan_index -= 1;
                let rel = if focus == Some(scan_index) {
                    RamSym::delta(*sym)
                } else {
                    RamSym::full(*sym)
                };
                RamStmt::Search {
                    row: *row,
                    rel,
                    body: Box::new(stmt),
                }
            }
            LoopSpec::Stream {
                row,
                f,
                args,
                app,
                arity,
            } => RamStmt::Functional {
                row: *row,
                f: (*f).clone(),
                args: args.iter().map(|t| cx.term(t, ids)).collect(),
                app: *app,
                arity: *arity,
                body: Box::new(stmt),
            },
        };
    }
    Some(stmt)
}

fn lattice_ops(relations: &RelationStore, sym: RelSym) -> LatticeOps {
    relations
        .denotation(sym)
        .lattice()
        .cloned()
        .unwrap_or_else(|| panic!("internal error: relation {sym:?} is not latticenal"))
}

fn fact_rows(
    tables: &FactTables,
) -> impl Iterator<Item = (RelSym, SmallVec<[Value; 4]>)> + '_ {
    tables
        .iter()
        .flat_map(|(&sym, rows)| rows.iter().map(move |r| (sym, r.clone())))
}

/// Group ground facts by relation, folding lattice duplicates.
///
/// A Latticenal fact at or below bottom carries no information and is
/// dropped; two facts sharing a key fold via `lub`.
fn fold_facts(
    rows: impl Iterator<Item = (RelSym, SmallVec<[Value; 4]>)>,
    relations: &RelationStore,
) -> FactTables {
    let mut out = FactTables::default();
    for (sym, row) in rows {
        let denotation = relations.denotation(sym);
        let Some(ops) = denotation.lattice() else {
            out.entry(sym).or_default().push(row);
            continue;
        };
        let Some((value, key)) = row.split_last() else {
            panic!("internal error: zero-arity lattice fact");
        };
        if ops.is_bottom(value) {
            continue;
        }
        let table = out.entry(sym).or_default();
        if let Some(existing) = table.iter_mut().find(|r| r[..r.len() - 1] == *key) {
            let merged = {
                let Some(stored) = existing.last() else {
                    panic!("internal error: zero-arity lattice fact");
                };
                (ops.lub)(stored, value)
            };
            if let Some(slot) = existing.last_mut() {
                *slot = merged;
            }
        } else {
            table.push(row);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::{BodyPredicate, Fact, HeadAtom};
    use crate::lattice::Denotation;
    use crate::test_utils::min_lattice;
    use smallvec::smallvec;

    fn closure_program(relations: &Arc<RelationStore>) -> Program {
        let edge = relations.register("Edge", 2, Denotation::Relational);
        let path = relations.register("Path", 2, Denotation::Relational);
        let base = Constraint {
            head: HeadAtom {
                sym: path,
                terms: smallvec![HeadTerm::Var(VarSym(0)), HeadTerm::Var(VarSym(1))],
            },
            body: vec![BodyPredicate::atom(
                edge,
                smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
            )],
        };
        let step = Constraint {
            head: HeadAtom {
                sym: path,
                terms: smallvec![HeadTerm::Var(VarSym(0)), HeadTerm::Var(VarSym(2))],
            },
            body: vec![
                BodyPredicate::atom(
                    path,
                    smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
                ),
                BodyPredicate::atom(
                    edge,
                    smallvec![BodyTerm::Var(VarSym(1)), BodyTerm::Var(VarSym(2))],
                ),
            ],
        };
        Program {
            facts: vec![],
            rules: vec![base, step],
        }
    }

    fn compiled_text(program: &Program, relations: &Arc<RelationStore>) -> String {
        let ram = compile(
            program,
            &FactTables::default(),
            &Stratification::new(),
            relations,
            CompileOptions::default(),
        );
        ram.render(true).unwrap()
    }

    // ========== ROUND STRUCTURE ==========

    #[test]
    fn closure_compiles_to_semi_naive_rounds() {
        let relations = Arc::new(RelationStore::new());
        let program = closure_program(&relations);
        let text = compiled_text(&program, &relations);

        assert!(text.contains("search $r0 in Edge#full do"), "full pass base rule:\n{text}");
        assert!(text.contains("merge Path#new into Path#full"), "{text}");
        assert!(text.contains("swap Path#new Path#delta"), "{text}");
        assert!(text.contains("purge Path#new"), "{text}");
        assert!(text.contains("until empty(Path#delta) do"), "{text}");
        assert!(text.contains("in Path#delta do"), "incremental focus:\n{text}");
        assert!(text.contains("not in Path#full"), "re-derivation guard:\n{text}");
    }

    #[test]
    fn one_incremental_variant_per_recursive_atom() {
        let relations = Arc::new(RelationStore::new());
        let path = relations.register("Path", 2, Denotation::Relational);
        // Path(x,z) :- Path(x,y), Path(y,z). Two recursive atoms, two variants.
        let rule = Constraint {
            head: HeadAtom {
                sym: path,
                terms: smallvec![HeadTerm::Var(VarSym(0)), HeadTerm::Var(VarSym(2))],
            },
            body: vec![
                BodyPredicate::atom(
                    path,
                    smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
                ),
                BodyPredicate::atom(
                    path,
                    smallvec![BodyTerm::Var(VarSym(1)), BodyTerm::Var(VarSym(2))],
                ),
            ],
        };
        let program = Program {
            facts: vec![],
            rules: vec![rule],
        };
        let text = compiled_text(&program, &relations);
        let delta_scans = text.matches("in Path#delta do").count();
        assert_eq!(delta_scans, 2, "{text}");
    }

    #[test]
    fn non_recursive_rule_emits_no_fixpoint_loop() {
        let relations = Arc::new(RelationStore::new());
        let edge = relations.register("Edge", 2, Denotation::Relational);
        let start = relations.register("Start", 1, Denotation::Relational);
        let rule = Constraint {
            head: HeadAtom {
                sym: start,
                terms: smallvec![HeadTerm::Var(VarSym(0))],
            },
            body: vec![BodyPredicate::atom(
                edge,
                smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
            )],
        };
        let program = Program {
            facts: vec![],
            rules: vec![rule],
        };
        let text = compiled_text(&program, &relations);
        assert!(!text.contains("until"), "{text}");
        assert!(text.contains("merge Start#new into Start#full"), "{text}");
    }

    #[test]
    fn round_bookkeeping_for_distinct_relations_runs_in_parallel() {
        let relations = Arc::new(RelationStore::new());
        let src = relations.register("Src", 1, Denotation::Relational);
        let left = relations.register("Left", 1, Denotation::Relational);
        let right = relations.register("Right", 1, Denotation::Relational);
        let copy_into = |head| Constraint {
            head: HeadAtom {
                sym: head,
                terms: smallvec![HeadTerm::Var(VarSym(0))],
            },
            body: vec![BodyPredicate::atom(src, smallvec![BodyTerm::Var(VarSym(0))])],
        };
        let program = Program {
            facts: vec![],
            rules: vec![copy_into(left), copy_into(right)],
        };
        let text = compiled_text(&program, &relations);
        // Both merge/swap/purge groups sit under one par block.
        assert!(text.contains("par\n  merge Left#new into Left#full"), "{text}");
        assert!(text.contains("purge Left#new\n  merge Right#new into Right#full"), "{text}");
        assert!(text.contains("purge Right#new\nend"), "{text}");
    }

    // ========== TESTS AND GUARDS ==========

    #[test]
    fn repeated_variable_emits_equality_test() {
        let relations = Arc::new(RelationStore::new());
        let edge = relations.register("Edge", 2, Denotation::Relational);
        let looped = relations.register("Loop", 1, Denotation::Relational);
        // Loop(x) :- Edge(x, x).
        let rule = Constraint {
            head: HeadAtom {
                sym: looped,
                terms: smallvec![HeadTerm::Var(VarSym(0))],
            },
            body: vec![BodyPredicate::atom(
                edge,
                smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(0))],
            )],
        };
        let program = Program {
            facts: vec![],
            rules: vec![rule],
        };
        let text = compiled_text(&program, &relations);
        assert!(text.contains("if $r0[0] == $r0[1] then"), "{text}");
    }

    #[test]
    fn negative_atom_tests_absence_from_full() {
        let relations = Arc::new(RelationStore::new());
        let node = relations.register("Node", 1, Denotation::Relational);
        let reach = relations.register("Reach", 1, Denotation::Relational);
        let dead = relations.register("Dead", 1, Denotation::Relational);
        let mut strat = Stratification::new();
        strat.assign(reach, 0, 0);
        strat.assign(dead, 1, 0);
        let rule = Constraint {
            head: HeadAtom {
                sym: dead,
                terms: smallvec![HeadTerm::Var(VarSym(0))],
            },
            body: vec![
                BodyPredicate::atom(node, smallvec![BodyTerm::Var(VarSym(0))]),
                BodyPredicate::negated(reach, smallvec![BodyTerm::Var(VarSym(0))]),
            ],
        };
        let reach_rule = Constraint {
            head: HeadAtom {
                sym: reach,
                terms: smallvec![HeadTerm::Var(VarSym(0))],
            },
            body: vec![BodyPredicate::atom(node, smallvec![BodyTerm::Var(VarSym(0))])],
        };
        let program = Program {
            facts: vec![],
            rules: vec![reach_rule, rule],
        };
        let ram = compile(
            &program,
            &FactTables::default(),
            &strat,
            &relations,
            CompileOptions::default(),
        );
        let text = ram.render(false).unwrap();
        assert!(text.contains("not in Reach#full"), "{text}");
    }

    #[test]
    fn statically_false_guard_compiles_to_nothing() {
        let relations = Arc::new(RelationStore::new());
        let edge = relations.register("Edge", 2, Denotation::Relational);
        let out = relations.register("Out", 1, Denotation::Relational);
        let rule = Constraint {
            head: HeadAtom {
                sym: out,
                terms: smallvec![HeadTerm::Var(VarSym(0))],
            },
            body: vec![
                BodyPredicate::atom(
                    edge,
                    smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
                ),
                BodyPredicate::Guard {
                    f: Arc::new(|_| false),
                    args: smallvec![],
                },
            ],
        };
        let program = Program {
            facts: vec![],
            rules: vec![rule],
        };
        let text = compiled_text(&program, &relations);
        assert!(!text.contains("search"), "{text}");
    }

    // ========== LATTICE RULES ==========

    #[test]
    fn shared_lattice_variable_becomes_meet_with_notbot() {
        let relations = Arc::new(RelationStore::new());
        let a = relations.register("A", 2, Denotation::Latticenal(min_lattice()));
        let b = relations.register("B", 2, Denotation::Latticenal(min_lattice()));
        let c = relations.register("C", 2, Denotation::Latticenal(min_lattice()));
        // C(k; d) :- A(k; d), B(k; d). d denotes glb of both stored elements.
        let rule = Constraint {
            head: HeadAtom {
                sym: c,
                terms: smallvec![HeadTerm::Var(VarSym(0)), HeadTerm::Var(VarSym(1))],
            },
            body: vec![
                BodyPredicate::atom(
                    a,
                    smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
                ),
                BodyPredicate::atom(
                    b,
                    smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
                ),
            ],
        };
        let program = Program {
            facts: vec![],
            rules: vec![rule],
        };
        let text = compiled_text(&program, &relations);
        assert!(text.contains("glb($r0[1], $r1[1])"), "{text}");
        assert!(text.contains("not-bot(glb($r0[1], $r1[1]))"), "{text}");
    }

    #[test]
    fn bound_lattice_column_emits_leq_test() {
        let relations = Arc::new(RelationStore::new());
        let dist = relations.register("Dist", 2, Denotation::Latticenal(min_lattice()));
        let close = relations.register("Close", 1, Denotation::Relational);
        // Close(k) :- Dist(k; 5).
        let rule = Constraint {
            head: HeadAtom {
                sym: close,
                terms: smallvec![HeadTerm::Var(VarSym(0))],
            },
            body: vec![BodyPredicate::atom(
                dist,
                smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Lit(Value::Int64(5))],
            )],
        };
        let program = Program {
            facts: vec![],
            rules: vec![rule],
        };
        let text = compiled_text(&program, &relations);
        assert!(text.contains("if 5 <= $r0[1] then"), "{text}");
    }

    // ========== FACTS ==========

    #[test]
    fn lattice_facts_fold_and_drop_bottom() {
        let relations = Arc::new(RelationStore::new());
        let dist = relations.register("Dist", 2, Denotation::Latticenal(min_lattice()));
        let program = Program {
            facts: vec![
                Fact {
                    sym: dist,
                    terms: smallvec![Value::Int64(1), Value::Int64(9)],
                },
                Fact {
                    sym: dist,
                    terms: smallvec![Value::Int64(1), Value::Int64(4)],
                },
                Fact {
                    sym: dist,
                    terms: smallvec![Value::Int64(2), Value::Int64(i64::MAX)],
                },
            ],
            rules: vec![],
        };
        let ram = compile(
            &program,
            &FactTables::default(),
            &Stratification::new(),
            &relations,
            CompileOptions::default(),
        );
        let rows = &ram.new_facts[&dist];
        assert_eq!(rows.len(), 1, "bottom fact dropped, duplicate key folded");
        assert_eq!(rows[0].as_slice(), &[Value::Int64(1), Value::Int64(4)]);
    }

    // ========== DEBUG SURFACE ==========

    #[test]
    fn comments_carry_rule_text_when_enabled() {
        let relations = Arc::new(RelationStore::new());
        let program = closure_program(&relations);
        let ram = compile(
            &program,
            &FactTables::default(),
            &Stratification::new(),
            &relations,
            CompileOptions {
                emit_comments: true,
            },
        );
        let text = ram.render(false).unwrap();
        assert!(
            text.contains("// Path(x0, x2) :- Path(x0, x1), Edge(x1, x2)."),
            "{text}"
        );
    }

    #[test]
    #[should_panic(expected = "empty stratum")]
    fn empty_stratum_is_fatal() {
        let relations = RelationStore::new();
        let mut ids = IdGen::default();
        compile_stratum(&[], &relations, &mut ids, CompileOptions::default());
    }

    #[test]
    #[should_panic(expected = "unbound variable")]
    fn head_variable_without_definition_is_fatal() {
        let relations = Arc::new(RelationStore::new());
        let edge = relations.register("Edge", 2, Denotation::Relational);
        let out = relations.register("Out", 1, Denotation::Relational);
        let rule = Constraint {
            head: HeadAtom {
                sym: out,
                terms: smallvec![HeadTerm::Var(VarSym(9))],
            },
            body: vec![BodyPredicate::atom(
                edge,
                smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
            )],
        };
        let program = Program {
            facts: vec![],
            rules: vec![rule],
        };
        compiled_text(&program, &relations);
    }
}

//! Type unification over boxing slots.
//!
//! Every place a boxed value can live in a compiled program is a [`SlotId`]:
//! a row-variable column, a relation column, a function-application argument
//! or output, a literal occurrence, or a lattice-meet result. Two slots must
//! share a boxing table exactly when a data-flow or equality edge connects
//! them; [`compute_mapping`] discovers those edges in one walk of the
//! statement tree, unions them, and assigns each equivalence class a dense
//! [`TypePos`].
//!
//! The union-find is an explicit arena over dense integers: SlotIds are
//! interned to indices on first sight and all unions operate on indices.
//! No recursion through shared mutable state, no depth limits.

use crate::ram::{BoolExpr, RamProgram, RamStmt, RamSym, RamTerm, Version};
use crate::symbol::RelSym;
use rustc_hash::FxHashMap;

use crate::ram::{AppId, LitId, MeetId, RowVar};

/// A compile-time-only identifier for one place a boxed value lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotId {
    /// Column of a bound row variable.
    RowCol(RowVar, usize),
    /// Column of a physical relation variant.
    RelCol(RamSym, usize),
    /// Argument slot of a function application.
    AppArg(AppId, usize),
    /// Output slot of a function application.
    AppOut(AppId, usize),
    /// A literal occurrence.
    Lit(LitId),
    /// A lattice-meet result.
    Meet(MeetId),
    /// Synthetic trailing provenance column (0 or 1).
    Prov(usize),
}

/// Dense integer naming one slot equivalence class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypePos(pub usize);

/// The slot of a term: where its evaluated encoding lives.
pub fn term_slot(term: &RamTerm) -> SlotId {
    match term {
        RamTerm::Lit(_, id) => SlotId::Lit(*id),
        RamTerm::RowLoad(row, col) => SlotId::RowCol(*row, *col),
        RamTerm::Meet(_, _, _, id) => SlotId::Meet(*id),
        RamTerm::App(_, _, id) => SlotId::AppOut(*id, 0),
    }
}

/// Union-find over dense indices with path halving.
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self { parent: Vec::new() }
    }

    pub fn make(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        id
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Lower index wins, keeping representatives stable under the
            // deterministic interning order.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

impl Default for UnionFind {
    fn default() -> Self {
        Self::new()
    }
}

struct SlotArena {
    index: FxHashMap<SlotId, usize>,
    slots: Vec<SlotId>,
    uf: UnionFind,
}

impl SlotArena {
    fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            slots: Vec::new(),
            uf: UnionFind::new(),
        }
    }

    fn intern(&mut self, slot: SlotId) -> usize {
        if let Some(&i) = self.index.get(&slot) {
            return i;
        }
        let i = self.uf.make();
        debug_assert_eq!(i, self.slots.len());
        self.slots.push(slot);
        self.index.insert(slot, i);
        i
    }

    fn union(&mut self, a: SlotId, b: SlotId) {
        let ia = self.intern(a);
        let ib = self.intern(b);
        self.uf.union(ia, ib);
    }
}

/// Compute the slot-to-position mapping for a compiled program.
///
/// With provenance enabled, one extra trailing position is reserved and
/// shared by the two synthetic provenance slots.
pub fn compute_mapping(
    program: &RamProgram,
    with_provenance: bool,
) -> FxHashMap<SlotId, TypePos> {
    let mut arena = SlotArena::new();

    // Seed every declared relation column so a column used only by facts
    // still resolves to a position. Registration order keeps the interning
    // order, and hence the assignment, deterministic.
    for sym in program.relations.syms() {
        seed_relation(&mut arena, sym, program.relations.arity(sym));
    }

    visit_stmt(&mut arena, program, &program.stmt);

    if with_provenance {
        arena.union(SlotId::Prov(0), SlotId::Prov(1));
    }

    assign_positions(arena)
}

fn seed_relation(arena: &mut SlotArena, sym: RelSym, arity: usize) {
    for version in [Version::Full, Version::Delta, Version::New] {
        let rel = RamSym { sym, version };
        for col in 0..arity {
            arena.intern(SlotId::RelCol(rel, col));
        }
    }
}

fn union_relation_columns(arena: &mut SlotArena, program: &RamProgram, a: RamSym, b: RamSym) {
    let arity = program.relations.arity(a.sym);
    for col in 0..arity {
        arena.union(SlotId::RelCol(a, col), SlotId::RelCol(b, col));
    }
}

fn visit_term(arena: &mut SlotArena, term: &RamTerm) {
    arena.intern(term_slot(term));
    match term {
        RamTerm::Lit(_, _) | RamTerm::RowLoad(_, _) => {}
        RamTerm::Meet(_, a, b, id) => {
            // The meet result shares a representation with both operands.
            arena.union(SlotId::Meet(*id), term_slot(a));
            arena.union(SlotId::Meet(*id), term_slot(b));
            visit_term(arena, a);
            visit_term(arena, b);
        }
        RamTerm::App(_, args, id) => {
            for (i, arg) in args.iter().enumerate() {
                arena.union(SlotId::AppArg(*id, i), term_slot(arg));
                visit_term(arena, arg);
            }
        }
    }
}

fn visit_bool(arena: &mut SlotArena, cond: &BoolExpr) {
    match cond {
        BoolExpr::Eq(a, b) | BoolExpr::Leq(_, a, b) => {
            arena.union(term_slot(a), term_slot(b));
            visit_term(arena, a);
            visit_term(arena, b);
        }
        BoolExpr::NotBot { term, .. } => visit_term(arena, term),
        BoolExpr::NotMemberOf(terms, rel) => {
            for (col, t) in terms.iter().enumerate() {
                arena.union(term_slot(t), SlotId::RelCol(*rel, col));
                visit_term(arena, t);
            }
        }
        BoolExpr::Guard(_, args, app) => {
            for (i, arg) in args.iter().enumerate() {
                arena.union(SlotId::AppArg(*app, i), term_slot(arg));
                visit_term(arena, arg);
            }
        }
        BoolExpr::IsEmpty(_) => {}
    }
}

fn visit_stmt(arena: &mut SlotArena, program: &RamProgram, stmt: &RamStmt) {
    match stmt {
        RamStmt::Search { row, rel, body } => {
            let arity = program.relations.arity(rel.sym);
            for col in 0..arity {
                arena.union(SlotId::RowCol(*row, col), SlotId::RelCol(*rel, col));
            }
            visit_stmt(arena, program, body);
        }
        RamStmt::Query { row, rel, prefix, body } => {
            let arity = program.relations.arity(rel.sym);
            for col in 0..arity {
                arena.union(SlotId::RowCol(*row, col), SlotId::RelCol(*rel, col));
            }
            for (col, t) in prefix.iter().enumerate() {
                arena.union(term_slot(t), SlotId::RelCol(*rel, col));
                visit_term(arena, t);
            }
            visit_stmt(arena, program, body);
        }
        RamStmt::Functional { row, args, app, arity, body, .. } => {
            for (i, arg) in args.iter().enumerate() {
                arena.union(SlotId::AppArg(*app, i), term_slot(arg));
                visit_term(arena, arg);
            }
            for col in 0..*arity {
                arena.union(SlotId::RowCol(*row, col), SlotId::AppOut(*app, col));
            }
            visit_stmt(arena, program, body);
        }
        RamStmt::If { conds, then } => {
            for cond in conds {
                visit_bool(arena, cond);
            }
            visit_stmt(arena, program, then);
        }
        RamStmt::Project { terms, rel } => {
            for (col, t) in terms.iter().enumerate() {
                arena.union(term_slot(t), SlotId::RelCol(*rel, col));
                visit_term(arena, t);
            }
        }
        RamStmt::MergeInto { src, dst } => {
            union_relation_columns(arena, program, *src, *dst);
        }
        RamStmt::Swap { a, b } => {
            union_relation_columns(arena, program, *a, *b);
        }
        RamStmt::Purge { .. } | RamStmt::Comment(_) => {}
        RamStmt::Seq(stmts) | RamStmt::Par(stmts) => {
            for s in stmts {
                visit_stmt(arena, program, s);
            }
        }
        RamStmt::Until { conds, body } => {
            for cond in conds {
                visit_bool(arena, cond);
            }
            visit_stmt(arena, program, body);
        }
    }
}

fn assign_positions(mut arena: SlotArena) -> FxHashMap<SlotId, TypePos> {
    let mut root_pos: FxHashMap<usize, TypePos> = FxHashMap::default();
    let mut mapping = FxHashMap::default();
    let mut next = 0usize;
    // Walk in interning order: every class gets the position of its first
    // interned member, members inherit their representative's id.
    for i in 0..arena.slots.len() {
        let root = arena.uf.find(i);
        let pos = *root_pos.entry(root).or_insert_with(|| {
            let p = TypePos(next);
            next += 1;
            p
        });
        mapping.insert(arena.slots[i], pos);
    }
    mapping
}

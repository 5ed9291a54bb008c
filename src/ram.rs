//! The RAM intermediate representation rules compile to.
//!
//! Each variant of [`RamStmt`] is one imperative construct:
//! - `Search`: full scan of a relation variant, binding a row variable
//! - `Query`: prefix-filtered scan over the ordered store
//! - `Functional`: loop over rows a host function computes
//! - `If` / `Project`: guarded insertion into a relation variant
//! - `Seq` / `Par` / `Until`: sequencing, fork-join parallelism, fixpoint
//! - `MergeInto` / `Swap` / `Purge`: relation-variant bookkeeping between
//!   rounds
//! - `Comment`: presentation-only rule text in program dumps

use crate::datalog::{FactTables, PredFn, RowFn, ValueFn};
use crate::lattice::LeqFn;
use crate::symbol::{RelSym, RelationStore};
use crate::value::{format_value, Value};
use std::fmt::Write as _;
use std::sync::Arc;

/// A row variable bound by a `Search`, `Query` or `Functional` loop.
/// Ids are unique across one compiled program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RowVar(pub u32);

/// Identifies one literal occurrence in the compiled program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LitId(pub u32);

/// Identifies one function application (guard, functional or head app).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AppId(pub u32);

/// Identifies one lattice-meet result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeetId(pub u32);

/// The three physical variants of every logical relation during evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Version {
    /// Cumulative contents.
    Full,
    /// Tuples newly added in the previous round.
    Delta,
    /// Tuples staged in the current round.
    New,
}

/// A physical relation: logical symbol plus variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RamSym {
    pub sym: RelSym,
    pub version: Version,
}

impl RamSym {
    pub fn full(sym: RelSym) -> Self {
        Self { sym, version: Version::Full }
    }

    pub fn delta(sym: RelSym) -> Self {
        Self { sym, version: Version::Delta }
    }

    pub fn new_rel(sym: RelSym) -> Self {
        Self { sym, version: Version::New }
    }
}

/// A term evaluated inside a compiled loop nest.
#[derive(Clone)]
pub enum RamTerm {
    /// A literal occurrence; the id names its boxing slot.
    Lit(Value, LitId),
    /// Column `1` of the row bound by row variable `0`.
    RowLoad(RowVar, usize),
    /// Greatest lower bound of two lattice terms.
    Meet(crate::lattice::BinOpFn, Box<RamTerm>, Box<RamTerm>, MeetId),
    /// Host-computed value from argument terms.
    App(ValueFn, Vec<RamTerm>, AppId),
}

/// A boolean test inside an `If` or `Until`.
#[derive(Clone)]
pub enum BoolExpr {
    Eq(RamTerm, RamTerm),
    /// Lattice order test: left `leq` right.
    Leq(LeqFn, RamTerm, RamTerm),
    /// Lattice value is strictly above bottom.
    NotBot {
        leq: LeqFn,
        bottom: Value,
        term: RamTerm,
    },
    /// Tuple is absent from the relation variant.
    NotMemberOf(Vec<RamTerm>, RamSym),
    Guard(PredFn, Vec<RamTerm>, AppId),
    IsEmpty(RamSym),
}

/// A compiled statement.
#[derive(Clone)]
pub enum RamStmt {
    Search {
        row: RowVar,
        rel: RamSym,
        body: Box<RamStmt>,
    },
    Query {
        row: RowVar,
        rel: RamSym,
        prefix: Vec<RamTerm>,
        body: Box<RamStmt>,
    },
    Functional {
        row: RowVar,
        f: RowFn,
        args: Vec<RamTerm>,
        app: AppId,
        /// Number of columns each yielded row binds.
        arity: usize,
        body: Box<RamStmt>,
    },
    If {
        conds: Vec<BoolExpr>,
        then: Box<RamStmt>,
    },
    Project {
        terms: Vec<RamTerm>,
        rel: RamSym,
    },
    MergeInto {
        src: RamSym,
        dst: RamSym,
    },
    Swap {
        a: RamSym,
        b: RamSym,
    },
    Purge {
        rel: RamSym,
    },
    Seq(Vec<RamStmt>),
    Par(Vec<RamStmt>),
    Until {
        conds: Vec<BoolExpr>,
        body: Box<RamStmt>,
    },
    Comment(String),
}

/// A compiled program: one top-level statement, the Int64-eligible fact
/// tables (pre-existing database vs. facts supplied by the program text),
/// and the relation metadata downstream passes seed from.
#[derive(Clone)]
pub struct RamProgram {
    pub stmt: RamStmt,
    pub given_facts: FactTables,
    pub new_facts: FactTables,
    pub relations: Arc<RelationStore>,
}

impl RamProgram {
    /// Render the program for inspection. `render_facts` controls whether
    /// fact table contents are listed.
    pub fn render(&self, render_facts: bool) -> Result<String, String> {
        let mut out = String::new();
        if render_facts {
            for (label, tables) in [("given", &self.given_facts), ("new", &self.new_facts)] {
                // Registration order keeps dumps stable.
                for sym in self.relations.syms() {
                    let Some(rows) = tables.get(&sym) else { continue };
                    let name = self.rel_name(sym)?;
                    for row in rows {
                        let rendered: Vec<String> = row.iter().map(format_value).collect();
                        let _ = writeln!(out, "{label} {name}({}).", rendered.join(", "));
                    }
                }
            }
        }
        render_stmt(&self.stmt, &self.relations, 0, &mut out)?;
        Ok(out)
    }

    fn rel_name(&self, sym: RelSym) -> Result<String, String> {
        self.relations
            .name(sym)
            .ok_or_else(|| format!("unknown relation symbol {sym:?}"))
    }
}

fn ram_sym_name(rel: RamSym, relations: &RelationStore) -> Result<String, String> {
    let name = relations
        .name(rel.sym)
        .ok_or_else(|| format!("unknown relation symbol {:?}", rel.sym))?;
    let suffix = match rel.version {
        Version::Full => "full",
        Version::Delta => "delta",
        Version::New => "new",
    };
    Ok(format!("{name}#{suffix}"))
}

fn render_term(term: &RamTerm, out: &mut String) {
    match term {
        RamTerm::Lit(value, _) => out.push_str(&format_value(value)),
        RamTerm::RowLoad(row, col) => {
            let _ = write!(out, "$r{}[{col}]", row.0);
        }
        RamTerm::Meet(_, a, b, _) => {
            out.push_str("glb(");
            render_term(a, out);
            out.push_str(", ");
            render_term(b, out);
            out.push(')');
        }
        RamTerm::App(_, args, _) => {
            out.push_str("<app>(");
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_term(a, out);
            }
            out.push(')');
        }
    }
}

fn render_terms(terms: &[RamTerm], out: &mut String) {
    for (i, t) in terms.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render_term(t, out);
    }
}

fn render_bool(cond: &BoolExpr, relations: &RelationStore, out: &mut String) -> Result<(), String> {
    match cond {
        BoolExpr::Eq(a, b) => {
            render_term(a, out);
            out.push_str(" == ");
            render_term(b, out);
        }
        BoolExpr::Leq(_, a, b) => {
            render_term(a, out);
            out.push_str(" <= ");
            render_term(b, out);
        }
        BoolExpr::NotBot { term, .. } => {
            out.push_str("not-bot(");
            render_term(term, out);
            out.push(')');
        }
        BoolExpr::NotMemberOf(terms, rel) => {
            out.push('(');
            render_terms(terms, out);
            let _ = write!(out, ") not in {}", ram_sym_name(*rel, relations)?);
        }
        BoolExpr::Guard(_, args, _) => {
            out.push_str("<guard>(");
            render_terms(args, out);
            out.push(')');
        }
        BoolExpr::IsEmpty(rel) => {
            let _ = write!(out, "empty({})", ram_sym_name(*rel, relations)?);
        }
    }
    Ok(())
}

fn render_conds(
    conds: &[BoolExpr],
    relations: &RelationStore,
    out: &mut String,
) -> Result<(), String> {
    for (i, c) in conds.iter().enumerate() {
        if i > 0 {
            out.push_str(" and ");
        }
        render_bool(c, relations, out)?;
    }
    Ok(())
}

fn render_stmt(
    stmt: &RamStmt,
    relations: &RelationStore,
    indent: usize,
    out: &mut String,
) -> Result<(), String> {
    let pad = "  ".repeat(indent);
    match stmt {
        RamStmt::Search { row, rel, body } => {
            let _ = writeln!(out, "{pad}search $r{} in {} do", row.0, ram_sym_name(*rel, relations)?);
            render_stmt(body, relations, indent + 1, out)?;
        }
        RamStmt::Query { row, rel, prefix, body } => {
            let _ = write!(out, "{pad}query $r{} in {} where (", row.0, ram_sym_name(*rel, relations)?);
            render_terms(prefix, out);
            out.push_str(") do\n");
            render_stmt(body, relations, indent + 1, out)?;
        }
        RamStmt::Functional { row, args, body, .. } => {
            let _ = write!(out, "{pad}loop $r{} over <fn>(", row.0);
            render_terms(args, out);
            out.push_str(") do\n");
            render_stmt(body, relations, indent + 1, out)?;
        }
        RamStmt::If { conds, then } => {
            let _ = write!(out, "{pad}if ");
            render_conds(conds, relations, out)?;
            out.push_str(" then\n");
            render_stmt(then, relations, indent + 1, out)?;
        }
        RamStmt::Project { terms, rel } => {
            let _ = write!(out, "{pad}project (");
            render_terms(terms, out);
            let _ = writeln!(out, ") into {}", ram_sym_name(*rel, relations)?);
        }
        RamStmt::MergeInto { src, dst } => {
            let _ = writeln!(
                out,
                "{pad}merge {} into {}",
                ram_sym_name(*src, relations)?,
                ram_sym_name(*dst, relations)?
            );
        }
        RamStmt::Swap { a, b } => {
            let _ = writeln!(
                out,
                "{pad}swap {} {}",
                ram_sym_name(*a, relations)?,
                ram_sym_name(*b, relations)?
            );
        }
        RamStmt::Purge { rel } => {
            let _ = writeln!(out, "{pad}purge {}", ram_sym_name(*rel, relations)?);
        }
        RamStmt::Seq(stmts) => {
            for s in stmts {
                render_stmt(s, relations, indent, out)?;
            }
        }
        RamStmt::Par(stmts) => {
            let _ = writeln!(out, "{pad}par");
            for s in stmts {
                render_stmt(s, relations, indent + 1, out)?;
            }
            let _ = writeln!(out, "{pad}end");
        }
        RamStmt::Until { conds, body } => {
            let _ = write!(out, "{pad}until ");
            render_conds(conds, relations, out)?;
            out.push_str(" do\n");
            render_stmt(body, relations, indent + 1, out)?;
            let _ = writeln!(out, "{pad}end");
        }
        RamStmt::Comment(text) => {
            let _ = writeln!(out, "{pad}// {text}");
        }
    }
    Ok(())
}

//! Fixpoint benchmarks using Criterion.
//!
//! Run with: `cargo bench`
//!
//! Measures end-to-end solving: compilation, boxing, and the semi-naive
//! evaluation loop over graphs of growing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fixlog::datalog::{BodyPredicate, BodyTerm, Constraint, HeadAtom, HeadTerm, VarSym};
use fixlog::engine::Solver;
use fixlog::lattice::{Denotation, LatticeOps};
use fixlog::value::Value;
use smallvec::smallvec;
use std::sync::Arc;

fn closure_solver(nodes: i64) -> Solver {
    let mut solver = Solver::new();
    let edge = solver.register("Edge", 2, Denotation::Relational);
    let path = solver.register("Path", 2, Denotation::Relational);
    for i in 0..nodes {
        solver.given(edge, smallvec![Value::Int64(i), Value::Int64(i + 1)]);
    }
    solver.rule(Constraint {
        head: HeadAtom {
            sym: path,
            terms: smallvec![HeadTerm::Var(VarSym(0)), HeadTerm::Var(VarSym(1))],
        },
        body: vec![BodyPredicate::atom(
            edge,
            smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
        )],
    });
    solver.rule(Constraint {
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
    });
    solver
}

fn min_lattice() -> LatticeOps {
    fn int(value: &Value) -> i64 {
        match value {
            Value::Int64(x) => *x,
            other => panic!("expected Int64, got {other:?}"),
        }
    }
    LatticeOps::new(
        Value::Int64(i64::MAX),
        |a, b| int(a) >= int(b),
        |a, b| Value::Int64(int(a).min(int(b))),
        |a, b| Value::Int64(int(a).max(int(b))),
    )
}

fn distance_solver(nodes: i64) -> Solver {
    let mut solver = Solver::new();
    let edge = solver.register("Edge", 3, Denotation::Relational);
    let dist = solver.register("Dist", 2, Denotation::Latticenal(min_lattice()));
    for i in 0..nodes {
        solver.given(
            edge,
            smallvec![
                Value::Int64(i),
                Value::Int64((i + 1) % nodes),
                Value::Int64(1)
            ],
        );
    }
    solver.fact(dist, smallvec![Value::Int64(0), Value::Int64(0)]);
    let add: fixlog::datalog::ValueFn = Arc::new(|args| match (&args[0], &args[1]) {
        (Value::Int64(d), Value::Int64(w)) => Value::Int64(d.saturating_add(*w)),
        _ => Value::Absent,
    });
    solver.rule(Constraint {
        head: HeadAtom {
            sym: dist,
            terms: smallvec![
                HeadTerm::Var(VarSym(2)),
                HeadTerm::App(add, smallvec![VarSym(1), VarSym(3)])
            ],
        },
        body: vec![
            BodyPredicate::atom(
                dist,
                smallvec![BodyTerm::Var(VarSym(0)), BodyTerm::Var(VarSym(1))],
            ),
            BodyPredicate::atom(
                edge,
                smallvec![
                    BodyTerm::Var(VarSym(0)),
                    BodyTerm::Var(VarSym(2)),
                    BodyTerm::Var(VarSym(3))
                ],
            ),
        ],
    });
    solver
}

fn bench_transitive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_closure");
    for nodes in [8i64, 32, 64] {
        let solver = closure_solver(nodes);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &solver, |b, solver| {
            b.iter(|| black_box(solver.solve()));
        });
    }
    group.finish();
}

fn bench_distance_lattice(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance_lattice");
    for nodes in [8i64, 32] {
        let solver = distance_solver(nodes);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &solver, |b, solver| {
            b.iter(|| black_box(solver.solve()));
        });
    }
    group.finish();
}

fn bench_compile_only(c: &mut Criterion) {
    let solver = closure_solver(32);
    c.bench_function("compile_closure", |b| {
        b.iter(|| black_box(solver.compiled()));
    });
}

criterion_group!(
    benches,
    bench_transitive_closure,
    bench_distance_lattice,
    bench_compile_only
);
criterion_main!(benches);

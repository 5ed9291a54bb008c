use fixlog::datalog::{BodyPredicate, BodyTerm, Constraint, HeadAtom, HeadTerm, VarSym};
use fixlog::engine::Solver;
use fixlog::lattice::Denotation;
use fixlog::value::Value;
use proptest::prelude::*;
use smallvec::smallvec;
use std::collections::BTreeSet;

const NODES: i64 = 6;

fn edges_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0..NODES, 0..NODES), 0..20)
}

/// Reference closure by repeated joining until nothing changes.
fn naive_closure(edges: &[(i64, i64)]) -> BTreeSet<(i64, i64)> {
    let mut paths: BTreeSet<(i64, i64)> = edges.iter().copied().collect();
    loop {
        let mut next = paths.clone();
        for &(a, b) in &paths {
            for &(c, d) in edges {
                if b == c {
                    next.insert((a, d));
                }
            }
        }
        if next == paths {
            return paths;
        }
        paths = next;
    }
}

fn solve_closure(edges: &[(i64, i64)]) -> BTreeSet<(i64, i64)> {
    let mut solver = Solver::new();
    let edge = solver.register("Edge", 2, Denotation::Relational);
    let path = solver.register("Path", 2, Denotation::Relational);
    for &(a, b) in edges {
        solver.given(edge, smallvec![Value::Int64(a), Value::Int64(b)]);
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

    let model = solver.solve();
    model[&path]
        .iter()
        .map(|row| match (&row[0], &row[1]) {
            (Value::Int64(a), Value::Int64(b)) => (*a, *b),
            other => panic!("expected Int64 pair, got {other:?}"),
        })
        .collect()
}

proptest! {
    /// Semi-naive evaluation computes exactly the naive transitive closure.
    #[test]
    fn semi_naive_matches_naive_closure(edges in edges_strategy()) {
        let expected = naive_closure(&edges);
        let actual = solve_closure(&edges);
        prop_assert_eq!(actual, expected);
    }

    /// Evaluation is deterministic across runs despite parallel scans.
    #[test]
    fn closure_is_deterministic(edges in edges_strategy()) {
        prop_assert_eq!(solve_closure(&edges), solve_closure(&edges));
    }
}

//! Property tests for automaton composition and traversal.

use pathwise_dsl::{Arrow, PathExpr, TypeTerm};
use pathwise_engine::*;
use pathwise_graph::{GraphAccess, MemGraph};
use proptest::prelude::*;
use roaring::RoaringBitmap;

const MAX_VERTICES: u32 = 6;
const MAX_EDGES: usize = 12;

type GraphShape = (u32, Vec<(u32, u32, bool)>);

fn arb_graph() -> impl Strategy<Value = GraphShape> {
    (
        1..=MAX_VERTICES,
        prop::collection::vec((0..MAX_VERTICES, 0..MAX_VERTICES, any::<bool>()), 0..MAX_EDGES),
    )
}

/// `n` vertices; `A` edges carry roles `tail`/`head`, `B` edges none.
fn build_graph((n, edges): &GraphShape) -> MemGraph {
    let mut g = MemGraph::new();
    g.declare_edge_type("A", &[], Some("tail"), Some("head"))
        .unwrap();
    for _ in 0..*n {
        g.add_vertex("Node", vec![]).unwrap();
    }
    for &(a, b, is_a) in edges {
        let ty = if is_a { "A" } else { "B" };
        g.add_edge(ty, a % n, b % n, vec![]).unwrap();
    }
    g
}

fn arb_step() -> impl Strategy<Value = PathExpr> {
    let arrow = prop_oneof![Just(Arrow::Out), Just(Arrow::In), Just(Arrow::Any)];
    let clause = prop_oneof![
        Just((vec![], vec![])),
        Just((vec![TypeTerm::allowed("A")], vec![])),
        Just((vec![TypeTerm::allowed("B")], vec![])),
        Just((vec![TypeTerm::forbidden("B")], vec![])),
        Just((vec![], vec!["head".to_string()])),
        Just((vec![TypeTerm::allowed("B")], vec!["tail".to_string()])),
    ];
    (arrow, clause).prop_map(|(arrow, (types, roles))| PathExpr::Edge {
        arrow,
        types,
        roles,
    })
}

fn arb_path() -> impl Strategy<Value = PathExpr> {
    arb_step().prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..3).prop_map(PathExpr::Seq),
            prop::collection::vec(inner.clone(), 2..3).prop_map(PathExpr::Alt),
            inner.clone().prop_map(|p| PathExpr::Star(Box::new(p))),
            inner.clone().prop_map(|p| PathExpr::Plus(Box::new(p))),
            inner.clone().prop_map(|p| PathExpr::Opt(Box::new(p))),
            (inner.clone(), 0u32..3).prop_map(|(p, n)| PathExpr::Exp(Box::new(p), n)),
            inner.prop_map(|p| PathExpr::Transpose(Box::new(p))),
        ]
    })
}

fn vertex_count(g: &MemGraph) -> u32 {
    g.vertices().len() as u32
}

fn single(v: u32) -> RoaringBitmap {
    let mut s = RoaringBitmap::new();
    s.insert(v);
    s
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 96,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn compiled_automata_are_well_formed(shape in arb_graph(), path in arb_path()) {
        let g = build_graph(&shape);
        let mut ast = AstGraph::new();
        let root = ast.lower_path_expr(&path);
        let nfa = compile_path_description(&g, &ast, root).unwrap();

        prop_assert!(!nfa.finals().is_empty());
        for state in nfa.states() {
            let closure = nfa.epsilon_closure(state.id);
            prop_assert!(closure.contains(&state.id));
            let mut sorted = closure.to_vec();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), closure.len());
        }
        prop_assert!(nfa.reverse().validate().is_ok());
    }

    #[test]
    fn double_reverse_preserves_reachability(shape in arb_graph(), path in arb_path()) {
        let g = build_graph(&shape);
        let mut ast = AstGraph::new();
        let root = ast.lower_path_expr(&path);
        let nfa = compile_path_description(&g, &ast, root).unwrap();
        let twice = nfa.reverse().reverse();

        let mut cache = EvaluatorCache::new();
        let mut bindings = Bindings::new();
        let mut ev = Evaluator::new(&g, &ast, &mut cache, &mut bindings);
        for v in 0..vertex_count(&g) {
            let start = single(v);
            let a = PathEvaluator::new(&nfa).reachable(&start, &mut ev).unwrap();
            let b = PathEvaluator::new(&twice).reachable(&start, &mut ev).unwrap();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn forward_and_backward_agree(shape in arb_graph(), path in arb_path()) {
        let g = build_graph(&shape);
        let mut ast = AstGraph::new();
        let root = ast.lower_path_expr(&path);
        let nfa = compile_path_description(&g, &ast, root).unwrap();

        let mut cache = EvaluatorCache::new();
        let mut bindings = Bindings::new();
        let mut ev = Evaluator::new(&g, &ast, &mut cache, &mut bindings);
        let n = vertex_count(&g);
        let forward: Vec<RoaringBitmap> = (0..n)
            .map(|v| PathEvaluator::new(&nfa).reachable(&single(v), &mut ev).unwrap())
            .collect();
        for t in 0..n {
            let backward = PathEvaluator::new(&nfa)
                .reachable_backward(&single(t), &mut ev)
                .unwrap();
            for s in 0..n {
                prop_assert_eq!(
                    forward[s as usize].contains(t),
                    backward.contains(s),
                    "pair ({}, {}) for {}",
                    s,
                    t,
                    path
                );
            }
        }
    }

    #[test]
    fn transpose_swaps_endpoints(shape in arb_graph(), path in arb_path()) {
        let g = build_graph(&shape);
        let transposed = PathExpr::Transpose(Box::new(path.clone()));
        let mut ast = AstGraph::new();
        let root = ast.lower_path_expr(&path);
        let root_t = ast.lower_path_expr(&transposed);
        let nfa = compile_path_description(&g, &ast, root).unwrap();
        let nfa_t = compile_path_description(&g, &ast, root_t).unwrap();

        let mut cache = EvaluatorCache::new();
        let mut bindings = Bindings::new();
        let mut ev = Evaluator::new(&g, &ast, &mut cache, &mut bindings);
        for v in 0..vertex_count(&g) {
            let a = PathEvaluator::new(&nfa).reachable_backward(&single(v), &mut ev).unwrap();
            let b = PathEvaluator::new(&nfa_t).reachable(&single(v), &mut ev).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}

//! Path evaluation E2E tests

use std::sync::Arc;

use pathwise_dsl::{parse_path_expr, TypeTerm};
use pathwise_engine::*;
use pathwise_graph::{AttrValue, Direction, EdgeRef, GraphAccess, GraphMutation, MemGraph};
use roaring::RoaringBitmap;

/// v0 -A-> v1 -B-> v2
fn chain() -> MemGraph {
    let mut g = MemGraph::new();
    let v0 = g.add_vertex("Node", vec![]).unwrap();
    let v1 = g.add_vertex("Node", vec![]).unwrap();
    let v2 = g.add_vertex("Node", vec![]).unwrap();
    g.add_edge("A", v0, v1, vec![]).unwrap();
    g.add_edge("B", v1, v2, vec![]).unwrap();
    g
}

fn set(ids: &[u32]) -> RoaringBitmap {
    ids.iter().copied().collect()
}

fn ids(s: &RoaringBitmap) -> Vec<u32> {
    s.iter().collect()
}

fn forward_query(expr: &str, start: &[u32]) -> Query {
    let mut ast = AstGraph::new();
    let path = ast.lower_path_expr(&parse_path_expr(expr).unwrap());
    let start = ast.literal(Value::VertexSet(set(start)));
    let root = ast.add(AstNode::ForwardVertexSet { start, path });
    Query::new(Arc::new(ast), root)
}

fn forward(g: &MemGraph, expr: &str, start: &[u32]) -> Vec<u32> {
    match forward_query(expr, start).evaluate(g, None).unwrap() {
        Value::VertexSet(s) => ids(&s),
        other => panic!("unexpected {other:?}"),
    }
}

// ============================================================================
// Reachability
// ============================================================================

#[test]
fn test_single_typed_step() {
    let g = chain();
    assert_eq!(forward(&g, "-->{A}", &[0]), vec![1]);
    assert_eq!(forward(&g, "-->{B}", &[0]), Vec::<u32>::new());
    assert_eq!(forward(&g, "<--{A}", &[1]), vec![0]);
    assert_eq!(forward(&g, "<->", &[1]), vec![0, 2]);
}

#[test]
fn test_iteration_over_two_types() {
    let g = chain();
    assert_eq!(forward(&g, "-->{A,B}+", &[0]), vec![1, 2]);
    // zero repetitions keep the start vertex; reaching exactly {v1, v2}
    // from v0 takes the `+` form above
    assert_eq!(forward(&g, "-->{A,B}*", &[0]), vec![0, 1, 2]);
    assert_eq!(forward(&g, "-->{A,B}?", &[0]), vec![0, 1]);
}

#[test]
fn test_sequence_exponent_and_transpose() {
    let g = chain();
    assert_eq!(forward(&g, "-->{A} -->{B}", &[0]), vec![2]);
    assert_eq!(forward(&g, "(-->)^2", &[0]), vec![2]);
    assert_eq!(forward(&g, "(-->)^0", &[0]), vec![0]);
    assert_eq!(forward(&g, "(-->{A} -->{B})^T", &[2]), vec![0]);
    assert_eq!(forward(&g, "-->{A} | -->{B}", &[0, 1]), vec![1, 2]);
}

#[test]
fn test_forbidden_types() {
    let g = chain();
    assert_eq!(forward(&g, "-->{^A}*", &[0]), vec![0]);
    assert_eq!(forward(&g, "-->{^A}*", &[1]), vec![1, 2]);
}

#[test]
fn test_cycles_terminate() {
    let mut g = MemGraph::new();
    let a = g.add_vertex("Node", vec![]).unwrap();
    let b = g.add_vertex("Node", vec![]).unwrap();
    let c = g.add_vertex("Node", vec![]).unwrap();
    g.add_edge("Next", a, b, vec![]).unwrap();
    g.add_edge("Next", b, a, vec![]).unwrap();
    g.add_edge("Next", b, b, vec![]).unwrap();
    g.add_edge("Next", b, c, vec![]).unwrap();

    assert_eq!(forward(&g, "-->*", &[a]), vec![a, b, c]);
    assert_eq!(forward(&g, "((-->)*)*", &[c]), vec![c]);
    assert_eq!(forward(&g, "(<->+)+", &[c]), vec![a, b, c]);
}

#[test]
fn test_start_vertices_outside_graph_are_ignored() {
    let g = chain();
    assert_eq!(forward(&g, "-->*", &[0, 99]), vec![0, 1, 2]);
}

// ============================================================================
// Roles
// ============================================================================

fn employment() -> MemGraph {
    let mut g = MemGraph::new();
    g.declare_edge_type("Employs", &[], Some("employer"), Some("employee"))
        .unwrap();
    g.declare_edge_type("Knows", &[], None, None).unwrap();
    let acme = g.add_vertex("Company", vec![]).unwrap();
    let ann = g.add_vertex("Person", vec![]).unwrap();
    let bob = g.add_vertex("Person", vec![]).unwrap();
    g.add_edge("Employs", acme, ann, vec![]).unwrap();
    g.add_edge("Knows", acme, bob, vec![]).unwrap();
    g
}

#[test]
fn test_roles_only_and_roles_or_type() {
    let g = employment();
    // far end must play `employee`
    assert_eq!(forward(&g, "-->{@employee}", &[0]), vec![1]);
    assert_eq!(forward(&g, "-->{@employer}", &[0]), Vec::<u32>::new());
    // walking backwards from the employee arrives at the employer end
    assert_eq!(forward(&g, "<--{@employer}", &[1]), vec![0]);
    // roles or type
    assert_eq!(forward(&g, "-->{Knows, @employee}", &[0]), vec![1, 2]);
    // unknown roles match nothing
    assert_eq!(forward(&g, "-->{@ghost}", &[0]), Vec::<u32>::new());
}

#[test]
fn test_backward_matches_forward_with_roles() {
    let g = employment();
    let mut ast = AstGraph::new();
    let path = ast.lower_path_expr(&parse_path_expr("-->{@employee}").unwrap());
    let target = ast.literal(Value::Vertex(1));
    let root = ast.add(AstNode::BackwardVertexSet { target, path });
    let mut q = Query::new(Arc::new(ast), root);
    assert_eq!(q.evaluate(&g, None).unwrap(), Value::VertexSet(set(&[0])));
}

// ============================================================================
// Guards and edge identity
// ============================================================================

fn weighted() -> MemGraph {
    let mut g = MemGraph::new();
    let a = g.add_vertex("Node", vec![]).unwrap();
    let b = g.add_vertex("Node", vec![]).unwrap();
    let c = g.add_vertex("Node", vec![]).unwrap();
    g.add_edge("Road", a, b, vec![("km", AttrValue::Int(5))])
        .unwrap();
    g.add_edge("Road", a, c, vec![("km", AttrValue::Int(50))])
        .unwrap();
    g.add_edge("Road", b, c, vec![]).unwrap();
    g
}

/// `-->{Road}` restricted to edges whose `km` compares `op` against `limit`.
fn guarded_query(op: CompareOp, limit: i64) -> (AstGraph, NodeId) {
    let mut ast = AstGraph::new();
    let this = ast.variable("e");
    let km = ast.add(AstNode::Attribute {
        target: this,
        name: "km".into(),
    });
    let lim = ast.literal(limit);
    let pred = ast.add(AstNode::Compare {
        op,
        lhs: km,
        rhs: lim,
    });
    let step = ast.add(AstNode::SimplePath {
        direction: Direction::Out,
        types: vec![TypeTerm::allowed("Road")],
        roles: vec![],
        guard: Some(Guard::binding(pred, "e")),
    });
    let path = ast.add(AstNode::Iterated {
        inner: step,
        kind: Iteration::Plus,
    });
    let start = ast.literal(Value::Vertex(0));
    let root = ast.add(AstNode::ForwardVertexSet { start, path });
    (ast, root)
}

#[test]
fn test_guard_binds_candidate_edge() {
    let g = weighted();
    let (ast, root) = guarded_query(CompareOp::Lt, 10);
    let mut q = Query::new(Arc::new(ast), root);
    // b -> c has no km, so the comparison is null and the edge is rejected
    assert_eq!(q.evaluate(&g, None).unwrap(), Value::VertexSet(set(&[1])));

    let (ast, root) = guarded_query(CompareOp::Ge, 5);
    let mut q = Query::new(Arc::new(ast), root);
    assert_eq!(q.evaluate(&g, None).unwrap(), Value::VertexSet(set(&[1, 2])));
}

#[test]
fn test_guard_errors_are_hard() {
    let g = weighted();
    let mut ast = AstGraph::new();
    let missing = ast.variable("nope");
    let step = ast.add(AstNode::SimplePath {
        direction: Direction::Out,
        types: vec![],
        roles: vec![],
        guard: Some(Guard::binding(missing, "e")),
    });
    let start = ast.literal(Value::Vertex(0));
    let root = ast.add(AstNode::ForwardVertexSet { start, path: step });
    let mut q = Query::new(Arc::new(ast), root);
    assert!(matches!(
        q.evaluate(&g, None),
        Err(EvalError::UnresolvedVariable(name)) if name == "nope"
    ));
}

#[test]
fn test_edge_path_restricts_to_one_edge() {
    let g = weighted();
    let mut ast = AstGraph::new();
    let wanted = ast.variable("wanted");
    let step = ast.add(AstNode::EdgePath {
        direction: Direction::Any,
        edge: wanted,
        types: vec![],
        roles: vec![],
        guard: None,
    });
    let start = ast.literal(Value::Vertex(2));
    let root = ast.add(AstNode::ForwardVertexSet { start, path: step });
    let ast = Arc::new(ast);

    let mut q = Query::new(Arc::clone(&ast), root);
    q.bind("wanted", Value::Edge(EdgeRef::normal(1)));
    assert_eq!(q.evaluate(&g, None).unwrap(), Value::VertexSet(set(&[0])));

    let mut q = Query::new(ast, root);
    q.bind("wanted", Value::Int(1));
    assert!(matches!(
        q.evaluate(&g, None),
        Err(EvalError::TypeMismatch { .. })
    ));
}

// ============================================================================
// Path queries
// ============================================================================

#[test]
fn test_path_existence() {
    let g = chain();
    let mut ast = AstGraph::new();
    let path = ast.lower_path_expr(&parse_path_expr("-->+").unwrap());
    let start = ast.literal(Value::Vertex(0));
    let yes = ast.literal(Value::Vertex(2));
    let no = ast.literal(Value::Vertex(0));
    let found = ast.add(AstNode::PathExistence {
        start,
        path,
        target: yes,
    });
    let missing = ast.add(AstNode::PathExistence {
        start,
        path,
        target: no,
    });
    let ast = Arc::new(ast);
    assert_eq!(
        Query::new(Arc::clone(&ast), found).evaluate(&g, None).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        Query::new(ast, missing).evaluate(&g, None).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn test_path_system_reconstructs_shortest_paths() {
    let mut g = chain();
    // shortcut v0 -> v2
    g.add_edge("C", 0, 2, vec![]).unwrap();
    let mut ast = AstGraph::new();
    let path = ast.lower_path_expr(&parse_path_expr("-->{A,B}+").unwrap());
    let start = ast.literal(Value::Vertex(0));
    let root = ast.add(AstNode::PathSystem { start, path });
    let mut q = Query::new(Arc::new(ast), root);
    let Value::PathSystem(ps) = q.evaluate(&g, None).unwrap() else {
        panic!("expected a path system");
    };
    assert_eq!(ids(ps.reachable()), vec![1, 2]);
    assert_eq!(ps.distance(2), Some(2));
    assert_eq!(
        ps.path_to(2),
        Some(vec![EdgeRef::normal(0), EdgeRef::normal(1)])
    );
    assert_eq!(ps.root_of(2), Some(0));
    assert_eq!(ps.path_to(0), None);

    let mut ast = AstGraph::new();
    let path = ast.lower_path_expr(&parse_path_expr("-->+").unwrap());
    let start = ast.literal(Value::Vertex(0));
    let root = ast.add(AstNode::PathSystem { start, path });
    let Value::PathSystem(ps) = Query::new(Arc::new(ast), root).evaluate(&g, None).unwrap() else {
        panic!("expected a path system");
    };
    assert_eq!(ps.distance(2), Some(1));
    assert_eq!(ps.path_to(2), Some(vec![EdgeRef::normal(2)]));
}

#[test]
fn test_vertices_by_type() {
    let mut g = MemGraph::new();
    g.declare_vertex_type("Thing", &[]).unwrap();
    g.declare_vertex_type("Tool", &["Thing"]).unwrap();
    g.add_vertex("Thing", vec![]).unwrap();
    g.add_vertex("Tool", vec![]).unwrap();
    g.add_vertex("Other", vec![]).unwrap();

    let mut ast = AstGraph::new();
    let things = ast.add(AstNode::Vertices {
        types: vec![TypeTerm::allowed("Thing"), TypeTerm::forbidden("Tool")],
    });
    assert_eq!(
        Query::new(Arc::new(ast), things).evaluate(&g, None).unwrap(),
        Value::VertexSet(set(&[0]))
    );
}

// ============================================================================
// Limits
// ============================================================================

#[test]
fn test_max_hops_bounds_path_length() {
    let g = chain();
    let limited = |hops| {
        forward_query("-->*", &[0])
            .with_limits(TraversalLimits {
                max_hops: Some(hops),
                max_visited: None,
            })
            .evaluate(&g, None)
            .unwrap()
    };
    assert_eq!(limited(0), Value::VertexSet(set(&[0])));
    assert_eq!(limited(1), Value::VertexSet(set(&[0, 1])));
    assert_eq!(limited(5), Value::VertexSet(set(&[0, 1, 2])));
}

#[test]
fn test_max_visited_aborts_traversal() {
    let g = chain();
    let err = forward_query("-->*", &[0])
        .with_limits(TraversalLimits {
            max_hops: None,
            max_visited: Some(2),
        })
        .evaluate(&g, None)
        .unwrap_err();
    assert!(matches!(err, EvalError::TraversalLimit { limit: 2 }));
}

// ============================================================================
// Query lifecycle
// ============================================================================

#[test]
fn test_query_reset_and_staleness() {
    let mut g = weighted();
    let (ast, root) = guarded_query(CompareOp::Lt, 10);
    let mut q = Query::new(Arc::new(ast), root);
    assert!(q.is_stale(&g));
    assert_eq!(q.evaluate(&g, None).unwrap(), Value::VertexSet(set(&[1])));
    assert!(!q.is_stale(&g));

    g.set_edge_attr(2, "km", AttrValue::Int(1)).unwrap();
    assert!(q.is_stale(&g));
    // memoized until reset
    assert_eq!(q.evaluate(&g, None).unwrap(), Value::VertexSet(set(&[1])));
    q.reset_to_initial_state();
    assert_eq!(q.evaluate(&g, None).unwrap(), Value::VertexSet(set(&[1, 2])));
    assert_eq!(q.cache().evaluations(q.root()), 2);
}

#[test]
fn test_compile_and_evaluate_entry_points() {
    let g = chain();
    let mut ast = AstGraph::new();
    let path = ast.lower_path_expr(&parse_path_expr("-->{A} -->{B}?").unwrap());
    let nfa = compile_path_description(&g, &ast, path).unwrap();
    assert!(nfa.to_dot().contains("-->{A}"));

    let mut cache = EvaluatorCache::new();
    let mut bindings = Bindings::new();
    let mut ev = Evaluator::new(&g, &ast, &mut cache, &mut bindings);
    let reached = evaluate(&nfa, &set(&[0]), &mut ev).unwrap();
    assert_eq!(ids(&reached), vec![1, 2]);

    let lit = ast.literal(1i64);
    assert!(matches!(
        compile_path_description(&g, &ast, lit),
        Err(EvalError::TypeMismatch { .. })
    ));
    assert_eq!(g.vertices().len(), 3);
}

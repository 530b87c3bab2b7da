//! MemGraph E2E Tests

use pathwise_graph::*;

fn roles_graph() -> MemGraph {
    let mut g = MemGraph::new();
    g.declare_vertex_type("Person", &[]).unwrap();
    g.declare_edge_type("Link", &[], None, None).unwrap();
    g.declare_edge_type("Knows", &["Link"], Some("knower"), Some("known"))
        .unwrap();
    g.declare_edge_type("Employs", &["Link"], Some("employer"), Some("employee"))
        .unwrap();
    g.declare_edge_type("Manages", &["Employs"], Some("manager"), None)
        .unwrap();
    g
}

// ============================================================================
// String Interning Tests
// ============================================================================

#[test]
fn test_string_interning() {
    let interner = StringInterner::new();

    let id1 = interner.intern("hello");
    let id2 = interner.intern("world");
    let id3 = interner.intern("hello");

    assert_eq!(id1, id3);
    assert_ne!(id1, id2);
    assert_eq!(interner.lookup(id1), Some("hello".to_string()));
    assert_eq!(interner.id_of("world"), Some(id2));
    assert_eq!(interner.id_of("missing"), None);
    assert_eq!(interner.len(), 2);
}

// ============================================================================
// Incidence Tests
// ============================================================================

#[test]
fn test_incidences_by_direction() {
    let mut g = MemGraph::new();
    let a = g.add_vertex("Node", vec![]).unwrap();
    let b = g.add_vertex("Node", vec![]).unwrap();
    let e = g.add_edge("Next", a, b, vec![]).unwrap();

    assert_eq!(g.incidences(a, Direction::Out), vec![EdgeRef::normal(e)]);
    assert!(g.incidences(a, Direction::In).is_empty());
    assert_eq!(g.incidences(b, Direction::In), vec![EdgeRef::reversed_of(e)]);
    assert_eq!(g.incidences(b, Direction::Any).len(), 1);

    let inc = g.incidences(b, Direction::In)[0];
    assert_eq!(g.this(inc), Some(b));
    assert_eq!(g.that(inc), Some(a));
    assert_eq!(inc.canonical(), EdgeRef::normal(e));
}

#[test]
fn test_self_loop_reported_per_orientation() {
    let mut g = MemGraph::new();
    let a = g.add_vertex("Node", vec![]).unwrap();
    let e = g.add_edge("Loop", a, a, vec![]).unwrap();

    let any = g.incidences(a, Direction::Any);
    assert_eq!(any, vec![EdgeRef::normal(e), EdgeRef::reversed_of(e)]);
}

#[test]
fn test_add_edge_rejects_unknown_vertex() {
    let mut g = MemGraph::new();
    let a = g.add_vertex("Node", vec![]).unwrap();
    assert!(g.add_edge("Next", a, 42, vec![]).is_err());
}

#[test]
fn test_vertex_and_edge_type_namespaces_do_not_mix() {
    let mut g = MemGraph::new();
    let a = g.add_vertex("Node", vec![]).unwrap();
    assert!(g.add_edge("Node", a, a, vec![]).is_err());
    g.add_edge("Next", a, a, vec![]).unwrap();
    assert!(g.add_vertex("Next", vec![]).is_err());
}

// ============================================================================
// Schema Tests
// ============================================================================

#[test]
fn test_subtype_closure_is_transitive() {
    let g = roles_graph();
    let link = g.type_id("Link").unwrap();
    let employs = g.type_id("Employs").unwrap();
    let manages = g.type_id("Manages").unwrap();
    let knows = g.type_id("Knows").unwrap();

    assert!(g.is_subtype_of(manages, employs));
    assert!(g.is_subtype_of(manages, link));
    assert!(g.is_subtype_of(link, link));
    assert!(!g.is_subtype_of(link, manages));
    assert!(!g.is_subtype_of(knows, employs));
}

#[test]
fn test_supertype_must_exist() {
    let mut g = MemGraph::new();
    assert!(g.declare_edge_type("Child", &["Parent"], None, None).is_err());
}

#[test]
fn test_roles_include_inherited() {
    let g = roles_graph();
    let manages = g.type_id("Manages").unwrap();
    let manager = g.role_id("manager").unwrap();
    let employer = g.role_id("employer").unwrap();
    let employee = g.role_id("employee").unwrap();

    assert_eq!(g.roles_at(manages, EdgeEnd::Alpha), vec![manager, employer]);
    assert_eq!(g.roles_at(manages, EdgeEnd::Omega), vec![employee]);
    assert_eq!(g.role_id("Person"), None);
}

#[test]
fn test_find_by_type_includes_subtypes() {
    let mut g = MemGraph::new();
    g.declare_vertex_type("Thing", &[]).unwrap();
    g.declare_vertex_type("Tool", &["Thing"]).unwrap();
    g.add_vertex("Thing", vec![]).unwrap();
    g.add_vertex("Tool", vec![]).unwrap();
    g.add_vertex("Other", vec![]).unwrap();

    assert_eq!(g.find_by_type("Thing").len(), 2);
    assert_eq!(g.find_by_type("Tool").len(), 1);
    assert!(g.find_by_type("Missing").is_empty());
}

// ============================================================================
// Attribute Tests
// ============================================================================

#[test]
fn test_attributes_and_version() {
    let mut g = MemGraph::new();
    let a = g
        .add_vertex("Node", vec![("name", AttrValue::from("a"))])
        .unwrap();
    let b = g.add_vertex("Node", vec![]).unwrap();
    let e = g
        .add_edge("Next", a, b, vec![("weight", AttrValue::Int(3))])
        .unwrap();

    assert_eq!(g.vertex_attr(a, "name"), Some(AttrValue::Str("a".into())));
    assert_eq!(g.edge_attr(e, "weight"), Some(AttrValue::Int(3)));
    assert_eq!(g.edge_attr(e, "missing"), None);

    let before = g.version();
    g.set_edge_attr(e, "weight", AttrValue::Int(7)).unwrap();
    assert!(g.version() > before);
    assert_eq!(g.edge_attr(e, "weight"), Some(AttrValue::Int(7)));
    assert!(g.set_vertex_attr(99, "name", AttrValue::Bool(true)).is_err());
}

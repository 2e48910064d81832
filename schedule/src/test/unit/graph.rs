//! Call-graph discovery and the realization order.

use prism_ir::Expr;

use crate::env::build_env;
use crate::func::{Function, call};
use crate::graph::{find_direct_calls, realization_order};
use crate::test::helpers::pointwise_producer;

#[test]
fn image_reads_are_not_call_edges() {
    let f = pointwise_producer("f");
    assert!(find_direct_calls(&f).is_empty());
}

#[test]
fn self_reads_in_updates_are_not_call_edges() {
    let mut f = Function::single("f", &["x"], Expr::int(0) + 1);
    f.define_update(
        vec![Expr::var("x")],
        vec![call("f", vec![Expr::var("x")]) + 1],
        None,
    );
    assert!(find_direct_calls(&f).is_empty());
}

#[test]
fn update_stages_contribute_edges() {
    let g = pointwise_producer("g");
    let mut f = Function::single("f", &["x", "y"], Expr::int(0) * 1);
    f.define_update(
        vec![Expr::var("x"), Expr::var("y")],
        vec![call("g", vec![Expr::var("x"), Expr::var("y")])],
        None,
    );
    let calls = find_direct_calls(&f);
    assert!(calls.contains("g"));
    let _ = g;
}

#[test]
fn diamond_orders_producers_before_consumers() {
    let a = pointwise_producer("a");
    let b = Function::single("b", &["x", "y"], call("a", vec![Expr::var("x"), Expr::var("y")]) + 1);
    let c = Function::single("c", &["x", "y"], call("a", vec![Expr::var("x"), Expr::var("y")]) * 2);
    let d = Function::single(
        "d",
        &["x", "y"],
        call("b", vec![Expr::var("x"), Expr::var("y")])
            + call("c", vec![Expr::var("x"), Expr::var("y")]),
    );
    let env = build_env([a, b, c, d]);

    let order = realization_order(&["d".to_owned()], &env);

    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert_eq!(order.len(), 4);
    assert!(pos("a") < pos("b"));
    assert!(pos("a") < pos("c"));
    assert!(pos("b") < pos("d"));
    assert!(pos("c") < pos("d"));
}

#[test]
#[should_panic(expected = "cycle")]
fn cyclic_call_graphs_are_an_internal_error() {
    let f = Function::single("f", &["x"], call("g", vec![Expr::var("x")]));
    let g = Function::single("g", &["x"], call("f", vec![Expr::var("x")]));
    let env = build_env([f, g]);
    realization_order(&["f".to_owned()], &env);
}

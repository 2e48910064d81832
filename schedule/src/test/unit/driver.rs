//! End-to-end lowering scenarios through `schedule_functions`.

use prism_ir::{Expr, ForType, ScalarType, StmtNode};

use crate::func::{ExternArg, Function, ReductionDomain, ReductionVariable, call};
use crate::test::helpers::{
    collect_fors, collect_producer_consumers, collect_provides, collect_realizes, contains_call,
    count_asserts, find_for_body, input2, lower, pointwise_producer, stencil_consumer,
};

#[test]
fn pointwise_inline_pipeline_has_no_realization() {
    // f(x,y) = in(x,y)+1; out(x,y) = f(x,y)*2; f.compute_inline()
    let mut f = pointwise_producer("f");
    f.compute_inline();
    let out = Function::single("out", &["x", "y"], call("f", vec![Expr::var("x"), Expr::var("y")]) * 2);

    let s = lower(vec![f, out], &["out"], false).unwrap();

    let fors = collect_fors(&s);
    let names: Vec<&str> = fors.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["out.s0.y", "out.s0.x"]);
    assert_eq!(collect_provides(&s), ["out"]);
    assert!(collect_realizes(&s).is_empty());
    // The inlined body reads the image directly; no call to f survives.
    assert!(contains_call(&s, "in"));
    assert!(!contains_call(&s, "f"));
}

#[test]
fn tiled_consumer_with_compute_at_realizes_per_tile() {
    // out.split(x, xo, xi, 8).split(y, yo, yi, 8).reorder(xi, yi, xo, yo);
    // f.compute_at(out, xo)
    let f = {
        let mut f = pointwise_producer("f");
        f.compute_at("out", "xo");
        f
    };
    let mut out = stencil_consumer("out", "f");
    out.split("x", "xo", "xi", 8).split("y", "yo", "yi", 8).reorder(&["xi", "yi", "xo", "yo"]);

    let s = lower(vec![f, out], &["out"], false).unwrap();

    assert_eq!(collect_realizes(&s), ["f"]);
    assert!(collect_producer_consumers(&s).contains(&"f".to_owned()));

    // The realization sits inside the xo loop: the xo body holds the
    // producer nest of f and the consumer loops of out.
    let xo_body = find_for_body(&s, &|n| n == "out.s0.xo").expect("xo loop exists");
    assert_eq!(collect_realizes(&xo_body), ["f"]);
    assert!(collect_provides(&xo_body).contains(&"f".to_owned()));

    // Four consumer loops plus f's two.
    assert_eq!(collect_fors(&s).len(), 6);
}

#[test]
fn reduction_with_explicit_bounds_gets_two_stages_and_asserts() {
    // hist(x) = 0; hist(in(r)) += 1; hist.bound(x, 0, 256)
    let mut hist =
        Function::new("hist", vec!["x".to_owned()], vec![Expr::int(0)], vec![ScalarType::Int32]);
    let site = input2(Expr::var("r"), Expr::int(0));
    hist.define_update(
        vec![site.clone()],
        vec![call("hist", vec![site]) + 1],
        Some(ReductionDomain::new(vec![ReductionVariable {
            var: "r".to_owned(),
            min: Expr::int(0),
            extent: Expr::int(256),
        }])),
    );
    hist.bound("x", 0, 256);

    let s = lower(vec![hist], &["hist"], true).unwrap();

    assert_eq!(collect_producer_consumers(&s), ["hist"]);
    assert_eq!(collect_provides(&s).len(), 2);
    let names: Vec<String> = collect_fors(&s).into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"hist.s0.x".to_owned()));
    assert!(names.contains(&"hist.s1.r".to_owned()));
    // One explicit-bounds assertion per stage.
    assert_eq!(count_asserts(&s), 2);
}

#[test]
fn store_and_compute_at_different_serial_levels() {
    let f = {
        let mut f = pointwise_producer("f");
        f.store_at("g", "yo");
        f.compute_at("g", "x");
        f
    };
    let mut g = stencil_consumer("g", "f");
    g.split("y", "yo", "yi", 8);

    let s = lower(vec![f, g], &["g"], false).unwrap();

    // The allocation is established at yo, the production at x inside it.
    let yo_body = find_for_body(&s, &|n| n == "g.s0.yo").expect("yo loop exists");
    assert_eq!(collect_realizes(&yo_body), ["f"]);
    let x_body = find_for_body(&s, &|n| n == "g.s0.x").expect("x loop exists");
    assert!(collect_producer_consumers(&x_body).contains(&"f".to_owned()));
}

#[test]
fn inline_extern_under_vector_loop_is_hoisted_around_it() {
    let f = Function::new_extern(
        "f",
        vec!["x".to_owned()],
        vec![ScalarType::Float32],
        "ext_stage",
        vec![ExternArg::ImageParam("in".to_owned())],
    );
    let mut out = Function::single("out", &["x"], call("f", vec![Expr::var("x")]) * 2);
    out.split("x", "xo", "xi", 8).vectorize("xi");

    let s = lower(vec![f, out], &["out"], false).unwrap();

    assert_eq!(collect_realizes(&s), ["f"]);
    assert!(contains_call(&s, "ext_stage"));
    assert!(count_asserts(&s) >= 1);

    // The realization wraps the vectorized loop rather than sitting under
    // it.
    let realize_body = first_realize_body(&s).expect("realize present");
    match realize_body.node() {
        StmtNode::ProducerConsumer { consume, .. } => {
            let fors = collect_fors(consume);
            assert!(
                fors.iter().any(|(n, t)| n == "out.s0.xi" && *t == ForType::Vectorized),
                "vector loop must be inside the consume side"
            );
        }
        other => panic!("expected producer/consumer under the realize, got {other:?}"),
    }
}

#[test]
fn compute_root_producer_realizes_once_at_root() {
    let f = {
        let mut f = pointwise_producer("f");
        f.compute_root();
        f
    };
    let out = stencil_consumer("out", "f");

    let s = lower(vec![f, out], &["out"], false).unwrap();

    assert_eq!(collect_realizes(&s), ["f"]);
    // Root realization: the realize is the outermost node of the tree.
    assert!(matches!(s.node(), StmtNode::Realize { name, .. } if name == "f"));
}

#[test]
fn inline_function_with_updates_realizes_at_the_consuming_provide() {
    // An impure function cannot be substituted into its call sites; left at
    // the inline level it is realized right around the provide that uses it.
    let mut f = Function::single("f", &["x"], input2(Expr::var("x"), Expr::int(0)));
    f.define_update(
        vec![Expr::var("x")],
        vec![call("f", vec![Expr::var("x")]) * 2],
        None,
    );
    let out = Function::single("out", &["x"], call("f", vec![Expr::var("x")]) + 1);

    let s = lower(vec![f, out], &["out"], false).unwrap();

    assert_eq!(collect_realizes(&s), ["f"]);
    let x_body = find_for_body(&s, &|n| n == "out.s0.x").expect("consumer loop exists");
    assert_eq!(collect_realizes(&x_body), ["f"]);
    assert!(collect_producer_consumers(&x_body).contains(&"f".to_owned()));
}

#[test]
fn memoized_schedules_are_reported() {
    let mut f = pointwise_producer("f");
    f.compute_root().memoize();
    let out = stencil_consumer("out", "f");

    let env = crate::env::build_env([f, out]);
    let outputs = vec!["out".to_owned()];
    let order = crate::graph::realization_order(&outputs, &env);
    let (_, any_memoized) =
        crate::driver::schedule_functions(&outputs, &order, &env, false).unwrap();
    assert!(any_memoized);
}

fn first_realize_body(s: &prism_ir::Stmt) -> Option<prism_ir::Stmt> {
    match s.node() {
        StmtNode::Realize { body, .. } => Some(body.clone()),
        StmtNode::For { body, .. } | StmtNode::LetStmt { body, .. } => first_realize_body(body),
        StmtNode::ProducerConsumer { produce, update, consume, .. } => first_realize_body(produce)
            .or_else(|| update.as_ref().and_then(first_realize_body))
            .or_else(|| first_realize_body(consume)),
        StmtNode::Block { first, rest } => {
            first_realize_body(first).or_else(|| first_realize_body(rest))
        }
        StmtNode::IfThenElse { then_case, else_case, .. } => first_realize_body(then_case)
            .or_else(|| else_case.as_ref().and_then(first_realize_body)),
        _ => None,
    }
}

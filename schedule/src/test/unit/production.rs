//! Produce/update composition, stage namespaces, and the extern call path.

use prism_ir::{Expr, ScalarType, StmtNode, stmt_uses_var};

use crate::env::build_env;
use crate::func::{ExternArg, Function, ReductionDomain, ReductionVariable, call};
use crate::production::{build_produce, build_production, inject_explicit_bounds};
use crate::test::helpers::{collect_provides, contains_call, input2, pointwise_producer};

fn histogram() -> Function {
    let mut hist =
        Function::new("hist", vec!["x".to_owned()], vec![Expr::int(0)], vec![ScalarType::Int32]);
    let site = input2(Expr::var("r"), Expr::int(0));
    let domain = ReductionDomain::new(vec![ReductionVariable {
        var: "r".to_owned(),
        min: Expr::int(0),
        extent: Expr::int(100),
    }]);
    hist.define_update(vec![site.clone()], vec![call("hist", vec![site]) + 1], Some(domain));
    hist
}

#[test]
fn production_pairs_produce_with_merged_updates() {
    let hist = histogram();
    let env = build_env([hist.clone()]);
    let (produce, updates) = build_production(&hist, &env).unwrap();

    assert_eq!(collect_provides(&produce), ["hist"]);
    let updates = updates.expect("histogram has one update");
    assert_eq!(collect_provides(&updates), ["hist"]);
}

#[test]
fn stages_live_in_their_own_namespaces() {
    let hist = histogram();
    let env = build_env([hist.clone()]);
    let (produce, updates) = build_production(&hist, &env).unwrap();
    let updates = updates.unwrap();

    assert!(stmt_uses_var(&produce, "hist.s0.x"));
    assert!(!stmt_uses_var(&produce, "hist.s1.r"));
    assert!(stmt_uses_var(&updates, "hist.s1.r"));
    assert!(!stmt_uses_var(&updates, "hist.s0.x"));
}

#[test]
fn reduction_domains_bind_their_loop_bounds() {
    let hist = histogram();
    let env = build_env([hist.clone()]);
    let (_, updates) = build_production(&hist, &env).unwrap();
    let updates = updates.unwrap();

    // The loop bounds of r are tied to the externally supplied domain
    // bounds via lets at the top of the update nest.
    let mut seen = Vec::new();
    let mut cursor = updates;
    loop {
        let StmtNode::LetStmt { name, body, .. } = cursor.node() else { break };
        let (name, body) = (name.clone(), body.clone());
        seen.push(name);
        cursor = body;
    }
    assert!(seen.contains(&"hist.s1.r.loop_min".to_owned()));
    assert!(seen.contains(&"hist.s1.r.loop_max".to_owned()));
    assert!(seen.contains(&"hist.s1.r.loop_extent".to_owned()));
}

#[test]
fn extern_stage_at_matching_levels_reuses_injected_buffers() {
    let mut f = Function::new_extern(
        "f",
        vec!["x".to_owned(), "y".to_owned()],
        vec![ScalarType::Float32],
        "blur_stage",
        vec![ExternArg::ImageParam("in".to_owned())],
    );
    f.compute_root();
    let env = build_env([f.clone()]);
    let produce = build_produce(&f, &env).unwrap();

    assert!(contains_call(&produce, "blur_stage"));
    assert!(stmt_uses_var(&produce, "f.buffer"));
    assert!(stmt_uses_var(&produce, "in.buffer"));
    // A failed extern stage aborts through an assert on its return code.
    assert!(contains_call(&produce, prism_ir::intrinsics::ERROR_EXTERN_STAGE_FAILED));
}

#[test]
fn extern_stage_with_split_levels_builds_a_subregion_buffer() {
    let mut f = Function::new_extern(
        "f",
        vec!["x".to_owned(), "y".to_owned()],
        vec![ScalarType::Float32],
        "blur_stage",
        vec![ExternArg::Func("g".to_owned())],
    );
    f.store_root();
    f.compute_at("out", "yo");
    let g = pointwise_producer("g");
    let env = build_env([f.clone(), g]);
    let produce = build_produce(&f, &env).unwrap();

    // Store and compute levels differ, so a descriptor for just this
    // subregion is built and bound to a temporary.
    assert!(stmt_uses_var(&produce, "f.0.tmp_buffer"));
    assert!(contains_call(&produce, prism_ir::intrinsics::CREATE_BUFFER));
    assert!(contains_call(&produce, prism_ir::intrinsics::ADDRESS_OF));
    assert!(stmt_uses_var(&produce, "g.buffer"));
    assert!(stmt_uses_var(&produce, "f.0.stride.0") || stmt_uses_var(&produce, "f.stride.0"));
}

#[test]
fn explicit_bounds_assert_once_per_stage_and_bound() {
    let mut hist = histogram();
    hist.bound("x", 0, 256);
    let body = prism_ir::Stmt::evaluate(Expr::int(0));
    let checked = inject_explicit_bounds(body, &hist);
    assert_eq!(crate::test::helpers::count_asserts(&checked), 2);
}

//! Cost model, dependence analysis, and end-to-end auto-scheduling.

use indexmap::IndexMap;
use prism_ir::{BoundsBox, Expr, ForType, FuncValueBounds, Interval};
use smallvec::smallvec;

use crate::advisor::cost::{ExprCost, box_area, func_cost, region_size_set};
use crate::advisor::dependence::{redundant_regions, regions_required};
use crate::advisor::{AdvisorOpts, schedule_advisor};
use crate::env::build_env;
use crate::func::{Function, Split, call};
use crate::graph::realization_order;
use crate::test::helpers::{env_lock, input2, pointwise_producer};
use prism_ir::IRVisitor;

fn const_box(ranges: &[(i64, i64)]) -> BoundsBox {
    ranges.iter().map(|(min, max)| Interval::new(Expr::int(*min), Expr::int(*max))).collect()
}

#[test]
fn box_area_laws() {
    assert_eq!(box_area(&const_box(&[(0, 9), (0, 9)])), 100);
    // A zero-extent dimension empties the whole box.
    assert_eq!(box_area(&const_box(&[(0, 9), (5, 4)])), 0);
    // A symbolic dimension makes the area indeterminate.
    let symbolic: BoundsBox =
        smallvec![Interval::new(Expr::var("l"), Expr::var("u")), Interval::new(Expr::int(0), Expr::int(9))];
    assert_eq!(box_area(&symbolic), -1);
    // The empty box has unit area.
    assert_eq!(box_area(&BoundsBox::new()), 1);
}

#[test]
fn expr_cost_counts_ops_and_loads() {
    // in(x, y) + 1: one add, one image load.
    let mut cost = ExprCost::default();
    cost.visit_expr(&(input2(Expr::var("x"), Expr::var("y")) + 1));
    assert_eq!((cost.ops, cost.loads), (1, 1));

    let f = pointwise_producer("f");
    assert_eq!(func_cost(&f), vec![(1, 1)]);
}

#[test]
fn stencil_chain_footprints_widen_downstream() {
    // a(x) = in(x); b(x) = a(x-1) + a(x+1)
    let a = Function::single("a", &["x"], prism_ir::Expr::call(
        prism_ir::ScalarType::Float32,
        "in",
        vec![Expr::var("x")],
        prism_ir::CallType::Image,
    ));
    let b = Function::single(
        "b",
        &["x"],
        call("a", vec![Expr::var("x") - 1]) + call("a", vec![Expr::var("x") + 1]),
    );
    let env = build_env([a, b.clone()]);
    let fvb = FuncValueBounds::new();

    let regions = regions_required(&b, &[(Expr::int(0), Expr::int(9))], &env, &fvb);

    assert_eq!(regions["a"][0], Interval::new(Expr::int(-1), Expr::int(10)));
    // a reads the image over exactly the region of a that b needs.
    assert_eq!(regions["in"][0], Interval::new(Expr::int(-1), Expr::int(10)));
}

#[test]
fn redundant_regions_measure_the_tile_overlap() {
    let a = Function::single("a", &["x"], prism_ir::Expr::call(
        prism_ir::ScalarType::Float32,
        "in",
        vec![Expr::var("x")],
        prism_ir::CallType::Image,
    ));
    let b = Function::single(
        "b",
        &["x"],
        call("a", vec![Expr::var("x") - 1]) + call("a", vec![Expr::var("x") + 1]),
    );
    let env = build_env([a, b.clone()]);
    let fvb = FuncValueBounds::new();

    let overlaps = redundant_regions(&b, 0, &[(Expr::int(0), Expr::int(9))], &env, &fvb);

    // Tiles [0,9] and [10,19] of b both read a over [9,10]: two columns of
    // recomputation per tile step.
    assert_eq!(overlaps["a"][0], Interval::new(Expr::int(9), Expr::int(10)));
    assert_eq!(overlaps["a"][0].constant_extent(), Some(2));
}

#[test]
fn working_set_is_a_high_water_mark_not_a_sum() {
    // a feeds b feeds c; a is dead once b is realized.
    let a = pointwise_producer("a");
    let b = Function::single("b", &["x", "y"], call("a", vec![Expr::var("x"), Expr::var("y")]) + 1);
    let c = Function::single("c", &["x", "y"], call("b", vec![Expr::var("x"), Expr::var("y")]) + 1);
    let env = build_env([a, b, c]);

    let region = const_box(&[(0, 9), (0, 9)]);
    let regions: IndexMap<String, BoundsBox> = [
        ("a".to_owned(), region.clone()),
        ("b".to_owned(), region.clone()),
        ("c".to_owned(), region),
    ]
    .into_iter()
    .collect();

    let mut func_dep_regions: IndexMap<String, IndexMap<String, BoundsBox>> = IndexMap::new();
    func_dep_regions.insert("a".to_owned(), IndexMap::new());
    func_dep_regions
        .insert("b".to_owned(), [("a".to_owned(), const_box(&[(0, 9), (0, 9)]))].into_iter().collect());
    func_dep_regions
        .insert("c".to_owned(), [("b".to_owned(), const_box(&[(0, 9), (0, 9)]))].into_iter().collect());

    // 100 elements x 4 bytes each; peak is two live buffers, not three.
    assert_eq!(region_size_set(&regions, &env, &func_dep_regions), 800);
}

fn stencil_chain() -> (Vec<Function>, Vec<String>) {
    let a = Function::single(
        "a",
        &["x", "y"],
        input2(Expr::var("x"), Expr::var("y")) + 1,
    );
    let b = Function::single(
        "b",
        &["x", "y"],
        call("a", vec![Expr::var("x"), Expr::var("y")])
            + call("a", vec![Expr::var("x") + 1, Expr::var("y")]),
    );
    let mut c = Function::single(
        "c",
        &["x", "y"],
        call("b", vec![Expr::var("x"), Expr::var("y")])
            + call("b", vec![Expr::var("x"), Expr::var("y") + 1]),
    );
    c.bound("x", 0, 512).bound("y", 0, 512);
    (vec![a, b, c], vec!["c".to_owned()])
}

#[test]
fn advisor_groups_a_small_stencil_chain_under_one_tile() {
    // The advisor reads machine parameters from the environment.
    let _env = env_lock();
    let (funcs, outputs) = stencil_chain();
    let mut env = build_env(funcs);
    let order = realization_order(&outputs, &env);
    let fvb = FuncValueBounds::new();

    schedule_advisor(&outputs, &order, &mut env, &fvb, &AdvisorOpts::default());

    // a and b are computed inside c's tile loop.
    for name in ["a", "b"] {
        let f = &env[name];
        assert_eq!(f.schedule().compute_level.func, "c", "{name} not grouped under c");
        assert!(!f.schedule().compute_level.var.is_empty());
        assert_eq!(f.schedule().store_level, f.schedule().compute_level);
    }

    // c's schedule carries the tiling splits and a parallel outer dim.
    let c = &env["c"];
    assert!(
        c.schedule().splits.iter().any(|s| matches!(
            s,
            Split::Var { outer, .. } if outer.contains(".tile.")
        )),
        "no tiling split on the group output"
    );
    assert!(c.schedule().dims.iter().any(|d| d.for_type == ForType::Parallel));

    // All three are pure with unit-stride loads, so all three vectorize.
    for name in ["a", "b", "c"] {
        assert!(
            env[name].schedule().dims.iter().any(|d| d.for_type == ForType::Vectorized),
            "{name} not vectorized"
        );
    }
}

#[test]
fn advisor_respects_disabled_vectorization_and_parallelism() {
    let _env = env_lock();
    let (funcs, outputs) = stencil_chain();
    let mut env = build_env(funcs);
    let order = realization_order(&outputs, &env);
    let fvb = FuncValueBounds::new();

    let opts = AdvisorOpts { auto_vec: false, auto_par: false, ..AdvisorOpts::default() };
    schedule_advisor(&outputs, &order, &mut env, &fvb, &opts);

    for f in env.values() {
        assert!(f.schedule().dims.iter().all(|d| d.for_type == ForType::Serial));
        for u in f.updates() {
            assert!(u.schedule.dims.iter().all(|d| d.for_type == ForType::Serial));
        }
    }
}

#[test]
fn advised_pipeline_still_lowers() {
    let _env = env_lock();
    let (funcs, outputs) = stencil_chain();
    let mut env = build_env(funcs);
    let order = realization_order(&outputs, &env);
    let fvb = FuncValueBounds::new();

    schedule_advisor(&outputs, &order, &mut env, &fvb, &AdvisorOpts::default());

    let (stmt, _) =
        crate::driver::schedule_functions(&outputs, &order, &env, false).unwrap();
    // The advised schedule must be accepted by the validator and produce
    // realizations for the grouped members.
    let realizes = crate::test::helpers::collect_realizes(&stmt);
    assert!(realizes.contains(&"a".to_owned()));
    assert!(realizes.contains(&"b".to_owned()));
}

//! Reduction-variable parallelization checks.

use prism_ir::Expr;

use crate::func::{Function, ReductionDomain, ReductionVariable, call};
use crate::parallel_rvar::can_parallelize_rvar;
use crate::test::helpers::input2;

fn domain(var: &str, extent: i64) -> ReductionDomain {
    ReductionDomain::new(vec![ReductionVariable {
        var: var.to_owned(),
        min: Expr::int(0),
        extent: Expr::int(extent),
    }])
}

#[test]
fn data_dependent_scatter_cannot_be_parallelized() {
    // hist(in(r)) += 1: the store site is not one-to-one in r.
    let mut hist = Function::single("hist", &["x"], Expr::int(0) + 0);
    let site = input2(Expr::var("r"), Expr::int(0));
    hist.define_update(
        vec![site.clone()],
        vec![call("hist", vec![site]) + 1],
        Some(domain("r", 100)),
    );
    assert!(!can_parallelize_rvar("r", "hist", &hist.updates()[0]));
}

#[test]
fn pointwise_read_modify_write_along_r_is_parallel() {
    // f(r, y) = f(r, y) + in(r, y): distinct r store to distinct sites and
    // only read their own site.
    let mut f = Function::single("f", &["x", "y"], Expr::int(0) + 0);
    f.define_update(
        vec![Expr::var("r"), Expr::var("y")],
        vec![
            call("f", vec![Expr::var("r"), Expr::var("y")])
                + input2(Expr::var("r"), Expr::var("y")),
        ],
        Some(domain("r", 64)),
    );
    assert!(can_parallelize_rvar("r", "f", &f.updates()[0]));
}

#[test]
fn cross_site_reads_serialize_the_reduction() {
    // A scan: f(r, y) = f(r - 1, y) + 1 reads a neighbouring site.
    let mut f = Function::single("f", &["x", "y"], Expr::int(0) + 0);
    f.define_update(
        vec![Expr::var("r"), Expr::var("y")],
        vec![call("f", vec![Expr::var("r") - 1, Expr::var("y")]) + 1],
        Some(domain("r", 64)),
    );
    assert!(!can_parallelize_rvar("r", "f", &f.updates()[0]));
}

#[test]
fn var_must_pin_exactly_one_store_coordinate() {
    // r appears in two coordinates; the disjointness argument fails.
    let mut f = Function::single("f", &["x", "y"], Expr::int(0) + 0);
    f.define_update(
        vec![Expr::var("r"), Expr::var("r") + 1],
        vec![Expr::int(1) + 0],
        Some(domain("r", 64)),
    );
    assert!(!can_parallelize_rvar("r", "f", &f.updates()[0]));
}

//! Outermost-loop stripping and device propagation.

use prism_ir::{DeviceApi, Expr, ForType, Stmt, StmtNode};

use crate::cleanup::{propagate_device, strip_outermost_loops};
use crate::test::helpers::collect_fors;

fn serial_loop(name: &str, device: DeviceApi, body: Stmt) -> Stmt {
    Stmt::for_loop(
        name,
        Expr::var(format!("{name}.loop_min")),
        Expr::var(format!("{name}.loop_extent")),
        ForType::Serial,
        device,
        body,
    )
}

#[test]
fn outermost_loops_and_their_bounds_vanish() {
    let provide = Stmt::provide(
        "f",
        vec![Expr::var("f.s0.__outermost.loop_extent")],
        vec![Expr::var("f.s0.x")],
    );
    let inner = serial_loop("f.s0.x", DeviceApi::Parent, provide);
    let outer = serial_loop("f.s0.__outermost", DeviceApi::Parent, inner);
    let s = Stmt::let_stmt("f.s0.__outermost.loop_extent", Expr::int(1), outer);

    let stripped = strip_outermost_loops(&s);

    let fors = collect_fors(&stripped);
    assert_eq!(fors.len(), 1);
    assert_eq!(fors[0].0, "f.s0.x");
    // The binding is gone and references collapse to the unit constants.
    let StmtNode::For { body, .. } = stripped.node() else { panic!("loop expected at root") };
    let StmtNode::Provide { values, .. } = body.node() else { panic!("provide expected") };
    assert_eq!(values[0], Expr::int(1));
}

#[test]
fn non_outermost_structure_is_preserved() {
    let provide = Stmt::provide("f", vec![Expr::int(0)], vec![Expr::var("f.s0.x")]);
    let s = serial_loop("f.s0.x", DeviceApi::Parent, provide);
    assert_eq!(strip_outermost_loops(&s), s);
}

#[test]
fn parent_device_tags_inherit_from_the_enclosing_loop() {
    let innermost = Stmt::provide("f", vec![Expr::int(0)], vec![Expr::var("x")]);
    let inner = serial_loop("f.s0.x", DeviceApi::Parent, innermost);
    let outer = serial_loop("f.s0.y", DeviceApi::Cuda, inner);

    let resolved = propagate_device(&outer);

    let StmtNode::For { device, body, .. } = resolved.node() else { panic!() };
    assert_eq!(*device, DeviceApi::Cuda);
    let StmtNode::For { device, .. } = body.node() else { panic!() };
    assert_eq!(*device, DeviceApi::Cuda);
}

#[test]
fn unscoped_loops_default_to_host() {
    let s = serial_loop(
        "f.s0.x",
        DeviceApi::Parent,
        Stmt::provide("f", vec![Expr::int(0)], vec![Expr::var("x")]),
    );
    let resolved = propagate_device(&s);
    let StmtNode::For { device, .. } = resolved.node() else { panic!() };
    assert_eq!(*device, DeviceApi::Host);
}

#[test]
fn explicit_tags_are_sticky_below_an_inheriting_loop() {
    let innermost = Stmt::provide("f", vec![Expr::int(0)], vec![Expr::var("x")]);
    let gpu = serial_loop("f.s0.x", DeviceApi::OpenCl, innermost);
    let host = serial_loop("f.s0.y", DeviceApi::Parent, gpu);

    let resolved = propagate_device(&host);

    let StmtNode::For { device, body, .. } = resolved.node() else { panic!() };
    assert_eq!(*device, DeviceApi::Host);
    let StmtNode::For { device, .. } = body.node() else { panic!() };
    assert_eq!(*device, DeviceApi::OpenCl);
}

//! Legal-placement computation and race rejection.

use crate::error::Error;
use crate::func::{Function, LoopLevel};
use crate::test::helpers::{lower, pointwise_producer, stencil_consumer};
use crate::validate::schedule_to_source;

#[test]
fn store_outside_a_parallel_loop_with_compute_inside_is_a_race() {
    let f = {
        let mut f = pointwise_producer("f");
        f.store_at("g", "yo");
        f.compute_at("g", "x");
        f
    };
    let mut g = stencil_consumer("g", "f");
    g.split("y", "yo", "yi", 8).parallel("yi");

    let err = lower(vec![f, g], &["g"], false).unwrap_err();
    let Error::InvalidSchedule { func, message } = err else {
        panic!("expected an invalid-schedule error, got {err}");
    };
    assert_eq!(func, "f");
    assert!(message.contains("race condition"), "missing race diagnostic:\n{message}");
    assert!(message.contains("legal locations"), "missing remediation:\n{message}");
}

#[test]
fn same_placement_is_accepted_when_the_loop_between_is_serial() {
    let f = {
        let mut f = pointwise_producer("f");
        f.store_at("g", "yo");
        f.compute_at("g", "x");
        f
    };
    let mut g = stencil_consumer("g", "f");
    g.split("y", "yo", "yi", 8);

    assert!(lower(vec![f, g], &["g"], false).is_ok());
}

#[test]
fn compute_at_a_loop_that_does_not_enclose_any_use_is_rejected() {
    let f = {
        let mut f = pointwise_producer("f");
        f.compute_at("nowhere", "z");
        f
    };
    let g = stencil_consumer("g", "f");

    let err = lower(vec![f, g], &["g"], false).unwrap_err();
    assert!(matches!(err, Error::InvalidSchedule { .. }), "got {err}");
}

#[test]
fn outputs_must_be_scheduled_root() {
    let mut g = stencil_consumer("g", "f");
    g.compute_at("h", "y");
    let f = pointwise_producer("f");

    let err = lower(vec![f, g], &["g"], false).unwrap_err();
    assert!(matches!(err, Error::OutputNotRoot { .. }), "got {err}");
}

#[test]
fn extern_inputs_must_not_be_inlined() {
    let f = {
        let mut f = pointwise_producer("f");
        f.compute_inline();
        f
    };
    let e = Function::new_extern(
        "e",
        vec!["x".to_owned(), "y".to_owned()],
        vec![prism_ir::ScalarType::Float32],
        "ext_stage",
        vec![crate::func::ExternArg::Func("f".to_owned())],
    );
    let out = stencil_consumer("out", "e");

    let err = lower(vec![f, e, out], &["out"], false).unwrap_err();
    assert!(matches!(err, Error::ExternInputInlined { .. }), "got {err}");
}

#[test]
fn placements_render_back_to_directive_source() {
    let f = pointwise_producer("f");
    assert_eq!(
        schedule_to_source(&f, &LoopLevel::inlined(), &LoopLevel::inlined()),
        "f.compute_inline();"
    );
    assert_eq!(
        schedule_to_source(&f, &LoopLevel::root(), &LoopLevel::root()),
        "f.compute_root();"
    );
    assert_eq!(
        schedule_to_source(&f, &LoopLevel::at("g", "yo"), &LoopLevel::at("g", "x")),
        "f.store_at(g, yo).compute_at(g, x);"
    );
}

//! Top-level driver: lower every function of the pipeline into one loop
//! nest, in reverse realization order.

use prism_ir::{DeviceApi, Expr, ForType, Stmt, StmtNode};
use tracing::debug;

use crate::cleanup::{propagate_device, strip_outermost_loops};
use crate::env::Env;
use crate::error::Result;
use crate::func::{LoopLevel, ROOT_VAR};
use crate::inject::InjectRealization;
use crate::inline::inline_function;
use crate::validate::validate_schedule;

/// Lower the pipeline to a single statement.
///
/// Walks the realization order backwards (consumers first): each function is
/// validated against the IR built so far, then either inlined into it or
/// spliced in by the realization injector. The synthetic root loop and the
/// per-stage `__outermost` loops are stripped afterwards and device tags
/// resolved. Returns the statement and whether any schedule was memoized.
#[tracing::instrument(skip_all, fields(funcs = order.len()))]
pub fn schedule_functions(
    outputs: &[String],
    order: &[String],
    env: &Env,
    inject_asserts: bool,
) -> Result<(Stmt, bool)> {
    // Outputs are stored in caller-provided memory. An output left at the
    // default inline level gets the root placement that models that.
    let mut env: Env = env.clone();
    for out in outputs {
        if let Some(f) = env.get_mut(out)
            && f.schedule().compute_level.is_inline()
            && f.schedule().store_level.is_inline()
        {
            f.schedule_mut().store_level = LoopLevel::root();
            f.schedule_mut().compute_level = LoopLevel::root();
        }
    }

    let root_var = format!(".{ROOT_VAR}");
    let mut s = Stmt::for_loop(
        &root_var,
        Expr::int(0),
        Expr::int(1),
        ForType::Serial,
        DeviceApi::Host,
        Stmt::evaluate(Expr::int(0)),
    );

    let mut any_memoized = false;

    for name in order.iter().rev() {
        let f = env.get(name).unwrap_or_else(|| panic!("{name} missing from environment")).clone();
        let is_output = outputs.iter().any(|o| o == name);

        validate_schedule(&f, &s, is_output, &env)?;

        if !f.values().is_empty()
            && !f.has_update_definition()
            && !f.has_extern_definition()
            && f.schedule().compute_level.is_inline()
        {
            debug!(func = %name, "inlining");
            s = inline_function(&s, &f);
        } else {
            debug!(func = %name, "injecting realization");
            let injector = InjectRealization::new(&f, &env, is_output, inject_asserts);
            let (mutated, found_store, found_compute) = injector.inject(&s)?;
            s = mutated;
            assert!(
                found_store && found_compute,
                "injection of {name} did not find both store and compute levels"
            );
        }
        any_memoized = any_memoized || f.schedule().memoized;
    }

    // The loop over root has served its purpose as a match target.
    let StmtNode::For { body, .. } = s.node() else {
        unreachable!("driver scaffolding must still be the outermost loop");
    };
    let s = body.clone();

    let s = strip_outermost_loops(&s);
    let s = propagate_device(&s);

    Ok((s, any_memoized))
}

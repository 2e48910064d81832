//! Composing a function's produce and update loop nests.
//!
//! A pure function lowers to one provide nest; updates each get their own
//! nest qualified into their stage namespace; an extern function lowers to a
//! checked call with positionally materialized buffer arguments.

use prism_ir::{
    CallType, Expr, ScalarType, Stmt, intrinsics, make_zero, qualify, unique_name,
};

use crate::env::Env;
use crate::error::Result;
use crate::func::{ExternArg, Function, stage_prefix};
use crate::loop_nest::build_provide_loop_nest;

/// Build the loop nest computing the initial definition of `f`, or the
/// checked extern call for an extern function.
///
/// The nest refers to external symbols `<prefix><arg>.min`/`.max` to define
/// the bounds over which it realizes; it performs no allocation.
pub fn build_produce(f: &Function, env: &Env) -> Result<Stmt> {
    let Some(extern_def) = f.extern_definition() else {
        let prefix = stage_prefix(f.name(), 0);

        let values: Vec<Expr> = f.values().iter().map(|v| qualify(&prefix, v)).collect();
        let site: Vec<Expr> =
            f.args().iter().map(|a| Expr::var(format!("{prefix}{a}"))).collect();

        return build_provide_loop_nest(f, &prefix, &site, &values, f.schedule(), false);
    };

    // Build the positional argument list of the extern call.
    let mut extern_call_args: Vec<Expr> = Vec::new();
    let mut lets: Vec<(String, Expr)> = Vec::new();

    for arg in &extern_def.args {
        match arg {
            ExternArg::Expr(e) => extern_call_args.push(e.clone()),
            ExternArg::Func(name) => {
                let input = env
                    .get(name)
                    .unwrap_or_else(|| panic!("extern input {name} is not in the environment"));
                for k in 0..input.outputs() {
                    let mut buf_name = input.name().to_owned();
                    if input.outputs() > 1 {
                        buf_name.push_str(&format!(".{k}"));
                    }
                    buf_name.push_str(".buffer");
                    extern_call_args.push(Expr::var_typed(buf_name, ScalarType::Handle));
                }
            }
            ExternArg::Buffer(name) | ExternArg::ImageParam(name) => {
                extern_call_args.push(Expr::var_typed(format!("{name}.buffer"), ScalarType::Handle));
            }
        }
    }

    // The output buffers. When the store level matches the compute level the
    // descriptors injected by allocation bounds inference are reused; when
    // it does not, a descriptor covering just this subregion is built here.
    if f.schedule().store_level.match_level(&f.schedule().compute_level) {
        for j in 0..f.outputs() {
            let mut buf_name = f.name().to_owned();
            if f.outputs() > 1 {
                buf_name.push_str(&format!(".{j}"));
            }
            buf_name.push_str(".buffer");
            extern_call_args.push(Expr::var_typed(buf_name, ScalarType::Handle));
        }
    } else {
        let mut stride_name = f.name().to_owned();
        if f.outputs() > 1 {
            stride_name.push_str(".0");
        }
        let stage_name = stage_prefix(f.name(), 0);
        for j in 0..f.outputs() {
            let top_left: Vec<Expr> = f
                .args()
                .iter()
                .map(|a| Expr::var(format!("{stage_name}{a}.min")))
                .collect();
            let host_ptr = Expr::call_indexed(
                f.output_types()[j],
                f.name(),
                top_left,
                CallType::Func,
                j,
            );
            let host_ptr = Expr::call(
                ScalarType::Handle,
                intrinsics::ADDRESS_OF,
                vec![host_ptr],
                CallType::Intrinsic,
            );

            let mut buffer_args = vec![host_ptr, make_zero(f.output_types()[j])];
            for (k, a) in f.args().iter().enumerate() {
                let var = format!("{stage_name}{a}");
                let min = Expr::var(format!("{var}.min"));
                let max = Expr::var(format!("{var}.max"));
                let stride = Expr::var(format!("{stride_name}.stride.{k}"));
                buffer_args.push(min.clone());
                buffer_args.push(max - min + 1);
                buffer_args.push(stride);
            }

            let descriptor = Expr::call(
                ScalarType::Handle,
                intrinsics::CREATE_BUFFER,
                buffer_args,
                CallType::Intrinsic,
            );

            let buf_name = format!("{}.{j}.tmp_buffer", f.name());
            extern_call_args.push(Expr::var_typed(&buf_name, ScalarType::Handle));
            lets.push((buf_name, descriptor));
        }
    }

    // Call the stage and assert it reported success.
    let call = Expr::call(
        ScalarType::Int32,
        &extern_def.function_name,
        extern_call_args,
        CallType::Extern,
    );
    let result_name = unique_name('t');
    let result = Expr::var(&result_name);
    let error = Expr::call(
        ScalarType::Int32,
        intrinsics::ERROR_EXTERN_STAGE_FAILED,
        vec![Expr::str_const(&extern_def.function_name), result.clone()],
        CallType::Extern,
    );
    let mut check = Stmt::assert_stmt(Expr::eq(result, Expr::int(0)), error);
    check = Stmt::let_stmt(result_name, call, check);

    for (name, value) in lets {
        check = Stmt::let_stmt(name, value, check);
    }

    Ok(check)
}

/// Build one loop nest per update definition of `f`, qualified into the
/// update's stage namespace, with reduction-variable loop bounds tied to the
/// externally supplied domain bounds.
pub fn build_update(f: &Function) -> Result<Vec<Stmt>> {
    let mut updates = Vec::with_capacity(f.updates().len());

    for (i, r) in f.updates().iter().enumerate() {
        let prefix = stage_prefix(f.name(), i + 1);

        let values: Vec<Expr> = r.values.iter().map(|v| qualify(&prefix, v)).collect();
        let site: Vec<Expr> = r.args.iter().map(|a| qualify(&prefix, a)).collect();

        let mut loop_nest = build_provide_loop_nest(f, &prefix, &site, &values, &r.schedule, true)?;

        if let Some(domain) = &r.domain {
            for rv in &domain.vars {
                let p = format!("{prefix}{}", rv.var);
                let rmin = Expr::var(format!("{p}.min"));
                let rmax = Expr::var(format!("{p}.max"));
                loop_nest = Stmt::let_stmt(format!("{p}.loop_min"), rmin.clone(), loop_nest);
                loop_nest = Stmt::let_stmt(format!("{p}.loop_max"), rmax.clone(), loop_nest);
                loop_nest = Stmt::let_stmt(format!("{p}.loop_extent"), rmax - rmin + 1, loop_nest);
            }
        }

        updates.push(loop_nest);
    }

    Ok(updates)
}

/// The `(produce, merged updates)` pair of a function. Updates are chained
/// into a right-associated block, last update innermost.
pub fn build_production(f: &Function, env: &Env) -> Result<(Stmt, Option<Stmt>)> {
    let produce = build_produce(f, env)?;
    let updates = build_update(f)?;

    let mut merged: Option<Stmt> = None;
    for u in updates.into_iter().rev() {
        merged = Stmt::block(Some(u), merged);
    }
    Ok((produce, merged))
}

/// Assertions checking that the explicit bounds a schedule promises are at
/// least as large as the bounds inference inferred, one per stage and bound.
pub fn inject_explicit_bounds(mut body: Stmt, func: &Function) -> Stmt {
    let s = func.schedule();
    for stage in 0..=func.updates().len() {
        for b in &s.bounds {
            let max_val = (b.extent.clone() + b.min.clone()) - 1;
            let min_val = b.min.clone();
            let prefix = format!("{}.s{stage}.{}", func.name(), b.var);
            let min_var = Expr::var(format!("{prefix}.min_unbounded"));
            let max_var = Expr::var(format!("{prefix}.max_unbounded"));
            let check = Expr::and(
                Expr::le(min_val.clone(), min_var.clone()),
                Expr::ge(max_val.clone(), max_var.clone()),
            );
            let error = Expr::call(
                ScalarType::Int32,
                intrinsics::ERROR_EXPLICIT_BOUNDS_TOO_SMALL,
                vec![
                    Expr::str_const(&b.var),
                    Expr::str_const(func.name()),
                    min_val,
                    max_val,
                    min_var,
                    max_var,
                ],
                CallType::Extern,
            );
            body = Stmt::block(Some(Stmt::assert_stmt(check, error)), Some(body))
                .expect("block of two statements");
        }
    }
    body
}

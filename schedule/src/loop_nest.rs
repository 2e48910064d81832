//! Loop-nest synthesis for one stage of one function.
//!
//! Turns a `Provide` of the stage's values into the scheduled loop nest:
//! splits, fuses, and renames are applied as substitutions plus bounds lets,
//! the loops themselves come from the dim list, and invariant lets are
//! hoisted as far out as their dependencies allow.

use std::collections::HashMap;

use prism_ir::{
    Expr, ForType, Stmt, StmtNode, expr_uses_var, is_zero, likely, simplify, simplify_stmt,
    substitute_stmt, unique_name,
};
use tracing::trace;

use crate::error::{ExactSplitDoesNotDivideSnafu, Result};
use crate::func::{Dim, Function, OUTERMOST, Schedule, Split};

/// Rebalance a split list so that the outermost split of any chain comes
/// first and renames of split results are coalesced into the split itself.
///
/// Given `X -> a*Xo + Xi` followed by `Xo -> b*Xoo + Xoi`, rewrites to
/// `X -> (a*b)*Xoo + s` and `s -> a*Xoi + Xi` with a fresh `s`; given a
/// rename `X -> Y` followed by any split of `Y`, the split is rewritten to
/// consume `X` directly and the rename dropped. A rename of a derived
/// variable can never be produced by the scheduling API and is an internal
/// error.
pub fn normalize_splits(splits: &[Split]) -> Vec<Split> {
    let mut splits = splits.to_vec();
    let mut i = 0;
    while i < splits.len() {
        let mut j = i + 1;
        while j < splits.len() {
            if splits[i].outer_name() != splits[j].old_var() {
                j += 1;
                continue;
            }
            assert!(
                !splits[j].is_rename(),
                "rename of derived variable {} found in splits list",
                splits[j].old_var()
            );

            if splits[i].is_rename() {
                // X -> Y; Y -> f*Z + W  becomes  X -> f*Z + W.
                let source = splits[i].old_var().to_owned();
                match &mut splits[j] {
                    Split::Var { old_var, .. } => *old_var = source,
                    Split::Fuse { .. } | Split::Rename { .. } => {
                        unreachable!("rename target consumed by a non-split transform")
                    }
                }
                splits.remove(i);
                // The list shifted under us; rescan from the start of the
                // affected range.
                j = i + 1;
                continue;
            }

            let Split::Var {
                old_var: f_old,
                inner: f_inner,
                factor: f_factor,
                exact: f_exact,
                partial: f_partial,
                ..
            } = splits[i].clone()
            else {
                unreachable!("fuse output consumed by a later split")
            };
            let Split::Var {
                outer: s_outer,
                inner: s_inner,
                factor: s_factor,
                exact: s_exact,
                partial: s_partial,
                ..
            } = splits[j].clone()
            else {
                unreachable!("fuse output consumed by a later split")
            };

            // X -> a*Xo + Xi; Xo -> b*Xoo + Xoi  becomes
            // X -> (a*b)*Xoo + s; s -> a*Xoi + Xi.
            let exact = f_exact || s_exact;
            let fresh = unique_name('s');
            splits[i] = Split::Var {
                old_var: f_old,
                outer: s_outer,
                inner: fresh.clone(),
                factor: simplify(&(f_factor.clone() * s_factor)),
                exact,
                partial: f_partial,
            };
            let rewritten = Split::Var {
                old_var: fresh,
                outer: s_inner,
                inner: f_inner,
                factor: f_factor,
                exact,
                partial: s_partial,
            };
            splits.remove(j);
            splits.insert(i + 1, rewritten);
            j += 1;
        }
        i += 1;
    }
    splits
}

/// A containing `For` loop or `LetStmt` during nest construction.
/// Loops carry their dim index; lets carry their value.
struct Container {
    dim_idx: Option<usize>,
    name: String,
    value: Option<Expr>,
}

/// Build the loop nest of one stage around a `Provide` node.
///
/// `prefix` is the stage namespace (`f.s<k>.`); `site` and `values` are
/// already qualified into it. Referenced-but-undefined symbols
/// (`<prefix><v>.min`/`.max`, reduction variable bounds) are the contract
/// with bounds inference.
pub fn build_provide_loop_nest(
    f: &Function,
    prefix: &str,
    site: &[Expr],
    values: &[Expr],
    s: &Schedule,
    is_update: bool,
) -> Result<Stmt> {
    trace!(func = f.name(), prefix, is_update, "building provide loop nest");

    // Innermost store node, wrapped from the inside out.
    let mut stmt = Stmt::provide(f.name(), values.to_vec(), site.to_vec());

    // Dimensions with a known static size: explicit bounds first, then the
    // reduction domain.
    let mut known_size_dims: HashMap<String, Expr> = HashMap::new();
    for b in &s.bounds {
        known_size_dims.insert(b.var.clone(), b.extent.clone());
    }
    if let Some(domain) = &s.reduction_domain {
        for rv in &domain.vars {
            known_size_dims.insert(rv.var.clone(), rv.extent.clone());
        }
    }

    let splits = normalize_splits(&s.splits);

    let innermost_non_trivial: Option<&Dim> = s
        .dims
        .iter()
        .find(|d| d.for_type != ForType::Vectorized && d.for_type != ForType::Unrolled);

    // Define the function args in terms of the loop variables.
    for split in &splits {
        match split {
            Split::Var { old_var, outer, inner, factor, exact, partial } => {
                let outer_var = Expr::var(format!("{prefix}{outer}"));
                let inner_var = Expr::var(format!("{prefix}{inner}"));
                let old_max = Expr::var(format!("{prefix}{old_var}.loop_max"));
                let old_min = Expr::var(format!("{prefix}{old_var}.loop_min"));

                known_size_dims.insert(inner.clone(), factor.clone());

                let mut base = outer_var * factor.clone() + old_min;

                let known_extent = known_size_dims.get(old_var).cloned();
                let divides = known_extent
                    .as_ref()
                    .is_some_and(|e| is_zero(&simplify(&(e.clone() % factor.clone()))));
                if divides {
                    // The factor provably divides the old extent; the outer
                    // extent is exact and no clamp is needed.
                    let extent = known_extent.unwrap();
                    known_size_dims.insert(outer.clone(), extent / factor.clone());
                } else if *exact {
                    return ExactSplitDoesNotDivideSnafu {
                        old_var: old_var.clone(),
                        outer: outer.clone(),
                        inner: inner.clone(),
                        factor: factor.to_string(),
                        extent: known_extent.map_or_else(|| "unknown".to_owned(), |e| e.to_string()),
                    }
                    .fail();
                } else if !is_update && !partial {
                    // Shift the last iteration backwards so the tail does
                    // not run off the end of the realization. The hint only
                    // pays off on the innermost serial loop, where it
                    // triggers loop partitioning.
                    let hinted = innermost_non_trivial
                        .is_some_and(|d| d.var == *outer && d.for_type == ForType::Serial);
                    if hinted {
                        base = likely(base);
                    }
                    base = Expr::min(base, old_max + (1 - factor.clone()));
                }

                let base_name = format!("{prefix}{inner}.base");
                let base_var = Expr::var(&base_name);
                let old_name = format!("{prefix}{old_var}");
                stmt = substitute_stmt(&old_name, &(base_var.clone() + inner_var.clone()), &stmt);
                stmt = Stmt::let_stmt(old_name, base_var + inner_var, stmt);
                stmt = Stmt::let_stmt(base_name, base, stmt);
            }
            Split::Fuse { fused, outer, inner } => {
                let fused_var = Expr::var(format!("{prefix}{fused}"));
                let inner_min = Expr::var(format!("{prefix}{inner}.loop_min"));
                let outer_min = Expr::var(format!("{prefix}{outer}.loop_min"));
                let inner_extent = Expr::var(format!("{prefix}{inner}.loop_extent"));

                // A zero-iteration fused block is never entered, but its
                // bounds expressions may be hoisted; the max keeps them
                // from dividing by zero.
                let factor = Expr::max(inner_extent, Expr::int(1));
                let inner_val = fused_var.clone() % factor.clone() + inner_min;
                let outer_val = fused_var / factor + outer_min;

                let inner_name = format!("{prefix}{inner}");
                let outer_name = format!("{prefix}{outer}");
                stmt = substitute_stmt(&inner_name, &inner_val, &stmt);
                stmt = substitute_stmt(&outer_name, &outer_val, &stmt);
                stmt = Stmt::let_stmt(inner_name, inner_val, stmt);
                stmt = Stmt::let_stmt(outer_name, outer_val, stmt);

                // Track the fused size for any later split of the fused dim.
                if let (Some(i), Some(o)) =
                    (known_size_dims.get(inner).cloned(), known_size_dims.get(outer).cloned())
                {
                    known_size_dims.insert(fused.clone(), i * o);
                }
            }
            Split::Rename { old_var, new_var } => {
                let new_expr = Expr::var(format!("{prefix}{new_var}"));
                let old_name = format!("{prefix}{old_var}");
                stmt = substitute_stmt(&old_name, &new_expr, &stmt);
                stmt = Stmt::let_stmt(old_name, new_expr, stmt);
            }
        }
    }

    // All containing lets and fors, outermost first.
    let mut nest: Vec<Container> = Vec::new();
    for i in (0..s.dims.len()).rev() {
        nest.push(Container {
            dim_idx: Some(i),
            name: format!("{prefix}{}", s.dims[i].var),
            value: None,
        });
    }

    // Strip the lets introduced above into the container list.
    loop {
        let StmtNode::LetStmt { name, value, body } = stmt.node() else { break };
        let (name, value, body) = (name.clone(), value.clone(), body.clone());
        nest.push(Container { dim_idx: None, name, value: Some(value) });
        stmt = body;
    }

    // Push the lets outward as far as their dependencies allow, by reverse
    // insertion sort starting at the first let.
    for i in s.dims.len()..nest.len() {
        for j in (0..i).rev() {
            let value = nest[j + 1].value.as_ref().expect("only lets are pushed up");
            if !expr_uses_var(value, &nest[j].name) {
                nest.swap(j + 1, j);
            } else {
                break;
            }
        }
    }

    // Rewrap the statement in the containing lets and fors.
    for container in nest.iter().rev() {
        if let Some(value) = &container.value {
            stmt = Stmt::let_stmt(&container.name, value.clone(), stmt);
        } else {
            let dim = &s.dims[container.dim_idx.expect("loop containers carry their dim")];
            let min = Expr::var(format!("{}.loop_min", container.name));
            let extent = Expr::var(format!("{}.loop_extent", container.name));
            stmt = Stmt::for_loop(&container.name, min, extent, dim.for_type, dim.device, stmt);
        }
    }

    // Define the bounds of the variables each split created.
    for split in splits.iter().rev() {
        let old_extent = Expr::var(format!("{prefix}{}.loop_extent", split.old_var()));
        let old_max = Expr::var(format!("{prefix}{}.loop_max", split.old_var()));
        let old_min = Expr::var(format!("{prefix}{}.loop_min", split.old_var()));
        match split {
            Split::Var { outer, inner, factor, partial, .. } => {
                let inner_extent = if *partial {
                    Expr::min(likely(factor.clone()), old_max.clone() + 1)
                } else {
                    factor.clone()
                };
                let outer_extent = (old_max - old_min + factor.clone()) / factor.clone();

                stmt = Stmt::let_stmt(format!("{prefix}{inner}.loop_min"), Expr::int(0), stmt);
                stmt = Stmt::let_stmt(
                    format!("{prefix}{inner}.loop_max"),
                    inner_extent.clone() - 1,
                    stmt,
                );
                stmt = Stmt::let_stmt(format!("{prefix}{inner}.loop_extent"), inner_extent, stmt);
                stmt = Stmt::let_stmt(format!("{prefix}{outer}.loop_min"), Expr::int(0), stmt);
                stmt = Stmt::let_stmt(
                    format!("{prefix}{outer}.loop_max"),
                    outer_extent.clone() - 1,
                    stmt,
                );
                stmt = Stmt::let_stmt(format!("{prefix}{outer}.loop_extent"), outer_extent, stmt);
            }
            Split::Fuse { fused, outer, inner } => {
                let inner_extent = Expr::var(format!("{prefix}{inner}.loop_extent"));
                let outer_extent = Expr::var(format!("{prefix}{outer}.loop_extent"));
                let fused_extent = inner_extent * outer_extent;
                stmt = Stmt::let_stmt(format!("{prefix}{fused}.loop_min"), Expr::int(0), stmt);
                stmt = Stmt::let_stmt(
                    format!("{prefix}{fused}.loop_max"),
                    fused_extent.clone() - 1,
                    stmt,
                );
                stmt = Stmt::let_stmt(format!("{prefix}{fused}.loop_extent"), fused_extent, stmt);
            }
            Split::Rename { new_var, .. } => {
                stmt = Stmt::let_stmt(format!("{prefix}{new_var}.loop_min"), old_min, stmt);
                stmt = Stmt::let_stmt(format!("{prefix}{new_var}.loop_max"), old_max, stmt);
                stmt = Stmt::let_stmt(format!("{prefix}{new_var}.loop_extent"), old_extent, stmt);
            }
        }
    }

    // The synthetic outermost dimension is a unit-extent loop.
    {
        let o = format!("{prefix}{OUTERMOST}");
        stmt = Stmt::let_stmt(format!("{o}.loop_min"), Expr::int(0), stmt);
        stmt = Stmt::let_stmt(format!("{o}.loop_max"), Expr::int(1), stmt);
        stmt = Stmt::let_stmt(format!("{o}.loop_extent"), Expr::int(1), stmt);
    }

    // Tie the loop bounds of each pure arg to the mins and maxes produced by
    // bounds inference.
    for arg in f.args() {
        let var = format!("{prefix}{arg}");
        let max = Expr::var(format!("{var}.max"));
        let min = Expr::var(format!("{var}.min"));
        stmt = Stmt::let_stmt(format!("{var}.loop_extent"), (max.clone() + 1) - min.clone(), stmt);
        stmt = Stmt::let_stmt(format!("{var}.loop_min"), min, stmt);
        stmt = Stmt::let_stmt(format!("{var}.loop_max"), max, stmt);
    }

    // Specialized copies, innermost condition last.
    for spec in s.specializations.iter().rev() {
        let cond = &spec.condition;
        let then_case = build_provide_loop_nest(f, prefix, site, values, &spec.schedule, is_update)?;

        let eq_var_value = match cond.node() {
            prism_ir::ExprNode::Binary(prism_ir::BinaryOp::Eq, a, b) => {
                a.as_var().map(|name| (name.to_owned(), b.clone()))
            }
            _ => None,
        };

        if let Some((var, value)) = eq_var_value {
            let then_case = simplify_stmt(&substitute_stmt(&var, &value, &then_case));
            let mut else_case = stmt;
            if value.ty().is_bool() {
                else_case = simplify_stmt(&substitute_stmt(&var, &Expr::not(value), &else_case));
            }
            stmt = Stmt::if_then_else(cond.clone(), then_case, Some(else_case));
        } else if let Some(var) = cond.as_var() {
            let then_case =
                simplify_stmt(&substitute_stmt(var, &Expr::bool_const(true), &then_case));
            let else_case = simplify_stmt(&substitute_stmt(var, &Expr::bool_const(false), &stmt));
            stmt = Stmt::if_then_else(cond.clone(), then_case, Some(else_case));
        } else {
            stmt = Stmt::if_then_else(cond.clone(), then_case, Some(stmt));
        }
    }

    Ok(stmt)
}

//! Schedule surgery helpers the auto-scheduler applies to the environment:
//! dim reordering, tiling splits, fusion, and stride-checked vectorization.
//!
//! Every helper keeps the dimension-estimate map in step with the dims it
//! rewrites; `-1` means unknown, and a name missing from the map reads as 0.

use indexmap::IndexMap;
use prism_ir::{
    BoundsBox, CallType, Expr, ExprNode, ForType, IRVisitor, finite_difference, is_simple_const,
    simplify, walk_expr,
};

use crate::advisor::cost::get_extent;
use crate::advisor::partition::GroupSched;
use crate::func::{Dim, Function, Split};

/// Per-variable extent estimates, `-1` for unknown.
pub type DimEstimates = IndexMap<String, i64>;

pub fn est(estimates: &DimEstimates, var: &str) -> i64 {
    estimates.get(var).copied().unwrap_or(0)
}

pub fn parallelize_dim(dims: &mut [Dim], dim: usize) {
    dims[dim].for_type = ForType::Parallel;
}

/// Move a dim to the outermost real slot, just inside `__outermost`.
pub fn move_dim_to_outermost(dims: &mut Vec<Dim>, dim: usize) {
    let moved = dims[dim].clone();
    let slot = dims.len() - 1;
    dims.insert(slot, moved);
    dims.remove(dim);
}

/// Split dim `dim` of the initial definition by `split_size`, naming the
/// pieces `<old>.<tag>.in` / `<old>.<tag>.out`, and update the estimates.
pub fn split_dim(
    f: &mut Function,
    dim: usize,
    split_size: i64,
    estimates: &mut DimEstimates,
    tag: &str,
    partial: bool,
) {
    let schedule = f.schedule_mut();
    let old_name = schedule.dims[dim].var.clone();
    let inner_name = format!("{old_name}.{tag}.in");
    let outer_name = format!("{old_name}.{tag}.out");

    let template = schedule.dims[dim].clone();
    schedule.dims.insert(dim, template);
    schedule.dims[dim].var = inner_name.clone();
    schedule.dims[dim + 1].var = outer_name.clone();

    schedule.splits.push(Split::Var {
        old_var: old_name.clone(),
        outer: outer_name.clone(),
        inner: inner_name.clone(),
        factor: Expr::int(split_size),
        exact: false,
        partial,
    });
    schedule.touched = true;

    estimates.insert(inner_name.clone(), split_size);
    let old_estimate = est(estimates, &old_name);
    if old_estimate != -1 {
        estimates.insert(outer_name, (old_estimate + split_size - 1) / split_size);
    } else {
        estimates.insert(inner_name, -1);
    }
    estimates.shift_remove(&old_name);
}

/// Fuse the dim at `outer_idx` into the dim at `inner_idx` (evaluated after
/// the outer dim is removed), returning the fused name `<inner>.<outer>`.
pub fn fuse_dim(
    f: &mut Function,
    outer_idx: usize,
    inner_idx: usize,
    estimates: &mut DimEstimates,
) -> String {
    let schedule = f.schedule_mut();

    let outer_name = schedule.dims[outer_idx].var.clone();
    let outer_pure = schedule.dims[outer_idx].pure_dim;
    schedule.dims.remove(outer_idx);

    let inner_name = schedule.dims[inner_idx].var.clone();
    let fused_name = format!("{inner_name}.{outer_name}");
    schedule.dims[inner_idx].var = fused_name.clone();
    schedule.dims[inner_idx].pure_dim &= outer_pure;

    let out_estimate = est(estimates, &outer_name);
    let in_estimate = est(estimates, &inner_name);
    if in_estimate > 0 && out_estimate > 0 {
        estimates.insert(fused_name.clone(), out_estimate * in_estimate);
    } else {
        estimates.insert(fused_name.clone(), -1);
    }
    estimates.shift_remove(&outer_name);
    estimates.shift_remove(&inner_name);

    schedule.splits.push(Split::Fuse {
        fused: fused_name.clone(),
        outer: outer_name,
        inner: inner_name,
    });
    schedule.touched = true;
    fused_name
}

/// Vectorize dim `dim`, splitting off a `vec` lane dimension first when a
/// width is given.
pub fn vectorize_dim(f: &mut Function, estimates: &mut DimEstimates, dim: usize, vec_width: i64) {
    if vec_width != -1 {
        split_dim(f, dim, vec_width, estimates, "vec", false);
    }
    f.schedule_mut().dims[dim].for_type = ForType::Vectorized;
}

/// Is the extent of dim `dim` known to be at least `min_size`? Unknown
/// extents are treated optimistically.
pub fn check_dim_size(
    f: &Function,
    dim: usize,
    min_size: i64,
    pipeline_bounds: &IndexMap<String, BoundsBox>,
) -> bool {
    let Some(b) = pipeline_bounds.get(f.name()) else { return true };
    for (i, var) in f.args().iter().enumerate() {
        if f.schedule().dims[dim].var == *var {
            let extent = get_extent(&b[i]);
            return if extent >= 0 { extent >= min_size } else { true };
        }
    }
    true
}

struct LoadArgs {
    args: Vec<(String, Vec<Expr>)>,
}

impl IRVisitor for LoadArgs {
    fn visit_expr(&mut self, e: &Expr) {
        if let ExprNode::Call { name, args, call_type: CallType::Func, .. } = e.node() {
            self.args.push((name.clone(), args.clone()));
        }
        walk_expr(self, e);
    }
}

/// `(callee, argument list)` of every function load in any definition of
/// `f`.
pub fn collect_load_args_by_name(f: &Function) -> Vec<(String, Vec<Expr>)> {
    let mut collector = LoadArgs { args: Vec::new() };
    for v in f.values() {
        collector.visit_expr(v);
    }
    for u in f.updates() {
        for e in u.args.iter().chain(&u.values) {
            collector.visit_expr(e);
        }
    }
    collector.args
}

/// Argument lists of every function load in any definition of `f`.
pub fn collect_load_args(f: &Function) -> Vec<Vec<Expr>> {
    collect_load_args_by_name(f).into_iter().map(|(_, args)| args).collect()
}

/// Per-dimension extent estimates of `f`, keyed by dimension name.
pub fn get_extent_estimate_map(
    f: &Function,
    pipeline_bounds: &IndexMap<String, BoundsBox>,
) -> DimEstimates {
    f.args()
        .iter()
        .enumerate()
        .map(|(i, arg)| {
            (arg.clone(), crate::advisor::partition::get_extent_estimate(f, pipeline_bounds, i))
        })
        .collect()
}

/// Vectorize dim `inner_dim` only if every load has a constant stride along
/// it, verified by finite differencing the load index.
pub fn simple_vectorize(
    f: &mut Function,
    estimates: &mut DimEstimates,
    inner_dim: usize,
    vec_width: i64,
) {
    if inner_dim >= f.args().len() {
        return;
    }
    let load_args = collect_load_args(f);
    let var = f.args()[inner_dim].clone();
    let mut constant_stride = true;
    for args in &load_args {
        if let Some(arg) = args.get(inner_dim) {
            let diff = simplify(&finite_difference(arg, &var));
            constant_stride = constant_stride && is_simple_const(&diff);
        }
    }
    if constant_stride {
        vectorize_dim(f, estimates, inner_dim, vec_width);
    }
}

/// Choose (and if necessary create, by fusing tiled dims) an outer dim with
/// enough iterations to keep the machine's cores busy. Returns the index of
/// the chosen dim, or -1 when none qualifies.
pub fn pick_dim_to_parallelize(
    f: &mut Function,
    estimates: &mut DimEstimates,
    parallelism: i64,
    sched: &GroupSched,
    num_fused_dims: &mut usize,
) -> i64 {
    let mut outer_dim = f.schedule().dims.len() as i64 - 2;
    let num_tile_dims = sched.tile_sizes.iter().filter(|&&t| t > 1).count();

    if num_tile_dims > 0 {
        for _ in 0..num_tile_dims {
            if outer_dim < 1 {
                break;
            }
            let var = f.schedule().dims[outer_dim as usize].var.clone();
            if est(estimates, &var) > parallelism {
                break;
            }
            fuse_dim(f, outer_dim as usize, outer_dim as usize - 1, estimates);
            outer_dim = f.schedule().dims.len() as i64 - 2;
            *num_fused_dims += 1;
        }
    } else {
        for i in (1..=outer_dim.max(0) as usize).rev() {
            if i >= f.schedule().dims.len() {
                continue;
            }
            let var = f.schedule().dims[i].var.clone();
            if est(estimates, &var) > parallelism {
                move_dim_to_outermost(&mut f.schedule_mut().dims, i);
                break;
            }
        }
    }
    outer_dim
}

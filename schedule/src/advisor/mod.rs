//! The auto-scheduler: infers store/compute levels, tilings, parallel dims,
//! and vector widths for every function the user left unscheduled, and
//! writes them back into the environment.

pub mod cost;
pub mod dependence;
pub mod partition;
pub mod surgery;

use indexmap::IndexMap;
use prism_ir::{
    BoundsBox, Expr, ExprNode, FuncValueBounds, Interval, is_one_to_one, is_simple_const,
    merge_boxes,
};
use tracing::{debug, info};

use crate::advisor::cost::{FuncCostMap, func_cost};
use crate::advisor::dependence::DependenceAnalysis;
use crate::advisor::partition::{GroupSched, Level, MachineParams, Partitioner};
use crate::advisor::surgery::{
    check_dim_size, est, get_extent_estimate_map, move_dim_to_outermost, parallelize_dim,
    pick_dim_to_parallelize, simple_vectorize, split_dim,
};
use crate::env::Env;
use crate::func::LoopLevel;
use crate::parallel_rvar::can_parallelize_rvar;
use crate::validate::schedule_to_source;

/// Toggles of the advisor.
#[derive(Debug, Clone, Copy)]
pub struct AdvisorOpts {
    /// Rewrite every compute/store level to root before analysis.
    pub root_default: bool,
    /// Inline trivial single-consumer functions up front.
    pub auto_inline: bool,
    /// Parallelize the chosen outer dims.
    pub auto_par: bool,
    /// Vectorize innermost dims with constant stride.
    pub auto_vec: bool,
}

impl Default for AdvisorOpts {
    fn default() -> Self {
        Self { root_default: true, auto_inline: true, auto_par: true, auto_vec: true }
    }
}

/// Do all outputs carry complete, constant explicit bounds?
fn check_bounds_on_outputs(outputs: &[String], env: &Env) -> bool {
    for out in outputs {
        let f = &env[out];
        let bounds = &f.schedule().bounds;
        if bounds.len() != f.args().len() {
            return false;
        }
        for b in bounds {
            if !f.args().contains(&b.var)
                || b.min.as_const_int().is_none()
                || b.extent.as_const_int().is_none()
            {
                return false;
            }
        }
    }
    true
}

/// Inline functions that are obviously free to inline: a single consumer,
/// a single call site, and every call argument either one-to-one in its
/// variable or a plain constant.
pub fn simple_inline(
    all_calls: &IndexMap<String, Vec<Vec<Expr>>>,
    consumers: &IndexMap<String, Vec<String>>,
    env: &mut Env,
) -> IndexMap<String, String> {
    let mut inlines = IndexMap::new();
    for (name, calls) in all_calls {
        if !env.contains_key(name) {
            continue;
        }
        let mut all_one_to_one = true;
        let mut num_calls = 0;
        for args in calls {
            num_calls += 1;
            for arg in args {
                // Casts confuse the injectivity check; skip them.
                let one_to_one =
                    !matches!(arg.node(), ExprNode::Cast { .. }) && is_one_to_one(arg);
                all_one_to_one = all_one_to_one && (one_to_one || is_simple_const(arg));
            }
        }
        let consumer_list = consumers.get(name).map_or(&[][..], Vec::as_slice);
        if consumer_list.len() == 1 && all_one_to_one && num_calls == 1 {
            inlines.insert(name.clone(), consumer_list[0].clone());
            let f = env.get_mut(name).expect("checked above");
            f.schedule_mut().store_level = LoopLevel::inlined();
            f.schedule_mut().compute_level = LoopLevel::inlined();
        }
    }
    inlines
}

/// Argument lists of every function call made anywhere in `f`'s stages,
/// plus the consumer relation, accumulated across the environment.
fn collect_calls(env: &Env) -> (IndexMap<String, Vec<Vec<Expr>>>, IndexMap<String, Vec<String>>) {
    let mut all_calls: IndexMap<String, Vec<Vec<Expr>>> = IndexMap::new();
    let mut consumers: IndexMap<String, Vec<String>> = IndexMap::new();

    for (name, f) in env {
        let mut per_callee: IndexMap<String, Vec<Vec<Expr>>> = IndexMap::new();
        for args in surgery::collect_load_args_by_name(f) {
            per_callee.entry(args.0).or_default().push(args.1);
        }
        for (callee, sites) in per_callee {
            consumers.entry(callee.clone()).or_default().push(name.clone());
            all_calls.entry(callee).or_default().extend(sites);
        }
    }
    (all_calls, consumers)
}

/// Infer schedules for the pipeline, mutating `env` in place.
///
/// Decisions happen in three phases: obvious inlines, greedy fast-memory
/// grouping with tile selection, then per-group schedule emission (splits,
/// reorders, parallel dim, vectorization, member store/compute levels).
#[tracing::instrument(skip_all, fields(funcs = env.len()))]
pub fn schedule_advisor(
    outputs: &[String],
    _order: &[String],
    env: &mut Env,
    func_val_bounds: &FuncValueBounds,
    opts: &AdvisorOpts,
) {
    if opts.root_default {
        // Complete partial schedules by resetting placement only; splits
        // already applied to the domain are kept.
        for f in env.values_mut() {
            f.schedule_mut().store_level = LoopLevel::root();
            f.schedule_mut().compute_level = LoopLevel::root();
        }
    }

    let func_cost_map: FuncCostMap =
        env.iter().map(|(name, f)| (name.clone(), func_cost(f))).collect();

    let (all_calls, consumers) = collect_calls(env);

    let mut inlines = if opts.auto_inline {
        simple_inline(&all_calls, &consumers, env)
    } else {
        IndexMap::new()
    };
    debug!(inlines = ?inlines, "early inline decisions");

    // Dependence analysis: per function, the regions of upstream functions
    // required to compute a region of it.
    let analy = DependenceAnalysis::new(env, func_val_bounds);

    let mut pipeline_bounds: IndexMap<String, BoundsBox> = IndexMap::new();
    if check_bounds_on_outputs(outputs, env) {
        for out in outputs {
            let f = &env[out];
            let mut bounds: Vec<(i64, i64)> = Vec::new();
            let mut eval: Vec<bool> = Vec::new();
            for var in f.args() {
                let mut found = false;
                for b in &f.schedule().bounds {
                    if b.var == *var
                        && let (Some(bmin), Some(bextent)) =
                            (b.min.as_const_int(), b.extent.as_const_int())
                    {
                        bounds.push((bmin, bmin + bextent - 1));
                        eval.push(true);
                        found = true;
                    }
                }
                if !found {
                    bounds.push((-1, -1));
                    eval.push(false);
                }
            }

            let mut regions = analy.concrete_dep_regions(out, &eval, &bounds);

            // The output's own region joins the pipeline bounds too.
            let out_box: BoundsBox = bounds
                .iter()
                .map(|(min, max)| Interval::new(Expr::int(*min), Expr::int(*max)))
                .collect();
            regions.insert(out.clone(), out_box);

            for (name, region) in regions {
                match pipeline_bounds.get_mut(&name) {
                    Some(existing) => merge_boxes(existing, &region),
                    None => {
                        pipeline_bounds.insert(name, region);
                    }
                }
            }
        }
    }

    // Grouping.
    let arch_params = MachineParams::from_env();
    let mut part =
        Partitioner::new(&pipeline_bounds, inlines.clone(), &analy, &func_cost_map, arch_params);
    part.option_cache.clear();
    part.group(Level::FastMem);

    let groups = part.groups.clone();
    let group_sched = part.group_sched.clone();
    let arch_params = part.arch_params.clone();
    inlines = part.inlines.clone();
    drop(part);
    drop(analy);

    // Producers the partitioner decided to inline lose their placement.
    for name in inlines.keys() {
        if let Some(f) = env.get_mut(name) {
            f.schedule_mut().store_level = LoopLevel::inlined();
            f.schedule_mut().compute_level = LoopLevel::inlined();
        }
    }

    emit_group_schedules(&groups, &group_sched, &inlines, &pipeline_bounds, &arch_params, env, opts);

    for (name, f) in env.iter() {
        info!(
            func = %name,
            schedule = %schedule_to_source(f, &f.schedule().store_level, &f.schedule().compute_level),
            "advised schedule"
        );
    }
}

/// Write the grouping decisions back onto the environment as concrete
/// schedule directives.
fn emit_group_schedules(
    groups: &IndexMap<String, Vec<String>>,
    group_sched: &IndexMap<String, GroupSched>,
    inlines: &IndexMap<String, String>,
    pipeline_bounds: &IndexMap<String, BoundsBox>,
    arch_params: &MachineParams,
    env: &mut Env,
    opts: &AdvisorOpts,
) {
    let vec_len = arch_params.vec_len;
    let parallelism = arch_params.parallelism;

    for (g_name, members) in groups {
        assert!(!inlines.contains_key(g_name), "a group output cannot be inlined");
        let sched = group_sched[g_name].clone();

        // The dims chosen for tiling, before any surgery moves them.
        let (vars, tile_sizes): (Vec<String>, IndexMap<String, i64>) = {
            let g_out = &env[g_name];
            let dims = &g_out.schedule().dims;
            if dims.is_empty() {
                continue;
            }
            let mut vars = Vec::new();
            let mut sizes = IndexMap::new();
            for i in 0..dims.len() - 1 {
                if i < sched.tile_sizes.len() && sched.tile_sizes[i] != -1 {
                    vars.push(dims[i].var.clone());
                    sizes.insert(dims[i].var.clone(), sched.tile_sizes[i]);
                }
            }
            (vars, sizes)
        };

        let mut dim_estimates = get_extent_estimate_map(&env[g_name], pipeline_bounds);

        // Realize the tiling: split each chosen dim and move its outer half
        // outward, in a fixed order.
        let mut num_tile_dims = 0;
        for v in &vars {
            let g_out = env.get_mut(g_name).expect("group output must exist");
            let index = g_out
                .schedule()
                .dims
                .iter()
                .take(g_out.schedule().dims.len() - 1)
                .position(|d| d.var == *v)
                .expect("tiled dim must still exist");
            if tile_sizes[v] > 1 {
                split_dim(g_out, index, tile_sizes[v], &mut dim_estimates, "tile", false);
                move_dim_to_outermost(&mut g_out.schedule_mut().dims, index + 1);
            } else if tile_sizes[v] == 1 {
                move_dim_to_outermost(&mut g_out.schedule_mut().dims, index);
            }
            num_tile_dims += 1;
        }

        let mut num_fused_dims = 0;
        {
            let g_out = env.get_mut(g_name).expect("group output must exist");
            if g_out.is_pure() {
                // Vectorize first; the same dim may otherwise be claimed for
                // parallelism.
                if opts.auto_vec && check_dim_size(g_out, 0, vec_len, pipeline_bounds) {
                    simple_vectorize(g_out, &mut dim_estimates, 0, vec_len);
                }
                let outer_dim = pick_dim_to_parallelize(
                    g_out,
                    &mut dim_estimates,
                    parallelism,
                    &sched,
                    &mut num_fused_dims,
                );
                if opts.auto_par && outer_dim != -1 {
                    parallelize_dim(&mut g_out.schedule_mut().dims, outer_dim as usize);
                }
            } else {
                let outer_dim = pick_dim_to_parallelize(
                    g_out,
                    &mut dim_estimates,
                    parallelism,
                    &sched,
                    &mut num_fused_dims,
                );
                if opts.auto_par && outer_dim != -1 {
                    parallelize_dim(&mut g_out.schedule_mut().dims, outer_dim as usize);
                }

                // Updates: parallelize the outermost reduction dim that both
                // permits it and has enough iterations.
                let updates = g_out.updates().to_vec();
                let func_name = g_out.name().to_owned();
                for (i, u) in updates.iter().enumerate() {
                    // Reduction extents are not in the pipeline bounds;
                    // take them from the domain itself.
                    if let Some(domain) = &u.domain {
                        for rv in &domain.vars {
                            if let Some(extent) = rv.extent.as_const_int() {
                                dim_estimates.entry(rv.var.clone()).or_insert(extent);
                            }
                        }
                    }
                    let dims_len = g_out.update_schedule(i).dims.len();
                    if dims_len < 2 {
                        continue;
                    }
                    for d in (1..=dims_len - 2).rev() {
                        let var = g_out.update_schedule(i).dims[d].var.clone();
                        if can_parallelize_rvar(&var, &func_name, u)
                            && est(&dim_estimates, &var) > parallelism
                        {
                            let dims = &mut g_out.update_schedule_mut(i).dims;
                            move_dim_to_outermost(dims, d);
                            let outer = dims.len() - 2;
                            parallelize_dim(dims, outer);
                            g_out.update_schedule_mut(i).touched = true;
                            break;
                        }
                    }
                }
            }
        }

        // Non-output members compute and store at the consumer's tile loop.
        let (outer_dim, dims_snapshot): (usize, Vec<String>) = {
            let dims = &env[g_name].schedule().dims;
            (dims.len().saturating_sub(2), dims.iter().map(|d| d.var.clone()).collect())
        };
        for m in members {
            if m == g_name || inlines.contains_key(m) || num_tile_dims == 0 {
                continue;
            }
            let compute_level = outer_dim as isize + num_fused_dims as isize + 1 - num_tile_dims as isize;
            assert!(
                compute_level >= 0 && (compute_level as usize) < dims_snapshot.len(),
                "tile level index out of range for group {g_name}"
            );
            let compute_level = compute_level as usize;
            let level = LoopLevel::at(g_name, &dims_snapshot[compute_level]);
            let member = env.get_mut(m).expect("group member must exist");
            member.schedule_mut().store_level = level.clone();
            member.schedule_mut().compute_level = level;
            member.schedule_mut().touched = true;

            if member.is_pure()
                && opts.auto_vec
                && check_dim_size(member, 0, vec_len, pipeline_bounds)
            {
                simple_vectorize(member, &mut dim_estimates, 0, vec_len);
            }
        }
    }
}

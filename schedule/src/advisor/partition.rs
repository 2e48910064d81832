//! The partitioner: greedy grouping of producers into their consumers,
//! choosing tile sizes by a two-level memory cost model.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use prism_ir::{BoundsBox, Interval};
use tracing::debug;

use crate::advisor::cost::{
    FuncCostMap, get_extent, get_func_mem, get_func_op_cost, overlap_cost_set, region_cost_set,
    region_size_set,
};
use crate::advisor::dependence::DependenceAnalysis;
use crate::func::Function;
use crate::graph::find_direct_calls;

/// Cost-model description of the target machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineParams {
    pub parallelism: i64,
    pub vec_len: i64,
    /// Fast-memory working-set budget per group, in bytes.
    pub fast_mem_size: i64,
    /// Working-set budget below which inlining is considered free.
    pub inline_size: i64,
    /// Relative cost of a slow-memory load vs a fast-memory load.
    pub balance_fast_mem: i64,
    pub balance_inline: i64,
}

impl Default for MachineParams {
    fn default() -> Self {
        Self {
            parallelism: 8,
            vec_len: 8,
            fast_mem_size: 256 * 1024,
            inline_size: 32 * 4,
            balance_fast_mem: 10,
            balance_inline: 4,
        }
    }
}

impl MachineParams {
    /// Defaults with environment-variable overrides.
    ///
    /// # Environment Variables
    ///
    /// * `PRISM_PARALLELISM=N` - worker cores to fill
    /// * `PRISM_VEC_LEN=N` - vector lanes
    /// * `PRISM_FAST_MEM=N` - fast-memory size in bytes
    /// * `PRISM_BALANCE=N` - slow/fast load cost ratio
    pub fn from_env() -> Self {
        let mut params = Self::default();
        let read = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<i64>().ok());
        if let Some(v) = read("PRISM_PARALLELISM")
            && v > 0
        {
            params.parallelism = v;
        }
        if let Some(v) = read("PRISM_VEC_LEN")
            && v > 0
        {
            params.vec_len = v;
        }
        if let Some(v) = read("PRISM_FAST_MEM")
            && v > 0
        {
            params.fast_mem_size = v;
        }
        if let Some(v) = read("PRISM_BALANCE")
            && v > 0
        {
            params.balance_fast_mem = v;
        }
        params
    }
}

/// Granularity a merge is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Tile size 1 in every dimension: the producer is inlined.
    Inline,
    /// Outer tiles sized to keep the group's working set in fast memory.
    FastMem,
}

/// Tiling decision recorded for a group's output.
#[derive(Debug, Clone)]
pub struct GroupSched {
    /// Per-dimension tile size of the output, `-1` for untiled.
    pub tile_sizes: Vec<i64>,
    pub benefit: f64,
}

/// A candidate merge of a producer group into its sole consumer group,
/// computed at the granularity of `tile_sizes` on the consumer output.
#[derive(Debug, Clone)]
pub struct MergeOption {
    pub prod_group: String,
    pub cons_group: String,
    pub tile_sizes: Vec<i64>,
    /// Estimated saving in slow-memory traffic, minus redundant work.
    /// `-1` marks an unevaluable or rejected option.
    pub benefit: f64,
    /// Work performed beyond what the unfused pipeline does.
    pub redundant_work: f64,
}

impl MergeOption {
    fn rejected(prod_group: String, cons_group: String) -> Self {
        Self { prod_group, cons_group, tile_sizes: Vec::new(), benefit: -1.0, redundant_work: -1.0 }
    }
}

/// Maximum-extent estimate of one dimension of `f`, from its explicit
/// bounds and the pipeline bounds.
pub fn get_extent_estimate(
    f: &Function,
    pipeline_bounds: &IndexMap<String, BoundsBox>,
    dim: usize,
) -> i64 {
    let mut estimate = -1;
    for b in &f.schedule().bounds {
        if b.var == f.args()[dim]
            && let (Some(bmin), Some(bextent)) = (b.min.as_const_int(), b.extent.as_const_int())
        {
            estimate = bmin + bextent - 1;
        }
    }

    if let Some(bounds) = pipeline_bounds.get(f.name()) {
        let extent = get_extent(&bounds[dim]);
        if extent > 0 {
            estimate = estimate.max(extent);
        }
    }

    estimate
}

/// Greedy group merger. Every function starts in its own group; producers
/// with a single consumer group are folded in whenever the cost model finds
/// a positive benefit, until a fixpoint.
pub struct Partitioner<'a> {
    pipeline_bounds: &'a IndexMap<String, BoundsBox>,
    pub inlines: IndexMap<String, String>,
    analy: &'a DependenceAnalysis,
    func_cost: &'a FuncCostMap,

    /// group output name -> member function names
    pub groups: IndexMap<String, Vec<String>>,
    pub group_sched: IndexMap<String, GroupSched>,
    children: IndexMap<String, IndexSet<String>>,

    func_dim_estimates: IndexMap<String, Vec<i64>>,
    func_op: IndexMap<String, i64>,
    func_mem: IndexMap<String, i64>,

    pub option_cache: HashMap<(String, String), MergeOption>,
    pub arch_params: MachineParams,
}

impl<'a> Partitioner<'a> {
    pub fn new(
        pipeline_bounds: &'a IndexMap<String, BoundsBox>,
        inlines: IndexMap<String, String>,
        analy: &'a DependenceAnalysis,
        func_cost: &'a FuncCostMap,
        arch_params: MachineParams,
    ) -> Self {
        let mut part = Self {
            pipeline_bounds,
            inlines,
            analy,
            func_cost,
            groups: IndexMap::new(),
            group_sched: IndexMap::new(),
            children: IndexMap::new(),
            func_dim_estimates: IndexMap::new(),
            func_op: IndexMap::new(),
            func_mem: IndexMap::new(),
            option_cache: HashMap::new(),
            arch_params,
        };

        // Each function starts in its own group.
        for name in part.analy.env.keys() {
            part.groups.insert(name.clone(), vec![name.clone()]);
        }

        // Consumer edges relate groups to their children.
        for (name, f) in &part.analy.env {
            for callee in find_direct_calls(f) {
                part.children.entry(callee).or_default().insert(name.clone());
            }
        }

        // Functions inlined up front join their consumer's group.
        let pending: Vec<(String, String)> =
            part.inlines.iter().map(|(a, b)| (a.clone(), b.clone())).collect();
        for (inlined, dest) in pending {
            let dest_group = if part.groups.contains_key(&dest) {
                dest
            } else {
                part.groups
                    .iter()
                    .find(|(_, members)| members.contains(&dest))
                    .map(|(g, _)| g.clone())
                    .unwrap_or(dest)
            };
            part.merge_groups(&inlined, &dest_group);
        }

        for (name, _) in &part.groups {
            let output = &part.analy.env[name];
            let sched = GroupSched {
                tile_sizes: vec![-1; output.args().len()],
                benefit: -1.0,
            };
            part.group_sched.insert(name.clone(), sched);
        }

        for (name, f) in &part.analy.env {
            let mut dim_estimates = Vec::with_capacity(f.args().len());
            let mut size: i64 = 1;
            for i in 0..f.args().len() {
                let estimate = get_extent_estimate(f, part.pipeline_bounds, i);
                dim_estimates.push(estimate);
                if estimate != -1 && size != -1 {
                    size *= estimate;
                } else {
                    size = -1;
                }
            }
            let (work, mem) = if size != -1 {
                (
                    get_func_op_cost(&part.func_cost[name]) * size,
                    get_func_mem(&part.func_cost[name]) * size,
                )
            } else {
                (size, size)
            };
            part.func_op.insert(name.clone(), work);
            part.func_mem.insert(name.clone(), mem);
            part.func_dim_estimates.insert(name.clone(), dim_estimates);
        }

        part
    }

    fn merge_groups(&mut self, cand_group: &str, child_group: &str) {
        debug!(producer = cand_group, consumer = child_group, "merging groups");
        assert!(self.groups.contains_key(child_group), "merge target group must exist");
        let cand_members = self.groups.shift_remove(cand_group).unwrap_or_default();
        self.groups
            .get_mut(child_group)
            .expect("merge target group must exist")
            .extend(cand_members);

        self.children.shift_remove(cand_group);
        for children in self.children.values_mut() {
            if children.shift_remove(cand_group) {
                children.insert(child_group.to_owned());
            }
        }

        // Stale cost estimates touching the merge target are dropped.
        self.option_cache
            .retain(|(prod, cons), _| prod != child_group && cons != child_group);
    }

    /// Merge groups at the given level until no positive-benefit option
    /// remains.
    pub fn group(&mut self, level: Level) {
        loop {
            // Producers with exactly one consumer group are candidates.
            let cand_pairs: Vec<(String, String)> = self
                .groups
                .keys()
                .filter_map(|g| {
                    let children = self.children.get(g)?;
                    (children.len() == 1)
                        .then(|| (g.clone(), children.first().unwrap().clone()))
                })
                .collect();
            debug!(candidates = ?cand_pairs, ?level, "grouping iteration");

            let best = match level {
                Level::Inline => self.choose_candidate_inline(&cand_pairs),
                Level::FastMem => self.choose_candidate(&cand_pairs),
            };

            let Some(best) = best else { break };
            if best.benefit == -1.0 {
                break;
            }

            if level == Level::Inline {
                // The producer group is folded away entirely; its levels are
                // blanked by the caller once grouping settles.
                self.inlines.insert(best.prod_group.clone(), best.cons_group.clone());
            }
            self.merge_groups(&best.prod_group, &best.cons_group);
            self.group_sched.insert(
                best.cons_group.clone(),
                GroupSched { tile_sizes: best.tile_sizes, benefit: best.benefit },
            );
        }
    }

    fn choose_candidate_inline(&mut self, cand_pairs: &[(String, String)]) -> Option<MergeOption> {
        let mut best: Option<MergeOption> = None;

        for pair in cand_pairs {
            let cand = if let Some(cached) = self.option_cache.get(pair) {
                cached.clone()
            } else {
                let args_len = self.analy.env[&pair.1].args().len();
                let mut opt = MergeOption {
                    prod_group: pair.0.clone(),
                    cons_group: pair.1.clone(),
                    tile_sizes: vec![1; args_len],
                    benefit: -1.0,
                    redundant_work: -1.0,
                };
                self.evaluate_option(&mut opt, Level::Inline);
                self.option_cache.insert(pair.clone(), opt.clone());
                opt
            };
            if best.as_ref().is_none_or(|b| b.benefit < cand.benefit) {
                best = Some(cand);
            }
        }
        best
    }

    fn choose_candidate(&mut self, cand_pairs: &[(String, String)]) -> Option<MergeOption> {
        // Outer-tile widths tried on successively deeper suffixes of the
        // consumer's dim list.
        const SIZE_VARIANTS: [i64; 6] = [256, 128, 64, 32, 16, 8];

        let mut best: Option<MergeOption> = None;

        for pair in cand_pairs {
            if let Some(cached) = self.option_cache.get(pair) {
                if best.as_ref().is_none_or(|b| b.benefit < cached.benefit) {
                    best = Some(cached.clone());
                }
                continue;
            }

            let args_len = self.analy.env[&pair.1].args().len();

            // Only producers whose materialized output exceeds fast memory
            // are candidates at this level; smaller producers already live
            // in cache and fusing them buys nothing.
            let mut invalid = false;
            let prod = &self.analy.env[&pair.0];
            let mut prod_out_size: i64 =
                prod.output_types().iter().map(|t| t.bytes() as i64).sum();
            let dim_estimates_prod = &self.func_dim_estimates[&pair.0];
            for &estimate in dim_estimates_prod {
                if estimate == -1 {
                    invalid = true;
                } else {
                    prod_out_size *= estimate;
                }
            }
            if prod_out_size < self.arch_params.fast_mem_size {
                invalid = true;
            }

            let mut cand_best = MergeOption::rejected(pair.0.clone(), pair.1.clone());
            if !invalid {
                for i in (0..args_len).rev() {
                    for s in SIZE_VARIANTS {
                        let mut tile_sizes = vec![-1; i];
                        tile_sizes.extend(std::iter::repeat_n(s, args_len - i));
                        let mut opt = MergeOption {
                            prod_group: pair.0.clone(),
                            cons_group: pair.1.clone(),
                            tile_sizes,
                            benefit: -1.0,
                            redundant_work: -1.0,
                        };
                        self.evaluate_option(&mut opt, Level::FastMem);
                        if cand_best.benefit < opt.benefit {
                            cand_best = opt;
                        }
                    }
                }
            }

            self.option_cache.insert(pair.clone(), cand_best.clone());
            if best.as_ref().is_none_or(|b| b.benefit < cand_best.benefit) {
                best = Some(cand_best);
            }
        }
        best
    }

    /// Estimate the benefit of one merge option: slow-memory loads saved by
    /// keeping the group's working set in fast memory, minus the redundant
    /// work the tiling introduces.
    fn evaluate_option(&mut self, opt: &mut MergeOption, level: Level) {
        let cons = self.analy.env[&opt.cons_group].clone();
        let args_len = cons.args().len();
        assert_eq!(opt.tile_sizes.len(), args_len, "one tile size per consumer dimension");

        let dim_estimates_cons = self.func_dim_estimates[&opt.cons_group].clone();
        if dim_estimates_cons.iter().any(|&e| e == -1) {
            // Unknown extents make the whole option unevaluable.
            opt.benefit = -1.0;
            opt.redundant_work = -1.0;
            return;
        }

        let mut bounds: Vec<(i64, i64)> = Vec::with_capacity(args_len);
        let mut eval: Vec<bool> = Vec::with_capacity(args_len);
        let mut cons_box = BoundsBox::new();
        for i in 0..args_len {
            if opt.tile_sizes[i] != -1 {
                if dim_estimates_cons[i] >= opt.tile_sizes[i] {
                    bounds.push((0, opt.tile_sizes[i] - 1));
                    cons_box.push(Interval::new(
                        prism_ir::Expr::int(0),
                        prism_ir::Expr::int(opt.tile_sizes[i] - 1),
                    ));
                } else {
                    // Dimension too small to tile; fall back to its extent.
                    opt.tile_sizes[i] = -1;
                    bounds.push((0, dim_estimates_cons[i] - 1));
                    cons_box.push(Interval::new(
                        prism_ir::Expr::int(0),
                        prism_ir::Expr::int(dim_estimates_cons[i] - 1),
                    ));
                }
            } else {
                bounds.push((0, dim_estimates_cons[i] - 1));
                cons_box.push(Interval::new(
                    prism_ir::Expr::int(0),
                    prism_ir::Expr::int(dim_estimates_cons[i] - 1),
                ));
            }
            eval.push(true);
        }

        let mut estimate_tiles: i64 = 1;
        let mut partial_tiles: f64 = 1.0;
        for i in 0..args_len {
            if opt.tile_sizes[i] != -1 {
                estimate_tiles *= (dim_estimates_cons[i] + opt.tile_sizes[i] - 1) / opt.tile_sizes[i];
                partial_tiles *= dim_estimates_cons[i] as f64 / opt.tile_sizes[i] as f64;
            }
        }

        let conc_reg = self.analy.concrete_dep_regions(&opt.cons_group, &eval, &bounds);
        let conc_overlaps = self.analy.concrete_overlap_regions(&opt.cons_group, &eval, &bounds);

        // Members of both groups, except the consumer output itself.
        let mut prod_funcs: Vec<String> = self.groups[&opt.prod_group].clone();
        prod_funcs.extend(
            self.groups[&opt.cons_group].iter().filter(|f| **f != opt.cons_group).cloned(),
        );

        // Inlined members occupy no storage when grouping for fast memory.
        let mut mem_reg: IndexMap<String, BoundsBox> = IndexMap::new();
        let mut prod_comp: IndexMap<String, BoundsBox> = IndexMap::new();
        for f in &prod_funcs {
            let region = conc_reg.get(f).cloned().unwrap_or_default();
            if !self.inlines.contains_key(f) || level == Level::Inline {
                mem_reg.insert(f.clone(), region.clone());
            }
            prod_comp.insert(f.clone(), region);
        }
        mem_reg.insert(opt.cons_group.clone(), cons_box);

        let inter_s = region_size_set(&mem_reg, &self.analy.env, &self.analy.func_dep_regions);

        let mut red_work_tile: i64 = 0;
        for i in 0..args_len {
            if opt.tile_sizes[i] != -1 {
                let dir_red_work = overlap_cost_set(
                    &opt.cons_group,
                    &prod_funcs,
                    &conc_overlaps,
                    self.func_cost,
                    Some(i),
                );
                if dir_red_work != -1 {
                    red_work_tile += dir_red_work;
                } else {
                    red_work_tile = -1;
                    break;
                }
            }
        }

        let work_per_tile = region_cost_set(&prod_comp, self.func_cost);
        let total_work = work_per_tile as f64 * partial_tiles;

        let mut original_work: i64 = 0;
        let mut total_mem: i64 = 0;
        for f in &prod_funcs {
            let work = self.func_op[f];
            if work != -1 {
                original_work += work;
                total_mem += self.func_mem[f];
            } else {
                opt.benefit = -1.0;
                opt.redundant_work = -1.0;
                return;
            }
        }
        total_mem += self.func_mem[&opt.cons_group];

        opt.redundant_work = (total_work - original_work as f64).max(0.0);

        debug!(
            prod = %opt.prod_group,
            cons = %opt.cons_group,
            tile_sizes = ?opt.tile_sizes,
            work_per_tile,
            estimate_tiles,
            partial_tiles,
            total_work,
            total_mem,
            original_work,
            intermediate_size = inter_s,
            red_work_tile,
            redundant_work = opt.redundant_work,
            "evaluating merge option"
        );

        assert!(total_mem > 0 && total_work > 0.0, "cost model fed a zero-traffic group");

        // Two-level memory model: traffic saved scales with how much of the
        // working set stays resident; past twice the budget nothing does.
        let (budget, balance) = match level {
            Level::Inline => (self.arch_params.inline_size, self.arch_params.balance_inline),
            Level::FastMem => (self.arch_params.fast_mem_size, self.arch_params.balance_fast_mem),
        };
        if inter_s <= budget {
            opt.benefit = total_mem as f64 * balance as f64 - opt.redundant_work;
        } else if inter_s <= 2 * budget {
            let hit = (2 * budget - inter_s).max(0) as f64 / inter_s as f64;
            let loads_saved = hit * total_mem as f64;
            opt.benefit = loads_saved * balance as f64 - opt.redundant_work;
        }

        if self.arch_params.parallelism > estimate_tiles {
            // Not enough tiles to keep the cores busy.
            opt.benefit = -1.0;
        }
        debug!(benefit = opt.benefit, "option evaluated");
    }
}

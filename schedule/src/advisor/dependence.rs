//! Dependence analysis: symbolic footprints of every function and the
//! per-dimension overlap between adjacent tiles.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use prism_ir::{
    BoundsBox, Expr, FuncValueBounds, Interval, Scope, boxes_required, interval_intersect,
    merge_boxes, simplify, simplify_box, substitute_map,
};
use tracing::trace;

use crate::env::Env;
use crate::func::Function;

/// Regions of upstream producers required to compute `f` over `sym_bounds`
/// (one `(lower, upper)` expression pair per dimension of `f`).
///
/// The analysis assumes dependence patterns are uniform over the range of
/// the function; a non-uniform pattern costs accuracy, never correctness.
pub fn regions_required(
    f: &Function,
    sym_bounds: &[(Expr, Expr)],
    env: &Env,
    func_val_bounds: &FuncValueBounds,
) -> IndexMap<String, BoundsBox> {
    let bounds: BoundsBox = sym_bounds
        .iter()
        .map(|(l, u)| Interval::new(l.clone(), u.clone()))
        .collect();

    let mut regions: IndexMap<String, BoundsBox> = IndexMap::new();
    let mut queue: VecDeque<(String, BoundsBox)> = VecDeque::new();
    queue.push_back((f.name().to_owned(), bounds));

    while let Some((curr_name, curr_bounds)) = queue.pop_front() {
        // Producers outside the environment (image inputs) terminate the
        // recursion; their region is still recorded below.
        let Some(curr_f) = env.get(&curr_name) else { continue };

        for value in curr_f.values() {
            let mut scope = Scope::new();
            for (arg, interval) in curr_f.args().iter().zip(&curr_bounds) {
                scope.insert(
                    arg.clone(),
                    Interval::new(simplify(&interval.min), simplify(&interval.max)),
                );
            }
            let curr_regions = boxes_required(value, &scope, func_val_bounds);
            for (producer, region) in curr_regions {
                match regions.get_mut(&producer) {
                    Some(existing) => merge_boxes(existing, &region),
                    None => {
                        regions.insert(producer.clone(), region.clone());
                    }
                }
                queue.push_back((producer, region));
            }
        }
    }

    for region in regions.values_mut() {
        simplify_box(region);
    }
    regions
}

/// Overlap between the producer regions of a tile of `f` and those of the
/// adjacent tile along dimension `dir`: the required regions are recomputed
/// with the `dir` bounds shifted by one extent and intersected dimension-
/// wise. A producer absent from the shifted regions contributes no overlap
/// along this direction.
pub fn redundant_regions(
    f: &Function,
    dir: usize,
    sym_bounds: &[(Expr, Expr)],
    env: &Env,
    func_val_bounds: &FuncValueBounds,
) -> IndexMap<String, BoundsBox> {
    let regions = regions_required(f, sym_bounds, env, func_val_bounds);

    let shifted_bounds: Vec<(Expr, Expr)> = sym_bounds
        .iter()
        .enumerate()
        .map(|(arg, (l, u))| {
            if arg == dir {
                let len = u.clone() - l.clone() + 1;
                (l.clone() + len.clone(), u.clone() + len)
            } else {
                (l.clone(), u.clone())
            }
        })
        .collect();

    let regions_shifted = regions_required(f, &shifted_bounds, env, func_val_bounds);

    let mut overlaps: IndexMap<String, BoundsBox> = IndexMap::new();
    for (producer, region) in &regions {
        let Some(shifted) = regions_shifted.get(producer) else { continue };
        assert_eq!(region.len(), shifted.len(), "footprints of {producer} changed rank");
        let intersected: BoundsBox = region
            .iter()
            .zip(shifted)
            .map(|(a, b)| interval_intersect(a, b))
            .collect();
        overlaps.insert(producer.clone(), intersected);
    }

    for region in overlaps.values_mut() {
        simplify_box(region);
    }
    overlaps
}

/// Substitute concrete bounds for the symbolic `_l`/`_u` pairs of a region
/// map. Dimensions whose endpoints do not fold to constants fall back to
/// the producer's explicit bound for that dimension, when one exists.
pub fn sym_to_concrete_bounds(
    sym: &[(String, String)],
    bounds: &[(i64, i64)],
    eval: &[bool],
    sym_regions: &IndexMap<String, BoundsBox>,
    env: &Env,
) -> IndexMap<String, BoundsBox> {
    let mut replacements: HashMap<String, Expr> = HashMap::new();
    for ((lower, upper), (bound, use_it)) in sym.iter().zip(bounds.iter().zip(eval)) {
        if *use_it {
            replacements.insert(lower.clone(), Expr::int(bound.0));
            replacements.insert(upper.clone(), Expr::int(bound.1));
        }
    }

    let mut concrete_regions = IndexMap::new();
    for (name, region) in sym_regions {
        let mut concrete: BoundsBox = BoundsBox::new();
        for (i, interval) in region.iter().enumerate() {
            let mut lower = simplify(&substitute_map(&replacements, &interval.min));
            let mut upper = simplify(&substitute_map(&replacements, &interval.max));

            if let Some(f) = env.get(name) {
                if lower.as_const_int().is_none() {
                    for b in &f.schedule().bounds {
                        if i < f.args().len() && b.var == f.args()[i] {
                            lower = b.min.clone();
                        }
                    }
                }
                if upper.as_const_int().is_none() {
                    for b in &f.schedule().bounds {
                        if i < f.args().len()
                            && b.var == f.args()[i]
                            && let (Some(bmin), Some(bextent)) =
                                (b.min.as_const_int(), b.extent.as_const_int())
                        {
                            upper = Expr::int(bmin + bextent - 1);
                        }
                    }
                }
            }

            concrete.push(Interval::new(lower, upper));
        }
        concrete_regions.insert(name.clone(), concrete);
    }
    concrete_regions
}

/// Per-function footprints computed once up front: symbolic required
/// regions and per-dimension tile overlaps, concretized on demand.
pub struct DependenceAnalysis {
    pub env: Env,
    pub func_val_bounds: FuncValueBounds,
    /// producer regions required per function, over symbolic bounds
    pub func_dep_regions: IndexMap<String, IndexMap<String, BoundsBox>>,
    /// per function, one overlap map per dimension
    pub func_overlaps: IndexMap<String, Vec<IndexMap<String, BoundsBox>>>,
    /// the `(lower, upper)` symbol names introduced per dimension
    pub func_sym: IndexMap<String, Vec<(String, String)>>,
}

impl DependenceAnalysis {
    pub fn new(env: &Env, func_val_bounds: &FuncValueBounds) -> Self {
        let mut analysis = Self {
            env: env.clone(),
            func_val_bounds: func_val_bounds.clone(),
            func_dep_regions: IndexMap::new(),
            func_overlaps: IndexMap::new(),
            func_sym: IndexMap::new(),
        };

        for (name, f) in env {
            let mut syms = Vec::new();
            let mut sym_bounds = Vec::new();
            for arg in f.args() {
                let lower = format!("{arg}_l");
                let upper = format!("{arg}_u");
                sym_bounds.push((Expr::var(&lower), Expr::var(&upper)));
                syms.push((lower, upper));
            }
            analysis.func_sym.insert(name.clone(), syms);

            let regions = regions_required(f, &sym_bounds, env, func_val_bounds);
            trace!(func = %name, producers = regions.len(), "computed required regions");
            analysis.func_dep_regions.insert(name.clone(), regions);

            let overlaps: Vec<_> = (0..f.args().len())
                .map(|arg| redundant_regions(f, arg, &sym_bounds, env, func_val_bounds))
                .collect();
            analysis.func_overlaps.insert(name.clone(), overlaps);
        }

        analysis
    }

    /// Required regions of `name` with numeric bounds substituted in.
    pub fn concrete_dep_regions(
        &self,
        name: &str,
        eval: &[bool],
        bounds: &[(i64, i64)],
    ) -> IndexMap<String, BoundsBox> {
        sym_to_concrete_bounds(
            &self.func_sym[name],
            bounds,
            eval,
            &self.func_dep_regions[name],
            &self.env,
        )
    }

    /// Per-dimension overlap regions of `name`, concretized.
    pub fn concrete_overlap_regions(
        &self,
        name: &str,
        eval: &[bool],
        bounds: &[(i64, i64)],
    ) -> Vec<IndexMap<String, BoundsBox>> {
        self.func_overlaps[name]
            .iter()
            .map(|dir| sym_to_concrete_bounds(&self.func_sym[name], bounds, eval, dir, &self.env))
            .collect()
    }
}

//! The cost model: areas, sizes, arithmetic cost, and overlap cost of
//! symbolic regions.
//!
//! Any quantity that does not fold to a numeric constant is reported as
//! `-1`, which disables the option being evaluated rather than erroring.

use indexmap::IndexMap;
use prism_ir::{
    BoundsBox, CallType, Expr, ExprNode, IRVisitor, Interval, walk_expr,
};

use crate::env::Env;
use crate::func::Function;
use crate::graph::realization_order;

/// Operation and load counts of one value expression.
///
/// This runs strictly on value expressions; statement nodes cannot appear
/// inside an `Expr`, so the structural invariant of the original (cost
/// estimation never sees statements) holds by construction.
#[derive(Debug, Default)]
pub struct ExprCost {
    pub ops: i64,
    pub loads: i64,
}

impl IRVisitor for ExprCost {
    fn visit_expr(&mut self, e: &Expr) {
        match e.node() {
            ExprNode::Const(_) | ExprNode::Var { .. } => {}
            ExprNode::Cast { .. } | ExprNode::Binary(..) | ExprNode::Not(_) | ExprNode::Select { .. } => {
                self.ops += 1;
            }
            ExprNode::Call { call_type, .. } => match call_type {
                CallType::Func | CallType::Image => self.loads += 1,
                CallType::Intrinsic => self.ops += 1,
                CallType::Extern => {}
            },
            ExprNode::Let { .. } => {}
        }
        walk_expr(self, e);
    }
}

/// `(ops, loads)` of every value expression of a function.
pub fn func_cost(f: &Function) -> Vec<(i64, i64)> {
    f.values()
        .iter()
        .map(|v| {
            let mut cost = ExprCost::default();
            cost.visit_expr(v);
            (cost.ops, cost.loads)
        })
        .collect()
}

/// Per-function cost table keyed by name.
pub type FuncCostMap = IndexMap<String, Vec<(i64, i64)>>;

/// Constant extent of an interval: `-1` when symbolic, `0` when empty.
pub fn get_extent(i: &Interval) -> i64 {
    match i.constant_extent() {
        Some(extent) => extent,
        None => -1,
    }
}

/// Product of the extents of a box. `-1` if any dimension is symbolic,
/// `0` if any dimension is empty. The empty box has area 1.
pub fn box_area(b: &BoundsBox) -> i64 {
    let mut area: i64 = 1;
    for interval in b {
        let extent = get_extent(interval);
        if extent > 0 && area > 0 {
            area *= extent;
        } else if extent == 0 {
            area = 0;
            break;
        } else {
            area = -1;
        }
    }
    area
}

/// Bytes of storage one region of `func` occupies: area times the summed
/// output element sizes. Producers outside the environment store nothing
/// the pipeline allocates.
pub fn region_size(func: &str, region: &BoundsBox, env: &Env) -> i64 {
    let area = box_area(region);
    if area < 0 {
        return -1;
    }
    let size: i64 = env
        .get(func)
        .map(|f| f.output_types().iter().map(|t| t.bytes() as i64).sum())
        .unwrap_or(0);
    area * size
}

/// High-water mark of live intermediate bytes over a set of regions.
///
/// Walks the regions in realization order, growing by each region's size
/// and shrinking when the last consumer of a region has been visited.
pub fn region_size_set(
    regions: &IndexMap<String, BoundsBox>,
    env: &Env,
    func_dep_regions: &IndexMap<String, IndexMap<String, BoundsBox>>,
) -> i64 {
    let mut num_consumers: IndexMap<&str, i64> =
        regions.keys().map(|name| (name.as_str(), 0)).collect();

    for name in regions.keys() {
        if let Some(producers) = func_dep_regions.get(name) {
            for producer in producers.keys() {
                if regions.contains_key(producer) {
                    *num_consumers.get_mut(producer.as_str()).unwrap() += 1;
                }
            }
        }
    }

    let outs: Vec<String> = num_consumers
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(name, _)| (*name).to_owned())
        .collect();
    assert_eq!(outs.len(), 1, "a group must have exactly one output");

    let order = realization_order(&outs, env);

    let mut func_sizes: IndexMap<&str, i64> = IndexMap::new();
    for (name, region) in regions {
        let size = region_size(name, region, env);
        if size < 0 {
            return -1;
        }
        func_sizes.insert(name.as_str(), size);
    }

    let mut working_set_size: i64 = 0;
    let mut curr_size: i64 = 0;
    for name in &order {
        curr_size += func_sizes.get(name.as_str()).copied().unwrap_or(0);
        working_set_size = working_set_size.max(curr_size);
        if let Some(producers) = func_dep_regions.get(name) {
            for producer in producers.keys() {
                if let Some(count) = num_consumers.get_mut(producer.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        curr_size -= func_sizes.get(producer.as_str()).copied().unwrap_or(0);
                    }
                }
            }
        }
    }

    working_set_size
}

/// One plus the summed op counts across a function's tuple outputs.
pub fn get_func_op_cost(costs: &[(i64, i64)]) -> i64 {
    1 + costs.iter().map(|(ops, _)| ops).sum::<i64>()
}

/// Summed load counts across a function's tuple outputs.
pub fn get_func_mem(costs: &[(i64, i64)]) -> i64 {
    costs.iter().map(|(_, loads)| loads).sum()
}

/// Arithmetic cost of computing one region of `func`.
pub fn region_cost(func: &str, region: &BoundsBox, func_cost: &FuncCostMap) -> i64 {
    let area = box_area(region);
    if area < 0 {
        return -1;
    }
    let op_cost = get_func_op_cost(&func_cost[func]);
    area * op_cost
}

/// Summed arithmetic cost of a region set; `-1` propagates.
pub fn region_cost_set(regions: &IndexMap<String, BoundsBox>, func_cost: &FuncCostMap) -> i64 {
    let mut total: i64 = 0;
    for (name, region) in regions {
        let cost = region_cost(name, region, func_cost);
        if cost < 0 {
            return -1;
        }
        total += cost;
    }
    total
}

/// Redundant work recomputing the overlap of `prod` between adjacent tiles
/// of the consumer, in the given dimension (or all when `None`).
pub fn overlap_cost(
    prod: &str,
    overlaps: &[IndexMap<String, BoundsBox>],
    func_cost: &FuncCostMap,
    dim: Option<usize>,
) -> i64 {
    let mut total_area: i64 = 0;
    for (d, overlap) in overlaps.iter().enumerate() {
        if let Some(region) = overlap.get(prod)
            && dim.is_none_or(|wanted| wanted == d)
        {
            let area = box_area(region);
            if area < 0 {
                return -1;
            }
            total_area += area;
        }
    }
    let op_cost = get_func_op_cost(&func_cost[prod]);
    total_area * op_cost
}

/// Summed overlap cost across producers, skipping the consumer itself.
pub fn overlap_cost_set(
    cons: &str,
    prods: &[String],
    overlaps: &[IndexMap<String, BoundsBox>],
    func_cost: &FuncCostMap,
    dim: Option<usize>,
) -> i64 {
    let mut total: i64 = 0;
    for p in prods {
        if p != cons {
            let cost = overlap_cost(p, overlaps, func_cost, dim);
            if cost < 0 {
                return -1;
            }
            total += cost;
        }
    }
    total
}

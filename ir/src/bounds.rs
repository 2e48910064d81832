//! Interval evaluation of expressions and call-footprint collection.
//!
//! `bounds_of_expr_in_scope` evaluates an index expression over a scope of
//! variable intervals; `boxes_required` walks an expression and reports, per
//! callee, the box of values it reads. These are the footprint primitives the
//! dependence analysis is built on.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::expr::{Expr, ExprNode, intrinsics};
use crate::interval::{BoundsBox, Interval, merge_boxes};
use crate::simplify::simplify;
use crate::types::{BinaryOp, CallType};

/// Variable environment for interval evaluation.
pub type Scope = HashMap<String, Interval>;

/// Known value ranges of pipeline functions, keyed by `(name, value_index)`.
/// Supplied by the caller; functions without an entry are treated as opaque.
pub type FuncValueBounds = HashMap<(String, usize), Interval>;

/// Evaluate the interval of `e` given intervals for its free variables.
///
/// Variables absent from the scope (and opaque calls) evaluate to the point
/// interval containing themselves, so downstream constant checks degrade to
/// "symbolic" rather than failing.
pub fn bounds_of_expr_in_scope(e: &Expr, scope: &Scope, func_bounds: &FuncValueBounds) -> Interval {
    match e.node() {
        ExprNode::Const(_) => Interval::point(e.clone()),
        ExprNode::Var { name, .. } => match scope.get(name) {
            Some(interval) => interval.clone(),
            None => Interval::point(e.clone()),
        },
        ExprNode::Cast { value, .. } => bounds_of_expr_in_scope(value, scope, func_bounds),
        ExprNode::Binary(op, a, b) => {
            let ia = bounds_of_expr_in_scope(a, scope, func_bounds);
            let ib = bounds_of_expr_in_scope(b, scope, func_bounds);
            bounds_of_binary(*op, &ia, &ib, e)
        }
        ExprNode::Not(_) => Interval::point(e.clone()),
        ExprNode::Select { then_case, else_case, .. } => {
            let it = bounds_of_expr_in_scope(then_case, scope, func_bounds);
            let ie = bounds_of_expr_in_scope(else_case, scope, func_bounds);
            Interval {
                min: simplify(&Expr::min(it.min, ie.min)),
                max: simplify(&Expr::max(it.max, ie.max)),
            }
        }
        ExprNode::Call { name, args, call_type, value_index, .. } => {
            if *call_type == CallType::Intrinsic && name == intrinsics::LIKELY {
                return bounds_of_expr_in_scope(&args[0], scope, func_bounds);
            }
            if *call_type == CallType::Func
                && let Some(interval) = func_bounds.get(&(name.clone(), *value_index))
            {
                return interval.clone();
            }
            Interval::point(e.clone())
        }
        ExprNode::Let { name, value, body } => {
            let value_bounds = bounds_of_expr_in_scope(value, scope, func_bounds);
            let mut inner = scope.clone();
            inner.insert(name.clone(), value_bounds);
            bounds_of_expr_in_scope(body, &inner, func_bounds)
        }
    }
}

fn bounds_of_binary(op: BinaryOp, a: &Interval, b: &Interval, original: &Expr) -> Interval {
    use BinaryOp::*;
    let interval = match op {
        Add => Interval {
            min: Expr::binary(Add, a.min.clone(), b.min.clone()),
            max: Expr::binary(Add, a.max.clone(), b.max.clone()),
        },
        Sub => Interval {
            min: Expr::binary(Sub, a.min.clone(), b.max.clone()),
            max: Expr::binary(Sub, a.max.clone(), b.min.clone()),
        },
        Mul => {
            if let Some(k) = point_const(b) {
                scale_interval(a, k, Mul)
            } else if let Some(k) = point_const(a) {
                scale_interval(b, k, Mul)
            } else {
                corner_interval(Mul, a, b)
            }
        }
        Div => {
            if let Some(k) = point_const(b)
                && k != 0
            {
                scale_interval(a, k, Div)
            } else {
                // Unknown divisor: give up and stay symbolic.
                return Interval::point(original.clone());
            }
        }
        Mod => {
            if let Some(k) = point_const(b)
                && k > 0
            {
                Interval { min: Expr::int(0), max: Expr::int(k - 1) }
            } else {
                return Interval::point(original.clone());
            }
        }
        Min => Interval {
            min: Expr::min(a.min.clone(), b.min.clone()),
            max: Expr::min(a.max.clone(), b.max.clone()),
        },
        Max => Interval {
            min: Expr::max(a.min.clone(), b.min.clone()),
            max: Expr::max(a.max.clone(), b.max.clone()),
        },
        // Boolean results; the enclosing expression is not an index.
        Eq | Ne | Lt | Le | Gt | Ge | And | Or => return Interval::point(original.clone()),
    };
    Interval { min: simplify(&interval.min), max: simplify(&interval.max) }
}

fn point_const(i: &Interval) -> Option<i64> {
    let min = i.min.as_const_int()?;
    let max = i.max.as_const_int()?;
    (min == max).then_some(min)
}

fn scale_interval(i: &Interval, k: i64, op: BinaryOp) -> Interval {
    let apply = |e: &Expr| Expr::binary(op, e.clone(), Expr::int(k));
    if k >= 0 {
        Interval { min: apply(&i.min), max: apply(&i.max) }
    } else {
        Interval { min: apply(&i.max), max: apply(&i.min) }
    }
}

fn corner_interval(op: BinaryOp, a: &Interval, b: &Interval) -> Interval {
    let corners = [
        Expr::binary(op, a.min.clone(), b.min.clone()),
        Expr::binary(op, a.min.clone(), b.max.clone()),
        Expr::binary(op, a.max.clone(), b.min.clone()),
        Expr::binary(op, a.max.clone(), b.max.clone()),
    ];
    let min = corners.iter().skip(1).fold(corners[0].clone(), |acc, c| Expr::min(acc, c.clone()));
    let max = corners.iter().skip(1).fold(corners[0].clone(), |acc, c| Expr::max(acc, c.clone()));
    Interval { min, max }
}

/// Per-callee boxes of every `Func` and `Image` call inside `e`, evaluated
/// under `scope`. Boxes of repeated callees are unioned.
pub fn boxes_required(
    e: &Expr,
    scope: &Scope,
    func_bounds: &FuncValueBounds,
) -> IndexMap<String, BoundsBox> {
    let mut boxes = IndexMap::new();
    collect_boxes(e, scope, func_bounds, &mut boxes);
    boxes
}

fn collect_boxes(
    e: &Expr,
    scope: &Scope,
    func_bounds: &FuncValueBounds,
    boxes: &mut IndexMap<String, BoundsBox>,
) {
    match e.node() {
        ExprNode::Const(_) | ExprNode::Var { .. } => {}
        ExprNode::Cast { value, .. } => collect_boxes(value, scope, func_bounds, boxes),
        ExprNode::Binary(_, a, b) => {
            collect_boxes(a, scope, func_bounds, boxes);
            collect_boxes(b, scope, func_bounds, boxes);
        }
        ExprNode::Not(a) => collect_boxes(a, scope, func_bounds, boxes),
        ExprNode::Select { cond, then_case, else_case } => {
            collect_boxes(cond, scope, func_bounds, boxes);
            collect_boxes(then_case, scope, func_bounds, boxes);
            collect_boxes(else_case, scope, func_bounds, boxes);
        }
        ExprNode::Call { name, args, call_type, .. } => {
            for a in args {
                collect_boxes(a, scope, func_bounds, boxes);
            }
            if matches!(call_type, CallType::Func | CallType::Image) {
                let arg_box: BoundsBox =
                    args.iter().map(|a| bounds_of_expr_in_scope(a, scope, func_bounds)).collect();
                match boxes.get_mut(name) {
                    Some(existing) => merge_boxes(existing, &arg_box),
                    None => {
                        boxes.insert(name.clone(), arg_box);
                    }
                }
            }
        }
        ExprNode::Let { name, value, body } => {
            collect_boxes(value, scope, func_bounds, boxes);
            let value_bounds = bounds_of_expr_in_scope(value, scope, func_bounds);
            let mut inner = scope.clone();
            inner.insert(name.clone(), value_bounds);
            collect_boxes(body, &inner, func_bounds, boxes);
        }
    }
}

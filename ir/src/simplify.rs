//! Bottom-up expression simplifier.
//!
//! Constant folding plus the algebraic identities the scheduling passes
//! lean on: proving that a known extent divides a split factor, collapsing
//! specialization branches after substitution, and folding the concrete
//! bounds the partitioner instantiates down to integer immediates.
//!
//! Integer division and modulo are Euclidean, matching the semantics the
//! loop-nest builder assumes for split arithmetic.

use std::collections::BTreeMap;

use crate::expr::{Expr, ExprNode};
use crate::stmt::Stmt;
use crate::types::{BinaryOp, ConstValue};
use crate::visit::{IRMutator, walk_expr_mut, walk_stmt_mut};

/// Simplify an expression.
pub fn simplify(e: &Expr) -> Expr {
    let mut s = Simplifier;
    s.mutate_expr(e)
}

/// Simplify every expression inside a statement tree, leaving the statement
/// structure itself untouched.
pub fn simplify_stmt(s: &Stmt) -> Stmt {
    let mut m = Simplifier;
    m.mutate_stmt(s)
}

struct Simplifier;

impl IRMutator for Simplifier {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        let e = walk_expr_mut(self, e);
        match e.node() {
            ExprNode::Binary(op, a, b) => simplify_binary(&e, *op, a, b),
            ExprNode::Not(a) => match a.node() {
                ExprNode::Const(ConstValue::Bool(v)) => Expr::bool_const(!v),
                ExprNode::Not(inner) => inner.clone(),
                _ => e,
            },
            ExprNode::Select { cond, then_case, else_case } => match cond.node() {
                ExprNode::Const(ConstValue::Bool(true)) => then_case.clone(),
                ExprNode::Const(ConstValue::Bool(false)) => else_case.clone(),
                _ if then_case == else_case => then_case.clone(),
                _ => e,
            },
            ExprNode::Cast { value, ty } => {
                if value.ty() == *ty {
                    value.clone()
                } else {
                    e
                }
            }
            _ => e,
        }
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        walk_stmt_mut(self, s)
    }
}

fn simplify_binary(e: &Expr, op: BinaryOp, a: &Expr, b: &Expr) -> Expr {
    use BinaryOp::*;

    if let (Some(x), Some(y)) = (a.as_const_int(), b.as_const_int())
        && let Some(folded) = fold_int(op, x, y)
    {
        return folded;
    }
    if let (Some(ConstValue::Float(x)), Some(ConstValue::Float(y))) = (a.as_const(), b.as_const())
        && let Some(folded) = fold_float(op, *x, *y)
    {
        return folded;
    }
    if let (Some(ConstValue::Bool(x)), Some(ConstValue::Bool(y))) = (a.as_const(), b.as_const()) {
        match op {
            And => return Expr::bool_const(*x && *y),
            Or => return Expr::bool_const(*x || *y),
            Eq => return Expr::bool_const(x == y),
            Ne => return Expr::bool_const(x != y),
            _ => {}
        }
    }

    let a_int = a.as_const_int();
    let b_int = b.as_const_int();

    match op {
        Add => {
            if a_int == Some(0) {
                return b.clone();
            }
            if b_int == Some(0) {
                return a.clone();
            }
        }
        Sub => {
            if b_int == Some(0) {
                return a.clone();
            }
            if a == b {
                return Expr::int(0);
            }
            // Linear difference of index expressions (finite differencing).
            if let (Some(la), Some(lb)) = (as_linear(a), as_linear(b)) {
                let diff = linear_sub(la, lb);
                if diff.0.values().all(|&c| c == 0) {
                    return Expr::int(diff.1);
                }
            }
        }
        Mul => {
            if a_int == Some(0) || b_int == Some(0) {
                return Expr::int(0);
            }
            if a_int == Some(1) {
                return b.clone();
            }
            if b_int == Some(1) {
                return a.clone();
            }
        }
        Div => {
            if b_int == Some(1) {
                return a.clone();
            }
            if a_int == Some(0) {
                return Expr::int(0);
            }
        }
        Mod => {
            if b_int == Some(1) {
                return Expr::int(0);
            }
            if a_int == Some(0) {
                return Expr::int(0);
            }
        }
        Min | Max => {
            if a == b {
                return a.clone();
            }
        }
        And => {
            if let Some(ConstValue::Bool(v)) = a.as_const() {
                return if *v { b.clone() } else { Expr::bool_const(false) };
            }
            if let Some(ConstValue::Bool(v)) = b.as_const() {
                return if *v { a.clone() } else { Expr::bool_const(false) };
            }
        }
        Or => {
            if let Some(ConstValue::Bool(v)) = a.as_const() {
                return if *v { Expr::bool_const(true) } else { b.clone() };
            }
            if let Some(ConstValue::Bool(v)) = b.as_const() {
                return if *v { Expr::bool_const(true) } else { a.clone() };
            }
        }
        Eq | Le | Ge => {
            if a == b {
                return Expr::bool_const(true);
            }
        }
        Ne | Lt | Gt => {
            if a == b {
                return Expr::bool_const(false);
            }
        }
    }

    e.clone()
}

fn fold_int(op: BinaryOp, x: i64, y: i64) -> Option<Expr> {
    use BinaryOp::*;
    let v = match op {
        Add => x.checked_add(y)?,
        Sub => x.checked_sub(y)?,
        Mul => x.checked_mul(y)?,
        Div => {
            if y == 0 {
                return None;
            }
            x.div_euclid(y)
        }
        Mod => {
            if y == 0 {
                return None;
            }
            x.rem_euclid(y)
        }
        Min => x.min(y),
        Max => x.max(y),
        Eq => return Some(Expr::bool_const(x == y)),
        Ne => return Some(Expr::bool_const(x != y)),
        Lt => return Some(Expr::bool_const(x < y)),
        Le => return Some(Expr::bool_const(x <= y)),
        Gt => return Some(Expr::bool_const(x > y)),
        Ge => return Some(Expr::bool_const(x >= y)),
        And | Or => return None,
    };
    Some(Expr::int(v))
}

fn fold_float(op: BinaryOp, x: f64, y: f64) -> Option<Expr> {
    use BinaryOp::*;
    let v = match op {
        Add => x + y,
        Sub => x - y,
        Mul => x * y,
        Div => {
            if y == 0.0 {
                return None;
            }
            x / y
        }
        Min => x.min(y),
        Max => x.max(y),
        Eq => return Some(Expr::bool_const(x == y)),
        Ne => return Some(Expr::bool_const(x != y)),
        Lt => return Some(Expr::bool_const(x < y)),
        Le => return Some(Expr::bool_const(x <= y)),
        Gt => return Some(Expr::bool_const(x > y)),
        Ge => return Some(Expr::bool_const(x >= y)),
        Mod | And | Or => return None,
    };
    Some(Expr::float(v))
}

type Linear = (BTreeMap<String, i64>, i64);

/// Interpret an expression as an integer linear combination of variables.
/// Returns `None` for anything non-linear.
fn as_linear(e: &Expr) -> Option<Linear> {
    match e.node() {
        ExprNode::Const(ConstValue::Int(v)) => Some((BTreeMap::new(), *v)),
        ExprNode::Var { name, .. } => {
            let mut terms = BTreeMap::new();
            terms.insert(name.clone(), 1);
            Some((terms, 0))
        }
        ExprNode::Binary(BinaryOp::Add, a, b) => {
            let (ta, ca) = as_linear(a)?;
            let (tb, cb) = as_linear(b)?;
            Some(linear_add((ta, ca), (tb, cb)))
        }
        ExprNode::Binary(BinaryOp::Sub, a, b) => {
            let la = as_linear(a)?;
            let lb = as_linear(b)?;
            Some(linear_sub(la, lb))
        }
        ExprNode::Binary(BinaryOp::Mul, a, b) => {
            if let Some(k) = a.as_const_int() {
                let (t, c) = as_linear(b)?;
                Some(linear_scale((t, c), k))
            } else if let Some(k) = b.as_const_int() {
                let (t, c) = as_linear(a)?;
                Some(linear_scale((t, c), k))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn linear_add((mut ta, ca): Linear, (tb, cb): Linear) -> Linear {
    for (name, coeff) in tb {
        *ta.entry(name).or_insert(0) += coeff;
    }
    (ta, ca + cb)
}

fn linear_sub(a: Linear, b: Linear) -> Linear {
    linear_add(a, linear_scale(b, -1))
}

fn linear_scale((mut t, c): Linear, k: i64) -> Linear {
    for coeff in t.values_mut() {
        *coeff *= k;
    }
    (t, c * k)
}

//! Finite differencing of index expressions.

use std::collections::BTreeSet;

use crate::expr::{Expr, ExprNode, is_simple_const};
use crate::simplify::simplify;
use crate::substitute::substitute;
use crate::visit::{IRVisitor, walk_expr};

/// The discrete derivative of `e` along `var`: `e[var := var+1] - e`,
/// simplified. A constant result means constant stride along `var`.
pub fn finite_difference(e: &Expr, var: &str) -> Expr {
    let shifted = substitute(var, &(Expr::var(var) + 1), e);
    simplify(&Expr::binary(crate::types::BinaryOp::Sub, shifted, e.clone()))
}

struct FreeVars {
    names: BTreeSet<String>,
}

impl IRVisitor for FreeVars {
    fn visit_expr(&mut self, e: &Expr) {
        if let ExprNode::Var { name, .. } = e.node() {
            self.names.insert(name.clone());
            return;
        }
        walk_expr(self, e);
    }
}

/// Free variable names of an expression, sorted.
pub fn free_vars(e: &Expr) -> BTreeSet<String> {
    let mut v = FreeVars { names: BTreeSet::new() };
    v.visit_expr(e);
    v.names
}

/// Conservative injectivity test for a call argument.
///
/// Holds when the expression is a bare variable, or depends on exactly one
/// variable with a provably nonzero constant finite difference.
pub fn is_one_to_one(e: &Expr) -> bool {
    if e.as_var().is_some() {
        return true;
    }
    let vars = free_vars(e);
    if vars.len() != 1 {
        return false;
    }
    let var = vars.iter().next().unwrap();
    let diff = finite_difference(e, var);
    is_simple_const(&diff) && diff.as_const_int() != Some(0)
}

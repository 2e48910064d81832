//! Variable substitution, use testing, and stage qualification.

use std::collections::HashMap;

use crate::expr::{Expr, ExprNode};
use crate::stmt::Stmt;
use crate::visit::{IRMutator, IRVisitor, walk_expr, walk_expr_mut};

struct Substitute<'a> {
    replacements: &'a HashMap<String, Expr>,
}

impl IRMutator for Substitute<'_> {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if let ExprNode::Var { name, .. } = e.node()
            && let Some(replacement) = self.replacements.get(name)
        {
            return replacement.clone();
        }
        walk_expr_mut(self, e)
    }
}

/// Replace every occurrence of the variable `name` in an expression.
pub fn substitute(name: &str, replacement: &Expr, e: &Expr) -> Expr {
    let mut map = HashMap::new();
    map.insert(name.to_owned(), replacement.clone());
    substitute_map(&map, e)
}

/// Replace every occurrence of the variable `name` in a statement.
pub fn substitute_stmt(name: &str, replacement: &Expr, s: &Stmt) -> Stmt {
    let mut map = HashMap::new();
    map.insert(name.to_owned(), replacement.clone());
    substitute_map_stmt(&map, s)
}

/// Simultaneous substitution of several variables in an expression.
pub fn substitute_map(replacements: &HashMap<String, Expr>, e: &Expr) -> Expr {
    Substitute { replacements }.mutate_expr(e)
}

/// Simultaneous substitution of several variables in a statement.
pub fn substitute_map_stmt(replacements: &HashMap<String, Expr>, s: &Stmt) -> Stmt {
    Substitute { replacements }.mutate_stmt(s)
}

struct UsesVar<'a> {
    name: &'a str,
    result: bool,
}

impl IRVisitor for UsesVar<'_> {
    fn visit_expr(&mut self, e: &Expr) {
        if self.result {
            return;
        }
        if let ExprNode::Var { name, .. } = e.node() {
            if name == self.name {
                self.result = true;
            }
            return;
        }
        walk_expr(self, e);
    }
}

/// Does the expression reference the variable `name`?
pub fn expr_uses_var(e: &Expr, name: &str) -> bool {
    let mut v = UsesVar { name, result: false };
    v.visit_expr(e);
    v.result
}

/// Does any expression inside the statement reference the variable `name`?
pub fn stmt_uses_var(s: &Stmt, name: &str) -> bool {
    let mut v = UsesVar { name, result: false };
    v.visit_stmt(s);
    v.result
}

struct Qualify<'a> {
    prefix: &'a str,
}

impl IRMutator for Qualify<'_> {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        match e.node() {
            ExprNode::Var { name, ty } => Expr::var_typed(format!("{}{}", self.prefix, name), *ty),
            ExprNode::Let { name, value, body } => {
                let value = self.mutate_expr(value);
                let body = self.mutate_expr(body);
                Expr::let_in(format!("{}{}", self.prefix, name), value, body)
            }
            _ => walk_expr_mut(self, e),
        }
    }
}

/// Rewrite every free variable `v` of an expression to `prefix + v`.
///
/// Used to move a definition's unqualified argument and reduction-domain
/// names into the stage's `f.s<k>.` namespace.
pub fn qualify(prefix: &str, e: &Expr) -> Expr {
    Qualify { prefix }.mutate_expr(e)
}

//! Inlining a pure function into the IR that consumes it.

use std::collections::HashMap;

use prism_ir::{
    CallType, Expr, ExprNode, IRMutator, Stmt, substitute_map, walk_expr_mut, walk_stmt_mut,
};

use crate::func::Function;

struct Inliner<'a> {
    func: &'a Function,
}

impl IRMutator for Inliner<'_> {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if let ExprNode::Call { name, args, call_type: CallType::Func, value_index, .. } = e.node()
            && name == self.func.name()
        {
            let args: Vec<Expr> = args.iter().map(|a| self.mutate_expr(a)).collect();
            let mut replacements = HashMap::new();
            for (formal, actual) in self.func.args().iter().zip(&args) {
                replacements.insert(formal.clone(), actual.clone());
            }
            let value = &self.func.values()[*value_index];
            return substitute_map(&replacements, value);
        }
        walk_expr_mut(self, e)
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        walk_stmt_mut(self, s)
    }
}

/// Replace every call to `f` inside `s` with its definition, substituting
/// call arguments for the pure dimensions. Only pure functions can be
/// inlined; an update stage needs storage to read its own previous value.
pub fn inline_function(s: &Stmt, f: &Function) -> Stmt {
    assert!(f.is_pure(), "cannot inline {}: it has update or extern definitions", f.name());
    Inliner { func: f }.mutate_stmt(s)
}

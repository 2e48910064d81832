//! Deciding whether a reduction variable admits parallel execution.

use prism_ir::{CallType, Expr, ExprNode, IRVisitor, expr_uses_var, free_vars, is_one_to_one, walk_expr};

use crate::func::UpdateDefinition;

struct SelfCalls<'a> {
    func: &'a str,
    sites: Vec<Vec<Expr>>,
}

impl IRVisitor for SelfCalls<'_> {
    fn visit_expr(&mut self, e: &Expr) {
        if let ExprNode::Call { name, args, call_type: CallType::Func, .. } = e.node()
            && name == self.func
        {
            self.sites.push(args.clone());
        }
        walk_expr(self, e);
    }
}

/// Conservative check that iterations of `var` may run concurrently.
///
/// Two conditions together guarantee distinct iterations touch disjoint
/// storage: exactly one store coordinate depends on `var` and does so
/// one-to-one (distinct `var` values store to distinct sites), and every
/// read of the function's own value inside the update is of exactly the
/// store site (pure read-modify-write, no cross-site communication).
pub fn can_parallelize_rvar(var: &str, func: &str, update: &UpdateDefinition) -> bool {
    let dependent: Vec<&Expr> =
        update.args.iter().filter(|a| expr_uses_var(a, var)).collect();
    if dependent.len() != 1 {
        return false;
    }
    let site_arg = dependent[0];
    if !is_one_to_one(site_arg) || !free_vars(site_arg).contains(var) {
        return false;
    }

    let mut self_calls = SelfCalls { func, sites: Vec::new() };
    for v in &update.values {
        self_calls.visit_expr(v);
    }
    self_calls.sites.iter().all(|site| site.as_slice() == update.args.as_slice())
}

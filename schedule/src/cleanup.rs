//! Post-injection cleanup: dropping the synthetic outermost loops and
//! propagating device tags down the nest.

use prism_ir::{
    DeviceApi, Expr, ExprNode, IRMutator, Stmt, StmtNode, walk_expr_mut, walk_stmt_mut,
};

use crate::func::OUTERMOST;

struct StripOutermost;

impl StripOutermost {
    fn suffix(kind: &str) -> String {
        format!(".{OUTERMOST}.{kind}")
    }
}

impl IRMutator for StripOutermost {
    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        match s.node() {
            StmtNode::For { name, body, .. } if name.ends_with(&format!(".{OUTERMOST}")) => {
                self.mutate_stmt(body)
            }
            StmtNode::LetStmt { name, body, .. }
                if name.ends_with(&Self::suffix("loop_extent"))
                    || name.ends_with(&Self::suffix("loop_min"))
                    || name.ends_with(&Self::suffix("loop_max")) =>
            {
                self.mutate_stmt(body)
            }
            _ => walk_stmt_mut(self, s),
        }
    }

    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if let ExprNode::Var { name, .. } = e.node() {
            if name.ends_with(&Self::suffix("loop_extent")) {
                return Expr::int(1);
            }
            if name.ends_with(&Self::suffix("loop_min")) {
                return Expr::int(0);
            }
            if name.ends_with(&Self::suffix("loop_max")) {
                return Expr::int(1);
            }
            return e.clone();
        }
        walk_expr_mut(self, e)
    }
}

/// Remove every loop over a synthetic `__outermost` dimension, replacing
/// references to its bounds with the unit-loop constants.
pub fn strip_outermost_loops(s: &Stmt) -> Stmt {
    StripOutermost.mutate_stmt(s)
}

struct PropagateDevice {
    current: DeviceApi,
}

impl IRMutator for PropagateDevice {
    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        if let StmtNode::For { name, min, extent, for_type, device, body } = s.node() {
            let saved = self.current;
            self.current = if *device == DeviceApi::Parent { self.current } else { *device };

            let new_min = self.mutate_expr(min);
            let new_extent = self.mutate_expr(extent);
            let new_body = self.mutate_stmt(body);
            let resolved = self.current;
            self.current = saved;

            let unchanged = new_min.same_as(min)
                && new_extent.same_as(extent)
                && new_body.same_as(body)
                && resolved == *device;
            return if unchanged {
                s.clone()
            } else {
                Stmt::for_loop(name.clone(), new_min, new_extent, *for_type, resolved, new_body)
            };
        }
        walk_stmt_mut(self, s)
    }
}

/// Resolve `Parent` device tags: each loop inherits the device of its
/// nearest enclosing loop with an explicit tag, starting from `Host`.
pub fn propagate_device(s: &Stmt) -> Stmt {
    PropagateDevice { current: DeviceApi::Host }.mutate_stmt(s)
}

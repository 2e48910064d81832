//! Visitor and mutator traits with default recursive walkers.
//!
//! Passes implement [`IRVisitor`] or [`IRMutator`] and intercept only the
//! variants they care about; the `walk_*` free functions provide the
//! structural recursion. Mutator walkers preserve sharing: a subtree is
//! reallocated only if one of its children actually changed.

use crate::expr::{Expr, ExprNode};
use crate::stmt::{Range, Stmt, StmtNode};

/// Read-only traversal over expressions and statements.
pub trait IRVisitor {
    fn visit_expr(&mut self, e: &Expr) {
        walk_expr(self, e);
    }

    fn visit_stmt(&mut self, s: &Stmt) {
        walk_stmt(self, s);
    }
}

/// Default expression recursion for [`IRVisitor`].
pub fn walk_expr<V: IRVisitor + ?Sized>(v: &mut V, e: &Expr) {
    match e.node() {
        ExprNode::Const(_) | ExprNode::Var { .. } => {}
        ExprNode::Cast { value, .. } => v.visit_expr(value),
        ExprNode::Binary(_, a, b) => {
            v.visit_expr(a);
            v.visit_expr(b);
        }
        ExprNode::Not(a) => v.visit_expr(a),
        ExprNode::Select { cond, then_case, else_case } => {
            v.visit_expr(cond);
            v.visit_expr(then_case);
            v.visit_expr(else_case);
        }
        ExprNode::Call { args, .. } => {
            for a in args {
                v.visit_expr(a);
            }
        }
        ExprNode::Let { value, body, .. } => {
            v.visit_expr(value);
            v.visit_expr(body);
        }
    }
}

/// Default statement recursion for [`IRVisitor`].
pub fn walk_stmt<V: IRVisitor + ?Sized>(v: &mut V, s: &Stmt) {
    match s.node() {
        StmtNode::For { min, extent, body, .. } => {
            v.visit_expr(min);
            v.visit_expr(extent);
            v.visit_stmt(body);
        }
        StmtNode::LetStmt { value, body, .. } => {
            v.visit_expr(value);
            v.visit_stmt(body);
        }
        StmtNode::Provide { values, args, .. } => {
            for e in values.iter().chain(args) {
                v.visit_expr(e);
            }
        }
        StmtNode::Realize { bounds, condition, body, .. } => {
            for r in bounds {
                v.visit_expr(&r.min);
                v.visit_expr(&r.extent);
            }
            v.visit_expr(condition);
            v.visit_stmt(body);
        }
        StmtNode::ProducerConsumer { produce, update, consume, .. } => {
            v.visit_stmt(produce);
            if let Some(update) = update {
                v.visit_stmt(update);
            }
            v.visit_stmt(consume);
        }
        StmtNode::Block { first, rest } => {
            v.visit_stmt(first);
            v.visit_stmt(rest);
        }
        StmtNode::IfThenElse { cond, then_case, else_case } => {
            v.visit_expr(cond);
            v.visit_stmt(then_case);
            if let Some(else_case) = else_case {
                v.visit_stmt(else_case);
            }
        }
        StmtNode::AssertStmt { condition, message } => {
            v.visit_expr(condition);
            v.visit_expr(message);
        }
        StmtNode::Evaluate(e) => v.visit_expr(e),
    }
}

/// Rebuilding traversal over expressions and statements.
pub trait IRMutator {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        walk_expr_mut(self, e)
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        walk_stmt_mut(self, s)
    }
}

fn mutate_all<M: IRMutator + ?Sized>(m: &mut M, exprs: &[Expr], changed: &mut bool) -> Vec<Expr> {
    exprs
        .iter()
        .map(|e| {
            let new = m.mutate_expr(e);
            *changed |= !new.same_as(e);
            new
        })
        .collect()
}

/// Default expression recursion for [`IRMutator`].
pub fn walk_expr_mut<M: IRMutator + ?Sized>(m: &mut M, e: &Expr) -> Expr {
    match e.node() {
        ExprNode::Const(_) | ExprNode::Var { .. } => e.clone(),
        ExprNode::Cast { value, ty } => {
            let new = m.mutate_expr(value);
            if new.same_as(value) { e.clone() } else { Expr::cast(new, *ty) }
        }
        ExprNode::Binary(op, a, b) => {
            let na = m.mutate_expr(a);
            let nb = m.mutate_expr(b);
            if na.same_as(a) && nb.same_as(b) { e.clone() } else { Expr::binary(*op, na, nb) }
        }
        ExprNode::Not(a) => {
            let na = m.mutate_expr(a);
            if na.same_as(a) { e.clone() } else { Expr::not(na) }
        }
        ExprNode::Select { cond, then_case, else_case } => {
            let nc = m.mutate_expr(cond);
            let nt = m.mutate_expr(then_case);
            let ne = m.mutate_expr(else_case);
            if nc.same_as(cond) && nt.same_as(then_case) && ne.same_as(else_case) {
                e.clone()
            } else {
                Expr::select(nc, nt, ne)
            }
        }
        ExprNode::Call { ty, name, args, call_type, value_index } => {
            let mut changed = false;
            let new_args = mutate_all(m, args, &mut changed);
            if changed {
                Expr::call_indexed(*ty, name.clone(), new_args, *call_type, *value_index)
            } else {
                e.clone()
            }
        }
        ExprNode::Let { name, value, body } => {
            let nv = m.mutate_expr(value);
            let nb = m.mutate_expr(body);
            if nv.same_as(value) && nb.same_as(body) {
                e.clone()
            } else {
                Expr::let_in(name.clone(), nv, nb)
            }
        }
    }
}

/// Default statement recursion for [`IRMutator`].
pub fn walk_stmt_mut<M: IRMutator + ?Sized>(m: &mut M, s: &Stmt) -> Stmt {
    match s.node() {
        StmtNode::For { name, min, extent, for_type, device, body } => {
            let nmin = m.mutate_expr(min);
            let next = m.mutate_expr(extent);
            let nbody = m.mutate_stmt(body);
            if nmin.same_as(min) && next.same_as(extent) && nbody.same_as(body) {
                s.clone()
            } else {
                Stmt::for_loop(name.clone(), nmin, next, *for_type, *device, nbody)
            }
        }
        StmtNode::LetStmt { name, value, body } => {
            let nv = m.mutate_expr(value);
            let nb = m.mutate_stmt(body);
            if nv.same_as(value) && nb.same_as(body) {
                s.clone()
            } else {
                Stmt::let_stmt(name.clone(), nv, nb)
            }
        }
        StmtNode::Provide { name, values, args } => {
            let mut changed = false;
            let nv = mutate_all(m, values, &mut changed);
            let na = mutate_all(m, args, &mut changed);
            if changed { Stmt::provide(name.clone(), nv, na) } else { s.clone() }
        }
        StmtNode::Realize { name, types, bounds, condition, body } => {
            let mut changed = false;
            let nbounds: Vec<Range> = bounds
                .iter()
                .map(|r| {
                    let min = m.mutate_expr(&r.min);
                    let extent = m.mutate_expr(&r.extent);
                    changed |= !min.same_as(&r.min) || !extent.same_as(&r.extent);
                    Range::new(min, extent)
                })
                .collect();
            let ncond = m.mutate_expr(condition);
            let nbody = m.mutate_stmt(body);
            changed |= !ncond.same_as(condition) || !nbody.same_as(body);
            if changed {
                Stmt::realize(name.clone(), types.clone(), nbounds, ncond, nbody)
            } else {
                s.clone()
            }
        }
        StmtNode::ProducerConsumer { name, produce, update, consume } => {
            let np = m.mutate_stmt(produce);
            let nu = update.as_ref().map(|u| m.mutate_stmt(u));
            let nc = m.mutate_stmt(consume);
            let unchanged = np.same_as(produce)
                && nc.same_as(consume)
                && match (&nu, update) {
                    (Some(a), Some(b)) => a.same_as(b),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged { s.clone() } else { Stmt::producer_consumer(name.clone(), np, nu, nc) }
        }
        StmtNode::Block { first, rest } => {
            let nf = m.mutate_stmt(first);
            let nr = m.mutate_stmt(rest);
            if nf.same_as(first) && nr.same_as(rest) {
                s.clone()
            } else {
                Stmt::new(StmtNode::Block { first: nf, rest: nr })
            }
        }
        StmtNode::IfThenElse { cond, then_case, else_case } => {
            let nc = m.mutate_expr(cond);
            let nt = m.mutate_stmt(then_case);
            let ne = else_case.as_ref().map(|e| m.mutate_stmt(e));
            let unchanged = nc.same_as(cond)
                && nt.same_as(then_case)
                && match (&ne, else_case) {
                    (Some(a), Some(b)) => a.same_as(b),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged { s.clone() } else { Stmt::if_then_else(nc, nt, ne) }
        }
        StmtNode::AssertStmt { condition, message } => {
            let nc = m.mutate_expr(condition);
            let nm = m.mutate_expr(message);
            if nc.same_as(condition) && nm.same_as(message) {
                s.clone()
            } else {
                Stmt::assert_stmt(nc, nm)
            }
        }
        StmtNode::Evaluate(e) => {
            let ne = m.mutate_expr(e);
            if ne.same_as(e) { s.clone() } else { Stmt::evaluate(ne) }
        }
    }
}

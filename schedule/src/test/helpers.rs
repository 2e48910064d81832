//! Shared builders and IR queries for the schedule test suites.

use std::sync::{Mutex, MutexGuard, PoisonError};

use prism_ir::{Expr, ExprNode, ForType, IRVisitor, Stmt, StmtNode, walk_expr, walk_stmt};

use crate::env::{Env, build_env};
use crate::func::{Function, call, image};
use crate::graph::realization_order;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that read or write process environment variables. The
/// advisor entry point reads machine parameters from `PRISM_*`, so every
/// test that goes through it (or mutates those variables) takes this lock.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` with the given variables set (`None` means unset), restoring the
/// previous values afterwards. Holds the env lock for the duration.
pub fn with_env(vars: &[(&str, Option<&str>)], f: impl FnOnce()) {
    let _guard = env_lock();
    let saved: Vec<(String, Option<String>)> =
        vars.iter().map(|(k, _)| ((*k).to_owned(), std::env::var(k).ok())).collect();
    for (k, v) in vars {
        match v {
            Some(v) => unsafe { std::env::set_var(k, v) },
            None => unsafe { std::env::remove_var(k) },
        }
    }
    f();
    for (k, v) in saved {
        match v {
            Some(v) => unsafe { std::env::set_var(&k, v) },
            None => unsafe { std::env::remove_var(&k) },
        }
    }
}

/// `in(x, y)` image read at the given coordinates.
pub fn input2(x: Expr, y: Expr) -> Expr {
    image("in", vec![x, y])
}

/// `f(x, y) = in(x, y) + 1`.
pub fn pointwise_producer(name: &str) -> Function {
    Function::single(name, &["x", "y"], input2(Expr::var("x"), Expr::var("y")) + 1)
}

/// A consumer reading `producer` at `(x, y)` and `(x+1, y)`.
pub fn stencil_consumer(name: &str, producer: &str) -> Function {
    let value = call(producer, vec![Expr::var("x"), Expr::var("y")])
        + call(producer, vec![Expr::var("x") + 1, Expr::var("y")]);
    Function::single(name, &["x", "y"], value)
}

/// Build the env and run the driver for the given functions and outputs.
pub fn lower(funcs: Vec<Function>, outputs: &[&str], inject_asserts: bool) -> crate::Result<Stmt> {
    let env: Env = build_env(funcs);
    let outputs: Vec<String> = outputs.iter().map(|s| (*s).to_owned()).collect();
    let order = realization_order(&outputs, &env);
    crate::driver::schedule_functions(&outputs, &order, &env, inject_asserts).map(|(s, _)| s)
}

#[derive(Default)]
struct Collector {
    fors: Vec<(String, ForType)>,
    provides: Vec<String>,
    realizes: Vec<String>,
    producer_consumers: Vec<String>,
    asserts: usize,
    calls: Vec<String>,
}

impl IRVisitor for Collector {
    fn visit_stmt(&mut self, s: &Stmt) {
        match s.node() {
            StmtNode::For { name, for_type, .. } => {
                self.fors.push((name.clone(), *for_type));
            }
            StmtNode::Provide { name, .. } => self.provides.push(name.clone()),
            StmtNode::Realize { name, .. } => self.realizes.push(name.clone()),
            StmtNode::ProducerConsumer { name, .. } => self.producer_consumers.push(name.clone()),
            StmtNode::AssertStmt { .. } => self.asserts += 1,
            _ => {}
        }
        walk_stmt(self, s);
    }

    fn visit_expr(&mut self, e: &Expr) {
        if let ExprNode::Call { name, .. } = e.node() {
            self.calls.push(name.clone());
        }
        walk_expr(self, e);
    }
}

fn collect(s: &Stmt) -> Collector {
    let mut c = Collector::default();
    c.visit_stmt(s);
    c
}

/// Loop names and for-types, preorder.
pub fn collect_fors(s: &Stmt) -> Vec<(String, ForType)> {
    collect(s).fors
}

/// Names of every `Provide` node.
pub fn collect_provides(s: &Stmt) -> Vec<String> {
    collect(s).provides
}

/// Names of every `Realize` node.
pub fn collect_realizes(s: &Stmt) -> Vec<String> {
    collect(s).realizes
}

/// Names of every `ProducerConsumer` node.
pub fn collect_producer_consumers(s: &Stmt) -> Vec<String> {
    collect(s).producer_consumers
}

pub fn count_asserts(s: &Stmt) -> usize {
    collect(s).asserts
}

/// Does any expression in the statement call `name`?
pub fn contains_call(s: &Stmt, name: &str) -> bool {
    collect(s).calls.iter().any(|c| c == name)
}

/// The body of the first `For` whose name satisfies the predicate.
pub fn find_for_body(s: &Stmt, pred: &dyn Fn(&str) -> bool) -> Option<Stmt> {
    match s.node() {
        StmtNode::For { name, body, .. } if pred(name) => Some(body.clone()),
        StmtNode::For { body, .. } => find_for_body(body, pred),
        StmtNode::LetStmt { body, .. } => find_for_body(body, pred),
        StmtNode::Realize { body, .. } => find_for_body(body, pred),
        StmtNode::ProducerConsumer { produce, update, consume, .. } => {
            find_for_body(produce, pred)
                .or_else(|| update.as_ref().and_then(|u| find_for_body(u, pred)))
                .or_else(|| find_for_body(consume, pred))
        }
        StmtNode::Block { first, rest } => {
            find_for_body(first, pred).or_else(|| find_for_body(rest, pred))
        }
        StmtNode::IfThenElse { then_case, else_case, .. } => find_for_body(then_case, pred)
            .or_else(|| else_case.as_ref().and_then(|e| find_for_body(e, pred))),
        _ => None,
    }
}

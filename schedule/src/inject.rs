//! Splicing a function's produce/consume nest and allocation into the IR of
//! its consumers, at the scheduled store and compute levels.

use prism_ir::{
    Expr, ExprNode, ForType, IRMutator, IRVisitor, Range, Region, Stmt, StmtNode, const_true,
    walk_expr, walk_stmt_mut,
};
use tracing::debug;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::func::Function;
use crate::production::{build_production, inject_explicit_bounds};

struct UsedInStmt<'a> {
    func: &'a str,
    result: bool,
}

impl IRVisitor for UsedInStmt<'_> {
    fn visit_expr(&mut self, e: &Expr) {
        match e.node() {
            ExprNode::Call { name, .. } if name == self.func => self.result = true,
            // A reference to the function's buffers counts as a use.
            ExprNode::Var { name, ty } => {
                if ty.is_handle()
                    && name.starts_with(&format!("{}.", self.func))
                    && name.ends_with(".buffer")
                {
                    self.result = true;
                }
            }
            _ => {}
        }
        if !self.result {
            walk_expr(self, e);
        }
    }
}

/// Does the statement call `f` or touch one of its buffers?
pub fn function_is_used_in_stmt(f: &Function, s: &Stmt) -> bool {
    let mut v = UsedInStmt { func: f.name(), result: false };
    v.visit_stmt(s);
    v.result
}

/// Stateful mutator injecting the realization of one function.
///
/// After a successful run both levels must have been found; the driver
/// asserts this, so a schedule that names a nonexistent loop is caught as an
/// internal inconsistency rather than silently dropped.
pub struct InjectRealization<'a> {
    func: &'a Function,
    env: &'a Env,
    is_output: bool,
    inject_asserts: bool,
    pub found_store_level: bool,
    pub found_compute_level: bool,
    error: Option<Error>,
}

impl<'a> InjectRealization<'a> {
    pub fn new(func: &'a Function, env: &'a Env, is_output: bool, inject_asserts: bool) -> Self {
        Self {
            func,
            env,
            is_output,
            inject_asserts,
            found_store_level: false,
            found_compute_level: false,
            error: None,
        }
    }

    /// Run the injection over `s`.
    pub fn inject(mut self, s: &Stmt) -> Result<(Stmt, bool, bool)> {
        let result = self.mutate_stmt(s);
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok((result, self.found_store_level, self.found_compute_level))
    }

    fn build_pipeline(&mut self, consume: Stmt) -> Stmt {
        match build_production(self.func, self.env) {
            Ok((produce, update)) => {
                Stmt::producer_consumer(self.func.name(), produce, update, consume)
            }
            Err(e) => {
                self.error.get_or_insert(e);
                consume
            }
        }
    }

    fn build_realize(&self, s: Stmt) -> Stmt {
        let mut s = s;
        if !self.is_output {
            let name = self.func.name();
            let bounds: Region = self
                .func
                .args()
                .iter()
                .map(|arg| {
                    Range::new(
                        Expr::var(format!("{name}.{arg}.min_realized")),
                        Expr::var(format!("{name}.{arg}.extent_realized")),
                    )
                })
                .collect();
            s = Stmt::realize(name, self.func.output_types().to_vec(), bounds, const_true(), s);
        }

        // The allocation site is also where the explicit bounds promised by
        // the schedule get checked.
        if self.inject_asserts { inject_explicit_bounds(s, self.func) } else { s }
    }
}

impl IRMutator for InjectRealization<'_> {
    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        match s.node() {
            StmtNode::For { name, min, extent, for_type, device, body } => {
                debug!(func = self.func.name(), loop_name = %name, "injector entering loop");
                let compute_level = &self.func.schedule().compute_level;
                let store_level = &self.func.schedule().store_level;

                // Dig through any let statements so the level tests see the
                // actual loop boundary.
                let mut lets: Vec<(String, Expr)> = Vec::new();
                let mut body = body.clone();
                loop {
                    let StmtNode::LetStmt { name, value, body: inner } = body.node() else { break };
                    let (name, value, inner) = (name.clone(), value.clone(), inner.clone());
                    lets.push((name, value));
                    body = inner;
                }

                // An inlined extern stage cannot live under a vector loop;
                // realize it around the loop instead.
                if self.func.has_extern_definition()
                    && compute_level.is_inline()
                    && *for_type == ForType::Vectorized
                    && function_is_used_in_stmt(self.func, s)
                {
                    debug!(func = self.func.name(), loop_name = %name, "realizing extern around vector loop");
                    let wrapped = self.build_pipeline(s.clone());
                    let wrapped = self.build_realize(wrapped);
                    self.found_store_level = true;
                    self.found_compute_level = true;
                    return wrapped;
                }

                let mut body = self.mutate_stmt(&body);

                if compute_level.match_loop(name) {
                    debug!(func = self.func.name(), loop_name = %name, "found compute level");
                    if function_is_used_in_stmt(self.func, &body) || self.is_output {
                        body = self.build_pipeline(body);
                    }
                    self.found_compute_level = true;
                }

                if store_level.match_loop(name) {
                    debug!(func = self.func.name(), loop_name = %name, "found store level");
                    assert!(
                        self.found_compute_level,
                        "the compute loop level was not found within the store loop level"
                    );
                    if function_is_used_in_stmt(self.func, &body) || self.is_output {
                        body = self.build_realize(body);
                    }
                    self.found_store_level = true;
                }

                for (let_name, let_value) in lets.into_iter().rev() {
                    body = Stmt::let_stmt(let_name, let_value, body);
                }

                if body.same_as(match s.node() {
                    StmtNode::For { body, .. } => body,
                    _ => unreachable!(),
                }) {
                    s.clone()
                } else {
                    Stmt::for_loop(name.clone(), min.clone(), extent.clone(), *for_type, *device, body)
                }
            }
            // An inline function with updates cannot be substituted into a
            // call site; it must be realized right around the consuming
            // provide.
            StmtNode::Provide { name, .. } => {
                if name != self.func.name()
                    && !self.func.is_pure()
                    && self.func.schedule().compute_level.is_inline()
                    && function_is_used_in_stmt(self.func, s)
                {
                    let wrapped = self.build_pipeline(s.clone());
                    let wrapped = self.build_realize(wrapped);
                    self.found_store_level = true;
                    self.found_compute_level = true;
                    wrapped
                } else {
                    s.clone()
                }
            }
            _ => walk_stmt_mut(self, s),
        }
    }
}

//! Schedule validation: which store/compute placements are legal for a
//! function given how the current IR uses it.

use std::fmt::Write as _;

use itertools::Itertools;
use prism_ir::{Expr, ExprNode, IRVisitor, Stmt, StmtNode, walk_expr, walk_stmt};
use tracing::warn;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::func::{Function, LoopLevel, OUTERMOST, ROOT_VAR};

/// One enclosing loop of a use site.
#[derive(Debug, Clone)]
pub struct Site {
    pub is_parallel: bool,
    /// Full loop name (`f.s<k>.<var>`), the key used for matching.
    pub loop_name: String,
    /// The loop level the name denotes, for rendering placements back to
    /// directive source.
    pub loop_level: LoopLevel,
}

/// Parse a generated loop name into the loop level it represents. The var
/// component may itself contain dots (tiling splits produce `x.tile.out`),
/// so everything past the stage infix belongs to the var.
fn parse_loop_name(name: &str) -> LoopLevel {
    let mut parts = name.splitn(3, '.');
    let func = parts.next().unwrap_or_default();
    let second = parts.next().unwrap_or_default();
    match parts.next() {
        Some(var) => LoopLevel::at(func, var),
        // No stage infix: the synthetic root loop.
        None => LoopLevel::at(func, second),
    }
}

/// Collects the loops every use of a function sits under. With several use
/// sites, the legal sites are their common prefix.
struct ComputeLegalSchedules<'a> {
    func: &'a Function,
    sites_allowed: Vec<Site>,
    sites: Vec<Site>,
    found: bool,
}

impl ComputeLegalSchedules<'_> {
    fn register_use(&mut self) {
        if !self.found {
            self.found = true;
            self.sites_allowed = self.sites.clone();
        } else {
            let common: Vec<Site> = self
                .sites
                .iter()
                .filter(|s1| self.sites_allowed.iter().any(|s2| s1.loop_name == s2.loop_name))
                .cloned()
                .collect();
            self.sites_allowed = common;
        }
    }
}

impl IRVisitor for ComputeLegalSchedules<'_> {
    fn visit_stmt(&mut self, s: &Stmt) {
        if let StmtNode::For { name, min, extent, for_type, body, .. } = s.node() {
            self.visit_expr(min);
            self.visit_expr(extent);
            self.sites.push(Site {
                is_parallel: for_type.is_parallel(),
                loop_name: name.clone(),
                loop_level: parse_loop_name(name),
            });
            self.visit_stmt(body);
            self.sites.pop();
        } else {
            walk_stmt(self, s);
        }
    }

    fn visit_expr(&mut self, e: &Expr) {
        match e.node() {
            ExprNode::Call { name, .. } if name == self.func.name() => {
                walk_expr(self, e);
                self.register_use();
                return;
            }
            ExprNode::Var { name, ty } => {
                if ty.is_handle()
                    && name.starts_with(&format!("{}.", self.func.name()))
                    && name.ends_with(".buffer")
                {
                    self.register_use();
                }
                return;
            }
            _ => {}
        }
        walk_expr(self, e);
    }
}

/// Render a store/compute placement back into schedule-directive source.
pub fn schedule_to_source(f: &Function, store_at: &LoopLevel, compute_at: &LoopLevel) -> String {
    let mut out = f.name().to_owned();
    if compute_at.is_inline() {
        out.push_str(".compute_inline()");
    } else {
        let pretty = |var: &str| if var == OUTERMOST { "outermost".to_owned() } else { var.to_owned() };
        if !store_at.match_level(compute_at) {
            if store_at.is_root() {
                out.push_str(".store_root()");
            } else {
                let _ = write!(out, ".store_at({}, {})", store_at.func, pretty(&store_at.var));
            }
        }
        if compute_at.is_root() {
            out.push_str(".compute_root()");
        } else {
            let _ = write!(out, ".compute_at({}, {})", compute_at.func, pretty(&compute_at.var));
        }
    }
    out.push(';');
    out
}

struct StmtUsesFunc<'a> {
    func: &'a str,
    result: bool,
}

impl IRVisitor for StmtUsesFunc<'_> {
    fn visit_expr(&mut self, e: &Expr) {
        if let ExprNode::Call { name, .. } = e.node()
            && name == self.func
        {
            self.result = true;
        }
        walk_expr(self, e);
    }
}

/// Renders an indented tree of the loops a function is used under, with
/// uninteresting subtrees elided.
struct UsesTree<'a> {
    func: &'a str,
    caller: String,
    indent: usize,
    last_print_was_ellipsis: bool,
    out: String,
}

impl UsesTree<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

impl IRVisitor for UsesTree<'_> {
    fn visit_stmt(&mut self, s: &Stmt) {
        match s.node() {
            StmtNode::For { name, body, .. } => {
                if name.ends_with(OUTERMOST) || name.ends_with(ROOT_VAR) {
                    walk_stmt(self, s);
                    return;
                }
                let old_indent = self.indent;
                let mut uses = StmtUsesFunc { func: self.func, result: false };
                uses.visit_stmt(body);
                if !uses.result {
                    if !self.last_print_was_ellipsis {
                        self.line("...");
                        self.last_print_was_ellipsis = true;
                    }
                } else {
                    self.line(&format!("for {name}:"));
                    self.last_print_was_ellipsis = false;
                    self.indent += 1;
                }
                walk_stmt(self, s);
                self.indent = old_indent;
            }
            StmtNode::ProducerConsumer { name, produce, update, consume } => {
                let old_caller = std::mem::replace(&mut self.caller, name.clone());
                self.visit_stmt(produce);
                if let Some(update) = update {
                    self.visit_stmt(update);
                }
                self.caller = old_caller;
                self.visit_stmt(consume);
            }
            _ => walk_stmt(self, s),
        }
    }

    fn visit_expr(&mut self, e: &Expr) {
        if let ExprNode::Call { name, .. } = e.node()
            && name == self.func
        {
            let caller = self.caller.clone();
            self.line(&format!("{caller} uses {}", self.func));
            self.last_print_was_ellipsis = false;
            return;
        }
        walk_expr(self, e);
    }
}

/// Validate the store/compute placement of `f` against the IR built so far.
///
/// Inline+inline is always legal; outputs must be root+root; otherwise the
/// compute level must lie inside the common prefix of enclosing loops over
/// all use sites, the store level at or outside it, with no parallel loop
/// between the two.
pub fn validate_schedule(f: &Function, s: &Stmt, is_output: bool, env: &Env) -> Result<()> {
    // An extern stage reads its inputs through materialized buffers, so none
    // of them may be inlined away.
    if let Some(extern_def) = f.extern_definition() {
        for arg in &extern_def.args {
            if let crate::func::ExternArg::Func(name) = arg
                && let Some(g) = env.get(name)
                && g.schedule().compute_level.is_inline()
            {
                return Err(Error::ExternInputInlined {
                    func: g.name().to_owned(),
                    consumer: f.name().to_owned(),
                });
            }
        }
    }

    // Warn about half-scheduled functions.
    let any_scheduled =
        f.schedule().touched || f.updates().iter().any(|u| u.schedule.touched);
    if any_scheduled {
        for (i, u) in f.updates().iter().enumerate() {
            if !u.schedule.touched {
                warn!(
                    func = f.name(),
                    update = i,
                    "update step has not been scheduled even though other steps have been"
                );
            }
        }
    }

    let store_at = &f.schedule().store_level;
    let compute_at = &f.schedule().compute_level;

    // Outputs are stored in caller-provided memory; root is the only
    // placement that models that.
    if is_output {
        if store_at.is_root() && compute_at.is_root() {
            return Ok(());
        }
        return Err(Error::OutputNotRoot { func: f.name().to_owned() });
    }

    if store_at.is_inline() && compute_at.is_inline() {
        return Ok(());
    }

    let mut legal =
        ComputeLegalSchedules { func: f, sites_allowed: Vec::new(), sites: Vec::new(), found: false };
    legal.visit_stmt(s);
    let sites = legal.sites_allowed;

    let mut store_at_ok = false;
    let mut compute_at_ok = false;
    let mut store_idx = 0;
    let mut compute_idx = 0;
    for (i, site) in sites.iter().enumerate() {
        if store_at.match_loop(&site.loop_name) {
            store_at_ok = true;
            store_idx = i;
        }
        if compute_at.match_loop(&site.loop_name) {
            compute_at_ok = store_at_ok;
            compute_idx = i;
        }
    }

    let mut message = String::new();

    // A parallel loop between the store and compute levels means concurrent
    // writers into one allocation.
    if store_at_ok && compute_at_ok && store_idx < compute_idx {
        for site in &sites[store_idx + 1..=compute_idx] {
            if site.is_parallel {
                let _ = writeln!(
                    message,
                    "func \"{}\" is stored outside the parallel loop over {}.{} but computed \
                     within it; this is a potential race condition",
                    f.name(),
                    site.loop_level.func,
                    site.loop_level.var,
                );
                store_at_ok = false;
                compute_at_ok = false;
            }
        }
    }

    if !store_at_ok || !compute_at_ok {
        let legal = sites
            .iter()
            .map(|site| format!("  {}", schedule_to_source(f, &site.loop_level, &site.loop_level)))
            .join("\n");
        let _ = writeln!(
            message,
            "func \"{}\" is computed at the following invalid location:\n  {}\nlegal locations for this function are:\n{legal}",
            f.name(),
            schedule_to_source(f, store_at, compute_at),
        );
        let _ = writeln!(message, "\"{}\" is used in the following places:", f.name());
        let mut tree = UsesTree {
            func: f.name(),
            caller: String::new(),
            indent: 1,
            last_print_was_ellipsis: false,
            out: String::new(),
        };
        tree.visit_stmt(s);
        message.push_str(&tree.out);
        return Err(Error::InvalidSchedule { func: f.name().to_owned(), message });
    }

    Ok(())
}

//! Call-graph services over the environment: direct-call discovery and the
//! realization order.

use indexmap::IndexSet;
use prism_ir::{CallType, Expr, ExprNode, IRVisitor, walk_expr};

use crate::env::Env;
use crate::func::{ExternArg, Function};

struct CallCollector {
    calls: IndexSet<String>,
}

impl IRVisitor for CallCollector {
    fn visit_expr(&mut self, e: &Expr) {
        if let ExprNode::Call { name, call_type: CallType::Func, .. } = e.node() {
            self.calls.insert(name.clone());
        }
        walk_expr(self, e);
    }
}

/// Names of the functions `f` calls directly, in any stage of its
/// definition (including extern inputs). Image reads are not functions and
/// are excluded.
pub fn find_direct_calls(f: &Function) -> IndexSet<String> {
    let mut collector = CallCollector { calls: IndexSet::new() };
    for v in f.values() {
        collector.visit_expr(v);
    }
    for u in f.updates() {
        for e in u.args.iter().chain(&u.values) {
            collector.visit_expr(e);
        }
    }
    if let Some(extern_def) = f.extern_definition() {
        for arg in &extern_def.args {
            match arg {
                ExternArg::Func(name) => {
                    collector.calls.insert(name.clone());
                }
                ExternArg::Expr(e) => collector.visit_expr(e),
                ExternArg::Buffer(_) | ExternArg::ImageParam(_) => {}
            }
        }
    }
    // Self-recursion through updates is a read of the function's own
    // previous value, not a call-graph edge.
    collector.calls.shift_remove(f.name());
    collector.calls
}

/// Topological order over the call graph, producers first, ending at the
/// outputs. Only names present in the environment participate.
pub fn realization_order(outputs: &[String], env: &Env) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        env: &Env,
        marks: &mut indexmap::IndexMap<String, Mark>,
        order: &mut Vec<String>,
    ) {
        match marks.get(name) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                panic!("realization order: cycle through function {name}")
            }
            None => {}
        }
        let Some(f) = env.get(name) else { return };
        marks.insert(name.to_owned(), Mark::Visiting);
        for callee in find_direct_calls(f) {
            visit(&callee, env, marks, order);
        }
        marks.insert(name.to_owned(), Mark::Done);
        order.push(name.to_owned());
    }

    let mut marks = indexmap::IndexMap::new();
    let mut order = Vec::new();
    for out in outputs {
        visit(out, env, &mut marks, &mut order);
    }
    order
}

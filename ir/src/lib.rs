//! Expression and statement IR for the prism pipeline compiler.
//!
//! This crate owns the loop-nest intermediate representation the scheduler
//! lowers into, plus the symbolic services built on it:
//!
//! - [`expr`] / [`stmt`] - Arc-backed sum-type trees
//! - [`visit`] - visitor/mutator traits with default walkers
//! - [`simplify`] - constant folding and algebraic identities
//! - [`substitute`] - variable substitution, use testing, qualification
//! - [`interval`] / [`bounds`] - symbolic intervals, boxes, call footprints
//! - [`derivative`] - finite differencing for stride checks
//! - [`name`] - process-wide unique name generation

pub mod bounds;
pub mod derivative;
pub mod expr;
pub mod interval;
pub mod name;
pub mod simplify;
pub mod stmt;
pub mod substitute;
pub mod types;
pub mod visit;

#[cfg(test)]
pub mod test;

pub use bounds::{FuncValueBounds, Scope, bounds_of_expr_in_scope, boxes_required};
pub use derivative::{finite_difference, free_vars, is_one_to_one};
pub use expr::{
    Expr, ExprNode, const_false, const_true, intrinsics, is_one, is_simple_const, is_zero, likely,
    make_zero,
};
pub use interval::{BoundsBox, Interval, interval_intersect, merge_boxes, simplify_box};
pub use name::{reset_unique_names, unique_name};
pub use simplify::{simplify, simplify_stmt};
pub use stmt::{Range, Region, Stmt, StmtNode};
pub use substitute::{
    expr_uses_var, qualify, stmt_uses_var, substitute, substitute_map, substitute_map_stmt,
    substitute_stmt,
};
pub use types::{BinaryOp, CallType, ConstValue, DeviceApi, ForType, ScalarType};
pub use visit::{IRMutator, IRVisitor, walk_expr, walk_expr_mut, walk_stmt, walk_stmt_mut};

//! Statement tree.
//!
//! Statements produced by the scheduling core: loops, lets, multi-valued
//! stores, realizations, produce/consume markers, and the structural glue
//! around them. Like expressions, statements are immutable `Arc`-backed
//! trees with pointer identity available for change detection.

use std::fmt;
use std::sync::Arc;

use crate::expr::Expr;
use crate::types::{DeviceApi, ForType, ScalarType};

/// A half-open extent `[min, min+extent)` of one realized dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub min: Expr,
    pub extent: Expr,
}

impl Range {
    pub fn new(min: Expr, extent: Expr) -> Self {
        Self { min, extent }
    }
}

/// The bounds of a realization, one [`Range`] per dimension.
pub type Region = Vec<Range>;

/// One node of the statement tree.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtNode {
    For {
        name: String,
        min: Expr,
        extent: Expr,
        for_type: ForType,
        device: DeviceApi,
        body: Stmt,
    },
    LetStmt {
        name: String,
        value: Expr,
        body: Stmt,
    },
    /// Multi-valued store of `values` at the multi-dimensional site `args`.
    Provide {
        name: String,
        values: Vec<Expr>,
        args: Vec<Expr>,
    },
    /// Allocation lifetime of a function's storage over `bounds`.
    Realize {
        name: String,
        types: Vec<ScalarType>,
        bounds: Region,
        condition: Expr,
        body: Stmt,
    },
    /// Produce/update/consume phases of one function's realization.
    ProducerConsumer {
        name: String,
        produce: Stmt,
        update: Option<Stmt>,
        consume: Stmt,
    },
    Block {
        first: Stmt,
        rest: Stmt,
    },
    IfThenElse {
        cond: Expr,
        then_case: Stmt,
        else_case: Option<Stmt>,
    },
    AssertStmt {
        condition: Expr,
        message: Expr,
    },
    Evaluate(Expr),
}

/// Shared handle to a statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt(Arc<StmtNode>);

impl Stmt {
    pub fn new(node: StmtNode) -> Self {
        Self(Arc::new(node))
    }

    pub fn node(&self) -> &StmtNode {
        &self.0
    }

    /// Pointer identity, for change detection in mutators.
    pub fn same_as(&self, other: &Stmt) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn for_loop(
        name: impl Into<String>,
        min: Expr,
        extent: Expr,
        for_type: ForType,
        device: DeviceApi,
        body: Stmt,
    ) -> Self {
        Self::new(StmtNode::For { name: name.into(), min, extent, for_type, device, body })
    }

    pub fn let_stmt(name: impl Into<String>, value: Expr, body: Stmt) -> Self {
        Self::new(StmtNode::LetStmt { name: name.into(), value, body })
    }

    pub fn provide(name: impl Into<String>, values: Vec<Expr>, args: Vec<Expr>) -> Self {
        Self::new(StmtNode::Provide { name: name.into(), values, args })
    }

    pub fn realize(
        name: impl Into<String>,
        types: Vec<ScalarType>,
        bounds: Region,
        condition: Expr,
        body: Stmt,
    ) -> Self {
        Self::new(StmtNode::Realize { name: name.into(), types, bounds, condition, body })
    }

    pub fn producer_consumer(
        name: impl Into<String>,
        produce: Stmt,
        update: Option<Stmt>,
        consume: Stmt,
    ) -> Self {
        Self::new(StmtNode::ProducerConsumer { name: name.into(), produce, update, consume })
    }

    /// Two statements in sequence. `None` sides collapse away, so merging a
    /// list right-to-left needs no sentinel.
    pub fn block(first: Option<Stmt>, rest: Option<Stmt>) -> Option<Stmt> {
        match (first, rest) {
            (Some(first), Some(rest)) => Some(Self::new(StmtNode::Block { first, rest })),
            (one, None) | (None, one) => one,
        }
    }

    pub fn if_then_else(cond: Expr, then_case: Stmt, else_case: Option<Stmt>) -> Self {
        Self::new(StmtNode::IfThenElse { cond, then_case, else_case })
    }

    pub fn assert_stmt(condition: Expr, message: Expr) -> Self {
        Self::new(StmtNode::AssertStmt { condition, message })
    }

    pub fn evaluate(e: Expr) -> Self {
        Self::new(StmtNode::Evaluate(e))
    }
}

fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("  ")?;
    }
    Ok(())
}

fn fmt_stmt(s: &Stmt, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    match s.node() {
        StmtNode::For { name, min, extent, for_type, body, .. } => {
            indent(f, depth)?;
            let kind = match for_type {
                ForType::Serial => "for",
                ForType::Parallel => "parallel",
                ForType::Vectorized => "vectorized",
                ForType::Unrolled => "unrolled",
            };
            writeln!(f, "{kind} ({name}, {min}, {extent}) {{")?;
            fmt_stmt(body, f, depth + 1)?;
            indent(f, depth)?;
            writeln!(f, "}}")
        }
        StmtNode::LetStmt { name, value, body } => {
            indent(f, depth)?;
            writeln!(f, "let {name} = {value}")?;
            fmt_stmt(body, f, depth)
        }
        StmtNode::Provide { name, values, args } => {
            indent(f, depth)?;
            write!(f, "{name}(")?;
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{a}")?;
            }
            f.write_str(") = ")?;
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{v}")?;
            }
            writeln!(f)
        }
        StmtNode::Realize { name, bounds, condition, body, .. } => {
            indent(f, depth)?;
            write!(f, "realize {name}(")?;
            for (i, r) in bounds.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "[{}, {}]", r.min, r.extent)?;
            }
            writeln!(f, ") if {condition} {{")?;
            fmt_stmt(body, f, depth + 1)?;
            indent(f, depth)?;
            writeln!(f, "}}")
        }
        StmtNode::ProducerConsumer { name, produce, update, consume } => {
            indent(f, depth)?;
            writeln!(f, "produce {name} {{")?;
            fmt_stmt(produce, f, depth + 1)?;
            if let Some(update) = update {
                indent(f, depth)?;
                writeln!(f, "}} update {{")?;
                fmt_stmt(update, f, depth + 1)?;
            }
            indent(f, depth)?;
            writeln!(f, "}}")?;
            fmt_stmt(consume, f, depth)
        }
        StmtNode::Block { first, rest } => {
            fmt_stmt(first, f, depth)?;
            fmt_stmt(rest, f, depth)
        }
        StmtNode::IfThenElse { cond, then_case, else_case } => {
            indent(f, depth)?;
            writeln!(f, "if ({cond}) {{")?;
            fmt_stmt(then_case, f, depth + 1)?;
            if let Some(else_case) = else_case {
                indent(f, depth)?;
                writeln!(f, "}} else {{")?;
                fmt_stmt(else_case, f, depth + 1)?;
            }
            indent(f, depth)?;
            writeln!(f, "}}")
        }
        StmtNode::AssertStmt { condition, message } => {
            indent(f, depth)?;
            writeln!(f, "assert({condition}, {message})")
        }
        StmtNode::Evaluate(e) => {
            indent(f, depth)?;
            writeln!(f, "{e}")
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_stmt(self, f, 0)
    }
}

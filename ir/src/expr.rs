//! Expression tree.
//!
//! Expressions are immutable `Arc`-backed trees. [`Expr`] is a cheap handle;
//! structural equality is derived, pointer identity is available through
//! [`Expr::same_as`] for the mutators that want to avoid reallocating
//! untouched subtrees.

use std::fmt;
use std::sync::Arc;

use crate::types::{BinaryOp, CallType, ConstValue, ScalarType};

/// Names of the intrinsics the scheduling core emits.
pub mod intrinsics {
    /// Loop-partitioning hint wrapped around clamped split bases.
    pub const LIKELY: &str = "likely";
    /// Address of a function call site, used for extern output buffers.
    pub const ADDRESS_OF: &str = "address_of";
    /// Constructs a buffer descriptor from (host, zero, dim triples...).
    pub const CREATE_BUFFER: &str = "create_buffer";
    /// Runtime error constructor for a failed extern stage.
    pub const ERROR_EXTERN_STAGE_FAILED: &str = "error_extern_stage_failed";
    /// Runtime error constructor for an undersized explicit bound.
    pub const ERROR_EXPLICIT_BOUNDS_TOO_SMALL: &str = "error_explicit_bounds_too_small";
}

/// One node of the expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    Const(ConstValue),
    Var {
        name: String,
        ty: ScalarType,
    },
    Cast {
        value: Expr,
        ty: ScalarType,
    },
    Binary(BinaryOp, Expr, Expr),
    Not(Expr),
    Select {
        cond: Expr,
        then_case: Expr,
        else_case: Expr,
    },
    Call {
        ty: ScalarType,
        name: String,
        args: Vec<Expr>,
        call_type: CallType,
        /// Which tuple output of a multi-valued function this call reads.
        value_index: usize,
    },
    Let {
        name: String,
        value: Expr,
        body: Expr,
    },
}

/// Shared handle to an expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    pub fn new(node: ExprNode) -> Self {
        Self(Arc::new(node))
    }

    pub fn node(&self) -> &ExprNode {
        &self.0
    }

    /// Pointer identity, for change detection in mutators.
    pub fn same_as(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ---- leaf constructors ----

    pub fn int(v: i64) -> Self {
        Self::new(ExprNode::Const(ConstValue::Int(v)))
    }

    pub fn float(v: f64) -> Self {
        Self::new(ExprNode::Const(ConstValue::Float(v)))
    }

    pub fn bool_const(v: bool) -> Self {
        Self::new(ExprNode::Const(ConstValue::Bool(v)))
    }

    pub fn str_const(v: impl Into<String>) -> Self {
        Self::new(ExprNode::Const(ConstValue::Str(v.into())))
    }

    /// An `Int32` loop variable.
    pub fn var(name: impl Into<String>) -> Self {
        Self::new(ExprNode::Var { name: name.into(), ty: ScalarType::Int32 })
    }

    /// A variable of an explicit type (`Handle` for buffer references).
    pub fn var_typed(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(ExprNode::Var { name: name.into(), ty })
    }

    // ---- compound constructors ----

    pub fn cast(value: Expr, ty: ScalarType) -> Self {
        Self::new(ExprNode::Cast { value, ty })
    }

    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Self {
        Self::new(ExprNode::Binary(op, a, b))
    }

    pub fn min(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Min, a, b)
    }

    pub fn max(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Max, a, b)
    }

    pub fn eq(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Eq, a, b)
    }

    pub fn ne(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Ne, a, b)
    }

    pub fn lt(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Lt, a, b)
    }

    pub fn le(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Le, a, b)
    }

    pub fn gt(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Gt, a, b)
    }

    pub fn ge(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Ge, a, b)
    }

    pub fn and(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::And, a, b)
    }

    pub fn or(a: Expr, b: Expr) -> Self {
        Self::binary(BinaryOp::Or, a, b)
    }

    pub fn not(a: Expr) -> Self {
        Self::new(ExprNode::Not(a))
    }

    pub fn select(cond: Expr, then_case: Expr, else_case: Expr) -> Self {
        Self::new(ExprNode::Select { cond, then_case, else_case })
    }

    pub fn call(ty: ScalarType, name: impl Into<String>, args: Vec<Expr>, call_type: CallType) -> Self {
        Self::new(ExprNode::Call { ty, name: name.into(), args, call_type, value_index: 0 })
    }

    /// A call reading tuple output `value_index` of a pipeline function.
    pub fn call_indexed(
        ty: ScalarType,
        name: impl Into<String>,
        args: Vec<Expr>,
        call_type: CallType,
        value_index: usize,
    ) -> Self {
        Self::new(ExprNode::Call { ty, name: name.into(), args, call_type, value_index })
    }

    pub fn let_in(name: impl Into<String>, value: Expr, body: Expr) -> Self {
        Self::new(ExprNode::Let { name: name.into(), value, body })
    }

    // ---- inspection ----

    pub fn as_const(&self) -> Option<&ConstValue> {
        match self.node() {
            ExprNode::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_const_int(&self) -> Option<i64> {
        self.as_const().and_then(ConstValue::as_int)
    }

    pub fn as_var(&self) -> Option<&str> {
        match self.node() {
            ExprNode::Var { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.node(), ExprNode::Const(_))
    }

    /// Result type of the expression.
    pub fn ty(&self) -> ScalarType {
        match self.node() {
            ExprNode::Const(v) => v.ty(),
            ExprNode::Var { ty, .. } | ExprNode::Cast { ty, .. } | ExprNode::Call { ty, .. } => *ty,
            ExprNode::Binary(op, a, _) => {
                if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
                    ScalarType::Bool
                } else {
                    a.ty()
                }
            }
            ExprNode::Not(_) => ScalarType::Bool,
            ExprNode::Select { then_case, .. } => then_case.ty(),
            ExprNode::Let { body, .. } => body.ty(),
        }
    }
}

/// `true` as an expression.
pub fn const_true() -> Expr {
    Expr::bool_const(true)
}

/// `false` as an expression.
pub fn const_false() -> Expr {
    Expr::bool_const(false)
}

/// Zero of the given scalar type.
pub fn make_zero(ty: ScalarType) -> Expr {
    match ty {
        ScalarType::Bool => Expr::bool_const(false),
        ScalarType::Int32 => Expr::int(0),
        ScalarType::UInt32 => Expr::new(ExprNode::Const(ConstValue::UInt(0))),
        ScalarType::Float32 | ScalarType::Float64 => Expr::float(0.0),
        ScalarType::Handle => Expr::cast(Expr::int(0), ScalarType::Handle),
    }
}

/// Wraps an expression in the `likely` loop-partitioning hint.
pub fn likely(e: Expr) -> Expr {
    let ty = e.ty();
    Expr::call(ty, intrinsics::LIKELY, vec![e], CallType::Intrinsic)
}

/// Is this a bare numeric immediate (the partitioner's "simple const")?
pub fn is_simple_const(e: &Expr) -> bool {
    matches!(
        e.as_const(),
        Some(ConstValue::Int(_) | ConstValue::UInt(_) | ConstValue::Float(_) | ConstValue::Bool(_))
    )
}

/// Does this expression fold to integer zero?
pub fn is_zero(e: &Expr) -> bool {
    matches!(e.as_const(), Some(ConstValue::Int(0) | ConstValue::UInt(0)))
}

/// Does this expression fold to integer one?
pub fn is_one(e: &Expr) -> bool {
    matches!(e.as_const(), Some(ConstValue::Int(1) | ConstValue::UInt(1)))
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl std::ops::$trait<i64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: i64) -> Expr {
                Expr::binary($op, self, Expr::int(rhs))
            }
        }

        impl std::ops::$trait<Expr> for i64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::int(self), rhs)
            }
        }
    };
}

impl_expr_op!(Add, add, BinaryOp::Add);
impl_expr_op!(Sub, sub, BinaryOp::Sub);
impl_expr_op!(Mul, mul, BinaryOp::Mul);
impl_expr_op!(Div, div, BinaryOp::Div);
impl_expr_op!(Rem, rem, BinaryOp::Mod);

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            ExprNode::Const(v) => write!(f, "{v}"),
            ExprNode::Var { name, .. } => f.write_str(name),
            ExprNode::Cast { value, ty } => write!(f, "{ty}({value})"),
            ExprNode::Binary(op, a, b) => {
                let sym = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Mod => "%",
                    BinaryOp::Eq => "==",
                    BinaryOp::Ne => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    BinaryOp::And => "&&",
                    BinaryOp::Or => "||",
                    BinaryOp::Min => return write!(f, "min({a}, {b})"),
                    BinaryOp::Max => return write!(f, "max({a}, {b})"),
                };
                write!(f, "({a} {sym} {b})")
            }
            ExprNode::Not(a) => write!(f, "!{a}"),
            ExprNode::Select { cond, then_case, else_case } => {
                write!(f, "select({cond}, {then_case}, {else_case})")
            }
            ExprNode::Call { name, args, value_index, .. } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")?;
                if *value_index != 0 {
                    write!(f, "[{value_index}]")?;
                }
                Ok(())
            }
            ExprNode::Let { name, value, body } => write!(f, "(let {name} = {value} in {body})"),
        }
    }
}

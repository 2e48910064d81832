//! Scalar types, constants, and the small enums shared across the IR.

use std::fmt;

/// Scalar element type of an expression or a function output.
///
/// `Handle` is the opaque buffer-pointer type; references to a function's
/// backing storage appear in the IR as `Handle`-typed variables named
/// `<func>.<k>.buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int32,
    UInt32,
    Float32,
    Float64,
    Handle,
}

impl ScalarType {
    /// Size of one element in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 | Self::Handle => 8,
        }
    }

    pub fn is_bool(self) -> bool {
        matches!(self, Self::Bool)
    }

    pub fn is_handle(self) -> bool {
        matches!(self, Self::Handle)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
            Self::Handle => "handle",
        };
        f.write_str(name)
    }
}

/// Compile-time constant payload of a `Const` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ConstValue {
    pub fn ty(&self) -> ScalarType {
        match self {
            Self::Int(_) => ScalarType::Int32,
            Self::UInt(_) => ScalarType::UInt32,
            Self::Float(_) => ScalarType::Float32,
            Self::Bool(_) => ScalarType::Bool,
            // String immediates only occur as diagnostic call arguments.
            Self::Str(_) => ScalarType::Handle,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

/// Execution strategy of one generated loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForType {
    #[default]
    Serial,
    Parallel,
    Vectorized,
    Unrolled,
}

impl ForType {
    /// Loops that may run iterations concurrently at runtime.
    pub fn is_parallel(self) -> bool {
        matches!(self, Self::Parallel | Self::Vectorized)
    }
}

/// Device a loop executes on. `Parent` inherits from the enclosing loop
/// during the device-propagation cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceApi {
    #[default]
    Parent,
    Host,
    Default,
    Cuda,
    OpenCl,
}

/// Kind of a `Call` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// A call to another pipeline function, by name.
    Func,
    /// A read of an input image.
    Image,
    /// A call resolved by the linker at codegen time.
    Extern,
    /// A compiler-internal operation (`likely`, `address_of`, ...).
    Intrinsic,
}

/// Binary operations, grouped the way the IR stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Whether the result type is `Bool` regardless of operand types.
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// User-facing scheduling errors. Each carries enough context to tell the
/// user what to change; internal invariant violations are panics, not
/// variants here.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// An exact split (one derived from a reduction variable) whose factor
    /// could not be proven to divide the extent.
    #[snafu(display(
        "when splitting {old_var} into {outer} and {inner}, could not prove the split factor \
         ({factor}) divides the extent of {old_var} ({extent}); this is required when the split \
         originates from a reduction variable"
    ))]
    ExactSplitDoesNotDivide { old_var: String, outer: String, inner: String, factor: String, extent: String },

    /// An input of an extern stage was scheduled inline.
    #[snafu(display(
        "function {func} cannot be scheduled inline because it is used by the externally \
         computed function {consumer}"
    ))]
    ExternInputInlined { func: String, consumer: String },

    /// Pipeline outputs must be stored and computed at root.
    #[snafu(display("function {func} is the output, so it must be scheduled compute_root (the default)"))]
    OutputNotRoot { func: String },

    /// The requested store/compute placement is not among the legal sites,
    /// or a parallel loop sits between the store and compute levels.
    #[snafu(display("{message}"))]
    InvalidSchedule { func: String, message: String },

    /// A function was asked to be inlined but has update stages.
    #[snafu(display("cannot inline function {func}: it has update definitions"))]
    InlineOfImpureFunction { func: String },
}

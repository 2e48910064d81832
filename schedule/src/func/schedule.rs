//! The schedule value object: dims, splits, bounds, loop levels, and
//! specializations attached to one definition stage of a function.

use prism_ir::{DeviceApi, Expr, ForType};

/// Name of the synthetic dimension appended outside all real loops of every
/// stage. It lowers to a unit-extent loop and is stripped by a cleanup pass.
pub const OUTERMOST: &str = "__outermost";

/// Variable component of the root loop level.
pub const ROOT_VAR: &str = "__root";

/// Stage namespace prefix: stage 0 is the initial definition, stage `i + 1`
/// the i-th update.
pub fn stage_prefix(func: &str, stage: usize) -> String {
    format!("{func}.s{stage}.")
}

/// A loop in the generated nest where a function may be stored or computed.
///
/// Inline is the empty pair, root is `("", "__root")`, anything else names a
/// dimension of another function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopLevel {
    pub func: String,
    pub var: String,
}

impl LoopLevel {
    pub fn inlined() -> Self {
        Self { func: String::new(), var: String::new() }
    }

    pub fn root() -> Self {
        Self { func: String::new(), var: ROOT_VAR.to_owned() }
    }

    pub fn at(func: impl Into<String>, var: impl Into<String>) -> Self {
        Self { func: func.into(), var: var.into() }
    }

    pub fn is_inline(&self) -> bool {
        self.var.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.var == ROOT_VAR
    }

    /// Level-against-level match: both components equal.
    pub fn match_level(&self, other: &LoopLevel) -> bool {
        self.func == other.func && self.var == other.var
    }

    /// Level-against-loop-name match. Loop names carry stage infixes
    /// (`f.s0.x`), so this compares the function prefix and var suffix.
    pub fn match_loop(&self, loop_name: &str) -> bool {
        loop_name.starts_with(&format!("{}.", self.func)) && loop_name.ends_with(&format!(".{}", self.var))
    }
}

/// One loop of a stage's nest, innermost first in the dim list.
#[derive(Debug, Clone, PartialEq)]
pub struct Dim {
    pub var: String,
    pub for_type: ForType,
    pub device: DeviceApi,
    /// Pure dimensions come from the function's argument list; impure ones
    /// from a reduction domain.
    pub pure_dim: bool,
}

impl Dim {
    pub fn pure_var(var: impl Into<String>) -> Self {
        Self { var: var.into(), for_type: ForType::Serial, device: DeviceApi::Parent, pure_dim: true }
    }

    pub fn reduction_var(var: impl Into<String>) -> Self {
        Self { var: var.into(), for_type: ForType::Serial, device: DeviceApi::Parent, pure_dim: false }
    }
}

/// A loop-nest transformation on one dimension of a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Split {
    /// `old = factor * outer + inner`. `exact` splits must divide evenly
    /// (they originate from reduction variables); `partial` splits clamp the
    /// inner extent instead of the base.
    Var { old_var: String, outer: String, inner: String, factor: Expr, exact: bool, partial: bool },
    /// `old` becomes `new`.
    Rename { old_var: String, new_var: String },
    /// `fused` ranges over `outer * inner`; both sources collapse into it.
    Fuse { fused: String, outer: String, inner: String },
}

impl Split {
    /// The variable this split consumes.
    pub fn old_var(&self) -> &str {
        match self {
            Self::Var { old_var, .. } | Self::Rename { old_var, .. } => old_var,
            Self::Fuse { fused, .. } => fused,
        }
    }

    /// The `outer` field in the shared record layout: the outer result of a
    /// split, the result of a rename, or the outer source of a fuse.
    pub fn outer_name(&self) -> &str {
        match self {
            Self::Var { outer, .. } | Self::Fuse { outer, .. } => outer,
            Self::Rename { new_var, .. } => new_var,
        }
    }

    pub fn is_rename(&self) -> bool {
        matches!(self, Self::Rename { .. })
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Self::Var { .. })
    }

    pub fn is_fuse(&self) -> bool {
        matches!(self, Self::Fuse { .. })
    }
}

/// An explicit bound `[min, min+extent)` promised for a pure dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
}

/// A guarded alternative schedule; the condition is evaluated at runtime
/// (or folded at compile time when the substituted form simplifies).
#[derive(Debug, Clone, PartialEq)]
pub struct Specialization {
    pub condition: Expr,
    pub schedule: Schedule,
}

/// One reduction variable of an update's domain.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionVariable {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
}

/// The iteration domain of an update definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReductionDomain {
    pub vars: Vec<ReductionVariable>,
}

impl ReductionDomain {
    pub fn new(vars: Vec<ReductionVariable>) -> Self {
        Self { vars }
    }
}

/// Everything the user (or the auto-scheduler) has said about lowering one
/// stage of one function.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub splits: Vec<Split>,
    pub dims: Vec<Dim>,
    pub bounds: Vec<Bound>,
    pub specializations: Vec<Specialization>,
    pub store_level: LoopLevel,
    pub compute_level: LoopLevel,
    pub reduction_domain: Option<ReductionDomain>,
    pub memoized: bool,
    /// Set whenever a scheduling directive lands on this stage; used to warn
    /// about half-scheduled functions.
    pub touched: bool,
}

impl Schedule {
    /// A fresh schedule over the given pure dims, with the synthetic
    /// outermost dim appended and inline store/compute levels.
    pub fn for_pure_args(args: &[String]) -> Self {
        let mut dims: Vec<Dim> = args.iter().map(Dim::pure_var).collect();
        dims.push(Dim::pure_var(OUTERMOST));
        Self {
            splits: Vec::new(),
            dims,
            bounds: Vec::new(),
            specializations: Vec::new(),
            store_level: LoopLevel::inlined(),
            compute_level: LoopLevel::inlined(),
            reduction_domain: None,
            memoized: false,
            touched: false,
        }
    }

    /// Schedule of an update stage: pure vars that appear in the update
    /// arguments (innermost), then the reduction domain outside of them.
    pub fn for_update(pure_vars: &[String], domain: Option<&ReductionDomain>) -> Self {
        let mut dims: Vec<Dim> = pure_vars.iter().map(Dim::pure_var).collect();
        if let Some(domain) = domain {
            for rv in &domain.vars {
                dims.push(Dim::reduction_var(&rv.var));
            }
        }
        dims.push(Dim::pure_var(OUTERMOST));
        Self {
            splits: Vec::new(),
            dims,
            bounds: Vec::new(),
            specializations: Vec::new(),
            store_level: LoopLevel::inlined(),
            compute_level: LoopLevel::inlined(),
            reduction_domain: domain.cloned(),
            memoized: false,
            touched: false,
        }
    }

    pub fn dim_index(&self, var: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.var == var)
    }

    fn dim_index_or_panic(&self, var: &str) -> usize {
        self.dim_index(var)
            .unwrap_or_else(|| panic!("dimension {var} not found in schedule dims"))
    }

    // ---- scheduling directives ----

    /// `old = factor * outer + inner`. The inner dim takes the old dim's
    /// slot, the outer dim lands just outside it.
    pub fn split(&mut self, old: &str, outer: &str, inner: &str, factor: Expr) {
        self.split_with(old, outer, inner, factor, false, false);
    }

    pub fn split_with(&mut self, old: &str, outer: &str, inner: &str, factor: Expr, exact: bool, partial: bool) {
        let idx = self.dim_index_or_panic(old);
        let template = self.dims[idx].clone();
        self.dims[idx].var = inner.to_owned();
        self.dims.insert(idx + 1, Dim { var: outer.to_owned(), ..template });
        self.splits.push(Split::Var {
            old_var: old.to_owned(),
            outer: outer.to_owned(),
            inner: inner.to_owned(),
            factor,
            exact,
            partial,
        });
        self.touched = true;
    }

    pub fn rename(&mut self, old: &str, new: &str) {
        let idx = self.dim_index_or_panic(old);
        self.dims[idx].var = new.to_owned();
        self.splits.push(Split::Rename { old_var: old.to_owned(), new_var: new.to_owned() });
        self.touched = true;
    }

    /// Collapse `outer` and `inner` into `fused`, which takes inner's slot.
    pub fn fuse(&mut self, inner: &str, outer: &str, fused: &str) {
        let outer_idx = self.dim_index_or_panic(outer);
        let outer_pure = self.dims[outer_idx].pure_dim;
        self.dims.remove(outer_idx);
        let inner_idx = self.dim_index_or_panic(inner);
        self.dims[inner_idx].var = fused.to_owned();
        self.dims[inner_idx].pure_dim &= outer_pure;
        self.splits.push(Split::Fuse {
            fused: fused.to_owned(),
            outer: outer.to_owned(),
            inner: inner.to_owned(),
        });
        self.touched = true;
    }

    /// Reorder the named dims among themselves, innermost first. Dims not
    /// named keep their slots.
    pub fn reorder(&mut self, vars: &[&str]) {
        let slots: Vec<usize> = vars.iter().map(|v| self.dim_index_or_panic(v)).collect();
        let mut sorted = slots.clone();
        sorted.sort_unstable();
        let reordered: Vec<Dim> = slots.iter().map(|&i| self.dims[i].clone()).collect();
        for (slot, dim) in sorted.into_iter().zip(reordered) {
            self.dims[slot] = dim;
        }
        self.touched = true;
    }

    pub fn set_for_type(&mut self, var: &str, for_type: ForType) {
        let idx = self.dim_index_or_panic(var);
        self.dims[idx].for_type = for_type;
        self.touched = true;
    }

    pub fn bound(&mut self, var: &str, min: Expr, extent: Expr) {
        self.bounds.push(Bound { var: var.to_owned(), min, extent });
        self.touched = true;
    }

    pub fn specialize(&mut self, condition: Expr, schedule: Schedule) {
        self.specializations.push(Specialization { condition, schedule });
        self.touched = true;
    }
}

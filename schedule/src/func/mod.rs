//! The function data model: a named, multi-output array producer with an
//! initial definition, optional update definitions, an optional extern
//! binding, and a schedule per stage.

pub mod schedule;

use prism_ir::{Expr, ScalarType};

pub use schedule::{
    Bound, Dim, LoopLevel, OUTERMOST, ROOT_VAR, ReductionDomain, ReductionVariable, Schedule,
    Specialization, Split, stage_prefix,
};

/// One update definition: `f(args) = values` over an optional reduction
/// domain, with its own schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDefinition {
    pub args: Vec<Expr>,
    pub values: Vec<Expr>,
    pub domain: Option<ReductionDomain>,
    pub schedule: Schedule,
}

/// One positional argument of an extern stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternArg {
    /// A scalar expression, passed through as-is.
    Expr(Expr),
    /// Another pipeline function; expands to one buffer handle per output.
    Func(String),
    /// A concrete buffer, referenced by name.
    Buffer(String),
    /// An image parameter, referenced by name.
    ImageParam(String),
}

/// Binding of a stage to an externally defined implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternDefinition {
    pub function_name: String,
    pub args: Vec<ExternArg>,
}

/// A named array-valued producer.
///
/// Functions reference each other strictly by name; the `env` mapping owns
/// every function, so there are no back-pointers to keep consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    args: Vec<String>,
    values: Vec<Expr>,
    output_types: Vec<ScalarType>,
    updates: Vec<UpdateDefinition>,
    extern_def: Option<ExternDefinition>,
    schedule: Schedule,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        args: Vec<String>,
        values: Vec<Expr>,
        output_types: Vec<ScalarType>,
    ) -> Self {
        assert_eq!(values.len(), output_types.len(), "one output type per value expression");
        let schedule = Schedule::for_pure_args(&args);
        Self { name: name.into(), args, values, output_types, updates: Vec::new(), extern_def: None, schedule }
    }

    /// A function bound to an extern implementation: no value expressions,
    /// but a known output signature.
    pub fn new_extern(
        name: impl Into<String>,
        args: Vec<String>,
        output_types: Vec<ScalarType>,
        extern_name: impl Into<String>,
        extern_args: Vec<ExternArg>,
    ) -> Self {
        let schedule = Schedule::for_pure_args(&args);
        Self {
            name: name.into(),
            args,
            values: Vec::new(),
            output_types,
            updates: Vec::new(),
            extern_def: Some(ExternDefinition {
                function_name: extern_name.into(),
                args: extern_args,
            }),
            schedule,
        }
    }

    /// Single-output `Float32` convenience constructor.
    pub fn single(name: impl Into<String>, args: &[&str], value: Expr) -> Self {
        Self::new(
            name,
            args.iter().map(|a| (*a).to_owned()).collect(),
            vec![value],
            vec![ScalarType::Float32],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn dimensions(&self) -> usize {
        self.args.len()
    }

    pub fn values(&self) -> &[Expr] {
        &self.values
    }

    pub fn outputs(&self) -> usize {
        self.output_types.len()
    }

    pub fn output_types(&self) -> &[ScalarType] {
        &self.output_types
    }

    pub fn updates(&self) -> &[UpdateDefinition] {
        &self.updates
    }

    pub fn has_update_definition(&self) -> bool {
        !self.updates.is_empty()
    }

    pub fn extern_definition(&self) -> Option<&ExternDefinition> {
        self.extern_def.as_ref()
    }

    pub fn has_extern_definition(&self) -> bool {
        self.extern_def.is_some()
    }

    /// Pure functions have a single definition and no extern binding.
    pub fn is_pure(&self) -> bool {
        self.updates.is_empty() && self.extern_def.is_none()
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.schedule
    }

    pub fn update_schedule(&self, i: usize) -> &Schedule {
        &self.updates[i].schedule
    }

    pub fn update_schedule_mut(&mut self, i: usize) -> &mut Schedule {
        &mut self.updates[i].schedule
    }

    /// Append an update definition. Its schedule's dims are the pure
    /// variables appearing in `args` (innermost) followed by the reduction
    /// domain.
    pub fn define_update(&mut self, args: Vec<Expr>, values: Vec<Expr>, domain: Option<ReductionDomain>) {
        assert_eq!(args.len(), self.args.len(), "update site must cover every dimension");
        let pure_vars: Vec<String> = args
            .iter()
            .filter_map(|a| a.as_var())
            .filter(|v| self.args.iter().any(|arg| arg == v))
            .map(str::to_owned)
            .collect();
        let schedule = Schedule::for_update(&pure_vars, domain.as_ref());
        self.updates.push(UpdateDefinition { args, values, domain, schedule });
    }

    /// Bind this function to an extern implementation.
    pub fn define_extern(&mut self, function_name: impl Into<String>, args: Vec<ExternArg>) {
        self.extern_def = Some(ExternDefinition { function_name: function_name.into(), args });
    }

    // ---- fluent scheduling directives (initial definition stage) ----

    pub fn split(&mut self, old: &str, outer: &str, inner: &str, factor: i64) -> &mut Self {
        self.schedule.split(old, outer, inner, Expr::int(factor));
        self
    }

    pub fn rename_dim(&mut self, old: &str, new: &str) -> &mut Self {
        self.schedule.rename(old, new);
        self
    }

    pub fn fuse(&mut self, inner: &str, outer: &str, fused: &str) -> &mut Self {
        self.schedule.fuse(inner, outer, fused);
        self
    }

    pub fn reorder(&mut self, vars: &[&str]) -> &mut Self {
        self.schedule.reorder(vars);
        self
    }

    pub fn parallel(&mut self, var: &str) -> &mut Self {
        self.schedule.set_for_type(var, prism_ir::ForType::Parallel);
        self
    }

    pub fn vectorize(&mut self, var: &str) -> &mut Self {
        self.schedule.set_for_type(var, prism_ir::ForType::Vectorized);
        self
    }

    pub fn unroll(&mut self, var: &str) -> &mut Self {
        self.schedule.set_for_type(var, prism_ir::ForType::Unrolled);
        self
    }

    pub fn bound(&mut self, var: &str, min: i64, extent: i64) -> &mut Self {
        self.schedule.bound(var, Expr::int(min), Expr::int(extent));
        self
    }

    pub fn compute_at(&mut self, func: &str, var: &str) -> &mut Self {
        self.schedule.compute_level = LoopLevel::at(func, var);
        // Storage defaults to the compute granularity until store_at says
        // otherwise.
        if self.schedule.store_level.is_inline() {
            self.schedule.store_level = self.schedule.compute_level.clone();
        }
        self.schedule.touched = true;
        self
    }

    pub fn compute_root(&mut self) -> &mut Self {
        self.schedule.compute_level = LoopLevel::root();
        if self.schedule.store_level.is_inline() {
            self.schedule.store_level = LoopLevel::root();
        }
        self.schedule.touched = true;
        self
    }

    pub fn compute_inline(&mut self) -> &mut Self {
        self.schedule.compute_level = LoopLevel::inlined();
        self.schedule.store_level = LoopLevel::inlined();
        self.schedule.touched = true;
        self
    }

    pub fn store_at(&mut self, func: &str, var: &str) -> &mut Self {
        self.schedule.store_level = LoopLevel::at(func, var);
        self.schedule.touched = true;
        self
    }

    pub fn store_root(&mut self) -> &mut Self {
        self.schedule.store_level = LoopLevel::root();
        self.schedule.touched = true;
        self
    }

    pub fn memoize(&mut self) -> &mut Self {
        self.schedule.memoized = true;
        self.schedule.touched = true;
        self
    }
}

/// Shorthand for a `Func` call expression reading output 0.
pub fn call(func: &str, args: Vec<Expr>) -> Expr {
    Expr::call(ScalarType::Float32, func, args, prism_ir::CallType::Func)
}

/// Shorthand for an image read.
pub fn image(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(ScalarType::Float32, name, args, prism_ir::CallType::Image)
}

//! Scheduling core of the prism pipeline compiler.
//!
//! Takes a dependency-ordered set of array-valued functions plus their
//! schedules and lowers them into a single loop-nest statement; an
//! auto-scheduler infers schedules when the user supplies none.
//!
//! # Module Organization
//!
//! - [`func`] - the function/schedule data model
//! - [`loop_nest`] - split normalization and per-stage loop-nest synthesis
//! - [`production`] - produce/update composition and the extern call path
//! - [`inject`] - realization injection at store/compute levels
//! - [`validate`] - legal-placement computation and race rejection
//! - [`cleanup`] - outermost-loop stripping, device propagation
//! - [`driver`] - the `schedule_functions` entry point
//! - [`advisor`] - dependence analysis, cost model, partitioner
//! - [`graph`] / [`inline`] / [`parallel_rvar`] - call-graph services

pub mod advisor;
pub mod cleanup;
pub mod driver;
pub mod env;
pub mod error;
pub mod func;
pub mod graph;
pub mod inject;
pub mod inline;
pub mod loop_nest;
pub mod parallel_rvar;
pub mod production;
pub mod validate;

#[cfg(test)]
pub mod test;

pub use advisor::{AdvisorOpts, schedule_advisor, simple_inline};
pub use advisor::cost::{ExprCost, box_area, func_cost, region_cost, region_size};
pub use advisor::dependence::{DependenceAnalysis, redundant_regions, regions_required};
pub use advisor::partition::{GroupSched, Level, MachineParams, MergeOption, Partitioner};
pub use cleanup::{propagate_device, strip_outermost_loops};
pub use driver::schedule_functions;
pub use env::{Env, build_env};
pub use error::{Error, Result};
pub use func::{
    Bound, Dim, ExternArg, ExternDefinition, Function, LoopLevel, OUTERMOST, ROOT_VAR,
    ReductionDomain, ReductionVariable, Schedule, Specialization, Split, UpdateDefinition, call,
    image, stage_prefix,
};
pub use graph::{find_direct_calls, realization_order};
pub use inject::{InjectRealization, function_is_used_in_stmt};
pub use inline::inline_function;
pub use loop_nest::{build_provide_loop_nest, normalize_splits};
pub use parallel_rvar::can_parallelize_rvar;
pub use production::{build_produce, build_production, build_update, inject_explicit_bounds};
pub use validate::{schedule_to_source, validate_schedule};

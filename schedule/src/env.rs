//! The environment: every function of the pipeline, keyed by name.

use indexmap::IndexMap;

use crate::func::Function;

/// Name-to-function mapping. Built before scheduling; the auto-scheduler is
/// the only pass that mutates it.
pub type Env = IndexMap<String, Function>;

/// Build an environment from a list of functions.
pub fn build_env(funcs: impl IntoIterator<Item = Function>) -> Env {
    funcs.into_iter().map(|f| (f.name().to_owned(), f)).collect()
}

//! Process-wide unique name generation.
//!
//! A single atomic counter backs every fresh name the scheduler mints
//! (composite split variables, extern result temporaries). Names are
//! `<tag><n>` with a monotonically increasing `n`, so they never collide
//! with user dimension names, which cannot start with a bare tag digit pair
//! under the `f.s<k>.v` naming contract.

use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A fresh name starting with `tag`.
pub fn unique_name(tag: char) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{tag}{n}")
}

/// Reset the counter. Test support only: production callers must never
/// reuse names within a process.
pub fn reset_unique_names() {
    COUNTER.store(0, Ordering::Relaxed);
}

//! Symbolic intervals and per-dimension bounding boxes.

use smallvec::SmallVec;

use crate::expr::Expr;
use crate::simplify::simplify;

/// A closed symbolic interval `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub min: Expr,
    pub max: Expr,
}

impl Interval {
    pub fn new(min: Expr, max: Expr) -> Self {
        Self { min, max }
    }

    /// The degenerate interval containing a single value.
    pub fn point(e: Expr) -> Self {
        Self { min: e.clone(), max: e }
    }

    /// Number of integers covered, when both endpoints are immediates.
    /// `None` when either endpoint is symbolic; zero for an empty interval.
    pub fn constant_extent(&self) -> Option<i64> {
        let min = self.min.as_const_int()?;
        let max = self.max.as_const_int()?;
        Some(if min <= max { max - min + 1 } else { 0 })
    }
}

/// A bounding box: one interval per dimension of the producer it describes.
/// Pipelines rarely exceed four dimensions, so the intervals live inline.
pub type BoundsBox = SmallVec<[Interval; 4]>;

/// Pointwise union: grow `dst` so it covers `src` in every dimension.
pub fn merge_boxes(dst: &mut BoundsBox, src: &BoundsBox) {
    assert_eq!(dst.len(), src.len(), "cannot merge boxes of different dimensionality");
    for (d, s) in dst.iter_mut().zip(src) {
        d.min = simplify(&Expr::min(d.min.clone(), s.min.clone()));
        d.max = simplify(&Expr::max(d.max.clone(), s.max.clone()));
    }
}

/// Pointwise intersection of two intervals. May be empty.
pub fn interval_intersect(a: &Interval, b: &Interval) -> Interval {
    Interval {
        min: simplify(&Expr::max(a.min.clone(), b.min.clone())),
        max: simplify(&Expr::min(a.max.clone(), b.max.clone())),
    }
}

/// Simplify both endpoints of every dimension in place.
pub fn simplify_box(b: &mut BoundsBox) {
    for i in b.iter_mut() {
        i.min = simplify(&i.min);
        i.max = simplify(&i.max);
    }
}

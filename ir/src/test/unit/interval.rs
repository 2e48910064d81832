use smallvec::smallvec;

use crate::expr::Expr;
use crate::interval::{BoundsBox, Interval, interval_intersect, merge_boxes};

fn const_interval(min: i64, max: i64) -> Interval {
    Interval::new(Expr::int(min), Expr::int(max))
}

#[test]
fn constant_extent_counts_integers() {
    assert_eq!(const_interval(0, 9).constant_extent(), Some(10));
    assert_eq!(const_interval(5, 5).constant_extent(), Some(1));
    assert_eq!(const_interval(3, 1).constant_extent(), Some(0));
    assert_eq!(Interval::new(Expr::var("l"), Expr::int(4)).constant_extent(), None);
}

#[test]
fn merge_takes_the_union() {
    let mut a: BoundsBox = smallvec![const_interval(0, 4), const_interval(2, 8)];
    let b: BoundsBox = smallvec![const_interval(-3, 2), const_interval(5, 6)];
    merge_boxes(&mut a, &b);
    assert_eq!(a[0], const_interval(-3, 4));
    assert_eq!(a[1], const_interval(2, 8));
}

#[test]
fn intersect_can_be_empty() {
    let i = interval_intersect(&const_interval(0, 3), &const_interval(5, 9));
    assert_eq!(i.constant_extent(), Some(0));
}

#[test]
fn intersect_of_overlapping_intervals() {
    let i = interval_intersect(&const_interval(0, 8), &const_interval(8, 16));
    assert_eq!(i, const_interval(8, 8));
}

#[test]
#[should_panic(expected = "different dimensionality")]
fn merge_rejects_rank_mismatch() {
    let mut a: BoundsBox = smallvec![const_interval(0, 4)];
    let b: BoundsBox = smallvec![const_interval(0, 4), const_interval(0, 4)];
    merge_boxes(&mut a, &b);
}

//! Property suites: the simplifier preserves value; interval evaluation is
//! sound on concrete points.

use std::collections::HashMap;

use proptest::prelude::*;

use crate::bounds::{FuncValueBounds, Scope, bounds_of_expr_in_scope};
use crate::expr::{Expr, ExprNode};
use crate::interval::Interval;
use crate::simplify::simplify;
use crate::types::{BinaryOp, ConstValue};

const VARS: [&str; 3] = ["x", "y", "z"];

/// Random integer index expressions over a small variable set.
fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (-20i64..20).prop_map(Expr::int),
        (0usize..VARS.len()).prop_map(|i| Expr::var(VARS[i])),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        (
            inner.clone(),
            inner,
            prop_oneof![
                Just(BinaryOp::Add),
                Just(BinaryOp::Sub),
                Just(BinaryOp::Mul),
                Just(BinaryOp::Min),
                Just(BinaryOp::Max),
            ],
        )
            .prop_map(|(a, b, op)| Expr::binary(op, a, b))
    })
}

/// Evaluate an integer expression under an assignment.
fn eval(e: &Expr, env: &HashMap<&str, i64>) -> Option<i64> {
    match e.node() {
        ExprNode::Const(ConstValue::Int(v)) => Some(*v),
        ExprNode::Var { name, .. } => env.get(name.as_str()).copied(),
        ExprNode::Binary(op, a, b) => {
            let a = eval(a, env)?;
            let b = eval(b, env)?;
            Some(match op {
                BinaryOp::Add => a.checked_add(b)?,
                BinaryOp::Sub => a.checked_sub(b)?,
                BinaryOp::Mul => a.checked_mul(b)?,
                BinaryOp::Min => a.min(b),
                BinaryOp::Max => a.max(b),
                _ => return None,
            })
        }
        _ => None,
    }
}

proptest! {
    #[test]
    fn simplify_preserves_value(
        e in arb_expr(),
        vx in -10i64..10,
        vy in -10i64..10,
        vz in -10i64..10,
    ) {
        let env = HashMap::from([("x", vx), ("y", vy), ("z", vz)]);
        let before = eval(&e, &env);
        let after = eval(&simplify(&e), &env);
        prop_assert_eq!(before, after);
    }

    #[test]
    fn interval_bounds_contain_concrete_points(
        e in arb_expr(),
        vx in 0i64..8,
        vy in 0i64..8,
        vz in 0i64..8,
    ) {
        let mut scope = Scope::new();
        for var in VARS {
            scope.insert(var.to_owned(), Interval::new(Expr::int(0), Expr::int(7)));
        }
        let interval = bounds_of_expr_in_scope(&e, &scope, &FuncValueBounds::new());

        let env = HashMap::from([("x", vx), ("y", vy), ("z", vz)]);
        if let Some(value) = eval(&e, &env) {
            let min = eval(&simplify(&interval.min), &HashMap::new());
            let max = eval(&simplify(&interval.max), &HashMap::new());
            if let (Some(min), Some(max)) = (min, max) {
                prop_assert!(min <= value && value <= max, "{} outside [{}, {}]", value, min, max);
            }
        }
    }
}

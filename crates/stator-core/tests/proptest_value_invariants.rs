//! Property-based invariant tests for the value model.
//!
//! These verify the relationships between the engine's two equality
//! relations that the memoization and diffing layers rely on:
//!
//! 1. `same` is reflexive (including NaN floats).
//! 2. `same` is symmetric.
//! 3. `same` implies `shallow_equal`.
//! 4. `shallow_equal` is reflexive and symmetric.
//! 5. `same` on scalars agrees with structural equality.
//! 6. Slice comparison is length-sensitive.

use proptest::prelude::*;
use stator_core::{Value, shallow_equal, shallow_equal_slices};

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Unit),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_map(Value::Float),
        "[a-z]{0,8}".prop_map(|s| Value::from(s.as_str())),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(2, 8, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
            proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| Value::map(m)),
        ]
    })
}

proptest! {
    #[test]
    fn same_is_reflexive(v in value_strategy()) {
        prop_assert!(v.same(&v));
        let clone = v.clone();
        prop_assert!(v.same(&clone));
    }

    #[test]
    fn same_is_symmetric(a in value_strategy(), b in value_strategy()) {
        prop_assert_eq!(a.same(&b), b.same(&a));
    }

    #[test]
    fn same_implies_shallow_equal(a in value_strategy(), b in value_strategy()) {
        if a.same(&b) {
            prop_assert!(shallow_equal(&a, &b));
        }
    }

    #[test]
    fn shallow_equal_is_reflexive_and_symmetric(
        a in value_strategy(),
        b in value_strategy(),
    ) {
        prop_assert!(shallow_equal(&a, &a));
        prop_assert_eq!(shallow_equal(&a, &b), shallow_equal(&b, &a));
    }

    #[test]
    fn scalar_same_agrees_with_structural_eq(
        a in scalar_strategy(),
        b in scalar_strategy(),
    ) {
        // NaN is the one place `same` is coarser than `==`.
        let nan_pair = matches!(
            (&a, &b),
            (Value::Float(x), Value::Float(y)) if x.is_nan() && y.is_nan()
        );
        if !nan_pair {
            prop_assert_eq!(a.same(&b), a == b);
        }
    }

    #[test]
    fn slice_comparison_checks_length(
        items in proptest::collection::vec(scalar_strategy(), 0..6),
    ) {
        prop_assert!(shallow_equal_slices(&items, &items));
        let mut longer = items.clone();
        longer.push(Value::Unit);
        prop_assert!(!shallow_equal_slices(&items, &longer));
    }
}

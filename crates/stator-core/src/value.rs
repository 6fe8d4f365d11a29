#![forbid(unsafe_code)]

//! Dynamic value model for instance members.
//!
//! Instance data travels through the engine as [`Value`]: a small dynamic
//! enum covering scalars, strings, and shared composites. Two equality
//! relations matter here and they are deliberately different:
//!
//! - [`Value::same`] is the engine's diffing primitive. Scalars and strings
//!   compare by value; [`Value::List`] and [`Value::Map`] compare by `Rc`
//!   pointer identity. A freshly built list is never `same` as the one it
//!   replaces, even when structurally equal.
//! - `PartialEq` is structural, for consumers and tests.
//!
//! [`shallow_equal`] compares exactly one level deep using `same` per
//! element, and is what field dependency lists are checked with.
//!
//! # Invariants
//!
//! 1. `same` implies `shallow_equal`.
//! 2. `same(a, a)` holds for every value, including `Float(NAN)`.
//! 3. Cloning a composite `Value` shares the underlying `Rc`; the clone is
//!    `same` as the original.

use std::collections::BTreeMap;
use std::rc::Rc;

/// A dynamic instance-member value.
///
/// Composite variants are reference counted so that cloning an instance
/// snapshot is cheap and so that identity survives a clone.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Absence of a value.
    Unit,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Shared list.
    List(Rc<Vec<Value>>),
    /// Shared string-keyed map.
    Map(Rc<BTreeMap<String, Value>>),
}

impl Value {
    /// Build a [`Value::List`] from an iterator of values.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(items.into_iter().collect()))
    }

    /// Build a [`Value::Map`] from an iterator of `(name, value)` pairs.
    pub fn map(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::Map(Rc::new(entries.into_iter().collect()))
    }

    /// Identity comparison: the engine's diffing primitive.
    ///
    /// Scalars and strings compare by value (NaN is `same` as NaN, so a
    /// NaN-carrying state cannot notify forever); `List` and `Map` compare
    /// by pointer identity.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// True for [`Value::Unit`].
    #[must_use]
    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Float payload, if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// List payload, if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map payload, if this is a `Map`.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Unit
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(Rc::new(v))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(Rc::new(v))
    }
}

/// One-level-deep equality under [`Value::same`].
///
/// Identical values are shallow-equal; lists and maps are shallow-equal
/// when their lengths/keys match and every element is pairwise `same`.
/// Everything else falls back to `same`.
#[must_use]
pub fn shallow_equal(prev: &Value, current: &Value) -> bool {
    if prev.same(current) {
        return true;
    }
    match (prev, current) {
        (Value::List(a), Value::List(b)) => shallow_equal_slices(a, b),
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, value)| {
                    b.get(key).is_some_and(|other| value.same(other))
                })
        }
        _ => false,
    }
}

/// Pairwise [`Value::same`] over two slices.
///
/// This is the comparison applied to field dependency lists.
#[must_use]
pub fn shallow_equal_slices(prev: &[Value], current: &[Value]) -> bool {
    prev.len() == current.len()
        && prev.iter().zip(current.iter()).all(|(a, b)| a.same(b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_same_by_value() {
        assert!(Value::Int(3).same(&Value::Int(3)));
        assert!(!Value::Int(3).same(&Value::Int(4)));
        assert!(Value::from("a").same(&Value::from("a")));
        assert!(!Value::Bool(true).same(&Value::Int(1)));
    }

    #[test]
    fn nan_is_same_as_nan() {
        assert!(Value::Float(f64::NAN).same(&Value::Float(f64::NAN)));
        assert!(!Value::Float(f64::NAN).same(&Value::Float(0.0)));
    }

    #[test]
    fn composites_same_by_identity() {
        let a = Value::list([Value::Int(1)]);
        let b = a.clone();
        let c = Value::list([Value::Int(1)]);
        assert!(a.same(&b));
        assert!(!a.same(&c));
        // Structural equality still holds for the rebuilt list.
        assert_eq!(a, c);
    }

    #[test]
    fn shallow_equal_one_level() {
        let shared = Value::list([Value::Int(9)]);
        let a = Value::list([Value::Int(1), shared.clone()]);
        let b = Value::list([Value::Int(1), shared.clone()]);
        // Different outer Rc, pairwise-same elements.
        assert!(shallow_equal(&a, &b));

        let c = Value::list([Value::Int(1), Value::list([Value::Int(9)])]);
        // Second element is a fresh list: not same, and shallow stops at one level.
        assert!(!shallow_equal(&a, &c));
    }

    #[test]
    fn shallow_equal_maps() {
        let shared = Value::from("x");
        let a = Value::map([("k".to_string(), shared.clone())]);
        let b = Value::map([("k".to_string(), shared)]);
        assert!(shallow_equal(&a, &b));

        let c = Value::map([("other".to_string(), Value::from("x"))]);
        assert!(!shallow_equal(&a, &c));
    }

    #[test]
    fn slice_comparison() {
        let deps = [Value::Int(1), Value::from("a")];
        assert!(shallow_equal_slices(&deps, &[Value::Int(1), Value::from("a")]));
        assert!(!shallow_equal_slices(&deps, &[Value::Int(1)]));
        assert!(!shallow_equal_slices(&deps, &[Value::Int(2), Value::from("a")]));
    }
}

#![forbid(unsafe_code)]

//! Instance members: plain values, derived fields, and behavior methods.
//!
//! A model produces an instance whose members are a tagged union,
//! [`Member`]. The tag decides how the interceptor treats an access:
//!
//! - [`Member::Value`] — plain data, returned as-is.
//! - [`Member::Field`] — a derived value with an optional dependency list,
//!   resolved through the container's memoization layer.
//! - [`Member::Method`] — a behavior: its return value becomes the next
//!   state and a tracked action is dispatched.
//! - [`Member::NonMutating`] — behavior-shaped, but calling it never emits
//!   an action.
//!
//! # Dependency lists
//!
//! A [`Field`] built with [`Field::with_deps`] caches its value until the
//! dependency list changes under shallow equality. A field built with
//! [`Field::new`] has no list and is never cached. Dependencies may name
//! other fields; a field dependency contributes its own (flattened) list,
//! and depending on a no-list field poisons the whole list back to "never
//! cached".

use std::rc::Rc;

use crate::value::Value;

/// A behavior method body: arguments in, next state out.
pub type BehaviorFn<S> = Rc<dyn Fn(&[Value]) -> S>;

/// A non-mutating method body: arguments in, plain value out.
pub type PlainFn = Rc<dyn Fn(&[Value]) -> Value>;

/// A field computation.
pub type ComputeFn = Rc<dyn Fn() -> Value>;

/// A derived, optionally dependency-memoized value.
///
/// The value is computed eagerly when the field is built (i.e. each time
/// the model runs), so [`Field::get`] is a cheap clone. [`Field::recompute`]
/// re-runs the computation and is what the memoization layer uses for
/// fields without a dependency list.
pub struct Field {
    compute: ComputeFn,
    deps: Option<Vec<Value>>,
    value: Value,
}

impl Field {
    /// A field with no dependency list: never cached, recomputed on every
    /// access.
    pub fn new(compute: impl Fn() -> Value + 'static) -> Self {
        let compute: ComputeFn = Rc::new(compute);
        let value = compute();
        Self {
            compute,
            deps: None,
            value,
        }
    }

    /// A field cached until `deps` changes under shallow equality.
    ///
    /// Field dependencies are flattened into their own lists; if any of
    /// them has no list, the result has no list either.
    pub fn with_deps(
        compute: impl Fn() -> Value + 'static,
        deps: impl IntoIterator<Item = Dep>,
    ) -> Self {
        let compute: ComputeFn = Rc::new(compute);
        let value = compute();
        Self {
            compute,
            deps: flatten_deps(deps),
            value,
        }
    }

    /// The value computed when this field was built.
    #[must_use]
    pub fn get(&self) -> Value {
        self.value.clone()
    }

    /// Run the computation again and return the live result.
    #[must_use]
    pub fn recompute(&self) -> Value {
        (self.compute)()
    }

    /// The flattened dependency list, or `None` for never-cached fields.
    #[must_use]
    pub fn deps(&self) -> Option<&[Value]> {
        self.deps.as_deref()
    }
}

impl Clone for Field {
    fn clone(&self) -> Self {
        Self {
            compute: Rc::clone(&self.compute),
            deps: self.deps.clone(),
            value: self.value.clone(),
        }
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("value", &self.value)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// One dependency input for [`Field::with_deps`].
pub enum Dep {
    /// A plain value dependency.
    Value(Value),
    /// Another field; contributes that field's own dependency list.
    Field(Field),
}

impl From<Value> for Dep {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<Field> for Dep {
    fn from(f: Field) -> Self {
        Self::Field(f)
    }
}

impl From<&Field> for Dep {
    fn from(f: &Field) -> Self {
        Self::Field(f.clone())
    }
}

fn flatten_deps(deps: impl IntoIterator<Item = Dep>) -> Option<Vec<Value>> {
    let mut out = Vec::new();
    for dep in deps {
        match dep {
            Dep::Value(v) => out.push(v),
            Dep::Field(field) => match field.deps() {
                // Depending on a never-cached field makes this field
                // never-cached as well.
                None => return None,
                Some(list) => out.extend(list.iter().cloned()),
            },
        }
    }
    Some(out)
}

/// One member of a model instance.
pub enum Member<S> {
    /// Plain data.
    Value(Value),
    /// Derived, optionally memoized value.
    Field(Field),
    /// Behavior method: returns the next state.
    Method(BehaviorFn<S>),
    /// Behavior-shaped call that never mutates state.
    NonMutating(PlainFn),
}

impl<S> Member<S> {
    /// True for [`Member::Field`].
    #[must_use]
    pub fn is_field(&self) -> bool {
        matches!(self, Self::Field(_))
    }

    /// True for the callable variants.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Method(_) | Self::NonMutating(_))
    }

    /// Human-readable tag, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Field(_) => "field",
            Self::Method(_) => "method",
            Self::NonMutating(_) => "non-mutating method",
        }
    }
}

impl<S> Clone for Member<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Field(f) => Self::Field(f.clone()),
            Self::Method(m) => Self::Method(Rc::clone(m)),
            Self::NonMutating(m) => Self::NonMutating(Rc::clone(m)),
        }
    }
}

impl<S> std::fmt::Debug for Member<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Field(field) => f.debug_tuple("Field").field(field).finish(),
            Self::Method(_) => write!(f, "Method(..)"),
            Self::NonMutating(_) => write!(f, "NonMutating(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

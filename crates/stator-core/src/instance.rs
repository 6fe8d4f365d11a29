#![forbid(unsafe_code)]

//! Model instances and the model contract.
//!
//! An [`Instance`] is the object a model derives from a state value: an
//! immutable, name-keyed map of [`Member`]s. The member map is captured at
//! construction and doubles as the allow-list of what the interceptor will
//! resolve — there is no inheritance and no late addition.
//!
//! A [`Model`] is a pure function `&S -> Instance<S>`. The engine calls it
//! on every committed transition; behavior methods typically capture the
//! state they were derived from.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::member::{Field, Member};
use crate::value::Value;

/// A pure derivation from state to instance.
pub type Model<S> = Rc<dyn Fn(&S) -> Instance<S>>;

/// The object produced by a model: data fields, field descriptors,
/// behavior methods, and non-mutating methods, keyed by name.
pub struct Instance<S> {
    members: BTreeMap<String, Member<S>>,
}

impl<S> Instance<S> {
    /// Start building an instance.
    #[must_use]
    pub fn builder() -> InstanceBuilder<S> {
        InstanceBuilder {
            members: BTreeMap::new(),
        }
    }

    /// Look up a member by name.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Member<S>> {
        self.members.get(name)
    }

    /// True if a member with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Member names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// All members, in name order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Member<S>)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the instance has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<S> std::fmt::Debug for Instance<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("members", &self.members)
            .finish()
    }
}

/// Builder for [`Instance`]. Later entries with the same name replace
/// earlier ones.
pub struct InstanceBuilder<S> {
    members: BTreeMap<String, Member<S>>,
}

impl<S> InstanceBuilder<S> {
    /// Add a plain data member.
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members
            .insert(name.into(), Member::Value(value.into()));
        self
    }

    /// Add a field descriptor.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.members.insert(name.into(), Member::Field(field));
        self
    }

    /// Add a behavior method. Its return value becomes the next state.
    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&[Value]) -> S + 'static,
    ) -> Self {
        self.members
            .insert(name.into(), Member::Method(Rc::new(method)));
        self
    }

    /// Add a non-mutating method: callable, but never emits an action.
    #[must_use]
    pub fn non_mutating(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&[Value]) -> Value + 'static,
    ) -> Self {
        self.members
            .insert(name.into(), Member::NonMutating(Rc::new(method)));
        self
    }

    /// Finish the instance.
    #[must_use]
    pub fn build(self) -> Instance<S> {
        Instance {
            members: self.members,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

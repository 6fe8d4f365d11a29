#![forbid(unsafe_code)]

//! The instance interceptor: read-only access with tracked behavior calls
//! and field memoization.
//!
//! An [`InstanceView`] resolves member access against the container's
//! *current* instance through an explicit interface — `get` for data,
//! `invoke` for behavior — instead of property trapping. The member map
//! captured when the model ran is the complete allow-list; nothing can be
//! added, and `set` always fails.
//!
//! # Behavior calls
//!
//! `invoke` resolves a stable [`ActionMethod`] handle (cached by name on
//! the container, so repeated lookups return the same handle). Calling it
//! runs the underlying behavior to compute a candidate next state, wraps
//! it in an action, and hands it to the notifier. Non-mutating members
//! short-circuit: their result comes back as [`CallOutcome::Value`] and no
//! action is emitted.
//!
//! # Field memoization
//!
//! Field reads go through the container's field cache:
//!
//! - no dependency list ⇒ never cached; every access recomputes and
//!   refreshes the cache metadata.
//! - dependency list ⇒ the cached value is returned as long as the live
//!   list is shallow-equal to the cached one; otherwise the live value is
//!   cached and returned.
//!
//! A member that stops being a field (or a method) between model runs is a
//! model-author bug and surfaces as an error immediately.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use stator_core::{
    Action, ActionKind, Field, Member, StoreError, Value, shallow_equal_slices,
};

use crate::notifier;
use crate::store::StoreInner;

/// Hook observing every resolved `get` (name, value). The signal journal
/// is fed through this.
pub(crate) type OnGet = Rc<dyn Fn(&str, &Value)>;

/// Cached resolution of one field.
pub(crate) struct FieldCache {
    pub(crate) value: Value,
    pub(crate) deps: Option<Vec<Value>>,
}

/// What a call produced.
#[derive(Debug)]
pub enum CallOutcome<S> {
    /// A behavior ran: the next state (already dispatched).
    State(S),
    /// A non-mutating method ran: its plain result, nothing dispatched.
    Value(Value),
}

impl<S: Clone> CallOutcome<S> {
    /// The next state, for behavior calls.
    #[must_use]
    pub fn state(&self) -> Option<S> {
        match self {
            Self::State(state) => Some(state.clone()),
            Self::Value(_) => None,
        }
    }

    /// The plain result, for non-mutating calls.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::State(_) => None,
            Self::Value(value) => Some(value),
        }
    }
}

/// A stable handle for one behavior member. Handles are cached by name on
/// the container, so resolving the same name twice yields the same handle
/// even across state transitions.
///
/// Holds the container weakly (the cache sits inside the container, so a
/// strong reference would keep it alive forever); calling through a handle
/// that outlived its container fails like an uninitialized one.
pub struct ActionMethod<S> {
    name: Rc<str>,
    inner: Weak<RefCell<StoreInner<S>>>,
}

impl<S> Clone for ActionMethod<S> {
    fn clone(&self) -> Self {
        Self {
            name: Rc::clone(&self.name),
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for ActionMethod<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMethod")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<S: Clone + PartialEq + 'static> ActionMethod<S> {
    /// The behavior's member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the behavior against the current instance.
    pub fn call(&self, args: &[Value]) -> Result<CallOutcome<S>, StoreError> {
        enum Resolved<S> {
            Behavior {
                body: stator_core::BehaviorFn<S>,
                prev_state: S,
                prev_instance: Rc<stator_core::Instance<S>>,
            },
            Plain(stator_core::PlainFn),
        }

        let inner = self.inner.upgrade().ok_or(StoreError::Uninitialized)?;
        let resolved = {
            let guard = inner.borrow();
            let instance = guard
                .instance
                .clone()
                .ok_or(StoreError::Uninitialized)?;
            match instance.member(&self.name) {
                Some(Member::Method(body)) => {
                    let prev_state = guard
                        .state
                        .clone()
                        .ok_or(StoreError::Uninitialized)?;
                    Resolved::Behavior {
                        body: Rc::clone(body),
                        prev_state,
                        prev_instance: instance,
                    }
                }
                Some(Member::NonMutating(body)) => Resolved::Plain(Rc::clone(body)),
                // Methods cannot change shape between model runs.
                Some(_) | None => {
                    return Err(StoreError::MethodShapeChanged {
                        name: self.name.to_string(),
                    });
                }
            }
        };

        match resolved {
            Resolved::Plain(body) => Ok(CallOutcome::Value(body(args))),
            Resolved::Behavior {
                body,
                prev_state,
                prev_instance,
            } => {
                let next = body(args);
                trace!(method = %self.name, "behavior invoked");
                let action = Action {
                    kind: ActionKind::Method(Rc::clone(&self.name)),
                    params: args.iter().cloned().collect(),
                    state: next.clone(),
                    prev_state,
                    instance: Rc::clone(&prev_instance),
                    prev_instance,
                };
                notifier::notify(&inner, action).map_err(StoreError::from_dispatch)?;
                Ok(CallOutcome::State(next))
            }
        }
    }
}

/// Read-only, intercepted view of a container's current instance.
///
/// Cheap to create and clone; resolves against the live container on
/// every access.
pub struct InstanceView<S> {
    inner: Rc<RefCell<StoreInner<S>>>,
    on_get: Option<OnGet>,
}

impl<S> Clone for InstanceView<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            on_get: self.on_get.clone(),
        }
    }
}

impl<S> std::fmt::Debug for InstanceView<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceView").finish_non_exhaustive()
    }
}

impl<S: Clone + PartialEq + 'static> InstanceView<S> {
    pub(crate) fn new(inner: Rc<RefCell<StoreInner<S>>>, on_get: Option<OnGet>) -> Self {
        Self { inner, on_get }
    }

    /// Read a data or field member. Field members resolve through the
    /// memoization layer; callable members are not readable.
    pub fn get(&self, name: &str) -> Result<Value, StoreError> {
        let member = {
            let guard = self.inner.borrow();
            let instance = guard
                .instance
                .clone()
                .ok_or(StoreError::Uninitialized)?;
            // A name that resolved as a field before must stay a field:
            // anything else means the model recomputes inconsistently.
            let was_field = guard.cache_fields.contains_key(name);
            match instance.member(name) {
                Some(Member::Field(field)) => Member::<S>::Field(field.clone()),
                Some(Member::Value(value)) if !was_field => Member::Value(value.clone()),
                Some(Member::Value(_)) => {
                    return Err(StoreError::StaleField {
                        name: name.to_string(),
                    });
                }
                Some(Member::Method(_)) | Some(Member::NonMutating(_)) => {
                    return Err(if was_field {
                        StoreError::StaleField {
                            name: name.to_string(),
                        }
                    } else {
                        StoreError::NotAField {
                            name: name.to_string(),
                        }
                    });
                }
                None => {
                    return Err(if was_field {
                        StoreError::StaleField {
                            name: name.to_string(),
                        }
                    } else {
                        StoreError::UnknownMember {
                            name: name.to_string(),
                        }
                    });
                }
            }
        };
        let value = match member {
            Member::Value(value) => value,
            Member::Field(field) => self.resolve_field(name, field)?,
            _ => unreachable!("filtered above"),
        };
        if let Some(on_get) = &self.on_get {
            on_get(name, &value);
        }
        Ok(value)
    }

    /// Resolve a behavior member to its stable handle.
    pub fn method(&self, name: &str) -> Result<ActionMethod<S>, StoreError> {
        {
            let guard = self.inner.borrow();
            if let Some(handle) = guard.cache_methods.get(name) {
                return Ok(handle.clone());
            }
            let instance = guard
                .instance
                .clone()
                .ok_or(StoreError::Uninitialized)?;
            match instance.member(name) {
                None => {
                    return Err(StoreError::UnknownMember {
                        name: name.to_string(),
                    });
                }
                Some(member) if !member.is_callable() => {
                    return Err(StoreError::NotCallable {
                        name: name.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        let handle = ActionMethod {
            name: Rc::from(name),
            inner: Rc::downgrade(&self.inner),
        };
        self.inner
            .borrow_mut()
            .cache_methods
            .insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Invoke a behavior member. Equivalent to `method(name)?.call(args)`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<CallOutcome<S>, StoreError> {
        self.method(name)?.call(args)
    }

    /// Instances are read-only: always fails.
    pub fn set(&self, name: &str, _value: Value) -> Result<(), StoreError> {
        Err(StoreError::ImmutableWrite {
            name: name.to_string(),
        })
    }

    /// Names of all members of the current instance.
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.inner.borrow();
        let instance = guard
            .instance
            .clone()
            .ok_or(StoreError::Uninitialized)?;
        Ok(instance.names().map(str::to_string).collect())
    }

    /// A `Value::Map` of every readable member (data and fields), resolved
    /// through the memoization layer. This is the selector's default view.
    pub fn snapshot(&self) -> Result<Value, StoreError> {
        let readable: Vec<String> = {
            let guard = self.inner.borrow();
            let instance = guard
                .instance
                .clone()
                .ok_or(StoreError::Uninitialized)?;
            instance
                .members()
                .filter(|(_, member)| !member.is_callable())
                .map(|(name, _)| name.to_string())
                .collect()
        };
        let mut entries = Vec::with_capacity(readable.len());
        for name in readable {
            let value = self.get(&name)?;
            entries.push((name, value));
        }
        Ok(Value::map(entries))
    }

    /// Field resolution against the container cache. The `field` argument
    /// is the live descriptor read from the current instance.
    fn resolve_field(&self, name: &str, field: Field) -> Result<Value, StoreError> {
        match field.deps() {
            None => {
                // Never cached: recompute live, refresh metadata.
                let current = field.recompute();
                self.inner.borrow_mut().cache_fields.insert(
                    name.to_string(),
                    FieldCache {
                        value: current.clone(),
                        deps: None,
                    },
                );
                Ok(current)
            }
            Some(live_deps) => {
                {
                    let guard = self.inner.borrow();
                    if let Some(cached) = guard.cache_fields.get(name)
                        && let Some(cached_deps) = cached.deps.as_deref()
                        && shallow_equal_slices(cached_deps, live_deps)
                    {
                        return Ok(cached.value.clone());
                    }
                }
                let current = field.get();
                trace!(field = name, "field cache refreshed");
                self.inner.borrow_mut().cache_fields.insert(
                    name.to_string(),
                    FieldCache {
                        value: current.clone(),
                        deps: Some(live_deps.to_vec()),
                    },
                );
                Ok(current)
            }
        }
    }

}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use stator_core::{Dep, Field, Instance, Model, StoreError, Value};

    use crate::store::{Store, StoreConfig};

    fn counter_model() -> Model<i64> {
        Rc::new(|state: &i64| {
            let n = *state;
            Instance::builder()
                .value("count", n)
                .method("increase", move |_| n + 1)
                .method("add", move |args: &[Value]| {
                    n + args.first().and_then(Value::as_int).unwrap_or(0)
                })
                .non_mutating("describe", move |_| Value::from(format!("count={n}")))
                .build()
        })
    }

    #[test]
    fn get_plain_value() {
        let store = Store::new(counter_model(), StoreConfig::new().with_state(3));
        assert_eq!(store.instance().get("count").unwrap(), Value::Int(3));
    }

    #[test]
    fn invoke_with_params() {
        let store = Store::new(counter_model(), StoreConfig::new().with_state(10));
        let outcome = store
            .instance()
            .invoke("add", &[Value::Int(5)])
            .unwrap();
        assert_eq!(outcome.state(), Some(15));
        assert_eq!(store.state(), Some(15));
    }

    #[test]
    fn non_mutating_method_emits_nothing() {
        let store = Store::new(counter_model(), StoreConfig::new().with_state(2));
        let seen = Rc::new(Cell::new(0u32));
        let seen_in = Rc::clone(&seen);
        let _sub = store
            .subscribe(move |_| seen_in.set(seen_in.get() + 1))
            .unwrap();
        assert_eq!(seen.get(), 1); // sync replay

        let outcome = store.instance().invoke("describe", &[]).unwrap();
        assert_eq!(outcome.value(), Some(&Value::from("count=2")));
        assert_eq!(seen.get(), 1);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn uninitialized_invoke_fails() {
        let store = Store::new(counter_model(), StoreConfig::new());
        let err = store.instance().invoke("increase", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Uninitialized));
    }

    #[test]
    fn set_always_fails() {
        let store = Store::new(counter_model(), StoreConfig::new().with_state(0));
        let err = store
            .instance()
            .set("count", Value::Int(9))
            .unwrap_err();
        assert!(matches!(err, StoreError::ImmutableWrite { .. }));
    }

    #[test]
    fn unknown_and_miskind_members() {
        let store = Store::new(counter_model(), StoreConfig::new().with_state(0));
        let view = store.instance();
        assert!(matches!(
            view.get("missing").unwrap_err(),
            StoreError::UnknownMember { .. }
        ));
        assert!(matches!(
            view.get("increase").unwrap_err(),
            StoreError::NotAField { .. }
        ));
        assert!(matches!(
            view.invoke("count", &[]).unwrap_err(),
            StoreError::NotCallable { .. }
        ));
    }

    #[test]
    fn method_handles_are_stable() {
        let store = Store::new(counter_model(), StoreConfig::new().with_state(0));
        let view = store.instance();
        let a = view.method("increase").unwrap();
        a.call(&[]).unwrap();
        // Same handle after a state transition.
        let b = view.method("increase").unwrap();
        assert_eq!(a.name(), b.name());
        b.call(&[]).unwrap();
        assert_eq!(store.state(), Some(2));
    }

    fn sum_model(calls: Rc<Cell<u32>>) -> Model<Vec<i64>> {
        Rc::new(move |state: &Vec<i64>| {
            let items = state.clone();
            let first = items.first().copied().unwrap_or(0);
            let calls = Rc::clone(&calls);
            let sum_items = items.clone();
            let push_items = items.clone();
            Instance::builder()
                .value("len", items.len())
                .field(
                    "sum",
                    Field::with_deps(
                        move || {
                            calls.set(calls.get() + 1);
                            Value::Int(sum_items.iter().sum())
                        },
                        [Dep::Value(Value::Int(first))],
                    ),
                )
                .method("push", move |args: &[Value]| {
                    let mut next = push_items.clone();
                    next.push(args.first().and_then(Value::as_int).unwrap_or(0));
                    next
                })
                .method("double", move |_| {
                    items.iter().map(|x| x * 2).collect()
                })
                .build()
        })
    }

    #[test]
    fn field_with_deps_is_memoized() {
        let calls = Rc::new(Cell::new(0u32));
        let store = Store::new(
            sum_model(Rc::clone(&calls)),
            StoreConfig::new().with_state(vec![1, 2]),
        );
        let _sub = store.subscribe(|_| {}).unwrap();
        let view = store.instance();

        let first = view.get("sum").unwrap();
        assert_eq!(first, Value::Int(3));

        // Pushing keeps the first element (the dependency) unchanged, so
        // the memoized value survives even though the real sum changed.
        view.invoke("push", &[Value::Int(10)]).unwrap();
        assert_eq!(view.get("sum").unwrap(), Value::Int(3));

        // Doubling changes the dependency; the cache refreshes.
        view.invoke("double", &[]).unwrap();
        assert_eq!(store.state(), Some(vec![2, 4, 20]));
        assert_eq!(view.get("sum").unwrap(), Value::Int(26));
    }

    #[test]
    fn field_without_deps_is_never_cached() {
        let calls = Rc::new(Cell::new(0u32));
        let calls_in = Rc::clone(&calls);
        let model: Model<i64> = Rc::new(move |state: &i64| {
            let n = *state;
            let calls = Rc::clone(&calls_in);
            Instance::builder()
                .field(
                    "echo",
                    Field::new(move || {
                        calls.set(calls.get() + 1);
                        Value::Int(n)
                    }),
                )
                .method("bump", move |_| n + 1)
                .build()
        });
        let store = Store::new(model, StoreConfig::new().with_state(0));
        let _sub = store.subscribe(|_| {}).unwrap();
        let view = store.instance();

        view.get("echo").unwrap();
        let after_first = calls.get();
        view.get("echo").unwrap();
        // Every access recomputes.
        assert!(calls.get() > after_first);

        view.invoke("bump", &[]).unwrap();
        assert_eq!(view.get("echo").unwrap(), Value::Int(1));
    }

    #[test]
    fn shape_change_is_fatal() {
        // A model that turns a method into a value between states.
        let model: Model<i64> = Rc::new(|state: &i64| {
            let n = *state;
            if n == 0 {
                Instance::builder()
                    .value("x", 0)
                    .method("mutate", move |_| n + 1)
                    .build()
            } else {
                Instance::builder().value("x", n).value("mutate", 0).build()
            }
        });
        let store = Store::new(model, StoreConfig::new().with_state(0));
        let _sub = store.subscribe(|_| {}).unwrap();
        let handle = store.instance().method("mutate").unwrap();
        handle.call(&[]).unwrap();
        let err = handle.call(&[]).unwrap_err();
        assert!(matches!(err, StoreError::MethodShapeChanged { .. }));
    }
}

#![forbid(unsafe_code)]

//! Stator: reactive state containers.
//!
//! A **model** is a pure function from a state value to an **instance** —
//! plain data, derived fields, and behavior methods. A [`Store`] owns the
//! state, re-derives the instance on every transition, and notifies
//! listeners through a strictly ordered action queue. [`Selector`] and
//! [`Signal`] wrap a store and decide whether a notification is worth
//! forwarding at all.
//!
//! This crate is the umbrella: it re-exports the engine
//! ([`stator_runtime`]) and the data layer ([`stator_core`]) and adds the
//! convenience layer of [`ModelKey`]s and [`StoreCollection`]s.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use stator::{Instance, Store, StoreConfig, Value};
//!
//! let counter = Rc::new(|state: &i64| {
//!     let n = *state;
//!     Instance::builder()
//!         .value("count", n)
//!         .method("increase", move |_| n + 1)
//!         .build()
//! });
//!
//! let store = Store::new(counter, StoreConfig::new().with_state(0));
//! let _sub = store.subscribe(|action| {
//!     // Every action, starting with the initial sync.
//!     let _ = &action.state;
//! })?;
//!
//! let view = store.instance();
//! view.invoke("increase", &[])?;
//! assert_eq!(view.get("count")?, Value::from(1));
//! # Ok::<(), stator::StoreError>(())
//! ```

pub mod key;

pub use key::{ModelKey, StoreCollection};

pub use stator_core::{
    Action, ActionKind, BoxError, Dep, Dispatch, DispatchResult, Field, Instance,
    InstanceBuilder, Member, Model, Params, StoreError, Token, Value, shallow_equal,
    shallow_equal_slices,
};
pub use stator_runtime::{
    ActionMethod, BatchNotifyHook, CallOutcome, EqualityFn, InstanceView, Middleware, Next,
    NotifyHook, Selector, SelectorFn, Signal, Store, StoreConfig, StoreContext, Subscription,
    UpdateArgs,
};

#![forbid(unsafe_code)]

//! Core: value model, instances, actions, and errors for Stator.
//!
//! # Role in Stator
//! `stator-core` is the pure-data layer. It owns the dynamic [`Value`]
//! model and its two equality relations, the instance member structures a
//! model produces, the [`Action`] records that describe transitions, and
//! the engine's error types. Nothing here has interior mutability; the
//! runtime (`stator-runtime`) owns all shared state.
//!
//! # Primary responsibilities
//! - **Value**: dynamic member values with identity (`same`) and shallow
//!   equality semantics.
//! - **Members**: the tagged union of plain values, dependency-memoized
//!   fields, behavior methods, and non-mutating methods.
//! - **Instance**: the name-keyed member map a model derives from state,
//!   plus its builder.
//! - **Action**: one record per transition, including synthetic resyncs.
//! - **Errors**: consistency errors and listener-failure wrapping.
//!
//! # How it fits in the system
//! The runtime consumes these types and adds the machinery: the store
//! container, action queue, subscription tunnel, interceptor, and the
//! selector/signal diffing layers.

pub mod action;
pub mod error;
pub mod instance;
pub mod member;
pub mod token;
pub mod value;

pub use action::{Action, ActionKind, Dispatch, Params};
pub use error::{BoxError, DispatchResult, StoreError};
pub use instance::{Instance, InstanceBuilder, Model};
pub use member::{BehaviorFn, ComputeFn, Dep, Field, Member, PlainFn};
pub use token::Token;
pub use value::{Value, shallow_equal, shallow_equal_slices};

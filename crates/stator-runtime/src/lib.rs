#![forbid(unsafe_code)]

//! Runtime: the update/notification engine for Stator.
//!
//! # Role in Stator
//! `stator-runtime` owns all the machinery around the pure data types of
//! `stator-core`: the [`Store`] container, the action queue and drain
//! loop, the subscription tunnel, the instance interceptor with field
//! memoization, middleware composition, and the [`Selector`]/[`Signal`]
//! diffing layers.
//!
//! # Primary responsibilities
//! - **Store**: owns model, state, instance, listener lists, and the
//!   pending-action queue; `update`, `destroy`, `payload`.
//! - **Notifier**: FIFO drain with the non-nesting guarantee — an action
//!   raised inside a listener is appended, never inlined.
//! - **Tunnel**: connect/disconnect, temporary-listener promotion,
//!   destroy-on-empty, RAII [`Subscription`] guards.
//! - **Interceptor**: [`InstanceView`] turns behavior calls into tracked
//!   actions and memoizes field reads against dependency lists.
//! - **Selector / Signal**: decide whether a notified action is worth
//!   forwarding, by selected-value or per-field diffing.
//!
//! # Execution model
//! Single-threaded and cooperative. Containers are `Rc<RefCell<..>>`
//! records; no borrow is ever held across a model or listener call, so
//! re-entrant engine calls from listeners are always safe and always
//! strictly ordered.

pub mod middleware;
mod notifier;
pub mod selector;
pub mod signal;
pub mod store;
pub mod tunnel;
pub mod view;

pub use middleware::{BatchNotifyHook, Middleware, Next, NotifyHook, StoreContext};
pub use selector::{EqualityFn, Selector, SelectorFn};
pub use signal::Signal;
pub use store::{Store, StoreConfig, UpdateArgs};
pub use tunnel::Subscription;
pub use view::{ActionMethod, CallOutcome, InstanceView};

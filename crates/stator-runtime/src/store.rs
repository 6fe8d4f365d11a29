#![forbid(unsafe_code)]

//! The state container.
//!
//! A [`Store`] owns a model, its current state, the instance derived from
//! that state, the listener lists, and the pending-action queue. Cloning a
//! `Store` creates a new handle to the **same** container (`Rc<RefCell>`
//! sharing, as elsewhere in this workspace).
//!
//! # Invariants
//!
//! 1. Once initialized, `instance` is always `model(state)` for the last
//!    committed state.
//! 2. `version` increments and `token` is reminted on every effective
//!    transition.
//! 3. No `RefCell` borrow is held across a model or listener call: every
//!    operation snapshots, computes, then commits.
//! 4. A destroyed container accepts behavior calls but notifies nobody.
//!
//! # Update semantics
//!
//! `update` distinguishes four situations: controlled containers recompute
//! immediately and bypass the queue; uninitialized containers require a
//! state and produce no notification on first initialization; a model
//! and/or state change on a live container commits and resyncs listeners
//! with a synthetic action; a no-op change (model by identity, state by
//! `PartialEq`) does nothing.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use bitflags::bitflags;
use tracing::debug;

use stator_core::{
    Action, ActionKind, Dispatch, DispatchResult, Instance, Model, Params, StoreError, Token,
    Value,
};

use crate::middleware::{BatchNotifyHook, Middleware, NotifyHook};
use crate::notifier;
use crate::tunnel::{self, DispatchEntry, Subscription};
use crate::view::{ActionMethod, FieldCache, InstanceView};

bitflags! {
    /// Container status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct StoreFlags: u8 {
        /// The container has been given a state.
        const INITIALIZED = 1 << 0;
        /// Torn down; the queue is empty and notify is a no-op.
        const DESTROYED   = 1 << 1;
        /// Single externally-driven listener; updates bypass the queue.
        const CONTROLLED  = 1 << 2;
    }
}

/// Construction-time configuration for a [`Store`].
pub struct StoreConfig<S> {
    pub(crate) state: Option<S>,
    pub(crate) controlled: bool,
    pub(crate) middlewares: Vec<Middleware<S>>,
    pub(crate) notify: Option<NotifyHook<S>>,
    pub(crate) batch_notify: Option<BatchNotifyHook<S>>,
}

impl<S> StoreConfig<S> {
    /// An empty configuration: lazy initialization, uncontrolled, no
    /// middleware, default fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: None,
            controlled: false,
            middlewares: Vec::new(),
            notify: None,
            batch_notify: None,
        }
    }

    /// Eagerly initialize with this state.
    #[must_use]
    pub fn with_state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    /// True when an initial state is configured.
    #[must_use]
    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// Controlled mode: exactly one external listener re-feeds state from
    /// outside; updates recompute immediately and bypass the queue.
    #[must_use]
    pub fn controlled(mut self) -> Self {
        self.controlled = true;
        self
    }

    /// Append a middleware. Middlewares wrap the core dispatcher
    /// right-to-left, so the first one added sees each action first.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Middleware<S>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Install an error-aggregating notify hook. With a hook present,
    /// every listener runs for every action; the hook receives all
    /// failures afterwards and decides what surfaces.
    #[must_use]
    pub fn with_notify(
        mut self,
        hook: impl Fn(&Action<S>, Vec<stator_core::BoxError>) -> DispatchResult + 'static,
    ) -> Self {
        self.notify = Some(Rc::new(hook));
        self
    }

    /// Install a custom fan-out hook, replacing the default listener loop
    /// entirely. Takes precedence over a notify hook.
    #[must_use]
    pub fn with_batch_notify(
        mut self,
        hook: impl Fn(&[Dispatch<S>], &Action<S>) -> DispatchResult + 'static,
    ) -> Self {
        self.batch_notify = Some(Rc::new(hook));
        self
    }
}

impl<S> Default for StoreConfig<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for StoreConfig<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("eager_state", &self.state.is_some())
            .field("controlled", &self.controlled)
            .field("middlewares", &self.middlewares.len())
            .field("notify_hook", &self.notify.is_some())
            .field("batch_notify_hook", &self.batch_notify.is_some())
            .finish()
    }
}

/// Arguments for [`Store::update`]. Absent fields keep their current
/// values; `initial_state` takes precedence over `state` when the
/// container is not yet initialized.
pub struct UpdateArgs<S> {
    /// Replacement model.
    pub model: Option<Model<S>>,
    /// Replacement state.
    pub state: Option<S>,
    /// State used only for the uninitialized → initialized transition.
    pub initial_state: Option<S>,
}

impl<S> UpdateArgs<S> {
    /// No changes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            state: None,
            initial_state: None,
        }
    }

    /// Update to this state.
    #[must_use]
    pub fn state(state: S) -> Self {
        Self {
            state: Some(state),
            ..Self::new()
        }
    }

    /// Initialize with this state.
    #[must_use]
    pub fn initial_state(state: S) -> Self {
        Self {
            initial_state: Some(state),
            ..Self::new()
        }
    }

    /// Swap the model.
    #[must_use]
    pub fn model(model: Model<S>) -> Self {
        Self {
            model: Some(model),
            ..Self::new()
        }
    }

    /// Also swap the model.
    #[must_use]
    pub fn with_model(mut self, model: Model<S>) -> Self {
        self.model = Some(model);
        self
    }
}

impl<S> Default for UpdateArgs<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// The container record. All handles (`Store`, views, subscriptions,
/// action methods) share one of these.
pub(crate) struct StoreInner<S> {
    pub(crate) model: Model<S>,
    pub(crate) state: Option<S>,
    pub(crate) instance: Option<Rc<Instance<S>>>,
    pub(crate) flags: StoreFlags,
    pub(crate) version: u64,
    pub(crate) token: Token,
    pub(crate) dispatches: Vec<DispatchEntry<S>>,
    pub(crate) temporary_dispatches: Vec<DispatchEntry<S>>,
    pub(crate) queue: VecDeque<Action<S>>,
    pub(crate) cache_fields: HashMap<String, FieldCache>,
    pub(crate) cache_methods: HashMap<String, ActionMethod<S>>,
    pub(crate) side_payload: Option<Value>,
    pub(crate) middlewares: Vec<Middleware<S>>,
    pub(crate) notify_hook: Option<NotifyHook<S>>,
    pub(crate) batch_notify: Option<BatchNotifyHook<S>>,
}

impl<S> StoreInner<S> {
    pub(crate) fn is_destroyed(&self) -> bool {
        self.flags.contains(StoreFlags::DESTROYED)
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.flags.contains(StoreFlags::INITIALIZED)
    }

    pub(crate) fn is_controlled(&self) -> bool {
        self.flags.contains(StoreFlags::CONTROLLED)
    }

    /// A drain is in progress exactly while the queue is non-empty: the
    /// head stays queued until its fan-out finished.
    pub(crate) fn is_draining(&self) -> bool {
        !self.queue.is_empty()
    }
}

/// A reactive state container.
///
/// See the [module docs](self) for semantics; see [`InstanceView`] for how
/// behavior calls and field reads resolve.
pub struct Store<S> {
    inner: Rc<RefCell<StoreInner<S>>>,
}

// Manual Clone: shares the same container.
impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("flags", &inner.flags)
            .field("listeners", &inner.dispatches.len())
            .field("pending", &inner.queue.len())
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> Store<S> {
    /// Create a container. With `config.with_state(..)` the instance is
    /// derived eagerly; otherwise the container stays uninitialized until
    /// an update carries a state.
    pub fn new(model: Model<S>, config: StoreConfig<S>) -> Self {
        let StoreConfig {
            state,
            controlled,
            middlewares,
            notify,
            batch_notify,
        } = config;
        let mut flags = StoreFlags::empty();
        if controlled {
            flags.insert(StoreFlags::CONTROLLED);
        }
        let (state, instance) = match state {
            Some(state) => {
                let instance = Rc::new(model(&state));
                flags.insert(StoreFlags::INITIALIZED);
                (Some(state), Some(instance))
            }
            None => (None, None),
        };
        debug!(
            initialized = flags.contains(StoreFlags::INITIALIZED),
            controlled, "store created"
        );
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                model,
                state,
                instance,
                flags,
                version: 0,
                token: Token::new(),
                dispatches: Vec::new(),
                temporary_dispatches: Vec::new(),
                queue: VecDeque::new(),
                cache_fields: HashMap::new(),
                cache_methods: HashMap::new(),
                side_payload: None,
                middlewares,
                notify_hook: notify,
                batch_notify,
            })),
        }
    }

    /// Apply a model and/or state change.
    pub fn update(&self, args: UpdateArgs<S>) -> Result<(), StoreError> {
        let UpdateArgs {
            model: new_model,
            state: next_state,
            initial_state,
        } = args;

        let (cur_model, cur_state, cur_instance, flags) = {
            let inner = self.inner.borrow();
            (
                Rc::clone(&inner.model),
                inner.state.clone(),
                inner.instance.clone(),
                inner.flags,
            )
        };
        let model = new_model.unwrap_or_else(|| Rc::clone(&cur_model));
        let model_changed = !Rc::ptr_eq(&model, &cur_model);

        if flags.contains(StoreFlags::CONTROLLED) {
            let state = next_state
                .or(initial_state)
                .or(cur_state)
                .ok_or(StoreError::MissingInitialState)?;
            let instance = Rc::new(model(&state));
            let mut inner = self.inner.borrow_mut();
            let state_changed = inner.state.as_ref() != Some(&state);
            inner.model = model;
            inner.state = Some(state);
            inner.instance = Some(instance);
            inner.flags.insert(StoreFlags::INITIALIZED);
            if state_changed || model_changed {
                inner.token = Token::new();
                inner.version += 1;
            }
            return Ok(());
        }

        if flags.contains(StoreFlags::DESTROYED) {
            return Ok(());
        }

        if !flags.contains(StoreFlags::INITIALIZED) {
            // Uninitialized → initialized. No notification: there is no
            // previous state to resync from. A resurrected container may
            // still hold a stale instance; it is replaced here.
            let state = initial_state
                .or(next_state)
                .ok_or(StoreError::MissingInitialState)?;
            let instance = Rc::new(model(&state));
            let mut inner = self.inner.borrow_mut();
            inner.model = model;
            inner.state = Some(state);
            inner.instance = Some(instance);
            inner.flags.insert(StoreFlags::INITIALIZED);
            inner.token = Token::new();
            inner.cache_fields.clear();
            inner.cache_methods.clear();
            debug!("store initialized");
            return Ok(());
        }
        let prev_instance = cur_instance.ok_or(StoreError::MissingInitialState)?;

        let state_changed = match &next_state {
            None => false,
            Some(next) => cur_state.as_ref() != Some(next),
        };
        if !model_changed && !state_changed {
            return Ok(());
        }

        let prev_state = cur_state.ok_or(StoreError::MissingInitialState)?;
        let state = if state_changed {
            next_state.unwrap_or_else(|| prev_state.clone())
        } else {
            prev_state.clone()
        };
        let instance = Rc::new(model(&state));

        let action = {
            let mut inner = self.inner.borrow_mut();
            inner.model = model;
            inner.state = Some(state.clone());
            inner.instance = Some(Rc::clone(&instance));
            inner.cache_fields.clear();
            inner.cache_methods.clear();
            Action {
                kind: ActionKind::Sync,
                params: Params::new(),
                state,
                prev_state,
                instance,
                prev_instance,
            }
        };
        debug!(model_changed, state_changed, "store updated");
        notifier::notify(&self.inner, action).map_err(StoreError::from_dispatch)
    }

    /// Tear the container down regardless of remaining listeners: drop
    /// everything still queued, clear the side payload, mark destroyed.
    pub fn destroy(&self) {
        tunnel::teardown(&self.inner);
    }

    /// Subscribe an infallible listener. The listener immediately receives
    /// a synthetic sync action (or, mid-drain, after the current drain).
    pub fn subscribe(
        &self,
        listener: impl Fn(&Action<S>) + 'static,
    ) -> Result<Subscription<S>, StoreError> {
        self.subscribe_dispatch(Rc::new(move |action: &Action<S>| {
            listener(action);
            Ok(())
        }))
    }

    /// Subscribe a fallible listener. An `Err` aborts the default fan-out
    /// and surfaces to whoever triggered the transition.
    pub fn subscribe_with(
        &self,
        listener: impl Fn(&Action<S>) -> DispatchResult + 'static,
    ) -> Result<Subscription<S>, StoreError> {
        self.subscribe_dispatch(Rc::new(listener))
    }

    /// Subscribe an identity-stable listener. Connecting the same `Rc`
    /// twice registers it once.
    pub fn subscribe_dispatch(
        &self,
        dispatch: Dispatch<S>,
    ) -> Result<Subscription<S>, StoreError> {
        tunnel::connect(&self.inner, &dispatch).map_err(StoreError::from_dispatch)?;
        Ok(Subscription::new(Rc::downgrade(&self.inner), dispatch))
    }

    /// The intercepted, read-only view of the current instance.
    #[must_use]
    pub fn instance(&self) -> InstanceView<S> {
        InstanceView::new(Rc::clone(&self.inner), None)
    }

    /// Current state, if initialized.
    #[must_use]
    pub fn state(&self) -> Option<S> {
        self.inner.borrow().state.clone()
    }

    /// Monotonic transition counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Identity stamp of the last commit.
    #[must_use]
    pub fn token(&self) -> Token {
        self.inner.borrow().token.clone()
    }

    /// True after teardown (explicit or destroy-on-empty).
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().is_destroyed()
    }

    /// True once the container has been given a state.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().is_initialized()
    }

    /// True for containers in controlled mode.
    #[must_use]
    pub fn is_controlled(&self) -> bool {
        self.inner.borrow().is_controlled()
    }

    /// Number of confirmed plus pending-promotion listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.dispatches.len() + inner.temporary_dispatches.len()
    }

    /// Read the side payload.
    #[must_use]
    pub fn payload(&self) -> Option<Value> {
        self.inner.borrow().side_payload.clone()
    }

    /// Get-or-set the side payload through one accessor. The closure
    /// receives the current payload and returns the next one; the stored
    /// result is returned.
    pub fn update_payload(
        &self,
        f: impl FnOnce(Option<Value>) -> Option<Value>,
    ) -> Option<Value> {
        let current = self.inner.borrow().side_payload.clone();
        let next = f(current);
        self.inner.borrow_mut().side_payload = next.clone();
        next
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<StoreInner<S>>> {
        &self.inner
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

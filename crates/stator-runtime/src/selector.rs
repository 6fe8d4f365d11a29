#![forbid(unsafe_code)]

//! Selector: a value-diffed view over a container.
//!
//! A selector keeps the last result of applying a selection function to
//! the container's instance view and forwards an action to its listener
//! only when that result changed. "Changed" means not [`Value::same`], or,
//! with a custom equality function installed, not equal under it.
//!
//! The default selection is a snapshot of every readable member. Note
//! that a snapshot is a freshly built map each time — never `same` as its
//! predecessor — so default selectors suppress nothing; suppression comes
//! from selecting scalars or from a custom equality.

use std::cell::RefCell;
use std::rc::Rc;

use stator_core::{Action, StoreError, Token, Value};

use crate::store::Store;
use crate::tunnel::Subscription;
use crate::view::InstanceView;

/// A selection function over the intercepted instance.
pub type SelectorFn<S> = Rc<dyn Fn(&InstanceView<S>) -> Value>;

/// A custom equality relation between two selections.
pub type EqualityFn = Rc<dyn Fn(&Value, &Value) -> bool>;

struct SelectorState<S> {
    selector: SelectorFn<S>,
    equality: Option<EqualityFn>,
    selected: Value,
}

/// A notification-suppressing derived view of a [`Store`].
pub struct Selector<S> {
    store: Store<S>,
    state: Rc<RefCell<SelectorState<S>>>,
}

impl<S> Clone for Selector<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<S> std::fmt::Debug for Selector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("selected", &self.state.borrow().selected)
            .finish_non_exhaustive()
    }
}

impl<S: Clone + PartialEq + 'static> Selector<S> {
    /// Wrap a store with the default whole-instance selection.
    #[must_use]
    pub fn new(store: &Store<S>) -> Self {
        Self::with_selector(store, |view: &InstanceView<S>| {
            view.snapshot().unwrap_or(Value::Unit)
        })
    }

    /// Wrap a store with a custom selection function.
    #[must_use]
    pub fn with_selector(
        store: &Store<S>,
        selector: impl Fn(&InstanceView<S>) -> Value + 'static,
    ) -> Self {
        let selector: SelectorFn<S> = Rc::new(selector);
        let selected = selector(&store.instance());
        Self {
            store: store.clone(),
            state: Rc::new(RefCell::new(SelectorState {
                selector,
                equality: None,
                selected,
            })),
        }
    }

    /// Install a custom equality relation; selections it reports equal are
    /// suppressed.
    #[must_use]
    pub fn with_equality(self, equality: impl Fn(&Value, &Value) -> bool + 'static) -> Self {
        self.state.borrow_mut().equality = Some(Rc::new(equality));
        self
    }

    /// The current selection.
    #[must_use]
    pub fn select(&self) -> Value {
        self.state.borrow().selected.clone()
    }

    /// Swap the selection function and re-evaluate without notifying.
    /// Returns the (possibly refreshed) selection.
    pub fn select_with(&self, selector: impl Fn(&InstanceView<S>) -> Value + 'static) -> Value {
        let selector: SelectorFn<S> = Rc::new(selector);
        let next = selector(&self.store.instance());
        let mut state = self.state.borrow_mut();
        state.selector = selector;
        let keep = state.selected.same(&next)
            || state
                .equality
                .as_ref()
                .is_some_and(|eq| eq(&state.selected, &next));
        if !keep {
            state.selected = next;
        }
        state.selected.clone()
    }

    /// Identity stamp of the wrapped store's last commit.
    #[must_use]
    pub fn token(&self) -> Token {
        self.store.token()
    }

    /// The wrapped store.
    #[must_use]
    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    /// Subscribe a listener behind the diffing layer: it only sees actions
    /// whose selection differs from the previous one.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Action<S>) + 'static,
    ) -> Result<Subscription<S>, StoreError> {
        let state = Rc::clone(&self.state);
        let store = self.store.clone();
        self.store.subscribe_with(move |action: &Action<S>| {
            let next = {
                let selector = Rc::clone(&state.borrow().selector);
                selector(&store.instance())
            };
            let suppressed = {
                let state = state.borrow();
                state.selected.same(&next)
                    || state
                        .equality
                        .as_ref()
                        .is_some_and(|eq| eq(&state.selected, &next))
            };
            if suppressed {
                return Ok(());
            }
            state.borrow_mut().selected = next;
            listener(action);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

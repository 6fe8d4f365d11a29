#![forbid(unsafe_code)]

//! Middleware composition.
//!
//! A middleware is a function `(context, next) -> next`: it receives a
//! read-only [`StoreContext`] and the next link of the chain, and returns
//! its own link. The configured list is folded right-to-left so that the
//! first middleware added sees each action first and the innermost link is
//! always the core dispatcher. The composed chain runs once per drained
//! action.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use stator_core::{Action, DispatchResult, Token};

use crate::notifier;
use crate::store::StoreInner;

/// One link of the dispatch chain.
pub type Next<S> = Rc<dyn Fn(&Action<S>) -> DispatchResult>;

/// A middleware: wraps the next link, returning its own.
pub type Middleware<S> = Rc<dyn Fn(StoreContext<S>, Next<S>) -> Next<S>>;

/// Error-aggregating notify hook: receives every listener failure of one
/// action after all listeners ran.
pub type NotifyHook<S> = Rc<dyn Fn(&Action<S>, Vec<stator_core::BoxError>) -> DispatchResult>;

/// Custom fan-out hook: takes over the listener loop for one action.
pub type BatchNotifyHook<S> =
    Rc<dyn Fn(&[stator_core::Dispatch<S>], &Action<S>) -> DispatchResult>;

/// Read-only container access handed to middleware. Holds the container
/// weakly; accessors answer with `None`/defaults once it is gone.
pub struct StoreContext<S> {
    inner: Weak<RefCell<StoreInner<S>>>,
}

impl<S> Clone for StoreContext<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for StoreContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext").finish_non_exhaustive()
    }
}

impl<S: Clone> StoreContext<S> {
    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> Option<S> {
        self.inner
            .upgrade()
            .and_then(|inner| inner.borrow().state.clone())
    }

    /// Monotonic transition counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner
            .upgrade()
            .map_or(0, |inner| inner.borrow().version)
    }

    /// Identity stamp of the last commit.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.inner
            .upgrade()
            .map(|inner| inner.borrow().token.clone())
    }

    /// True after teardown.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner
            .upgrade()
            .is_none_or(|inner| inner.borrow().is_destroyed())
    }

    /// True once the container has a state.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.borrow().is_initialized())
    }
}

/// Fold the middleware list around the core dispatcher.
pub(crate) fn compose<S: Clone + PartialEq + 'static>(
    inner: &Rc<RefCell<StoreInner<S>>>,
    middlewares: &[Middleware<S>],
) -> Next<S> {
    let core: Next<S> = {
        let inner = Rc::clone(inner);
        Rc::new(move |action: &Action<S>| notifier::dispatch_core(&inner, action))
    };
    let context = StoreContext {
        inner: Rc::downgrade(inner),
    };
    middlewares
        .iter()
        .rev()
        .fold(core, |next, middleware| middleware(context.clone(), next))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use stator_core::{Action, Instance, Model, StoreError};

    use super::{Middleware, Next, StoreContext};
    use crate::store::{Store, StoreConfig};

    fn counter_model() -> Model<i64> {
        Rc::new(|state: &i64| {
            let n = *state;
            Instance::builder()
                .value("count", n)
                .method("increase", move |_| n + 1)
                .build()
        })
    }

    fn tap(
        label: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    ) -> Middleware<i64> {
        Rc::new(move |_ctx: StoreContext<i64>, next: Next<i64>| {
            let log = Rc::clone(&log);
            Rc::new(move |action: &Action<i64>| {
                log.borrow_mut().push(format!("{label}>"));
                next(action)?;
                log.borrow_mut().push(format!("<{label}"));
                Ok(())
            })
        })
    }

    #[test]
    fn first_added_runs_outermost() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let store = Store::new(
            counter_model(),
            StoreConfig::new()
                .with_state(0)
                .with_middleware(tap("a", Rc::clone(&log)))
                .with_middleware(tap("b", Rc::clone(&log))),
        );
        let _sub = store.subscribe(|_| {}).unwrap();
        log.borrow_mut().clear();

        store.instance().invoke("increase", &[]).unwrap();
        assert_eq!(*log.borrow(), vec!["a>", "b>", "<b", "<a"]);
    }

    #[test]
    fn middleware_sees_pre_commit_state() {
        let observed = Rc::new(RefCell::new(Vec::new()));
        let observed_in = Rc::clone(&observed);
        let spy: Middleware<i64> = Rc::new(move |ctx: StoreContext<i64>, next: Next<i64>| {
            let observed = Rc::clone(&observed_in);
            Rc::new(move |action: &Action<i64>| {
                // The commit happens inside the core dispatcher, so the
                // context still answers with the previous state here.
                observed.borrow_mut().push((ctx.state(), action.state));
                next(action)
            })
        });
        let store = Store::new(
            counter_model(),
            StoreConfig::new().with_state(0).with_middleware(spy),
        );
        let _sub = store.subscribe(|_| {}).unwrap();
        observed.borrow_mut().clear();

        store.instance().invoke("increase", &[]).unwrap();
        assert_eq!(*observed.borrow(), vec![(Some(0), 1)]);
        assert_eq!(store.state(), Some(1));
    }

    #[test]
    fn middleware_can_swallow_actions() {
        let delivered = Rc::new(RefCell::new(0u32));
        let gate: Middleware<i64> = Rc::new(|_ctx, next: Next<i64>| {
            Rc::new(move |action: &Action<i64>| {
                if action.kind.method_name() == Some("increase") && action.state > 1 {
                    // Swallowed: never reaches the core dispatcher.
                    return Ok(());
                }
                next(action)
            })
        });
        let store = Store::new(
            counter_model(),
            StoreConfig::new().with_state(0).with_middleware(gate),
        );
        let delivered_in = Rc::clone(&delivered);
        let _sub = store
            .subscribe(move |action: &Action<i64>| {
                if !action.kind.is_sync() {
                    *delivered_in.borrow_mut() += 1;
                }
            })
            .unwrap();

        store.instance().invoke("increase", &[]).unwrap();
        assert_eq!(store.state(), Some(1));
        // Swallowed: the state never commits past 1.
        store.instance().invoke("increase", &[]).unwrap();
        assert_eq!(store.state(), Some(1));
        assert_eq!(*delivered.borrow(), 1);
    }

    #[test]
    fn middleware_error_aborts_drain() {
        let failing: Middleware<i64> = Rc::new(|_ctx, next: Next<i64>| {
            Rc::new(move |action: &Action<i64>| {
                if action.kind.is_sync() {
                    next(action)
                } else {
                    Err("middleware rejected".into())
                }
            })
        });
        let store = Store::new(
            counter_model(),
            StoreConfig::new().with_state(0).with_middleware(failing),
        );
        let _sub = store.subscribe(|_| {}).unwrap();
        let err = store.instance().invoke("increase", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Listener { .. }));
        assert_eq!(store.state(), Some(0));
    }

    #[test]
    fn context_outlives_store_gracefully() {
        let ctx_cell: Rc<RefCell<Option<StoreContext<i64>>>> = Rc::new(RefCell::new(None));
        let ctx_in = Rc::clone(&ctx_cell);
        let capture: Middleware<i64> = Rc::new(move |ctx, next: Next<i64>| {
            *ctx_in.borrow_mut() = Some(ctx);
            next
        });
        let store = Store::new(
            counter_model(),
            StoreConfig::new().with_state(0).with_middleware(capture),
        );
        let _sub = store.subscribe(|_| {}).unwrap();
        store.instance().invoke("increase", &[]).unwrap();

        let ctx = ctx_cell.borrow_mut().take().unwrap();
        assert_eq!(ctx.state(), Some(1));
        drop(_sub);
        drop(store);
        assert_eq!(ctx.state(), None);
        assert!(ctx.is_destroyed());
        assert_eq!(ctx.version(), 0);
    }
}

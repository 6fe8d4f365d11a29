#![forbid(unsafe_code)]

//! Subscription lifecycle: connect, disconnect, teardown.
//!
//! Listeners connect through the tunnel and come in two stages: a
//! **confirmed** listener sits in the container's dispatch list and
//! receives every drained action; a **temporary** listener connected while
//! a drain is running waits out that drain and is then promoted (and
//! replayed once) by the notifier.
//!
//! Disconnecting flips the entry's shared `accessible` flag first, so a
//! fan-out snapshot that still holds the entry skips it, then removes it
//! from both lists. When the last listener of an uncontrolled container
//! disconnects, the container is torn down: pending actions are discarded
//! and the container reports destroyed.
//!
//! [`Subscription`] is an RAII guard in the style of the reactive
//! observable this engine grew out of: dropping it disconnects.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;

use stator_core::{Dispatch, DispatchResult};

use crate::notifier;
use crate::store::{StoreFlags, StoreInner};

/// One registered listener. The `accessible` flag is shared with every
/// fan-out snapshot holding this entry.
pub(crate) struct DispatchEntry<S> {
    pub(crate) dispatch: Dispatch<S>,
    pub(crate) accessible: Rc<Cell<bool>>,
}

impl<S> DispatchEntry<S> {
    fn new(dispatch: Dispatch<S>) -> Self {
        Self {
            dispatch,
            accessible: Rc::new(Cell::new(true)),
        }
    }

    pub(crate) fn accessible(&self) -> bool {
        self.accessible.get()
    }

    fn is(&self, dispatch: &Dispatch<S>) -> bool {
        Rc::ptr_eq(&self.dispatch, dispatch)
    }
}

impl<S> Clone for DispatchEntry<S> {
    fn clone(&self) -> Self {
        Self {
            dispatch: Rc::clone(&self.dispatch),
            accessible: Rc::clone(&self.accessible),
        }
    }
}

/// Register a listener. Re-connecting a known dispatch (same `Rc`) only
/// re-marks it accessible. Every connect path clears the destroyed flag.
pub(crate) fn connect<S: Clone + PartialEq + 'static>(
    inner: &Rc<RefCell<StoreInner<S>>>,
    dispatch: &Dispatch<S>,
) -> DispatchResult {
    enum Connected<S> {
        AlreadyKnown,
        Controlled,
        Temporary,
        Confirmed(Vec<DispatchEntry<S>>),
    }

    let connected = {
        let mut guard = inner.borrow_mut();
        guard.flags.remove(StoreFlags::DESTROYED);
        let known = guard
            .dispatches
            .iter()
            .chain(guard.temporary_dispatches.iter())
            .find(|entry| entry.is(dispatch));
        if let Some(entry) = known {
            entry.accessible.set(true);
            Connected::AlreadyKnown
        } else if guard.is_controlled() {
            // Controlled containers hold exactly one listener.
            guard.dispatches = vec![DispatchEntry::new(Rc::clone(dispatch))];
            Connected::Controlled
        } else if guard.is_draining() {
            guard
                .temporary_dispatches
                .push(DispatchEntry::new(Rc::clone(dispatch)));
            debug!("listener connected mid-drain, promotion pending");
            Connected::Temporary
        } else {
            // Merge any stragglers waiting for promotion along with the
            // newcomer, then replay to all of them below.
            let mut fresh = std::mem::take(&mut guard.temporary_dispatches);
            fresh.push(DispatchEntry::new(Rc::clone(dispatch)));
            guard.dispatches.extend(fresh.iter().cloned());
            Connected::Confirmed(fresh)
        }
    };

    if let Connected::Confirmed(fresh) = connected {
        let action = {
            let guard = inner.borrow();
            notifier::sync_action(&guard)
        };
        // Uninitialized containers have nothing to replay yet.
        if let Some(action) = action {
            for entry in &fresh {
                if !entry.accessible() {
                    continue;
                }
                (entry.dispatch)(&action)?;
            }
        }
    }
    Ok(())
}

/// Remove a listener from both lists; tear the container down if it was
/// the last one (uncontrolled mode).
pub(crate) fn disconnect<S>(inner: &Rc<RefCell<StoreInner<S>>>, dispatch: &Dispatch<S>) {
    let empty = {
        let mut guard = inner.borrow_mut();
        let known = guard
            .dispatches
            .iter()
            .chain(guard.temporary_dispatches.iter())
            .find(|entry| entry.is(dispatch));
        let Some(entry) = known else {
            return;
        };
        // Flip the shared flag first: snapshots already taken for an
        // in-flight fan-out must skip this listener.
        entry.accessible.set(false);
        guard.dispatches.retain(|entry| !entry.is(dispatch));
        guard.temporary_dispatches.retain(|entry| !entry.is(dispatch));
        guard.dispatches.is_empty()
            && guard.temporary_dispatches.is_empty()
            && !guard.is_controlled()
    };
    if empty {
        debug!("last listener disconnected");
        teardown(inner);
    }
}

/// Tear the container down: discard pending actions, clear the side
/// payload, clear initialized, mark destroyed. Cancels the remainder of
/// any drain in progress.
pub(crate) fn teardown<S>(inner: &Rc<RefCell<StoreInner<S>>>) {
    let mut guard = inner.borrow_mut();
    let dropped = guard.queue.len();
    guard.queue.clear();
    guard.side_payload = None;
    guard.flags.remove(StoreFlags::INITIALIZED);
    guard.flags.insert(StoreFlags::DESTROYED);
    debug!(dropped, "store torn down");
}

/// RAII guard for a connected listener.
///
/// Dropping the guard disconnects the listener; if it was the last one on
/// an uncontrolled container, the container is torn down. The guard holds
/// the container weakly, so it never keeps a store alive by itself.
pub struct Subscription<S> {
    inner: Weak<RefCell<StoreInner<S>>>,
    dispatch: Dispatch<S>,
}

impl<S> Subscription<S> {
    pub(crate) fn new(inner: Weak<RefCell<StoreInner<S>>>, dispatch: Dispatch<S>) -> Self {
        Self { inner, dispatch }
    }

    /// Disconnect now instead of at drop time.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            disconnect(&inner, &self.dispatch);
        }
    }
}

impl<S> std::fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

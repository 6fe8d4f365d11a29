#![forbid(unsafe_code)]

//! Action queue and drain loop.
//!
//! Every transition is appended to a FIFO queue of pending actions. The
//! caller that finds the queue empty becomes the drain loop: it feeds each
//! pending action through the middleware chain into the core dispatcher,
//! pops it, and repeats until the queue is empty. Anyone arriving while
//! the queue is non-empty only appends — which is exactly what makes
//! listener callbacks non-nesting: an action raised from inside a listener
//! lands behind the action being delivered and is processed by the same
//! drain, one generation later.
//!
//! # Invariants
//!
//! 1. At most one drain loop runs per container (guarded by queue
//!    non-emptiness; the head stays queued until fully fanned out).
//! 2. Actions are delivered strictly in append order.
//! 3. A dispatch failure clears the queue before surfacing, so the
//!    container is never left mid-drain.
//! 4. Listeners connected during a drain are promoted and replayed once
//!    with a synthetic sync action after the drain finishes.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use stator_core::{Action, ActionKind, Dispatch, DispatchResult, Params, Token};

use crate::middleware::{self, BatchNotifyHook, NotifyHook};
use crate::store::StoreInner;
use crate::tunnel::DispatchEntry;

/// Enqueue an action and, unless a drain is already in progress, drain the
/// queue to completion and promote any listeners that connected meanwhile.
pub(crate) fn notify<S: Clone + PartialEq + 'static>(
    inner: &Rc<RefCell<StoreInner<S>>>,
    action: Action<S>,
) -> DispatchResult {
    {
        let mut guard = inner.borrow_mut();
        if guard.is_destroyed() || !guard.is_initialized() {
            return Ok(());
        }
        let draining = guard.is_draining();
        guard.queue.push_back(action);
        if draining {
            trace!(pending = guard.queue.len(), "action appended to active drain");
            return Ok(());
        }
    }
    drain(inner)?;
    consume_temporaries(inner)
}

/// Process pending actions until the queue is empty. The head is popped
/// only after its fan-out completed, so re-entrant `notify` calls observe
/// a non-empty queue and append instead of starting a second drain.
fn drain<S: Clone + PartialEq + 'static>(inner: &Rc<RefCell<StoreInner<S>>>) -> DispatchResult {
    loop {
        let next = {
            let guard = inner.borrow();
            guard.queue.front().cloned().map(|action| {
                (action, middleware::compose(inner, &guard.middlewares))
            })
        };
        let Some((action, chain)) = next else {
            return Ok(());
        };
        trace!(kind = ?action.kind, "draining action");
        if let Err(err) = chain(&action) {
            // Abort the whole generation: nothing queued behind the
            // failing action is delivered.
            let mut guard = inner.borrow_mut();
            let dropped = guard.queue.len();
            guard.queue.clear();
            debug!(dropped, "dispatch failed, queue cleared");
            return Err(err);
        }
        inner.borrow_mut().queue.pop_front();
    }
}

/// The innermost link of the middleware chain: commit the transition and
/// fan the action out to confirmed listeners.
pub(crate) fn dispatch_core<S: Clone + PartialEq + 'static>(
    inner: &Rc<RefCell<StoreInner<S>>>,
    action: &Action<S>,
) -> DispatchResult {
    let model = {
        let guard = inner.borrow();
        if guard.is_destroyed() {
            return Ok(());
        }
        // Controlled containers committed in `update`; everyone else
        // re-derives from the action's state.
        (!guard.is_controlled()).then(|| Rc::clone(&guard.model))
    };
    let instance = model.map(|model| Rc::new(model(&action.state)));

    let (entries, batch, hook) = {
        let mut guard = inner.borrow_mut();
        if let Some(instance) = instance {
            guard.state = Some(action.state.clone());
            guard.instance = Some(instance);
            guard.token = Token::new();
            guard.version += 1;
            trace!(version = guard.version, "transition committed");
        }
        (
            guard.dispatches.clone(),
            guard.batch_notify.clone(),
            guard.notify_hook.clone(),
        )
    };
    fan_out(&entries, action, batch.as_ref(), hook.as_ref())
}

/// Deliver one action to the confirmed listeners.
fn fan_out<S>(
    entries: &[DispatchEntry<S>],
    action: &Action<S>,
    batch: Option<&BatchNotifyHook<S>>,
    hook: Option<&NotifyHook<S>>,
) -> DispatchResult {
    if let Some(batch) = batch {
        let dispatches: Vec<Dispatch<S>> = entries
            .iter()
            .filter(|entry| entry.accessible())
            .map(|entry| Rc::clone(&entry.dispatch))
            .collect();
        return batch(&dispatches, action);
    }
    if let Some(hook) = hook {
        // Isolating mode: every listener runs, failures are handed to the
        // hook afterwards.
        let mut failures = Vec::new();
        for entry in entries {
            if !entry.accessible() {
                continue;
            }
            if let Err(err) = (entry.dispatch)(action) {
                failures.push(err);
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        return hook(action, failures);
    }
    for entry in entries {
        if !entry.accessible() {
            continue;
        }
        (entry.dispatch)(action)?;
    }
    Ok(())
}

/// Promote listeners that connected mid-drain and replay one synthetic
/// sync action to each, so they observe current state without waiting for
/// the next mutation.
fn consume_temporaries<S: Clone + PartialEq + 'static>(
    inner: &Rc<RefCell<StoreInner<S>>>,
) -> DispatchResult {
    let (promoted, action) = {
        let mut guard = inner.borrow_mut();
        if guard.temporary_dispatches.is_empty() {
            return Ok(());
        }
        let promoted = std::mem::take(&mut guard.temporary_dispatches);
        guard.dispatches.extend(promoted.iter().cloned());
        let Some(action) = sync_action(&guard) else {
            return Ok(());
        };
        debug!(count = promoted.len(), "temporary listeners promoted");
        (promoted, action)
    };
    for entry in &promoted {
        if !entry.accessible() {
            continue;
        }
        (entry.dispatch)(&action)?;
    }
    Ok(())
}

/// A synthetic resync action carrying the current state and instance on
/// both sides. `None` while uninitialized.
pub(crate) fn sync_action<S: Clone>(inner: &StoreInner<S>) -> Option<Action<S>> {
    let state = inner.state.clone()?;
    let instance = inner.instance.clone()?;
    Some(Action {
        kind: ActionKind::Sync,
        params: Params::new(),
        state: state.clone(),
        prev_state: state,
        instance: Rc::clone(&instance),
        prev_instance: instance,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

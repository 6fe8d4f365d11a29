#![forbid(unsafe_code)]

//! Signal: per-field access-journal diffing.
//!
//! A signal watches which fields a caller actually reads. Reads through
//! [`Signal::instance`] are recorded into a journal (name → value seen);
//! on each notified action the journaled names are re-resolved against the
//! fresh instance and the action is forwarded only if at least one of them
//! changed under [`Value::same`]. Nothing journaled ⇒ nothing forwarded.
//!
//! Until the first tracked accessor is created the diffing layer is off
//! and actions pass through unchanged. [`Signal::start_statistics`] /
//! [`Signal::stop_statistics`] toggle recording; [`Signal::instance_untracked`]
//! reads without recording at all.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::trace;

use stator_core::{Action, StoreError, Token, Value};

use crate::store::Store;
use crate::tunnel::Subscription;
use crate::view::InstanceView;

struct SignalState {
    journal: BTreeMap<String, Value>,
    recording: bool,
    enabled: bool,
}

/// An access-journal diffing wrapper over a [`Store`].
pub struct Signal<S> {
    store: Store<S>,
    state: Rc<RefCell<SignalState>>,
}

impl<S> Clone for Signal<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<S> std::fmt::Debug for Signal<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Signal")
            .field("journaled", &state.journal.len())
            .field("recording", &state.recording)
            .field("enabled", &state.enabled)
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> Signal<S> {
    /// Wrap a store. Diffing stays off until the first tracked accessor is
    /// created.
    #[must_use]
    pub fn new(store: &Store<S>) -> Self {
        Self {
            store: store.clone(),
            state: Rc::new(RefCell::new(SignalState {
                journal: BTreeMap::new(),
                recording: false,
                enabled: false,
            })),
        }
    }

    /// A tracked instance accessor: every resolved read is recorded into
    /// the journal (while recording is on). Creating one arms the diffing
    /// layer and turns recording on.
    #[must_use]
    pub fn instance(&self) -> InstanceView<S> {
        {
            let mut state = self.state.borrow_mut();
            state.enabled = true;
            state.recording = true;
        }
        let state = Rc::clone(&self.state);
        InstanceView::new(
            Rc::clone(self.store.inner()),
            Some(Rc::new(move |name: &str, value: &Value| {
                let mut state = state.borrow_mut();
                if state.recording {
                    trace!(field = name, "journaled read");
                    state.journal.insert(name.to_string(), value.clone());
                }
            })),
        )
    }

    /// An untracked accessor: reads resolve normally but are never
    /// journaled.
    #[must_use]
    pub fn instance_untracked(&self) -> InstanceView<S> {
        self.store.instance()
    }

    /// Resume recording reads, starting from an empty journal.
    pub fn start_statistics(&self) {
        let mut state = self.state.borrow_mut();
        state.recording = true;
        state.journal.clear();
    }

    /// Stop recording reads and drop the journal.
    pub fn stop_statistics(&self) {
        let mut state = self.state.borrow_mut();
        state.recording = false;
        state.journal.clear();
    }

    /// Names currently journaled.
    #[must_use]
    pub fn journaled(&self) -> Vec<String> {
        self.state.borrow().journal.keys().cloned().collect()
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

    /// Subscribe a listener behind the journal diff: it only sees actions
    /// after which some journaled field resolves to a different value.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Action<S>) + 'static,
    ) -> Result<Subscription<S>, StoreError> {
        let state = Rc::clone(&self.state);
        let store = self.store.clone();
        self.store.subscribe_with(move |action: &Action<S>| {
            let recorded: Option<Vec<(String, Value)>> = {
                let state = state.borrow();
                if !state.enabled {
                    None
                } else {
                    Some(
                        state
                            .journal
                            .iter()
                            .map(|(name, value)| (name.clone(), value.clone()))
                            .collect(),
                    )
                }
            };
            let Some(recorded) = recorded else {
                // Diffing not armed yet: pass through.
                listener(action);
                return Ok(());
            };
            if recorded.is_empty() {
                return Ok(());
            }
            let view = store.instance();
            let mut changed = false;
            for (name, previous) in &recorded {
                let current = view.get(name)?;
                if !current.same(previous) {
                    changed = true;
                    break;
                }
            }
            if changed {
                listener(action);
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

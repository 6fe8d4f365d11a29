#![forbid(unsafe_code)]

//! Actions: one record per state transition.
//!
//! Every effective change flows through the engine as an [`Action`]. Real
//! mutations carry [`ActionKind::Method`] with the behavior's name; the
//! synthetic resync delivered to a freshly connected listener (and on
//! model swaps) carries [`ActionKind::Sync`] and does not represent a
//! mutation.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::DispatchResult;
use crate::instance::Instance;
use crate::value::Value;

/// Argument list of an invoked behavior method.
///
/// Almost every behavior takes zero or one argument; two slots keep the
/// common case off the heap.
pub type Params = SmallVec<[Value; 2]>;

/// What kind of transition an action describes.
#[derive(Clone)]
pub enum ActionKind {
    /// Synthetic resync: brings a listener up to date without a mutation.
    Sync,
    /// A tracked behavior call, tagged with the method name.
    Method(Rc<str>),
}

impl ActionKind {
    /// True for the synthetic resync kind.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync)
    }

    /// The behavior name, for method actions.
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        match self {
            Self::Sync => None,
            Self::Method(name) => Some(name),
        }
    }
}

impl std::fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
        }
    }
}

impl PartialEq for ActionKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sync, Self::Sync) => true,
            (Self::Method(a), Self::Method(b)) => a == b,
            _ => false,
        }
    }
}

/// One state transition event.
///
/// `instance`/`prev_instance` are the derived instances around the
/// transition; for [`ActionKind::Sync`] both sides are the current ones.
pub struct Action<S> {
    /// Transition kind.
    pub kind: ActionKind,
    /// Arguments the behavior was invoked with (empty for sync).
    pub params: Params,
    /// The state this action carries the container to.
    pub state: S,
    /// The state before the transition.
    pub prev_state: S,
    /// Instance derived at dispatch time.
    pub instance: Rc<Instance<S>>,
    /// Instance before the transition.
    pub prev_instance: Rc<Instance<S>>,
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            params: self.params.clone(),
            state: self.state.clone(),
            prev_state: self.prev_state.clone(),
            instance: Rc::clone(&self.instance),
            prev_instance: Rc::clone(&self.prev_instance),
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("prev_state", &self.prev_state)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A listener callback. Receives every action, including the initial
/// synthetic sync; may fail, which aborts the default fan-out.
pub type Dispatch<S> = Rc<dyn Fn(&Action<S>) -> DispatchResult>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;

    fn empty_instance() -> Rc<Instance<i64>> {
        Rc::new(Instance::builder().build())
    }

    #[test]
    fn kind_accessors() {
        assert!(ActionKind::Sync.is_sync());
        assert_eq!(ActionKind::Sync.method_name(), None);
        let method = ActionKind::Method(Rc::from("increase"));
        assert!(!method.is_sync());
        assert_eq!(method.method_name(), Some("increase"));
    }

    #[test]
    fn kind_equality() {
        assert_eq!(ActionKind::Sync, ActionKind::Sync);
        assert_eq!(
            ActionKind::Method(Rc::from("a")),
            ActionKind::Method(Rc::from("a"))
        );
        assert_ne!(ActionKind::Sync, ActionKind::Method(Rc::from("a")));
    }

    #[test]
    fn action_clone_shares_instances() {
        let instance = empty_instance();
        let action = Action {
            kind: ActionKind::Sync,
            params: Params::new(),
            state: 1i64,
            prev_state: 0i64,
            instance: Rc::clone(&instance),
            prev_instance: instance,
        };
        let copy = action.clone();
        assert!(Rc::ptr_eq(&action.instance, &copy.instance));
        assert_eq!(copy.state, 1);
    }
}

#![forbid(unsafe_code)]

//! Engine error types.
//!
//! Consistency errors ([`StoreError::ImmutableWrite`],
//! [`StoreError::StaleField`], [`StoreError::MethodShapeChanged`]) indicate
//! a model author bug and are never recovered by the engine. Listener
//! failures abort the current drain and surface to the caller that
//! triggered the transition; a custom notify hook can aggregate them
//! instead.

/// A boxed failure from a listener or middleware.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result of delivering one action to one listener (or through one
/// middleware link).
pub type DispatchResult = Result<(), BoxError>;

/// Everything that can go wrong inside the engine.
#[derive(Debug)]
pub enum StoreError {
    /// A behavior method was invoked on a container never given a state.
    Uninitialized,
    /// `update` needs a state before the container is initialized.
    MissingInitialState,
    /// Assignment to an instance member; instances are read-only.
    ImmutableWrite {
        /// The member that was written to.
        name: String,
    },
    /// A cached field no longer resolves to a field descriptor.
    StaleField {
        /// The member that changed shape.
        name: String,
    },
    /// A cached method no longer resolves to a callable member.
    MethodShapeChanged {
        /// The member that changed shape.
        name: String,
    },
    /// No member with this name exists on the current instance.
    UnknownMember {
        /// The missing name.
        name: String,
    },
    /// The member exists but is not a behavior method.
    NotCallable {
        /// The member name.
        name: String,
    },
    /// The member is callable and cannot be read as a value.
    NotAField {
        /// The member name.
        name: String,
    },
    /// A listener (or middleware) failed during dispatch; the in-flight
    /// queue was cleared.
    Listener {
        /// The underlying failure.
        source: BoxError,
    },
    /// Multiple listener failures, aggregated by a notify hook.
    Listeners {
        /// The underlying failures, in listener order.
        sources: Vec<BoxError>,
    },
}

impl StoreError {
    /// Aggregate several listener failures into one error. Intended for
    /// notify hooks.
    #[must_use]
    pub fn aggregate(sources: Vec<BoxError>) -> Self {
        Self::Listeners { sources }
    }

    /// Wrap a dispatch failure, unwrapping errors that already are
    /// [`StoreError`]s so they do not nest.
    #[must_use]
    pub fn from_dispatch(err: BoxError) -> Self {
        match err.downcast::<StoreError>() {
            Ok(own) => *own,
            Err(err) => Self::Listener { source: err },
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => {
                write!(f, "behavior invoked before the container was given a state")
            }
            Self::MissingInitialState => {
                write!(f, "update requires an initial state first")
            }
            Self::ImmutableWrite { name } => {
                write!(f, "instance member '{name}' is read-only")
            }
            Self::StaleField { name } => {
                write!(f, "member '{name}' is no longer a field descriptor")
            }
            Self::MethodShapeChanged { name } => {
                write!(f, "member '{name}' is no longer a callable method")
            }
            Self::UnknownMember { name } => {
                write!(f, "no instance member named '{name}'")
            }
            Self::NotCallable { name } => {
                write!(f, "member '{name}' is not a behavior method")
            }
            Self::NotAField { name } => {
                write!(f, "member '{name}' is a method, not a readable field")
            }
            Self::Listener { source } => {
                write!(f, "a listener failed during dispatch: {source}")
            }
            Self::Listeners { sources } => {
                write!(f, "{} listeners failed during dispatch", sources.len())
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Listener { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

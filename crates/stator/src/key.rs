#![forbid(unsafe_code)]

//! Model keys and store collections.
//!
//! A [`ModelKey`] binds a model to an optional default state and carries a
//! stable identity, so the same key can mint containers and later find
//! them again inside a [`StoreCollection`]. Keys are the convenience layer
//! over the engine — nothing here adds semantics to the store itself.

use std::cell::Cell;
use std::rc::Rc;

use stator_core::Model;
use stator_runtime::{Store, StoreConfig, UpdateArgs};

/// A model plus optional default state, with stable identity.
///
/// Cloning a key keeps its identity: clones mint stores from the same
/// model and compare equal under [`ModelKey::same_key`].
pub struct ModelKey<S> {
    model: Model<S>,
    default_state: Option<S>,
    mark: Rc<()>,
}

impl<S: Clone> Clone for ModelKey<S> {
    fn clone(&self) -> Self {
        Self {
            model: Rc::clone(&self.model),
            default_state: self.default_state.clone(),
            mark: Rc::clone(&self.mark),
        }
    }
}

impl<S> std::fmt::Debug for ModelKey<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelKey")
            .field("default_state", &self.default_state.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Clone + PartialEq + 'static> ModelKey<S> {
    /// A key without a default state: stores minted from it start
    /// uninitialized unless the config carries a state.
    #[must_use]
    pub fn new(model: Model<S>) -> Self {
        Self {
            model,
            default_state: None,
            mark: Rc::new(()),
        }
    }

    /// A key with a default state.
    #[must_use]
    pub fn with_state(model: Model<S>, state: S) -> Self {
        Self {
            model,
            default_state: Some(state),
            mark: Rc::new(()),
        }
    }

    /// The bound model.
    #[must_use]
    pub fn model(&self) -> Model<S> {
        Rc::clone(&self.model)
    }

    /// Identity comparison between keys (clones compare equal).
    #[must_use]
    pub fn same_key(&self, other: &ModelKey<S>) -> bool {
        Rc::ptr_eq(&self.mark, &other.mark)
    }

    /// Mint a container. The key's default state fills in when the config
    /// does not carry one.
    #[must_use]
    pub fn create_store(&self, config: StoreConfig<S>) -> Store<S> {
        let config = match (&self.default_state, config.has_state()) {
            (Some(state), false) => config.with_state(state.clone()),
            _ => config,
        };
        Store::new(Rc::clone(&self.model), config)
    }
}

/// An ordered set of stores minted from keys, addressable by key identity.
pub struct StoreCollection<S> {
    units: Vec<(ModelKey<S>, Store<S>)>,
    dead: Cell<bool>,
}

impl<S: Clone + PartialEq + 'static> StoreCollection<S> {
    /// Mint one store per key, in order.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = ModelKey<S>>) -> Self {
        let units = keys
            .into_iter()
            .map(|key| {
                let store = key.create_store(StoreConfig::new());
                (key, store)
            })
            .collect();
        Self {
            units,
            dead: Cell::new(false),
        }
    }

    /// Find the store minted from this key (by identity).
    #[must_use]
    pub fn find(&self, key: &ModelKey<S>) -> Option<Store<S>> {
        self.units
            .iter()
            .find(|(unit_key, _)| unit_key.same_key(key))
            .map(|(_, store)| store.clone())
    }

    /// Number of member stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True when the collection has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Re-feed each member store its positional key's model. Extra keys
    /// are ignored; missing positions keep their model. No-op once the
    /// collection was destroyed.
    pub fn refresh(&self, keys: &[ModelKey<S>]) -> Result<(), stator_core::StoreError> {
        if self.dead.get() {
            return Ok(());
        }
        for ((_, store), key) in self.units.iter().zip(keys.iter()) {
            store.update(UpdateArgs::model(key.model()))?;
        }
        Ok(())
    }

    /// Destroy every member and mark the collection dead.
    pub fn destroy(&self) {
        for (_, store) in &self.units {
            store.destroy();
        }
        self.dead.set(true);
    }
}

impl<S> std::fmt::Debug for StoreCollection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCollection")
            .field("units", &self.units.len())
            .field("dead", &self.dead.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use stator_core::{Instance, Model, Value};
    use stator_runtime::StoreConfig;

    use super::{ModelKey, StoreCollection};

    fn counter_model() -> Model<i64> {
        Rc::new(|state: &i64| {
            let n = *state;
            Instance::builder()
                .value("count", n)
                .method("increase", move |_| n + 1)
                .build()
        })
    }

    #[test]
    fn key_default_state_fills_in() {
        let key = ModelKey::with_state(counter_model(), 7);
        let store = key.create_store(StoreConfig::new());
        assert!(store.is_initialized());
        assert_eq!(store.state(), Some(7));

        // An explicit config state wins over the key default.
        let eager = key.create_store(StoreConfig::new().with_state(1));
        assert_eq!(eager.state(), Some(1));
    }

    #[test]
    fn key_without_state_stays_lazy() {
        let key = ModelKey::new(counter_model());
        let store = key.create_store(StoreConfig::new());
        assert!(!store.is_initialized());
    }

    #[test]
    fn clones_share_identity() {
        let key = ModelKey::with_state(counter_model(), 0);
        let copy = key.clone();
        assert!(key.same_key(&copy));
        assert!(!key.same_key(&ModelKey::with_state(counter_model(), 0)));
    }

    #[test]
    fn collection_find_by_identity() {
        let a = ModelKey::with_state(counter_model(), 1);
        let b = ModelKey::with_state(counter_model(), 2);
        let collection = StoreCollection::new([a.clone(), b.clone()]);
        assert_eq!(collection.len(), 2);

        let store_b = collection.find(&b).unwrap();
        assert_eq!(store_b.state(), Some(2));
        assert!(collection.find(&ModelKey::new(counter_model())).is_none());
    }

    #[test]
    fn refresh_swaps_models_in_place() {
        let key = ModelKey::with_state(counter_model(), 4);
        let collection = StoreCollection::new([key.clone()]);
        let store = collection.find(&key).unwrap();
        let _sub = store.subscribe(|_| {}).unwrap();

        let widened: Model<i64> = Rc::new(|state: &i64| {
            let n = *state;
            Instance::builder()
                .value("count", n * 10)
                .method("increase", move |_| n + 1)
                .build()
        });
        let replacement = ModelKey::new(widened);
        collection.refresh(&[replacement]).unwrap();
        assert_eq!(store.state(), Some(4));
        assert_eq!(store.instance().get("count").unwrap(), Value::Int(40));
    }

    #[test]
    fn destroy_kills_members_and_mutes_refresh() {
        let key = ModelKey::with_state(counter_model(), 0);
        let collection = StoreCollection::new([key.clone()]);
        let store = collection.find(&key).unwrap();

        collection.destroy();
        assert!(store.is_destroyed());
        collection.refresh(&[key]).unwrap();
        assert!(store.is_destroyed());
    }
}

//! Components and per-owner component maps

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use void_core::TypeKey;

use crate::builder::Builder;
use crate::contract::ContractKey;
use crate::factory::{Factory, Upcast};
use crate::params::Params;

/// A keyed data unit attachable to a model or an archetype
pub trait Component: Any + Send + Sync + fmt::Debug {
    /// The concrete declared type of this component
    fn component_type(&self) -> TypeKey;

    /// Get as Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

impl dyn Component {
    /// Downcast to a concrete component
    pub fn downcast_ref<C: Component>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }

    /// Check the concrete type
    pub fn is<C: Component>(&self) -> bool {
        self.as_any().is::<C>()
    }
}

impl<C: Component> Upcast<C> for dyn Component {
    fn upcast(value: C) -> Box<Self> {
        Box::new(value)
    }
}

/// Implement [`Component`] for a struct under a declared type key
#[macro_export]
macro_rules! impl_component {
    ($ty:ty, $key:expr) => {
        impl $crate::component::Component for $ty {
            fn component_type(&self) -> $crate::TypeKey {
                $crate::TypeKey::new($key)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}

pub type ComponentBuilder = Builder<dyn Component>;
pub type ComponentFactory = Factory<dyn Component>;

/// Key of a component: its resolved component-base type
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(TypeKey);

impl ComponentKey {
    pub(crate) fn new(base: TypeKey) -> Self {
        Self(base)
    }

    /// The component-base type
    pub fn base_type(&self) -> &TypeKey {
        &self.0
    }

    /// Canonical name of the component-base type
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKey({})", self.0.name())
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

/// A component to build and attach: declared type plus parameters
#[derive(Clone, Debug)]
pub struct ComponentSpec {
    pub type_key: TypeKey,
    pub params: Params,
}

impl ComponentSpec {
    /// Spec with no parameters
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            params: Params::new(),
        }
    }

    /// Builder-style parameter insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.set(key, value);
        self
    }
}

#[derive(Default)]
struct Slots {
    by_key: BTreeMap<ComponentKey, Arc<dyn Component>>,
    executed: BTreeSet<ContractKey>,
}

/// Components present on one owner, at most one per key
///
/// Attachment goes through `ComponentSystem::attach`, which also runs
/// contracts.
#[derive(Default)]
pub struct ComponentMap {
    slots: RwLock<Slots>,
}

impl ComponentMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Component under a key
    pub fn get(&self, key: &ComponentKey) -> Option<Arc<dyn Component>> {
        self.slots.read().by_key.get(key).cloned()
    }

    /// Component under a key by name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.get(&ComponentKey::new(TypeKey::new(name)))
    }

    /// Typed component lookup by key name
    pub fn get_as<C: Component + Clone>(&self, name: &str) -> Option<C> {
        self.get_by_name(name)
            .and_then(|c| c.downcast_ref::<C>().cloned())
    }

    /// Keys present, in key order
    pub fn keys(&self) -> Vec<ComponentKey> {
        self.slots.read().by_key.keys().cloned().collect()
    }

    /// Check if a key is present
    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.slots.read().by_key.contains_key(key)
    }

    /// Detach a component
    pub fn remove(&self, key: &ComponentKey) -> Option<Arc<dyn Component>> {
        self.slots.write().by_key.remove(key)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.slots.read().by_key.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.slots.read().by_key.is_empty()
    }

    /// Insert under a key, returning the replaced component
    pub(crate) fn insert(
        &self,
        key: ComponentKey,
        component: Arc<dyn Component>,
    ) -> Option<Arc<dyn Component>> {
        self.slots.write().by_key.insert(key, component)
    }

    /// Mark a contract as executed on this owner; false if it already was
    pub(crate) fn claim_contract(&self, key: &ContractKey) -> bool {
        self.slots.write().executed.insert(key.clone())
    }

    /// Undo a claim whose contract did not complete
    pub(crate) fn release_contract(&self, key: &ContractKey) {
        self.slots.write().executed.remove(key);
    }

    /// Put back what a failed insert replaced
    pub(crate) fn restore(&self, key: ComponentKey, previous: Option<Arc<dyn Component>>) {
        let mut slots = self.slots.write();
        match previous {
            Some(component) => {
                slots.by_key.insert(key, component);
            }
            None => {
                slots.by_key.remove(&key);
            }
        }
    }
}

impl fmt::Debug for ComponentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("ComponentMap")
            .field("components", &slots.by_key)
            .field("executed", &slots.executed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Tint {
        value: String,
    }

    impl_component!(Tint, "Tint");

    #[test]
    fn test_insert_replaces_under_key() {
        let map = ComponentMap::new();
        let key = ComponentKey::new(TypeKey::new("Tint"));

        assert!(map
            .insert(key.clone(), Arc::new(Tint { value: "red".into() }))
            .is_none());
        let old = map.insert(key.clone(), Arc::new(Tint { value: "blue".into() }));

        assert_eq!(old.unwrap().downcast_ref::<Tint>().unwrap().value, "red");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_as::<Tint>("Tint").unwrap().value, "blue");
    }

    #[test]
    fn test_downcast() {
        let component: Arc<dyn Component> = Arc::new(Tint { value: "red".into() });
        assert!(component.is::<Tint>());
        assert_eq!(component.component_type(), TypeKey::new("Tint"));
    }
}

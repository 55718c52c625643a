//! Typed extra-context store of a universe

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::universe::Scope;

/// One value per Rust type; writable until the universe is sealed
pub struct ExtraContexts {
    scope: Arc<Scope>,
    values: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ExtraContexts {
    pub(crate) fn new(scope: Arc<Scope>) -> Self {
        Self {
            scope,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Store a context value, replacing any previous value of the same type
    pub fn set<T: Any + Send + Sync>(&self, value: T) -> Result<()> {
        self.scope.ensure_unsealed()?;
        self.values.write().insert(TypeId::of::<T>(), Arc::new(value));
        Ok(())
    }

    /// Strict lookup
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.try_get::<T>()
            .ok_or_else(|| Error::not_found("context", type_name::<T>()))
    }

    /// Lookup
    pub fn try_get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = self.values.read().get(&TypeId::of::<T>()).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Check if a value of type `T` is stored
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl fmt::Debug for ExtraContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraContexts")
            .field("values", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::Universe;

    #[derive(Debug, PartialEq)]
    struct Difficulty(u8);

    #[test]
    fn test_set_and_get() {
        let universe = Universe::new("contexts");
        universe.set_context(Difficulty(3)).unwrap();
        assert_eq!(*universe.get_context::<Difficulty>().unwrap(), Difficulty(3));
        assert!(universe.has_context::<Difficulty>());

        assert!(matches!(
            universe.get_context::<String>(),
            Err(Error::NotFound { .. })
        ));
        assert!(universe.try_get_context::<String>().is_none());
    }

    #[test]
    fn test_sealed_rejects_set() {
        let universe = Universe::new("contexts-sealed");
        universe.seal();
        assert!(matches!(
            universe.set_context(Difficulty(1)),
            Err(Error::SealedUniverse { .. })
        ));
    }
}

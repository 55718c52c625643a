//! Identity registry and archetype hierarchy lookups
//!
//! Archetypes are indexed twice: by identity key and by declared type.
//! Both indexes are unique within a universe.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use void_core::{NamedId, TypeKey, TypeKind, TypeRegistryError};

use crate::archetype::Archetype;
use crate::error::{Error, Result};
use crate::universe::Scope;

/// Immutable (key, universe) pair identifying one archetype singleton
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    key: NamedId,
    universe: NamedId,
}

impl Identity {
    /// Create an identity
    pub fn new(key: &str, universe: &NamedId) -> Self {
        Self {
            key: NamedId::new(key),
            universe: universe.clone(),
        }
    }

    /// The identity key
    pub fn key(&self) -> &str {
        self.key.name()
    }

    /// The owning universe key
    pub fn universe(&self) -> &str {
        self.universe.name()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}::{})", self.universe, self.key)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.universe, self.key)
    }
}

#[derive(Default)]
struct Tables {
    by_key: HashMap<NamedId, Arc<Archetype>>,
    by_type: HashMap<TypeKey, Arc<Archetype>>,
    order: Vec<Arc<Archetype>>,
}

/// Registry of archetype singletons in one universe
pub struct ArchetypeRegistry {
    scope: Arc<Scope>,
    tables: RwLock<Tables>,
}

impl ArchetypeRegistry {
    pub(crate) fn new(scope: Arc<Scope>) -> Self {
        Self {
            scope,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Insert an archetype; fails if its key or declared type is taken
    pub(crate) fn register(&self, archetype: Arc<Archetype>) -> Result<()> {
        self.scope.ensure_unsealed()?;
        self.insert(archetype)
    }

    /// Insert a splayed archetype; allowed after sealing because its
    /// constructor was recorded before the seal
    pub(crate) fn register_splayed(&self, archetype: Arc<Archetype>) -> Result<()> {
        self.insert(archetype)
    }

    fn insert(&self, archetype: Arc<Archetype>) -> Result<()> {
        let mut tables = self.tables.write();
        let key = NamedId::new(archetype.identity().key());

        if tables.by_key.contains_key(&key) || tables.by_type.contains_key(archetype.type_key()) {
            return Err(Error::DuplicateIdentity {
                key: key.name().to_string(),
                universe: self.scope.key().name().to_string(),
            });
        }

        log::debug!(
            "Registered archetype {} ({})",
            archetype.identity(),
            archetype.type_key()
        );
        tables.by_key.insert(key, archetype.clone());
        tables.by_type.insert(archetype.type_key().clone(), archetype.clone());
        tables.order.push(archetype);
        Ok(())
    }

    /// Drop an archetype from both indexes
    pub(crate) fn remove(&self, archetype: &Archetype) {
        let mut tables = self.tables.write();
        tables.by_key.remove(&NamedId::new(archetype.identity().key()));
        tables.by_type.remove(archetype.type_key());
        tables.order.retain(|a| a.identity() != archetype.identity());
        log::debug!("Withdrew archetype {}", archetype.identity());
    }

    /// Strict lookup by identity key
    pub fn get(&self, key: &str) -> Result<Arc<Archetype>> {
        self.try_get(key)
            .ok_or_else(|| Error::not_found("archetype", key))
    }

    /// Lookup by identity key
    pub fn try_get(&self, key: &str) -> Option<Arc<Archetype>> {
        self.tables.read().by_key.get(&NamedId::new(key)).cloned()
    }

    /// Strict lookup by declared type
    pub fn get_by_type(&self, type_key: &TypeKey) -> Result<Arc<Archetype>> {
        self.try_get_by_type(type_key)
            .ok_or_else(|| Error::not_found("archetype type", type_key.name()))
    }

    /// Lookup by declared type
    pub fn try_get_by_type(&self, type_key: &TypeKey) -> Option<Arc<Archetype>> {
        self.tables.read().by_type.get(type_key).cloned()
    }

    /// Check if a declared type has an archetype
    pub fn contains_type(&self, type_key: &TypeKey) -> bool {
        self.tables.read().by_type.contains_key(type_key)
    }

    /// Walk the declared ancestors of `type_key` to the nearest registered
    /// archetype
    ///
    /// Returns `Ok(None)` for a hierarchy root. An ancestor that is declared
    /// as an archetype but not yet registered, or a parent type that is not
    /// declared at all, is reported as not ready.
    pub fn resolve_base(&self, type_key: &TypeKey) -> Result<Option<Arc<Archetype>>> {
        let types = self.scope.types().read();
        let ancestors = types.ancestors(type_key).map_err(|e| match e {
            TypeRegistryError::UnknownParent { parent, .. } => {
                Error::dependency_not_ready(type_key, &TypeKey::new(&parent))
            }
            TypeRegistryError::Cycle(_) => {
                Error::invalid_declaration(type_key, "archetype ancestry is cyclic")
            }
            other => Error::from(other),
        })?;

        for ancestor in &ancestors {
            if let Some(base) = self.try_get_by_type(ancestor) {
                return Ok(Some(base));
            }
            if types.get(ancestor).map(|info| info.kind) == Some(TypeKind::Archetype) {
                return Err(Error::dependency_not_ready(type_key, ancestor));
            }
        }
        Ok(None)
    }

    /// All archetypes in registration order
    pub fn all(&self) -> Vec<Arc<Archetype>> {
        self.tables.read().order.clone()
    }

    /// Archetypes whose base chain includes `ancestor`
    pub fn descendants_of(&self, ancestor: &Archetype) -> Vec<Arc<Archetype>> {
        self.tables
            .read()
            .order
            .iter()
            .filter(|a| a.is_descendant_of(ancestor))
            .cloned()
            .collect()
    }

    /// Conceptual unload; archetypes live for the whole process
    pub fn unload(&self, key: &str) -> Result<()> {
        let archetype = self.get(key)?;
        log::info!("Unloaded archetype {}", archetype.identity());
        Ok(())
    }

    /// Get number of registered archetypes
    pub fn len(&self) -> usize {
        self.tables.read().order.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tables.read().order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let universe = NamedId::new("main");
        let identity = Identity::new("Sword", &universe);
        assert_eq!(identity.key(), "Sword");
        assert_eq!(identity.universe(), "main");
        assert_eq!(identity.to_string(), "main::Sword");
        assert_eq!(identity, Identity::new("Sword", &universe));
        assert_ne!(identity, Identity::new("Sword", &NamedId::new("other")));
    }
}

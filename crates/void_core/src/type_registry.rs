//! Declared type graph
//!
//! Stands in for runtime type introspection: each participant registers a
//! small descriptor (key, direct parent, kind, flags) at startup, and the
//! registry answers ancestry questions from that graph.

use core::fmt;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::error::TypeRegistryError;
use crate::id::TypeKey;

/// What role a declared type plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKind {
    /// Intermediate type with no registry entry of its own
    Abstract,
    /// Archetype (singleton factory) type
    Archetype,
    /// Model type produced by archetypes or model families
    Model,
    /// Component type
    Component,
    /// Enumeration type
    Enumeration,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Abstract => "abstract",
            TypeKind::Archetype => "archetype",
            TypeKind::Model => "model",
            TypeKind::Component => "component",
            TypeKind::Enumeration => "enumeration",
        };
        f.write_str(name)
    }
}

/// Flags attached to a declared type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TypeFlags {
    /// Declared component root: components below it share its key
    pub component_root: bool,
    /// Neither this type nor any descendant is built by the loader
    pub exclude_descendants: bool,
    /// Declared but left out of the initial load, together with descendants
    pub deferred: bool,
}

/// Information about a declared type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub key: TypeKey,
    pub parent: Option<TypeKey>,
    pub kind: TypeKind,
    pub flags: TypeFlags,
}

impl TypeInfo {
    /// Create type info with no parent
    pub fn new(key: impl Into<TypeKey>, kind: TypeKind) -> Self {
        Self {
            key: key.into(),
            parent: None,
            kind,
            flags: TypeFlags::default(),
        }
    }

    /// Set the direct parent
    pub fn with_parent(mut self, parent: impl Into<TypeKey>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the flags
    pub fn with_flags(mut self, flags: TypeFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Registry of all declared types in one scope
#[derive(Default)]
pub struct TypeRegistry {
    by_key: BTreeMap<TypeKey, TypeInfo>,
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            by_key: BTreeMap::new(),
        }
    }

    /// Register a type
    ///
    /// Registering the exact same descriptor twice is a no-op; a different
    /// descriptor under an existing key is rejected.
    pub fn register(&mut self, info: TypeInfo) -> Result<(), TypeRegistryError> {
        if let Some(existing) = self.by_key.get(&info.key) {
            if *existing == info {
                return Ok(());
            }
            return Err(TypeRegistryError::AlreadyRegistered(info.key.name().into()));
        }
        self.by_key.insert(info.key.clone(), info);
        Ok(())
    }

    /// Get type info by key
    pub fn get(&self, key: &TypeKey) -> Option<&TypeInfo> {
        self.by_key.get(key)
    }

    /// Get type info by key, failing if absent
    pub fn require(&self, key: &TypeKey) -> Result<&TypeInfo, TypeRegistryError> {
        self.by_key
            .get(key)
            .ok_or_else(|| TypeRegistryError::NotRegistered(key.name().into()))
    }

    /// Check if a type is registered
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Direct parent of a type
    pub fn parent_of(&self, key: &TypeKey) -> Option<&TypeKey> {
        self.by_key.get(key).and_then(|info| info.parent.as_ref())
    }

    /// The type followed by its ancestors, most-derived first
    pub fn lineage(&self, key: &TypeKey) -> Result<Vec<TypeKey>, TypeRegistryError> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.require(key)?;

        loop {
            if !seen.insert(current.key.clone()) {
                return Err(TypeRegistryError::Cycle(current.key.name().into()));
            }
            chain.push(current.key.clone());

            let child = current;
            let Some(parent) = &child.parent else {
                return Ok(chain);
            };
            current = self.by_key.get(parent).ok_or_else(|| {
                TypeRegistryError::UnknownParent {
                    child: child.key.name().into(),
                    parent: parent.name().into(),
                }
            })?;
        }
    }

    /// Ancestors of a type, nearest first (excludes the type itself)
    pub fn ancestors(&self, key: &TypeKey) -> Result<Vec<TypeKey>, TypeRegistryError> {
        let mut chain = self.lineage(key)?;
        chain.remove(0);
        Ok(chain)
    }

    /// Whether `key` is `ancestor` or descends from it
    pub fn is_a(&self, key: &TypeKey, ancestor: &TypeKey) -> bool {
        self.lineage(key)
            .map(|chain| chain.iter().any(|k| k == ancestor))
            .unwrap_or(false)
    }

    /// Whether this type or any ancestor is flagged to exclude descendants
    pub fn is_excluded(&self, key: &TypeKey) -> bool {
        self.lineage_has(key, |flags| flags.exclude_descendants)
    }

    /// Whether this type or any ancestor is left out of the initial load
    pub fn is_deferred(&self, key: &TypeKey) -> bool {
        self.lineage_has(key, |flags| flags.deferred)
    }

    /// Walks the parent chain as far as it is registered; stops on a cycle
    fn lineage_has(&self, key: &TypeKey, test: impl Fn(&TypeFlags) -> bool) -> bool {
        let mut current = self.by_key.get(key);
        let mut steps = 0;
        while let Some(info) = current {
            if test(&info.flags) {
                return true;
            }
            steps += 1;
            if steps > self.by_key.len() {
                return false;
            }
            current = info.parent.as_ref().and_then(|p| self.by_key.get(p));
        }
        false
    }

    /// Iterate over all registered types in key order
    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.by_key.values()
    }

    /// Iterate over registered types of one kind
    pub fn of_kind(&self, kind: TypeKind) -> impl Iterator<Item = &TypeInfo> {
        self.by_key.values().filter(move |info| info.kind == kind)
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.by_key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register(TypeInfo::new("Weapon", TypeKind::Archetype)).unwrap();
        types
            .register(TypeInfo::new("Blade", TypeKind::Abstract).with_parent("Weapon"))
            .unwrap();
        types
            .register(TypeInfo::new("Sword", TypeKind::Archetype).with_parent("Blade"))
            .unwrap();
        types
    }

    #[test]
    fn test_lineage_most_derived_first() {
        let types = registry();
        let chain = types.lineage(&TypeKey::new("Sword")).unwrap();
        let names: Vec<&str> = chain.iter().map(|k| k.name()).collect();
        assert_eq!(names, ["Sword", "Blade", "Weapon"]);

        let ancestors = types.ancestors(&TypeKey::new("Sword")).unwrap();
        assert_eq!(ancestors.len(), 2);
        assert!(types.is_a(&TypeKey::new("Sword"), &TypeKey::new("Weapon")));
        assert!(!types.is_a(&TypeKey::new("Weapon"), &TypeKey::new("Sword")));
    }

    #[test]
    fn test_unknown_parent() {
        let mut types = TypeRegistry::new();
        types
            .register(TypeInfo::new("Axe", TypeKind::Archetype).with_parent("Weapon"))
            .unwrap();
        let err = types.lineage(&TypeKey::new("Axe")).unwrap_err();
        assert!(matches!(err, TypeRegistryError::UnknownParent { .. }));
    }

    #[test]
    fn test_cycle_detected() {
        let mut types = TypeRegistry::new();
        types.register(TypeInfo::new("A", TypeKind::Abstract).with_parent("B")).unwrap();
        types.register(TypeInfo::new("B", TypeKind::Abstract).with_parent("A")).unwrap();
        let err = types.lineage(&TypeKey::new("A")).unwrap_err();
        assert!(matches!(err, TypeRegistryError::Cycle(_)));
    }

    #[test]
    fn test_conflicting_registration() {
        let mut types = registry();
        assert!(types.register(TypeInfo::new("Weapon", TypeKind::Archetype)).is_ok());
        let err = types
            .register(TypeInfo::new("Weapon", TypeKind::Model))
            .unwrap_err();
        assert!(matches!(err, TypeRegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_exclusion_inherited() {
        let mut types = TypeRegistry::new();
        let flags = TypeFlags {
            exclude_descendants: true,
            ..Default::default()
        };
        types
            .register(TypeInfo::new("Hidden", TypeKind::Archetype).with_flags(flags))
            .unwrap();
        types
            .register(TypeInfo::new("Child", TypeKind::Archetype).with_parent("Hidden"))
            .unwrap();
        assert!(types.is_excluded(&TypeKey::new("Child")));
        assert!(!types.is_excluded(&TypeKey::new("Other")));
    }

    #[test]
    fn test_deferral_inherited() {
        let mut types = TypeRegistry::new();
        let flags = TypeFlags {
            deferred: true,
            ..Default::default()
        };
        types
            .register(TypeInfo::new("Later", TypeKind::Archetype).with_flags(flags))
            .unwrap();
        types
            .register(TypeInfo::new("Sooner", TypeKind::Archetype).with_parent("Later"))
            .unwrap();
        assert!(types.is_deferred(&TypeKey::new("Sooner")));
        assert!(!types.is_excluded(&TypeKey::new("Sooner")));
        assert!(!types.is_deferred(&TypeKey::new("Other")));
    }
}

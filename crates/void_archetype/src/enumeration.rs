//! Enumerations
//!
//! Closed value sets discovered by the loader. An enumeration may extend a
//! base enumeration; splays over the base accept values of any derived
//! enumeration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use void_core::TypeKey;

use crate::declaration::EnumerationDecl;
use crate::error::{Error, Result};
use crate::universe::Scope;

/// One value of an enumeration
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumValue {
    enum_type: TypeKey,
    ordinal: u32,
    key: String,
}

impl EnumValue {
    /// The enumeration declaring this value
    pub fn enum_type(&self) -> &TypeKey {
        &self.enum_type
    }

    /// The value key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Position within the declaring enumeration
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

impl fmt::Debug for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnumValue({}::{})", self.enum_type.name(), self.key)
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.enum_type.name(), self.key)
    }
}

/// A registered enumeration
#[derive(Clone, Debug)]
pub struct Enumeration {
    type_key: TypeKey,
    base: Option<TypeKey>,
    values: Vec<EnumValue>,
}

impl Enumeration {
    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    pub fn base(&self) -> Option<&TypeKey> {
        self.base.as_ref()
    }

    /// Values declared by this enumeration, in declaration order
    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    /// Value by key
    pub fn value(&self, key: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.key == key)
    }
}

#[derive(Default)]
struct Tables {
    by_type: HashMap<TypeKey, Arc<Enumeration>>,
    order: Vec<TypeKey>,
}

/// Enumeration table for one universe
pub struct EnumerationRegistry {
    scope: Arc<Scope>,
    tables: RwLock<Tables>,
}

impl EnumerationRegistry {
    pub(crate) fn new(scope: Arc<Scope>) -> Self {
        Self {
            scope,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Register an enumeration; its base must already be registered
    pub(crate) fn initialize(&self, decl: &EnumerationDecl) -> Result<Arc<Enumeration>> {
        self.scope.ensure_unsealed()?;

        if let Some(base) = &decl.base {
            if self.try_get(base).is_none() {
                return Err(Error::dependency_not_ready(&decl.type_key, base));
            }
        }

        let mut seen = std::collections::HashSet::new();
        let mut values = Vec::with_capacity(decl.values.len());
        for (ordinal, key) in decl.values.iter().enumerate() {
            if !seen.insert(key.as_str()) {
                return Err(Error::invalid_declaration(
                    &decl.type_key,
                    format!("duplicate enumeration value '{}'", key),
                ));
            }
            values.push(EnumValue {
                enum_type: decl.type_key.clone(),
                ordinal: ordinal as u32,
                key: key.clone(),
            });
        }

        let enumeration = Arc::new(Enumeration {
            type_key: decl.type_key.clone(),
            base: decl.base.clone(),
            values,
        });

        let mut tables = self.tables.write();
        if tables.by_type.contains_key(&decl.type_key) {
            return Err(Error::DuplicateIdentity {
                key: decl.type_key.name().to_string(),
                universe: self.scope.key().name().to_string(),
            });
        }
        tables.by_type.insert(decl.type_key.clone(), enumeration.clone());
        tables.order.push(decl.type_key.clone());
        log::debug!(
            "Registered enumeration {} ({} values)",
            decl.type_key,
            enumeration.values.len()
        );
        Ok(enumeration)
    }

    /// Strict lookup
    pub fn get(&self, type_key: &TypeKey) -> Result<Arc<Enumeration>> {
        self.try_get(type_key)
            .ok_or_else(|| Error::not_found("enumeration", type_key.name()))
    }

    /// Lookup
    pub fn try_get(&self, type_key: &TypeKey) -> Option<Arc<Enumeration>> {
        self.tables.read().by_type.get(type_key).cloned()
    }

    /// Strict value lookup
    pub fn value(&self, type_key: &TypeKey, key: &str) -> Result<EnumValue> {
        let enumeration = self.get(type_key)?;
        enumeration
            .value(key)
            .cloned()
            .ok_or_else(|| Error::not_found("enumeration value", format!("{}::{}", type_key, key)))
    }

    /// Whether `type_key` is `ancestor` or extends it
    pub fn is_a(&self, type_key: &TypeKey, ancestor: &TypeKey) -> bool {
        let tables = self.tables.read();
        let mut current = tables.by_type.get(type_key);
        let mut steps = 0;
        while let Some(enumeration) = current {
            if &enumeration.type_key == ancestor {
                return true;
            }
            steps += 1;
            if steps > tables.order.len() {
                return false;
            }
            current = enumeration.base.as_ref().and_then(|b| tables.by_type.get(b));
        }
        false
    }

    /// Enumeration types from `type_key` up through its bases
    pub fn chain(&self, type_key: &TypeKey) -> Vec<TypeKey> {
        let tables = self.tables.read();
        let mut chain = Vec::new();
        let mut current = tables.by_type.get(type_key);
        while let Some(enumeration) = current {
            if chain.contains(&enumeration.type_key) {
                break;
            }
            chain.push(enumeration.type_key.clone());
            current = enumeration.base.as_ref().and_then(|b| tables.by_type.get(b));
        }
        chain
    }

    /// Values of an enumeration and of every enumeration extending it, in
    /// registration order
    pub fn values_including_derived(&self, type_key: &TypeKey) -> Vec<EnumValue> {
        let order = self.tables.read().order.clone();
        let mut values = Vec::new();
        for candidate in &order {
            if self.is_a(candidate, type_key) {
                if let Some(enumeration) = self.try_get(candidate) {
                    values.extend(enumeration.values.iter().cloned());
                }
            }
        }
        values
    }

    /// All enumerations in registration order
    pub fn all(&self) -> Vec<Arc<Enumeration>> {
        let tables = self.tables.read();
        tables
            .order
            .iter()
            .filter_map(|key| tables.by_type.get(key).cloned())
            .collect()
    }

    /// Number of enumerations
    pub fn len(&self) -> usize {
        self.tables.read().order.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tables.read().order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::Universe;

    #[test]
    fn test_base_must_exist() {
        let universe = Universe::new("enum-base");
        let derived = EnumerationDecl::new("Element", ["Void"]).base("BasicElement");
        assert!(universe
            .enumerations()
            .initialize(&derived)
            .unwrap_err()
            .is_dependency_not_ready());

        universe
            .enumerations()
            .initialize(&EnumerationDecl::new("BasicElement", ["Fire", "Ice"]))
            .unwrap();
        universe.enumerations().initialize(&derived).unwrap();

        let enums = universe.enumerations();
        assert!(enums.is_a(&TypeKey::new("Element"), &TypeKey::new("BasicElement")));
        assert!(!enums.is_a(&TypeKey::new("BasicElement"), &TypeKey::new("Element")));

        let keys: Vec<String> = enums
            .values_including_derived(&TypeKey::new("BasicElement"))
            .iter()
            .map(|v| v.key().to_string())
            .collect();
        assert_eq!(keys, ["Fire", "Ice", "Void"]);
    }

    #[test]
    fn test_value_lookup() {
        let universe = Universe::new("enum-values");
        universe
            .enumerations()
            .initialize(&EnumerationDecl::new("Rarity", ["Common", "Rare"]))
            .unwrap();

        let rare = universe
            .enumerations()
            .value(&TypeKey::new("Rarity"), "Rare")
            .unwrap();
        assert_eq!(rare.ordinal(), 1);
        assert_eq!(rare.to_string(), "Rarity::Rare");
        assert!(matches!(
            universe.enumerations().value(&TypeKey::new("Rarity"), "Epic"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_value_rejected() {
        let universe = Universe::new("enum-dup");
        let decl = EnumerationDecl::new("Rarity", ["Common", "Common"]);
        assert!(matches!(
            universe.enumerations().initialize(&decl),
            Err(Error::InvalidDeclaration { .. })
        ));
    }
}

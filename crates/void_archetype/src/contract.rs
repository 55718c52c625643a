//! Contracts between component-base type pairs
//!
//! A contract is keyed by an unordered pair of component-base types. When
//! both components are present on one owner its executor runs once, and any
//! replacement components it returns are written back to the owner.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use void_core::TypeKey;

use crate::component::Component;
use crate::error::{Error, Result};

/// Unordered pair of component-base types
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractKey {
    low: TypeKey,
    high: TypeKey,
}

impl ContractKey {
    /// Create a key; argument order does not matter
    pub fn new(a: TypeKey, b: TypeKey) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// The smaller type of the pair
    pub fn first(&self) -> &TypeKey {
        &self.low
    }

    /// The larger type of the pair
    pub fn second(&self) -> &TypeKey {
        &self.high
    }
}

impl fmt::Debug for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractKey({} <-> {})", self.low.name(), self.high.name())
    }
}

/// Replacement components produced by a contract
///
/// `first`/`second` refer to the executor's argument order, which follows
/// [`ContractKey::first`] and [`ContractKey::second`].
#[derive(Default)]
pub struct ContractOutcome {
    pub replace_first: Option<Arc<dyn Component>>,
    pub replace_second: Option<Arc<dyn Component>>,
}

impl ContractOutcome {
    /// Leave both components as they are
    pub fn unchanged() -> Self {
        Self::default()
    }
}

pub type ContractExecutor = Arc<
    dyn Fn(&(dyn Component + 'static), &(dyn Component + 'static)) -> Result<ContractOutcome>
        + Send
        + Sync,
>;

/// A registered contract
#[derive(Clone)]
pub struct Contract {
    key: ContractKey,
    executor: ContractExecutor,
}

impl Contract {
    /// The type pair
    pub fn key(&self) -> &ContractKey {
        &self.key
    }

    /// Invoke with components ordered as the key
    pub fn execute(
        &self,
        first: &(dyn Component + 'static),
        second: &(dyn Component + 'static),
    ) -> Result<ContractOutcome> {
        (self.executor)(first, second)
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract").field("key", &self.key).finish()
    }
}

/// Contract table; at most one contract per unordered pair
#[derive(Default)]
pub struct ContractRegistry {
    contracts: RwLock<HashMap<ContractKey, Contract>>,
}

impl ContractRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register an executor for an already-resolved pair of base types
    pub(crate) fn register(&self, key: ContractKey, executor: ContractExecutor) -> Result<()> {
        let mut contracts = self.contracts.write();
        if contracts.contains_key(&key) {
            return Err(Error::DuplicateContract {
                a: key.first().name().to_string(),
                b: key.second().name().to_string(),
            });
        }
        log::debug!("Registered contract {:?}", key);
        contracts.insert(key.clone(), Contract { key, executor });
        Ok(())
    }

    /// Strict lookup
    pub fn get(&self, key: &ContractKey) -> Result<Contract> {
        self.try_get(key).ok_or_else(|| Error::ContractMissing {
            a: key.first().name().to_string(),
            b: key.second().name().to_string(),
        })
    }

    /// Lookup
    pub fn try_get(&self, key: &ContractKey) -> Option<Contract> {
        self.contracts.read().get(key).cloned()
    }

    /// Contracts involving a base type
    pub fn involving(&self, base: &TypeKey) -> Vec<Contract> {
        let mut found: Vec<Contract> = self
            .contracts
            .read()
            .values()
            .filter(|c| c.key.first() == base || c.key.second() == base)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        found
    }

    /// Number of contracts
    pub fn len(&self) -> usize {
        self.contracts.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.contracts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_unordered() {
        let ab = ContractKey::new(TypeKey::new("Color"), TypeKey::new("Material"));
        let ba = ContractKey::new(TypeKey::new("Material"), TypeKey::new("Color"));
        assert_eq!(ab, ba);
        assert_eq!(ab.first().name(), "Color");
        assert_eq!(ab.second().name(), "Material");
    }

    #[test]
    fn test_one_contract_per_pair() {
        let registry = ContractRegistry::new();
        let noop: ContractExecutor = Arc::new(
            |_: &(dyn Component + 'static), _: &(dyn Component + 'static)| -> Result<ContractOutcome> {
                Ok(ContractOutcome::unchanged())
            },
        );
        let key = ContractKey::new(TypeKey::new("A"), TypeKey::new("B"));

        registry.register(key.clone(), noop.clone()).unwrap();
        let reversed = ContractKey::new(TypeKey::new("B"), TypeKey::new("A"));
        assert!(matches!(
            registry.register(reversed, noop),
            Err(Error::DuplicateContract { .. })
        ));
        assert_eq!(registry.involving(&TypeKey::new("B")).len(), 1);
    }

    #[test]
    fn test_missing_contract() {
        let registry = ContractRegistry::new();
        let key = ContractKey::new(TypeKey::new("A"), TypeKey::new("C"));
        assert!(matches!(registry.get(&key), Err(Error::ContractMissing { .. })));
        assert!(registry.try_get(&key).is_none());
    }
}

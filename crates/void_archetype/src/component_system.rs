//! Component system
//!
//! Resolves the component-base type of any declared component type, keeps
//! one factory per declared type (first registration wins), builds
//! components and runs contracts when components meet on an owner.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use void_core::{TypeKey, TypeRegistryError};

use crate::builder::Builder;
use crate::component::{Component, ComponentFactory, ComponentKey, ComponentMap, ComponentSpec};
use crate::contract::{Contract, ContractExecutor, ContractKey, ContractRegistry};
use crate::declaration::ComponentDecl;
use crate::error::{Error, Result};
use crate::params::IntoParams;
use crate::universe::Scope;

pub struct ComponentSystem {
    scope: Arc<Scope>,
    factories: RwLock<HashMap<TypeKey, Arc<ComponentFactory>>>,
    base_cache: RwLock<HashMap<TypeKey, TypeKey>>,
    contracts: ContractRegistry,
}

impl ComponentSystem {
    pub(crate) fn new(scope: Arc<Scope>) -> Self {
        Self {
            scope,
            factories: RwLock::new(HashMap::new()),
            base_cache: RwLock::new(HashMap::new()),
            contracts: ContractRegistry::new(),
        }
    }

    /// Resolve the component-base type of a declared component type
    ///
    /// The base is the declared component root in the type's lineage, or
    /// the topmost ancestor when no root is declared. Cached per type.
    pub fn resolve_base(&self, type_key: &TypeKey) -> Result<TypeKey> {
        if let Some(base) = self.base_cache.read().get(type_key) {
            return Ok(base.clone());
        }

        let base = {
            let types = self.scope.types().read();
            let lineage = types.lineage(type_key).map_err(|e| match e {
                TypeRegistryError::NotRegistered(_) => {
                    Error::not_found("component type", type_key.name())
                }
                TypeRegistryError::UnknownParent { parent, .. } => {
                    Error::dependency_not_ready(type_key, &TypeKey::new(&parent))
                }
                other => Error::from(other),
            })?;

            lineage
                .iter()
                .find(|key| types.get(key).map_or(false, |info| info.flags.component_root))
                .or_else(|| lineage.last())
                .cloned()
                .ok_or_else(|| Error::not_found("component type", type_key.name()))?
        };

        self.base_cache
            .write()
            .entry(type_key.clone())
            .or_insert_with(|| base.clone());
        Ok(base)
    }

    /// Key of a component type
    pub fn key_of(&self, type_key: &TypeKey) -> Result<ComponentKey> {
        self.resolve_base(type_key).map(ComponentKey::new)
    }

    /// Reject a component root declared below another component root
    pub(crate) fn check_root(&self, type_key: &TypeKey) -> Result<()> {
        let types = self.scope.types().read();
        let is_root = types.get(type_key).map_or(false, |info| info.flags.component_root);
        if !is_root {
            return Ok(());
        }
        for ancestor in types.ancestors(type_key)? {
            if types.get(&ancestor).map_or(false, |info| info.flags.component_root) {
                return Err(Error::invalid_declaration(
                    type_key,
                    format!("component root nested under component root '{}'", ancestor),
                ));
            }
        }
        Ok(())
    }

    /// Register a factory for a declared type
    ///
    /// Returns false when a factory already exists and `replace` is not set;
    /// the existing factory is kept.
    pub fn register_factory(
        &self,
        type_key: &TypeKey,
        factory: ComponentFactory,
        replace: bool,
    ) -> Result<bool> {
        self.scope.ensure_unsealed()?;
        let mut factories = self.factories.write();
        if factories.contains_key(type_key) && !replace {
            log::debug!("Component factory for {} already registered; keeping first", type_key);
            return Ok(false);
        }
        factories.insert(type_key.clone(), Arc::new(factory));
        Ok(true)
    }

    /// Factory for a type: its own, or the nearest ancestor's
    pub fn try_factory_for(&self, type_key: &TypeKey) -> Option<Arc<ComponentFactory>> {
        let lineage = self.scope.types().read().lineage(type_key).ok()?;
        let factories = self.factories.read();
        lineage.iter().find_map(|key| factories.get(key).cloned())
    }

    /// Strict variant of [`try_factory_for`](Self::try_factory_for)
    pub fn factory_for(&self, type_key: &TypeKey) -> Result<Arc<ComponentFactory>> {
        self.try_factory_for(type_key)
            .ok_or_else(|| Error::not_found("component factory", type_key.name()))
    }

    /// Build a component of a declared type
    pub fn make(&self, type_key: &TypeKey, params: impl IntoParams) -> Result<Arc<dyn Component>> {
        let factory = self.factory_for(type_key)?;
        let builder = Builder::new(type_key.clone()).with_params(params);
        self.build(&factory, &builder)
    }

    /// Build a component from a spec
    pub fn make_spec(&self, spec: &ComponentSpec) -> Result<Arc<dyn Component>> {
        self.make(&spec.type_key, spec.params.clone())
    }

    /// Run a factory with a prepared builder
    pub fn build(
        &self,
        factory: &ComponentFactory,
        builder: &Builder<dyn Component>,
    ) -> Result<Arc<dyn Component>> {
        factory.build(builder).map(Arc::from)
    }

    /// Attach a component to an owner
    ///
    /// A component with the same key is replaced and returned. Contracts
    /// that became applicable run before this returns.
    pub fn attach(
        &self,
        owner: &ComponentMap,
        component: Arc<dyn Component>,
    ) -> Result<Option<Arc<dyn Component>>> {
        let key = self.key_of(&component.component_type())?;
        let previous = owner.insert(key.clone(), component);
        if let Err(e) = self.execute_contracts(owner) {
            owner.restore(key, previous);
            return Err(e);
        }
        Ok(previous)
    }

    /// Register a contract between two component types
    ///
    /// Both types are reduced to their component-base types first.
    pub fn register_contract(
        &self,
        a: &TypeKey,
        b: &TypeKey,
        executor: ContractExecutor,
    ) -> Result<()> {
        self.scope.ensure_unsealed()?;
        let key = ContractKey::new(self.resolve_base(a)?, self.resolve_base(b)?);
        self.contracts.register(key, executor)
    }

    /// Strict contract lookup for two component types
    pub fn contract_for(&self, a: &TypeKey, b: &TypeKey) -> Result<Contract> {
        let key = ContractKey::new(self.resolve_base(a)?, self.resolve_base(b)?);
        self.contracts.get(&key)
    }

    /// The contract table
    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Run every applicable contract not yet executed on `owner`
    ///
    /// Returns the number of contracts executed.
    pub fn execute_contracts(&self, owner: &ComponentMap) -> Result<usize> {
        let keys = owner.keys();
        let mut executed = 0;

        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                let pair = ContractKey::new(a.base_type().clone(), b.base_type().clone());
                let Some(contract) = self.contracts.try_get(&pair) else {
                    continue;
                };
                if !owner.claim_contract(&pair) {
                    continue;
                }

                let first_key = ComponentKey::new(pair.first().clone());
                let second_key = ComponentKey::new(pair.second().clone());
                let (Some(first), Some(second)) = (owner.get(&first_key), owner.get(&second_key))
                else {
                    continue;
                };

                log::trace!("Executing contract {:?}", pair);
                let outcome = contract.execute(&*first, &*second).and_then(|outcome| {
                    self.check_replacement(&first_key, outcome.replace_first.as_ref())?;
                    self.check_replacement(&second_key, outcome.replace_second.as_ref())?;
                    Ok(outcome)
                });
                let outcome = match outcome {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        owner.release_contract(&pair);
                        return Err(e);
                    }
                };
                if let Some(replacement) = outcome.replace_first {
                    owner.insert(first_key, replacement);
                }
                if let Some(replacement) = outcome.replace_second {
                    owner.insert(second_key, replacement);
                }
                executed += 1;
            }
        }
        Ok(executed)
    }

    /// A contract replacement must keep the key of the slot it replaces
    fn check_replacement(
        &self,
        slot: &ComponentKey,
        replacement: Option<&Arc<dyn Component>>,
    ) -> Result<()> {
        let Some(replacement) = replacement else {
            return Ok(());
        };
        let key = self.key_of(&replacement.component_type())?;
        if &key != slot {
            return Err(Error::Validation {
                model: slot.name().to_string(),
                reason: format!("contract replaced it with a '{}' component", key),
            });
        }
        Ok(())
    }

    /// Register a component declaration whose type is already declared
    pub(crate) fn initialize(&self, decl: &ComponentDecl) -> Result<()> {
        self.check_root(&decl.type_key)?;

        let factory = match &decl.constructors {
            Some(constructors) => Some(
                ComponentFactory::new(decl.type_key.clone(), constructors.clone())
                    .with_stages(decl.stages.clone()),
            ),
            None if decl.has_stages() => {
                let inherited = self.inherited_factory(&decl.type_key)?;
                Some(inherited.overlay(decl.type_key.clone(), None, &decl.stages))
            }
            None => None,
        };

        // Contract keys only need the type graph; check them before any write.
        let mut contract_keys = Vec::with_capacity(decl.contracts.len());
        for (other, _) in &decl.contracts {
            let key = ContractKey::new(self.resolve_base(&decl.type_key)?, self.resolve_base(other)?);
            if self.contracts.try_get(&key).is_some() {
                return Err(Error::DuplicateContract {
                    a: key.first().name().to_string(),
                    b: key.second().name().to_string(),
                });
            }
            contract_keys.push(key);
        }

        if let Some(factory) = factory {
            self.register_factory(&decl.type_key, factory, decl.override_factory)?;
        }
        for (key, (_, executor)) in contract_keys.into_iter().zip(&decl.contracts) {
            self.scope.ensure_unsealed()?;
            self.contracts.register(key, executor.clone())?;
        }
        Ok(())
    }

    fn inherited_factory(&self, type_key: &TypeKey) -> Result<Arc<ComponentFactory>> {
        let ancestors = self.scope.types().read().ancestors(type_key)?;
        let factories = self.factories.read();
        ancestors
            .iter()
            .find_map(|key| factories.get(key).cloned())
            .ok_or_else(|| match ancestors.first() {
                Some(parent) => Error::dependency_not_ready(type_key, parent),
                None => Error::invalid_declaration(type_key, "stages declared without any constructor"),
            })
    }

    /// Number of registered factories
    pub fn factory_count(&self) -> usize {
        self.factories.read().len()
    }
}

impl fmt::Debug for ComponentSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSystem")
            .field("factories", &self.factories.read().len())
            .field("contracts", &self.contracts.len())
            .finish()
    }
}

//! Universes
//!
//! A universe is one isolated object-model world: declared types,
//! archetypes, model families, components, enumerations and extra contexts.
//! The first universe created in a process becomes the default.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{RwLock, RwLockReadGuard};
use void_core::{NamedId, TypeInfo, TypeRegistry};

use crate::archetype::Archetype;
use crate::component_system::ComponentSystem;
use crate::context::ExtraContexts;
use crate::declaration::{AbstractDecl, ArchetypeDecl, ComponentDecl, EnumerationDecl, ModelDecl};
use crate::enumeration::{Enumeration, EnumerationRegistry};
use crate::error::{Error, Result};
use crate::identity::ArchetypeRegistry;
use crate::model::{ModelFamily, ModelRegistry};
use crate::splay::{self, SplayMode, SplayTable};

/// State shared by every registry of one universe
pub(crate) struct Scope {
    key: NamedId,
    sealed: AtomicBool,
    types: RwLock<TypeRegistry>,
}

impl Scope {
    fn new(key: &str) -> Self {
        Self {
            key: NamedId::new(key),
            sealed: AtomicBool::new(false),
            types: RwLock::new(TypeRegistry::new()),
        }
    }

    pub(crate) fn key(&self) -> &NamedId {
        &self.key
    }

    pub(crate) fn types(&self) -> &RwLock<TypeRegistry> {
        &self.types
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_unsealed(&self) -> Result<()> {
        if self.is_sealed() {
            return Err(Error::SealedUniverse {
                universe: self.key.name().to_string(),
            });
        }
        Ok(())
    }
}

static DEFAULT_UNIVERSE: OnceLock<Arc<Universe>> = OnceLock::new();

/// An isolated registry scope
pub struct Universe {
    scope: Arc<Scope>,
    this: Weak<Universe>,
    archetypes: ArchetypeRegistry,
    models: ModelRegistry,
    components: ComponentSystem,
    enumerations: EnumerationRegistry,
    splays: SplayTable,
    contexts: ExtraContexts,
}

impl Universe {
    /// Create a universe; the first one created becomes the process default
    pub fn new(key: &str) -> Arc<Self> {
        let scope = Arc::new(Scope::new(key));
        let universe = Arc::new_cyclic(|this: &Weak<Universe>| Universe {
            scope: scope.clone(),
            this: this.clone(),
            archetypes: ArchetypeRegistry::new(scope.clone()),
            models: ModelRegistry::new(scope.clone(), this.clone()),
            components: ComponentSystem::new(scope.clone()),
            enumerations: EnumerationRegistry::new(scope.clone()),
            splays: SplayTable::new(),
            contexts: ExtraContexts::new(scope.clone()),
        });

        if DEFAULT_UNIVERSE.set(universe.clone()).is_ok() {
            log::info!("Universe '{}' is the process default", key);
        } else {
            log::debug!("Created universe '{}'", key);
        }
        universe
    }

    /// The process default universe, if any was created
    pub fn default_universe() -> Option<Arc<Universe>> {
        DEFAULT_UNIVERSE.get().cloned()
    }

    /// The process default universe, failing if none was created
    pub fn get_default() -> Result<Arc<Universe>> {
        Self::default_universe().ok_or_else(|| Error::not_found("universe", "default"))
    }

    /// The universe key
    pub fn key(&self) -> &NamedId {
        self.scope.key()
    }

    pub fn is_sealed(&self) -> bool {
        self.scope.is_sealed()
    }

    /// Make all registries read-only
    pub(crate) fn seal(&self) {
        self.scope.sealed.store(true, Ordering::Release);
        log::info!("Universe '{}' sealed", self.key());
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.scope
    }

    pub(crate) fn weak(&self) -> Weak<Universe> {
        self.this.clone()
    }

    /// Shared handle to this universe
    pub fn handle(&self) -> Option<Arc<Universe>> {
        self.this.upgrade()
    }

    /// Declared type graph
    pub fn types(&self) -> RwLockReadGuard<'_, TypeRegistry> {
        self.scope.types.read()
    }

    pub fn archetypes(&self) -> &ArchetypeRegistry {
        &self.archetypes
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn components(&self) -> &ComponentSystem {
        &self.components
    }

    pub fn enumerations(&self) -> &EnumerationRegistry {
        &self.enumerations
    }

    pub fn splays(&self) -> &SplayTable {
        &self.splays
    }

    pub fn contexts(&self) -> &ExtraContexts {
        &self.contexts
    }

    /// Strict archetype lookup by identity key
    pub fn get(&self, key: &str) -> Result<Arc<Archetype>> {
        self.archetypes.get(key)
    }

    /// Archetype lookup by identity key
    pub fn try_get(&self, key: &str) -> Option<Arc<Archetype>> {
        self.archetypes.try_get(key)
    }

    /// Store an extra context value
    pub fn set_context<T: Any + Send + Sync>(&self, value: T) -> Result<()> {
        self.contexts.set(value)
    }

    /// Strict extra context lookup
    pub fn get_context<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.contexts.get::<T>()
    }

    /// Extra context lookup
    pub fn try_get_context<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.contexts.try_get::<T>()
    }

    pub fn has_context<T: Any + Send + Sync>(&self) -> bool {
        self.contexts.contains::<T>()
    }

    /// Add a type to the declared type graph
    pub fn declare_type(&self, info: TypeInfo) -> Result<()> {
        self.scope.ensure_unsealed()?;
        self.scope.types.write().register(info)?;
        Ok(())
    }

    /// Declare an intermediate type
    pub fn declare_abstract(&self, decl: AbstractDecl) -> Result<()> {
        self.declare_type(decl.type_info())
    }

    /// Declare and register a component type
    pub fn declare_component(&self, decl: ComponentDecl) -> Result<()> {
        self.declare_type(decl.type_info())?;
        self.initialize_component(&decl)
    }

    /// Declare and register an enumeration
    pub fn declare_enumeration(&self, decl: EnumerationDecl) -> Result<Arc<Enumeration>> {
        self.declare_type(decl.type_info())?;
        self.initialize_enumeration(&decl)
    }

    /// Declare and register a model family
    pub fn declare_model(&self, decl: ModelDecl) -> Result<Arc<ModelFamily>> {
        self.declare_type(decl.type_info())?;
        self.initialize_model(&decl)
    }

    /// Declare and register an archetype
    pub fn declare_archetype(&self, decl: ArchetypeDecl) -> Result<Arc<Archetype>> {
        self.declare_type(decl.type_info())?;
        self.initialize_archetype(&decl)
    }

    pub(crate) fn initialize_component(&self, decl: &ComponentDecl) -> Result<()> {
        self.scope.ensure_unsealed()?;
        self.components.initialize(decl)
    }

    pub(crate) fn initialize_model(&self, decl: &ModelDecl) -> Result<Arc<ModelFamily>> {
        self.models.initialize(decl)
    }

    /// Register an enumeration and expand eager splays over it
    pub(crate) fn initialize_enumeration(&self, decl: &EnumerationDecl) -> Result<Arc<Enumeration>> {
        let enumeration = self.enumerations.initialize(decl)?;

        for governing in self.enumerations.chain(enumeration.type_key()) {
            for archetype in self.splays.governed_by(&governing) {
                if archetype.splay().map(|s| s.mode()) != Some(SplayMode::Eager) {
                    continue;
                }
                if let Err(e) = splay::expand(self, &archetype, enumeration.values()) {
                    log::warn!(
                        "Splay of {} over {} failed: {}",
                        archetype.identity(),
                        enumeration.type_key(),
                        e
                    );
                }
            }
        }
        Ok(enumeration)
    }

    /// Register an archetype and expand it if it is an eager splay
    pub(crate) fn initialize_archetype(&self, decl: &ArchetypeDecl) -> Result<Arc<Archetype>> {
        self.scope.ensure_unsealed()?;
        let archetype = Archetype::assemble(self, decl, None)?;
        self.archetypes.register(archetype.clone())?;

        if let Some(splay) = archetype.splay() {
            self.splays.record(archetype.clone());
            if splay.mode() == SplayMode::Eager {
                let values = self.enumerations.values_including_derived(splay.enumeration());
                if let Err(e) = splay::expand(self, &archetype, &values) {
                    self.withdraw(&archetype);
                    return Err(match e {
                        Error::DependencyNotReady { dependency, .. } => Error::DependencyNotReady {
                            item: decl.type_key.name().to_string(),
                            dependency,
                        },
                        other => Error::invalid_declaration(
                            &decl.type_key,
                            format!("splay expansion failed: {}", other),
                        ),
                    });
                }
            }
        }
        Ok(archetype)
    }

    /// Take back an archetype whose eager splay did not complete, with the
    /// children it already produced
    fn withdraw(&self, archetype: &Arc<Archetype>) {
        for child in archetype.splayed() {
            self.archetypes.remove(&child);
        }
        self.archetypes.remove(archetype);
        self.splays.forget(archetype);
    }

    /// Expand every eager splay over all values known now
    ///
    /// Picks up values of enumerations derived after the splay was
    /// registered whose expansion failed at the time.
    pub(crate) fn complete_eager_splays(&self) -> Vec<(Arc<Archetype>, Error)> {
        let mut failures = Vec::new();
        for archetype in self.splays.eager() {
            let Some(splay) = archetype.splay() else {
                continue;
            };
            let values = self.enumerations.values_including_derived(splay.enumeration());
            if let Err(e) = splay::expand(self, &archetype, &values) {
                failures.push((archetype, e));
            }
        }
        failures
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Universe")
            .field("key", self.key())
            .field("sealed", &self.is_sealed())
            .field("types", &self.types().len())
            .field("archetypes", &self.archetypes.len())
            .field("models", &self.models.len())
            .field("enumerations", &self.enumerations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use void_core::TypeKind;

    #[test]
    fn test_default_universe_is_first_created() {
        let universe = Universe::new("default-check");
        let default = Universe::get_default().unwrap();
        // Another test may have created the first universe.
        assert!(Universe::default_universe().is_some());
        assert!(Arc::ptr_eq(&default, &Universe::get_default().unwrap()));
        assert_eq!(universe.key().name(), "default-check");
    }

    #[test]
    fn test_seal_blocks_declarations() {
        let universe = Universe::new("seal-check");
        universe.declare_type(TypeInfo::new("Open", TypeKind::Abstract)).unwrap();
        universe.seal();
        assert!(universe.is_sealed());
        assert!(matches!(
            universe.declare_type(TypeInfo::new("Closed", TypeKind::Abstract)),
            Err(Error::SealedUniverse { .. })
        ));
        assert!(universe.types().contains(&"Open".into()));
    }
}

//! Models and model families
//!
//! A model is an instance produced by an archetype or a standalone model
//! family. It may carry a component map and, when its family opts into
//! uniqueness, a globally unique id registered in the process-wide cache.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use void_core::{TypeKey, TypeKind, TypeRegistryError};

use crate::builder::Builder;
use crate::component::{ComponentMap, ComponentSpec};
use crate::declaration::ModelDecl;
use crate::error::{Error, Result};
use crate::factory::{Constructors, Factory, Upcast};
use crate::params::IntoParams;
use crate::unique::{unique_cache, UniqueId};
use crate::universe::{Scope, Universe};

/// An instance produced by an archetype or a model family
pub trait Model: Any + Send + Sync + fmt::Debug {
    /// Components attached to this model, if it can hold any
    fn components(&self) -> Option<&ComponentMap> {
        None
    }

    /// Unique id, for models of a unique family
    fn unique_id(&self) -> Option<&UniqueId> {
        None
    }

    /// Store a generated unique id; false if the model has no id field
    fn assign_unique_id(&mut self, _id: UniqueId) -> bool {
        false
    }

    /// Get as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get as mutable Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Model {
    /// Downcast to a concrete model
    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    /// Downcast to a concrete model mutably
    pub fn downcast_mut<M: Model>(&mut self) -> Option<&mut M> {
        self.as_any_mut().downcast_mut::<M>()
    }

    /// Check the concrete type
    pub fn is<M: Model>(&self) -> bool {
        self.as_any().is::<M>()
    }
}

impl<M: Model> Upcast<M> for dyn Model {
    fn upcast(value: M) -> Box<Self> {
        Box::new(value)
    }
}

/// Implement [`Model`] for a struct
///
/// `components: field` names a [`ComponentMap`] field, `unique: field` an
/// `Option<UniqueId>` field.
#[macro_export]
macro_rules! impl_model {
    (@any) => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
    (@components $field:ident) => {
        fn components(&self) -> Option<&$crate::component::ComponentMap> {
            Some(&self.$field)
        }
    };
    (@unique $field:ident) => {
        fn unique_id(&self) -> Option<&$crate::unique::UniqueId> {
            self.$field.as_ref()
        }

        fn assign_unique_id(&mut self, id: $crate::unique::UniqueId) -> bool {
            self.$field = Some(id);
            true
        }
    };
    ($ty:ty) => {
        impl $crate::model::Model for $ty {
            $crate::impl_model!(@any);
        }
    };
    ($ty:ty, components: $c:ident) => {
        impl $crate::model::Model for $ty {
            $crate::impl_model!(@components $c);
            $crate::impl_model!(@any);
        }
    };
    ($ty:ty, unique: $u:ident) => {
        impl $crate::model::Model for $ty {
            $crate::impl_model!(@unique $u);
            $crate::impl_model!(@any);
        }
    };
    ($ty:ty, components: $c:ident, unique: $u:ident) => {
        impl $crate::model::Model for $ty {
            $crate::impl_model!(@components $c);
            $crate::impl_model!(@unique $u);
            $crate::impl_model!(@any);
        }
    };
}

pub type ModelBuilder = Builder<dyn Model>;
pub type ModelFactory = Factory<dyn Model>;

/// Serialization boundary for external codecs
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelSchema {
    pub model_type: String,
    pub parent: Option<String>,
    pub components: Vec<String>,
    pub unique_id_field: Option<String>,
}

/// Run a model pipeline: build, attach components, assign a unique id
pub(crate) fn produce(
    universe: &Universe,
    factory: &ModelFactory,
    builder: &ModelBuilder,
    components: &[ComponentSpec],
    unique: bool,
) -> Result<Arc<dyn Model>> {
    let mut model = factory.build_with(builder, |builder, model| {
        if components.is_empty() {
            return Ok(());
        }
        let Some(map) = model.components() else {
            return Err(Error::Validation {
                model: builder.target().name().to_string(),
                reason: "declares components but cannot hold any".to_string(),
            });
        };
        let system = universe.components();
        for spec in components {
            system.attach(map, system.make_spec(spec)?)?;
        }
        Ok(())
    })?;

    if unique && model.unique_id().is_none() && !model.assign_unique_id(UniqueId::generate()) {
        return Err(Error::Validation {
            model: builder.target().name().to_string(),
            reason: "unique model type has no id field".to_string(),
        });
    }

    let model: Arc<dyn Model> = Arc::from(model);
    if unique {
        if let Some(id) = model.unique_id() {
            unique_cache().register(id.clone(), model.clone())?;
        }
    }
    Ok(model)
}

/// A standalone model family
pub struct ModelFamily {
    type_key: TypeKey,
    parent: Option<TypeKey>,
    factory: ModelFactory,
    components: Vec<ComponentSpec>,
    unique_field: Option<String>,
    default_builder: OnceLock<ModelBuilder>,
    universe: Weak<Universe>,
}

impl ModelFamily {
    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    /// Nearest registered ancestor family
    pub fn parent(&self) -> Option<&TypeKey> {
        self.parent.as_ref()
    }

    pub fn factory(&self) -> &ModelFactory {
        &self.factory
    }

    /// Components every model of this family carries
    pub fn components(&self) -> &[ComponentSpec] {
        &self.components
    }

    pub fn unique_field(&self) -> Option<&str> {
        self.unique_field.as_deref()
    }

    pub fn is_unique(&self) -> bool {
        self.unique_field.is_some()
    }

    /// Fresh builder for this family
    pub fn builder(&self) -> ModelBuilder {
        self.factory.builder()
    }

    /// Build with the cached default builder
    pub fn make(&self) -> Result<Arc<dyn Model>> {
        let builder = self.default_builder.get_or_init(|| self.factory.builder());
        self.build(builder)
    }

    /// Build with parameters
    pub fn make_with(&self, params: impl IntoParams) -> Result<Arc<dyn Model>> {
        self.build(&self.builder().with_params(params))
    }

    /// Build with a prepared builder
    pub fn build(&self, builder: &ModelBuilder) -> Result<Arc<dyn Model>> {
        let universe = self
            .universe
            .upgrade()
            .ok_or_else(|| Error::not_found("universe", self.type_key.name()))?;
        produce(&universe, &self.factory, builder, &self.components, self.is_unique())
    }

    /// Schema exposed to external codecs
    pub fn schema(&self) -> Result<ModelSchema> {
        let universe = self
            .universe
            .upgrade()
            .ok_or_else(|| Error::not_found("universe", self.type_key.name()))?;
        let mut components = Vec::with_capacity(self.components.len());
        for spec in &self.components {
            let key = universe.components().key_of(&spec.type_key)?;
            if !components.iter().any(|k: &String| k == key.name()) {
                components.push(key.name().to_string());
            }
        }
        Ok(ModelSchema {
            model_type: self.type_key.name().to_string(),
            parent: self.parent.as_ref().map(|p| p.name().to_string()),
            components,
            unique_id_field: self.unique_field.clone(),
        })
    }
}

impl fmt::Debug for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFamily")
            .field("type_key", &self.type_key)
            .field("parent", &self.parent)
            .field("components", &self.components.len())
            .field("unique_field", &self.unique_field)
            .finish()
    }
}

#[derive(Default)]
struct Tables {
    by_type: HashMap<TypeKey, Arc<ModelFamily>>,
    order: Vec<TypeKey>,
}

/// Model family table for one universe
pub struct ModelRegistry {
    scope: Arc<Scope>,
    universe: Weak<Universe>,
    tables: RwLock<Tables>,
}

impl ModelRegistry {
    pub(crate) fn new(scope: Arc<Scope>, universe: Weak<Universe>) -> Self {
        Self {
            scope,
            universe,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Nearest declared model ancestor that is registered
    ///
    /// A model ancestor that is declared but not registered yet is not
    /// ready; abstract ancestors are skipped.
    fn resolve_parent(&self, type_key: &TypeKey) -> Result<Option<Arc<ModelFamily>>> {
        let types = self.scope.types().read();
        let ancestors = types.ancestors(type_key).map_err(|e| match e {
            TypeRegistryError::UnknownParent { parent, .. } => {
                Error::dependency_not_ready(type_key, &TypeKey::new(&parent))
            }
            other => Error::from(other),
        })?;
        for ancestor in ancestors {
            if let Some(family) = self.try_get(&ancestor) {
                return Ok(Some(family));
            }
            if types.get(&ancestor).map(|info| info.kind) == Some(TypeKind::Model) {
                return Err(Error::dependency_not_ready(type_key, &ancestor));
            }
        }
        Ok(None)
    }

    /// Register a model family whose type is already declared
    pub(crate) fn initialize(&self, decl: &ModelDecl) -> Result<Arc<ModelFamily>> {
        self.scope.ensure_unsealed()?;
        let parent = self.resolve_parent(&decl.type_key)?;

        let factory = match &parent {
            Some(parent) => {
                parent
                    .factory
                    .overlay(decl.type_key.clone(), decl.constructors.as_ref(), &decl.stages)
            }
            None => Factory::new(
                decl.type_key.clone(),
                decl.constructors.clone().unwrap_or_else(Constructors::none),
            )
            .with_stages(decl.stages.clone()),
        };

        let mut components = parent
            .as_ref()
            .map(|p| p.components.clone())
            .unwrap_or_default();
        components.extend(decl.components.iter().cloned());

        let unique_field = decl
            .unique_field
            .clone()
            .or_else(|| parent.as_ref().and_then(|p| p.unique_field.clone()));

        let family = Arc::new(ModelFamily {
            type_key: decl.type_key.clone(),
            parent: parent.as_ref().map(|p| p.type_key.clone()),
            factory,
            components,
            unique_field,
            default_builder: OnceLock::new(),
            universe: self.universe.clone(),
        });

        let mut tables = self.tables.write();
        if tables.by_type.contains_key(&decl.type_key) {
            return Err(Error::DuplicateIdentity {
                key: decl.type_key.name().to_string(),
                universe: self.scope.key().name().to_string(),
            });
        }
        tables.by_type.insert(decl.type_key.clone(), family.clone());
        tables.order.push(decl.type_key.clone());
        log::debug!("Registered model family {}", decl.type_key);
        Ok(family)
    }

    /// Strict lookup
    pub fn get(&self, type_key: &TypeKey) -> Result<Arc<ModelFamily>> {
        self.try_get(type_key)
            .ok_or_else(|| Error::not_found("model type", type_key.name()))
    }

    /// Lookup
    pub fn try_get(&self, type_key: &TypeKey) -> Option<Arc<ModelFamily>> {
        self.tables.read().by_type.get(type_key).cloned()
    }

    /// Build a model of a registered family
    pub fn make(&self, type_key: &TypeKey, params: impl IntoParams) -> Result<Arc<dyn Model>> {
        self.get(type_key)?.make_with(params)
    }

    /// Schema of a registered family
    pub fn schema(&self, type_key: &TypeKey) -> Result<ModelSchema> {
        self.get(type_key)?.schema()
    }

    /// All families in registration order
    pub fn all(&self) -> Vec<Arc<ModelFamily>> {
        let tables = self.tables.read();
        tables
            .order
            .iter()
            .filter_map(|key| tables.by_type.get(key).cloned())
            .collect()
    }

    /// Number of families
    pub fn len(&self) -> usize {
        self.tables.read().order.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tables.read().order.is_empty()
    }
}

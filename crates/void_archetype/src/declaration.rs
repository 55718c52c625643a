//! Declarations
//!
//! Each participating type is described by an explicit descriptor rather
//! than discovered from compiled metadata. Descriptors are produced by
//! declaration sources and consumed by the loader, or handed directly to a
//! universe's `declare_*` methods.

use std::sync::Arc;

use serde_json::Value;
use void_core::{TypeFlags, TypeInfo, TypeKey, TypeKind};

use crate::archetype::{Archetype, FinishHook};
use crate::builder::Builder;
use crate::component::{Component, ComponentSpec};
use crate::contract::{ContractExecutor, ContractOutcome};
use crate::enumeration::EnumValue;
use crate::error::Result;
use crate::factory::{Constructors, Stages};
use crate::model::Model;
use crate::params::{IntoParams, Params};
use crate::splay::{SplayConstructor, SplayMode};

/// Loader behaviour attached to a declaration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadFlags {
    /// Declared but not built during the initial load; descendants are
    /// left out with it
    pub skip_initial_load: bool,
    /// Neither this type nor its descendants are built
    pub exclude_descendants: bool,
    /// Not exercised by the test-build pass
    pub skip_test_build: bool,
}

impl LoadFlags {
    /// Flags for a type that is only declared
    pub fn deferred() -> Self {
        Self {
            skip_initial_load: true,
            ..Default::default()
        }
    }

    /// Flags excluding a whole subtree
    pub fn excluded() -> Self {
        Self {
            exclude_descendants: true,
            ..Default::default()
        }
    }
}

fn type_info(key: &TypeKey, parent: Option<&TypeKey>, kind: TypeKind, flags: TypeFlags) -> TypeInfo {
    let info = TypeInfo::new(key.clone(), kind).with_flags(flags);
    match parent {
        Some(parent) => info.with_parent(parent.clone()),
        None => info,
    }
}

/// An intermediate type with no registry entry of its own
#[derive(Clone, Debug)]
pub struct AbstractDecl {
    pub type_key: TypeKey,
    pub parent: Option<TypeKey>,
    pub flags: LoadFlags,
}

impl AbstractDecl {
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            parent: None,
            flags: LoadFlags::default(),
        }
    }

    pub fn parent(mut self, parent: impl Into<TypeKey>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn flags(mut self, flags: LoadFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn type_info(&self) -> TypeInfo {
        let flags = TypeFlags {
            exclude_descendants: self.flags.exclude_descendants,
            deferred: self.flags.skip_initial_load,
            ..Default::default()
        };
        type_info(&self.type_key, self.parent.as_ref(), TypeKind::Abstract, flags)
    }
}

/// A component type
#[derive(Clone)]
pub struct ComponentDecl {
    pub type_key: TypeKey,
    pub parent: Option<TypeKey>,
    pub root: bool,
    pub constructors: Option<Constructors<dyn Component>>,
    pub stages: Stages<dyn Component>,
    pub override_factory: bool,
    pub contracts: Vec<(TypeKey, ContractExecutor)>,
    pub flags: LoadFlags,
}

impl ComponentDecl {
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            parent: None,
            root: false,
            constructors: None,
            stages: Stages::default(),
            override_factory: false,
            contracts: Vec::new(),
            flags: LoadFlags::default(),
        }
    }

    pub fn parent(mut self, parent: impl Into<TypeKey>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Mark as a component root; components below share its key
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    pub fn constructors(mut self, constructors: Constructors<dyn Component>) -> Self {
        self.constructors = Some(constructors);
        self
    }

    /// Replace a factory registered earlier for this type
    pub fn override_factory(mut self) -> Self {
        self.override_factory = true;
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<dyn Component>, &(dyn Component + 'static)) -> std::result::Result<(), String>
            + Send
            + Sync
            + 'static,
    {
        self.stages.validators.push(Arc::new(f));
        self
    }

    /// Declare a contract with another component type
    pub fn contract<F>(mut self, other: impl Into<TypeKey>, f: F) -> Self
    where
        F: Fn(&(dyn Component + 'static), &(dyn Component + 'static)) -> Result<ContractOutcome>
            + Send
            + Sync
            + 'static,
    {
        self.contracts.push((other.into(), Arc::new(f)));
        self
    }

    pub fn flags(mut self, flags: LoadFlags) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn has_stages(&self) -> bool {
        self.stages.configure.is_some()
            || self.stages.finalize.is_some()
            || !self.stages.validators.is_empty()
    }

    pub fn type_info(&self) -> TypeInfo {
        let flags = TypeFlags {
            component_root: self.root,
            exclude_descendants: self.flags.exclude_descendants,
            deferred: self.flags.skip_initial_load,
        };
        type_info(&self.type_key, self.parent.as_ref(), TypeKind::Component, flags)
    }
}

/// An enumeration type and its values
#[derive(Clone, Debug)]
pub struct EnumerationDecl {
    pub type_key: TypeKey,
    pub base: Option<TypeKey>,
    pub values: Vec<String>,
    pub flags: LoadFlags,
}

impl EnumerationDecl {
    pub fn new<I, S>(type_key: impl Into<TypeKey>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_key: type_key.into(),
            base: None,
            values: values.into_iter().map(Into::into).collect(),
            flags: LoadFlags::default(),
        }
    }

    /// Extend a base enumeration
    pub fn base(mut self, base: impl Into<TypeKey>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn flags(mut self, flags: LoadFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn type_info(&self) -> TypeInfo {
        let flags = TypeFlags {
            exclude_descendants: self.flags.exclude_descendants,
            deferred: self.flags.skip_initial_load,
            ..Default::default()
        };
        type_info(&self.type_key, self.base.as_ref(), TypeKind::Enumeration, flags)
    }
}

/// A standalone model family
#[derive(Clone)]
pub struct ModelDecl {
    pub type_key: TypeKey,
    pub parent: Option<TypeKey>,
    pub constructors: Option<Constructors<dyn Model>>,
    pub stages: Stages<dyn Model>,
    pub components: Vec<ComponentSpec>,
    pub unique_field: Option<String>,
    pub flags: LoadFlags,
}

impl ModelDecl {
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            parent: None,
            constructors: None,
            stages: Stages::default(),
            components: Vec::new(),
            unique_field: None,
            flags: LoadFlags::default(),
        }
    }

    pub fn parent(mut self, parent: impl Into<TypeKey>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn constructors(mut self, constructors: Constructors<dyn Model>) -> Self {
        self.constructors = Some(constructors);
        self
    }

    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<dyn Model>, &mut (dyn Model + 'static)) -> Result<Option<Box<dyn Model>>>
            + Send
            + Sync
            + 'static,
    {
        self.stages.configure = Some(Arc::new(f));
        self
    }

    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<dyn Model>, Box<dyn Model>) -> Result<Box<dyn Model>> + Send + Sync + 'static,
    {
        self.stages.finalize = Some(Arc::new(f));
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<dyn Model>, &(dyn Model + 'static)) -> std::result::Result<(), String>
            + Send
            + Sync
            + 'static,
    {
        self.stages.validators.push(Arc::new(f));
        self
    }

    /// Declare a component every model of this family carries
    pub fn component(mut self, spec: impl Into<ComponentSpec>) -> Self {
        self.components.push(spec.into());
        self
    }

    /// Opt into the process-wide unique cache; `field` names the id field
    /// for external codecs
    pub fn unique(mut self, field: impl Into<String>) -> Self {
        self.unique_field = Some(field.into());
        self
    }

    pub fn flags(mut self, flags: LoadFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn type_info(&self) -> TypeInfo {
        let flags = TypeFlags {
            exclude_descendants: self.flags.exclude_descendants,
            deferred: self.flags.skip_initial_load,
            ..Default::default()
        };
        type_info(&self.type_key, self.parent.as_ref(), TypeKind::Model, flags)
    }
}

/// One-archetype-per-enumeration-value declaration
#[derive(Clone)]
pub struct SplayDecl {
    pub enumeration: TypeKey,
    pub mode: SplayMode,
    pub constructor: Option<SplayConstructor>,
}

impl SplayDecl {
    pub fn new(enumeration: impl Into<TypeKey>, mode: SplayMode) -> Self {
        Self {
            enumeration: enumeration.into(),
            mode,
            constructor: None,
        }
    }

    /// Custom per-value archetype declaration
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Archetype, &EnumValue) -> Result<ArchetypeDecl> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(f));
        self
    }
}

/// An archetype singleton
#[derive(Clone)]
pub struct ArchetypeDecl {
    pub type_key: TypeKey,
    pub key: Option<String>,
    pub parent: Option<TypeKey>,
    pub model_type: Option<TypeKey>,
    pub constructors: Option<Constructors<dyn Model>>,
    pub stages: Stages<dyn Model>,
    pub components: Vec<ComponentSpec>,
    pub model_components: Vec<ComponentSpec>,
    pub defaults: Params,
    pub test_params: Params,
    pub splay: Option<SplayDecl>,
    pub finish: Option<FinishHook>,
    pub flags: LoadFlags,
}

impl ArchetypeDecl {
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            key: None,
            parent: None,
            model_type: None,
            constructors: None,
            stages: Stages::default(),
            components: Vec::new(),
            model_components: Vec::new(),
            defaults: Params::new(),
            test_params: Params::new(),
            splay: None,
            finish: None,
            flags: LoadFlags::default(),
        }
    }

    /// Identity key; defaults to the type name
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<TypeKey>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Produce a different model family than the base archetype
    pub fn model(mut self, model_type: impl Into<TypeKey>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    pub fn constructors(mut self, constructors: Constructors<dyn Model>) -> Self {
        self.constructors = Some(constructors);
        self
    }

    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<dyn Model>, &mut (dyn Model + 'static)) -> Result<Option<Box<dyn Model>>>
            + Send
            + Sync
            + 'static,
    {
        self.stages.configure = Some(Arc::new(f));
        self
    }

    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<dyn Model>, Box<dyn Model>) -> Result<Box<dyn Model>> + Send + Sync + 'static,
    {
        self.stages.finalize = Some(Arc::new(f));
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<dyn Model>, &(dyn Model + 'static)) -> std::result::Result<(), String>
            + Send
            + Sync
            + 'static,
    {
        self.stages.validators.push(Arc::new(f));
        self
    }

    /// Attach a component to the archetype itself
    pub fn component(mut self, spec: impl Into<ComponentSpec>) -> Self {
        self.components.push(spec.into());
        self
    }

    /// Attach a component to every model this archetype makes
    pub fn model_component(mut self, spec: impl Into<ComponentSpec>) -> Self {
        self.model_components.push(spec.into());
        self
    }

    /// Parameter default for every build
    pub fn default_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.set(key, value);
        self
    }

    /// Extra parameters for the test-build pass
    pub fn test_params(mut self, params: impl IntoParams) -> Self {
        self.test_params.merge(params.into_params());
        self
    }

    pub fn splay(mut self, splay: SplayDecl) -> Self {
        self.splay = Some(splay);
        self
    }

    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&Archetype) -> Result<()> + Send + Sync + 'static,
    {
        self.finish = Some(Arc::new(f));
        self
    }

    pub fn flags(mut self, flags: LoadFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The identity key this declaration registers under
    pub fn identity_key(&self) -> &str {
        self.key.as_deref().unwrap_or_else(|| self.type_key.name())
    }

    pub fn type_info(&self) -> TypeInfo {
        let flags = TypeFlags {
            exclude_descendants: self.flags.exclude_descendants,
            deferred: self.flags.skip_initial_load,
            ..Default::default()
        };
        type_info(&self.type_key, self.parent.as_ref(), TypeKind::Archetype, flags)
    }
}

impl From<&str> for ComponentSpec {
    fn from(type_key: &str) -> Self {
        ComponentSpec::new(type_key)
    }
}

impl From<TypeKey> for ComponentSpec {
    fn from(type_key: TypeKey) -> Self {
        ComponentSpec::new(type_key)
    }
}

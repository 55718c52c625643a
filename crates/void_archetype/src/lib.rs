//! # void_archetype - Archetype Object Model
//!
//! Runtime object model built on declared types:
//! - **Universes**: isolated registries, sealed once loading finishes
//! - **Archetypes**: singleton factories linked by a base chain
//! - **Builders/Factories**: `initialize -> configure -> finalize` over a
//!   parameter bag, with an ordered choice of constructor
//! - **Components**: one per component-base key per owner, with contracts
//!   between component pairs
//! - **Splay**: one sub-archetype per enumeration value
//! - **Loader**: ordered sources, retry passes to a fixpoint, test builds
//!
//! ```ignore
//! use void_archetype::prelude::*;
//!
//! let universe = Universe::new("main");
//! let mut loader = Loader::new(universe.clone());
//! loader.add_source(
//!     StaticSource::new("core")
//!         .model(ModelDecl::new("Blade").constructors(Constructors::default_of::<Blade>()))
//!         .archetype(ArchetypeDecl::new("Weapon").model("Blade"))
//!         .archetype(ArchetypeDecl::new("Sword").parent("Weapon")),
//! );
//! loader.load()?;
//!
//! let sword = universe.get("Sword")?.make_with([("damage", 5)])?;
//! ```

pub mod archetype;
pub mod builder;
pub mod component;
pub mod component_system;
pub mod context;
pub mod contract;
pub mod declaration;
pub mod enumeration;
pub mod error;
pub mod factory;
pub mod identity;
pub mod loader;
pub mod model;
pub mod observer;
pub mod params;
pub mod source;
pub mod splay;
pub mod unique;
pub mod universe;

pub use archetype::{Archetype, FinishHook};
pub use builder::Builder;
pub use component::{Component, ComponentBuilder, ComponentFactory, ComponentKey, ComponentMap, ComponentSpec};
pub use component_system::ComponentSystem;
pub use contract::{Contract, ContractExecutor, ContractKey, ContractOutcome};
pub use declaration::{
    AbstractDecl, ArchetypeDecl, ComponentDecl, EnumerationDecl, LoadFlags, ModelDecl, SplayDecl,
};
pub use enumeration::{EnumValue, Enumeration};
pub use error::{Error, Result};
pub use factory::{Constructors, Factory, Stages, Upcast};
pub use identity::{ArchetypeRegistry, Identity};
pub use loader::{LoadFailure, LoadReport, Loader, LoaderConfig, LoaderState};
pub use model::{Model, ModelBuilder, ModelFactory, ModelFamily, ModelSchema};
pub use observer::{Category, LoadObserver, LoaderEvent, LogObserver};
pub use params::{IntoParams, Params};
pub use source::{DeclarationSource, Declarations, SourceId, StaticSource};
pub use splay::SplayMode;
pub use unique::{unique_cache, UniqueCache, UniqueId};
pub use universe::Universe;
pub use void_core::{NamedId, TypeFlags, TypeInfo, TypeKey, TypeKind};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{impl_component, impl_model};
    pub use crate::{
        Archetype, ArchetypeDecl, Builder, Component, ComponentDecl, ComponentSpec,
        Constructors, ContractOutcome, EnumValue, EnumerationDecl, Error, IntoParams, LoadFlags,
        Loader, LoaderConfig, Model, ModelBuilder, ModelDecl, Params, Result, SplayDecl,
        SplayMode, StaticSource, TypeKey, UniqueId, Universe,
    };
}

//! Archetypes
//!
//! An archetype is the singleton factory for one declared archetype type in
//! one universe. It links to its base archetype, knows the model family it
//! produces, and runs the three-stage pipeline on every `make` call.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use void_core::TypeKey;

use crate::component::{ComponentMap, ComponentSpec};
use crate::declaration::{ArchetypeDecl, LoadFlags};
use crate::enumeration::EnumValue;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::model::{produce, Model, ModelBuilder, ModelFactory, ModelFamily};
use crate::params::{IntoParams, Params};
use crate::splay::Splay;
use crate::universe::Universe;

/// Hook run once per archetype after all types are resolved
pub type FinishHook = Arc<dyn Fn(&Archetype) -> Result<()> + Send + Sync>;

/// Archetype singleton
pub struct Archetype {
    identity: Identity,
    type_key: TypeKey,
    base: Option<Arc<Archetype>>,
    family: Arc<ModelFamily>,
    factory: ModelFactory,
    /// Archetype-level model components, inherited down the base chain
    model_components: Vec<ComponentSpec>,
    /// Family components followed by archetype-level ones
    build_components: Vec<ComponentSpec>,
    components: ComponentMap,
    flags: LoadFlags,
    defaults: Params,
    test_params: Params,
    splay: Option<Splay>,
    splay_value: Option<EnumValue>,
    finish: Option<FinishHook>,
    default_builder: OnceLock<ModelBuilder>,
    universe: Weak<Universe>,
}

impl Archetype {
    /// Resolve a declaration against the universe without registering it
    pub(crate) fn assemble(
        universe: &Universe,
        decl: &ArchetypeDecl,
        splay_value: Option<EnumValue>,
    ) -> Result<Arc<Archetype>> {
        let base = universe.archetypes().resolve_base(&decl.type_key)?;

        let model_type = match (&decl.model_type, &base) {
            (Some(model_type), _) => model_type.clone(),
            (None, Some(base)) => base.model_type().clone(),
            (None, None) => {
                return Err(Error::invalid_declaration(
                    &decl.type_key,
                    "root archetype declares no model type",
                ))
            }
        };
        let family = universe
            .models()
            .try_get(&model_type)
            .ok_or_else(|| Error::dependency_not_ready(&decl.type_key, &model_type))?;

        if let Some(splay) = &decl.splay {
            if universe.enumerations().try_get(&splay.enumeration).is_none() {
                return Err(Error::dependency_not_ready(&decl.type_key, &splay.enumeration));
            }
        }

        let mut model_components = base
            .as_ref()
            .map(|b| b.model_components.clone())
            .unwrap_or_default();
        model_components.extend(decl.model_components.iter().cloned());

        let system = universe.components();
        for spec in decl.components.iter().chain(&model_components) {
            if system.try_factory_for(&spec.type_key).is_none() {
                return Err(Error::dependency_not_ready(&decl.type_key, &spec.type_key));
            }
        }

        // Same family as the base: refine the base pipeline. Otherwise the
        // archetype branches to a new family and starts from its pipeline.
        let factory = match &base {
            Some(base) if base.model_type() == &model_type => {
                base.factory
                    .overlay(model_type.clone(), decl.constructors.as_ref(), &decl.stages)
            }
            _ => family
                .factory()
                .overlay(model_type.clone(), decl.constructors.as_ref(), &decl.stages),
        };

        let mut defaults = base.as_ref().map(|b| b.defaults.clone()).unwrap_or_default();
        defaults.merge(decl.defaults.clone());
        let mut test_params = base
            .as_ref()
            .map(|b| b.test_params.clone())
            .unwrap_or_default();
        test_params.merge(decl.test_params.clone());

        let components = ComponentMap::new();
        for spec in &decl.components {
            system.attach(&components, system.make_spec(spec)?)?;
        }

        let build_components = family
            .components()
            .iter()
            .chain(&model_components)
            .cloned()
            .collect();

        Ok(Arc::new(Archetype {
            identity: Identity::new(decl.identity_key(), universe.key()),
            type_key: decl.type_key.clone(),
            base,
            family,
            factory,
            model_components,
            build_components,
            components,
            flags: decl.flags,
            defaults,
            test_params,
            splay: decl.splay.as_ref().map(Splay::new),
            splay_value,
            finish: decl.finish.clone(),
            default_builder: OnceLock::new(),
            universe: universe.weak(),
        }))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Identity key
    pub fn key(&self) -> &str {
        self.identity.key()
    }

    /// Declared archetype type
    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    /// Base archetype; `None` only at a hierarchy root
    pub fn base(&self) -> Option<&Arc<Archetype>> {
        self.base.as_ref()
    }

    pub fn is_base(&self) -> bool {
        self.base.is_none()
    }

    /// Model type this archetype produces
    pub fn model_type(&self) -> &TypeKey {
        self.family.type_key()
    }

    pub fn family(&self) -> &Arc<ModelFamily> {
        &self.family
    }

    pub fn factory(&self) -> &ModelFactory {
        &self.factory
    }

    /// Components attached to the archetype itself
    pub fn components(&self) -> &ComponentMap {
        &self.components
    }

    /// Components attached to every model this archetype makes
    pub fn model_components(&self) -> &[ComponentSpec] {
        &self.build_components
    }

    pub fn flags(&self) -> LoadFlags {
        self.flags
    }

    pub fn defaults(&self) -> &Params {
        &self.defaults
    }

    pub fn test_params(&self) -> &Params {
        &self.test_params
    }

    pub fn is_unique(&self) -> bool {
        self.family.is_unique()
    }

    pub fn splay(&self) -> Option<&Splay> {
        self.splay.as_ref()
    }

    /// The enumeration value this archetype was splayed for
    pub fn splay_value(&self) -> Option<&EnumValue> {
        self.splay_value.as_ref()
    }

    /// The owning universe
    pub fn universe(&self) -> Result<Arc<Universe>> {
        self.universe
            .upgrade()
            .ok_or_else(|| Error::not_found("universe", self.identity.universe()))
    }

    /// Fresh builder carrying this archetype's defaults
    pub fn builder(&self) -> ModelBuilder {
        ModelBuilder::new(self.model_type().clone())
            .for_archetype(self.identity.clone())
            .with_params(self.defaults.clone())
    }

    /// Builder behind every no-argument build, created on first use
    pub fn default_builder(&self) -> &ModelBuilder {
        self.default_builder.get_or_init(|| self.builder())
    }

    /// Run the pipeline; `None` uses the cached default builder
    pub fn build(&self, builder: Option<&ModelBuilder>) -> Result<Arc<dyn Model>> {
        let builder = match builder {
            Some(builder) => builder,
            None => self.default_builder(),
        };
        let universe = self.universe()?;
        produce(
            &universe,
            &self.factory,
            builder,
            &self.build_components,
            self.is_unique(),
        )
    }

    /// Build with the default builder
    pub fn make(&self) -> Result<Arc<dyn Model>> {
        self.build(None)
    }

    /// Build with parameters merged over the defaults
    pub fn make_with(&self, params: impl IntoParams) -> Result<Arc<dyn Model>> {
        self.build(Some(&self.builder().with_params(params)))
    }

    /// Build with a prepared builder
    pub fn make_from(&self, builder: ModelBuilder) -> Result<Arc<dyn Model>> {
        self.build(Some(&builder))
    }

    /// Build with a function applied to a fresh default builder
    pub fn make_configured<F>(&self, configure: F) -> Result<Arc<dyn Model>>
    where
        F: FnOnce(ModelBuilder) -> ModelBuilder,
    {
        self.build(Some(&configure(self.builder())))
    }

    /// Trial build used by the loader's test pass
    pub fn test_build(&self) -> Result<Arc<dyn Model>> {
        self.make_with(self.test_params.clone())
    }

    /// Sub-archetype for an enumeration value
    pub fn for_value(&self, value: &EnumValue) -> Result<Arc<Archetype>> {
        let splay = self.splay.as_ref().ok_or_else(|| {
            Error::invalid_declaration(&self.type_key, "archetype is not splayed")
        })?;
        let universe = self.universe()?;
        splay.get_or_build(&universe, self, value)
    }

    /// Sub-archetype for an enumeration value key
    pub fn for_key(&self, key: &str) -> Result<Arc<Archetype>> {
        let splay = self.splay.as_ref().ok_or_else(|| {
            Error::invalid_declaration(&self.type_key, "archetype is not splayed")
        })?;
        let universe = self.universe()?;
        let value = universe
            .enumerations()
            .values_including_derived(splay.enumeration())
            .into_iter()
            .find(|v| v.key() == key)
            .ok_or_else(|| {
                Error::not_found("enumeration value", format!("{}::{}", splay.enumeration(), key))
            })?;
        splay.get_or_build(&universe, self, &value)
    }

    /// Sub-archetypes built so far
    pub fn splayed(&self) -> Vec<Arc<Archetype>> {
        self.splay.as_ref().map(Splay::built).unwrap_or_default()
    }

    /// Whether `ancestor` appears in this archetype's base chain
    pub fn is_descendant_of(&self, ancestor: &Archetype) -> bool {
        let mut current = self.base.as_ref();
        while let Some(base) = current {
            if base.identity == ancestor.identity {
                return true;
            }
            current = base.base.as_ref();
        }
        false
    }

    /// Run the finish hook, if any
    pub(crate) fn finish(&self) -> Result<()> {
        match &self.finish {
            Some(hook) => hook(self),
            None => Ok(()),
        }
    }

    pub(crate) fn has_finish_hook(&self) -> bool {
        self.finish.is_some()
    }
}

impl PartialEq for Archetype {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Archetype {}

impl Hash for Archetype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("identity", &self.identity)
            .field("type_key", &self.type_key)
            .field("base", &self.base.as_ref().map(|b| b.identity.clone()))
            .field("model_type", self.model_type())
            .field("components", &self.components.len())
            .field("splay", &self.splay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::declaration::ModelDecl;
    use crate::factory::Constructors;

    #[derive(Debug, Default)]
    struct Blade {
        damage: i64,
        name: String,
    }

    crate::impl_model!(Blade);

    fn universe(key: &str) -> Arc<Universe> {
        let universe = Universe::new(key);
        universe
            .declare_model(ModelDecl::new("Blade").constructors(Constructors::builder(
                |b: &Builder<dyn Model>| {
                    Ok(Blade {
                        damage: b.get_or("damage", 1)?,
                        name: b.get_or("name", String::new())?,
                    })
                },
            )))
            .unwrap();
        universe
    }

    #[test]
    fn test_root_requires_model_type() {
        let universe = universe("archetype-root");
        assert!(matches!(
            universe.declare_archetype(ArchetypeDecl::new("Weapon")),
            Err(Error::InvalidDeclaration { .. })
        ));
    }

    #[test]
    fn test_defaults_are_inherited_and_overridable() {
        let universe = universe("archetype-defaults");
        let weapon = universe
            .declare_archetype(
                ArchetypeDecl::new("Weapon")
                    .model("Blade")
                    .default_param("damage", 2)
                    .default_param("name", "weapon"),
            )
            .unwrap();
        let sword = universe
            .declare_archetype(ArchetypeDecl::new("Sword").parent("Weapon").default_param("name", "sword"))
            .unwrap();

        assert!(weapon.is_base());
        assert_eq!(sword.base().unwrap().identity(), weapon.identity());
        assert!(sword.is_descendant_of(&weapon));

        let blade = sword.make().unwrap();
        let blade = blade.downcast_ref::<Blade>().unwrap();
        assert_eq!(blade.damage, 2);
        assert_eq!(blade.name, "sword");

        let heavy = sword.make_with([("damage", 9)]).unwrap();
        assert_eq!(heavy.downcast_ref::<Blade>().unwrap().damage, 9);
    }

    #[test]
    fn test_make_configured_and_validators() {
        let universe = universe("archetype-configured");
        let sword = universe
            .declare_archetype(ArchetypeDecl::new("Sword").model("Blade").validate(|_, model| {
                match model.downcast_ref::<Blade>() {
                    Some(blade) if blade.damage > 0 => Ok(()),
                    _ => Err("damage must be positive".to_string()),
                }
            }))
            .unwrap();

        let model = sword.make_configured(|b| b.with("damage", 4)).unwrap();
        assert_eq!(model.downcast_ref::<Blade>().unwrap().damage, 4);

        assert!(matches!(
            sword.make_configured(|b| b.with("damage", 0)),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_equality_is_by_identity() {
        let universe = universe("archetype-eq");
        let sword = universe
            .declare_archetype(ArchetypeDecl::new("Sword").model("Blade"))
            .unwrap();
        let again = universe.archetypes().get("Sword").unwrap();
        assert_eq!(*sword, *again);
        assert!(Arc::ptr_eq(&sword, &again));
    }
}

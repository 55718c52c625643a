//! Declaration sources
//!
//! A source is one unit of declarations (a module, a content pack) that the
//! loader consumes. Sources may depend on other sources; the loader visits
//! them in dependency order, breaking ties by registration order.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use void_core::{NamedId, TypeInfo};

use crate::declaration::{AbstractDecl, ArchetypeDecl, ComponentDecl, EnumerationDecl, ModelDecl};
use crate::error::{Error, Result};
use crate::universe::Universe;

/// Unique identifier for a declaration source
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(NamedId);

impl SourceId {
    pub fn new(name: &str) -> Self {
        Self(NamedId::new(name))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.name())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Everything one source declares
#[derive(Clone, Default)]
pub struct Declarations {
    pub abstracts: Vec<AbstractDecl>,
    pub components: Vec<ComponentDecl>,
    pub enumerations: Vec<EnumerationDecl>,
    pub archetypes: Vec<ArchetypeDecl>,
    pub models: Vec<ModelDecl>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_abstract(&mut self, decl: AbstractDecl) -> &mut Self {
        self.abstracts.push(decl);
        self
    }

    pub fn add_component(&mut self, decl: ComponentDecl) -> &mut Self {
        self.components.push(decl);
        self
    }

    pub fn add_enumeration(&mut self, decl: EnumerationDecl) -> &mut Self {
        self.enumerations.push(decl);
        self
    }

    pub fn add_archetype(&mut self, decl: ArchetypeDecl) -> &mut Self {
        self.archetypes.push(decl);
        self
    }

    pub fn add_model(&mut self, decl: ModelDecl) -> &mut Self {
        self.models.push(decl);
        self
    }

    /// Type descriptors of every declaration
    pub fn type_infos(&self) -> Vec<TypeInfo> {
        let mut infos = Vec::with_capacity(self.len());
        infos.extend(self.abstracts.iter().map(AbstractDecl::type_info));
        infos.extend(self.components.iter().map(ComponentDecl::type_info));
        infos.extend(self.enumerations.iter().map(EnumerationDecl::type_info));
        infos.extend(self.models.iter().map(ModelDecl::type_info));
        infos.extend(self.archetypes.iter().map(ArchetypeDecl::type_info));
        infos
    }

    /// Total number of declarations
    pub fn len(&self) -> usize {
        self.abstracts.len()
            + self.components.len()
            + self.enumerations.len()
            + self.archetypes.len()
            + self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A unit of declarations consumed by the loader
pub trait DeclarationSource: Send + Sync {
    /// Unique identifier for this source
    fn id(&self) -> SourceId;

    /// Sources that must be loaded before this one
    fn dependencies(&self) -> Vec<SourceId> {
        Vec::new()
    }

    /// Produce this source's declarations
    fn declare(&self, declarations: &mut Declarations);

    /// Post-load mutation hook, run after every type is resolved
    fn modify(&self, _universe: &Universe) -> Result<()> {
        Ok(())
    }
}

type ModifyHook = Arc<dyn Fn(&Universe) -> Result<()> + Send + Sync>;

/// A source built from a fixed set of declarations
pub struct StaticSource {
    id: SourceId,
    dependencies: Vec<SourceId>,
    declarations: Declarations,
    modify: Option<ModifyHook>,
}

impl StaticSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: SourceId::new(id),
            dependencies: Vec::new(),
            declarations: Declarations::new(),
            modify: None,
        }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(SourceId::new(id));
        self
    }

    pub fn abstract_type(mut self, decl: AbstractDecl) -> Self {
        self.declarations.add_abstract(decl);
        self
    }

    pub fn component(mut self, decl: ComponentDecl) -> Self {
        self.declarations.add_component(decl);
        self
    }

    pub fn enumeration(mut self, decl: EnumerationDecl) -> Self {
        self.declarations.add_enumeration(decl);
        self
    }

    pub fn archetype(mut self, decl: ArchetypeDecl) -> Self {
        self.declarations.add_archetype(decl);
        self
    }

    pub fn model(mut self, decl: ModelDecl) -> Self {
        self.declarations.add_model(decl);
        self
    }

    pub fn on_modify<F>(mut self, f: F) -> Self
    where
        F: Fn(&Universe) -> Result<()> + Send + Sync + 'static,
    {
        self.modify = Some(Arc::new(f));
        self
    }
}

impl DeclarationSource for StaticSource {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    fn dependencies(&self) -> Vec<SourceId> {
        self.dependencies.clone()
    }

    fn declare(&self, declarations: &mut Declarations) {
        *declarations = self.declarations.clone();
    }

    fn modify(&self, universe: &Universe) -> Result<()> {
        match &self.modify {
            Some(hook) => hook(universe),
            None => Ok(()),
        }
    }
}

/// Order sources so every source follows its dependencies
///
/// Among sources whose dependencies are satisfied, the earliest registered
/// goes first. Returns indices into `sources`.
pub fn order_sources(sources: &[Box<dyn DeclarationSource>]) -> Result<Vec<usize>> {
    let mut index_of = HashMap::new();
    for (i, source) in sources.iter().enumerate() {
        if index_of.insert(source.id(), i).is_some() {
            return Err(Error::DuplicateIdentity {
                key: source.id().to_string(),
                universe: "sources".to_string(),
            });
        }
    }

    let mut pending_deps = vec![0usize; sources.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); sources.len()];
    for (i, source) in sources.iter().enumerate() {
        for dep in source.dependencies() {
            let Some(&j) = index_of.get(&dep) else {
                return Err(Error::SourceDependency {
                    source_id: source.id().to_string(),
                    dependency: dep.to_string(),
                });
            };
            pending_deps[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..sources.len()).filter(|&i| pending_deps[i] == 0).collect();
    let mut order = Vec::with_capacity(sources.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            pending_deps[dependent] -= 1;
            if pending_deps[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < sources.len() {
        let stuck = (0..sources.len())
            .find(|i| !order.contains(i))
            .map(|i| sources[i].id().to_string())
            .unwrap_or_default();
        return Err(Error::SourceCycle(stuck));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(source: StaticSource) -> Box<dyn DeclarationSource> {
        Box::new(source)
    }

    #[test]
    fn test_dependencies_first_then_registration_order() {
        let sources = vec![
            boxed(StaticSource::new("weapons").depends_on("core")),
            boxed(StaticSource::new("armor")),
            boxed(StaticSource::new("core")),
        ];
        let order = order_sources(&sources).unwrap();
        let names: Vec<String> = order.iter().map(|&i| sources[i].id().to_string()).collect();
        assert_eq!(names, ["armor", "core", "weapons"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let sources = vec![boxed(StaticSource::new("weapons").depends_on("core"))];
        assert!(matches!(
            order_sources(&sources),
            Err(Error::SourceDependency { .. })
        ));
    }

    #[test]
    fn test_cycle() {
        let sources = vec![
            boxed(StaticSource::new("a").depends_on("b")),
            boxed(StaticSource::new("b").depends_on("a")),
        ];
        assert!(matches!(order_sources(&sources), Err(Error::SourceCycle(_))));
    }

    #[test]
    fn test_declarations_type_infos() {
        let mut declarations = Declarations::new();
        StaticSource::new("core")
            .model(ModelDecl::new("Blade"))
            .archetype(ArchetypeDecl::new("Weapon").model("Blade"))
            .declare(&mut declarations);
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations.type_infos().len(), 2);
    }
}

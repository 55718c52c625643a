//! Loader / resolver
//!
//! Drives a universe from declarations to a sealed registry:
//!
//! 1. order sources by their declared dependencies
//! 2. declare every candidate type so ancestry questions can be answered
//! 3. per source, attempt components, enumerations, archetypes and models
//!    once; items whose dependency is not registered yet are queued
//! 4. retry queued items (enumerations, components, archetypes, models)
//!    until a pass resolves nothing, then fill in eager splays over values
//!    that arrived late
//! 5. run modification hooks, finish types, trial-build archetypes, seal
//!
//! Failures other than a missing dependency are isolated per item and
//! collected into the [`LoadReport`].

mod config;
mod report;
mod state;

pub use config::LoaderConfig;
pub use report::{LoadFailure, LoadReport, SkippedItem};
pub use state::LoaderState;

use std::fmt;
use std::sync::Arc;

use void_core::TypeKey;

use crate::declaration::{ArchetypeDecl, ComponentDecl, EnumerationDecl, LoadFlags, ModelDecl};
use crate::error::{Error, Result};
use crate::observer::{Category, LoadObserver, LoaderEvent, Observers};
use crate::source::{order_sources, DeclarationSource, Declarations};
use crate::unique::unique_cache;
use crate::universe::Universe;

/// One declaration the loader initializes
enum Item {
    Component(ComponentDecl),
    Enumeration(EnumerationDecl),
    Archetype(ArchetypeDecl),
    Model(ModelDecl),
}

impl Item {
    fn category(&self) -> Category {
        match self {
            Item::Component(_) => Category::Component,
            Item::Enumeration(_) => Category::Enumeration,
            Item::Archetype(_) => Category::Archetype,
            Item::Model(_) => Category::Model,
        }
    }

    fn type_key(&self) -> &TypeKey {
        match self {
            Item::Component(d) => &d.type_key,
            Item::Enumeration(d) => &d.type_key,
            Item::Archetype(d) => &d.type_key,
            Item::Model(d) => &d.type_key,
        }
    }

    fn flags(&self) -> LoadFlags {
        match self {
            Item::Component(d) => d.flags,
            Item::Enumeration(d) => d.flags,
            Item::Archetype(d) => d.flags,
            Item::Model(d) => d.flags,
        }
    }

    /// Position in the retry order
    fn retry_rank(&self) -> u8 {
        match self {
            Item::Enumeration(_) => 0,
            Item::Component(_) => 1,
            Item::Archetype(_) => 2,
            Item::Model(_) => 3,
        }
    }
}

/// An item waiting on a dependency
struct Pending {
    item: Item,
    source_id: String,
    last_error: Error,
}

/// Loads declaration sources into a universe
pub struct Loader {
    universe: Arc<Universe>,
    config: LoaderConfig,
    sources: Vec<Box<dyn DeclarationSource>>,
    observers: Observers,
    state: LoaderState,
}

impl Loader {
    /// Create a loader with the default configuration
    pub fn new(universe: Arc<Universe>) -> Self {
        Self::with_config(universe, LoaderConfig::default())
    }

    /// Create a loader with a configuration
    pub fn with_config(universe: Arc<Universe>, config: LoaderConfig) -> Self {
        Self {
            universe,
            config,
            sources: Vec::new(),
            observers: Observers::new(),
            state: LoaderState::Initializing,
        }
    }

    /// Add a declaration source
    pub fn add_source<S: DeclarationSource + 'static>(&mut self, source: S) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Add a boxed declaration source
    pub fn add_boxed_source(&mut self, source: Box<dyn DeclarationSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    /// Subscribe to lifecycle events
    pub fn observe<O: LoadObserver + 'static>(&mut self, observer: O) -> &mut Self {
        self.observers.add(Arc::new(observer));
        self
    }

    pub fn state(&self) -> &LoaderState {
        &self.state
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// Run the whole pipeline and seal the universe
    ///
    /// Fails without sealing on a duplicate identity, on a source ordering
    /// error, or (in strict mode) when items remain unresolved.
    pub fn load(&mut self) -> Result<LoadReport> {
        let mut report = LoadReport::new();
        self.observers.notify(&LoaderEvent::LoadStarted {
            universe: self.universe.key().name().to_string(),
            sources: self.sources.len(),
        });

        match self.run(&mut report) {
            Ok(()) => {
                report.state = self.state.clone();
                self.notify_finished();
                Ok(report)
            }
            Err(e) => {
                log::error!("Loading universe '{}' failed: {}", self.universe.key(), e);
                self.transition(LoaderState::Failed);
                self.notify_finished();
                Err(e)
            }
        }
    }

    fn run(&mut self, report: &mut LoadReport) -> Result<()> {
        self.universe.scope().ensure_unsealed()?;

        self.transition(LoaderState::CollectingSources);
        let order = order_sources(&self.sources)?;
        let mut collected: Vec<(String, Declarations)> = Vec::with_capacity(order.len());
        for &index in &order {
            let source = &self.sources[index];
            let mut declarations = Declarations::new();
            source.declare(&mut declarations);
            collected.push((source.id().to_string(), declarations));
        }
        report.sources = collected.iter().map(|(id, _)| id.clone()).collect();

        self.transition(LoaderState::CollectingCandidateTypes);
        for (_, declarations) in &collected {
            for info in declarations.type_infos() {
                let key = info.key.clone();
                self.universe.declare_type(info).map_err(|e| match e {
                    Error::TypeRegistry(_) => Error::DuplicateIdentity {
                        key: key.name().to_string(),
                        universe: self.universe.key().name().to_string(),
                    },
                    other => other,
                })?;
            }
        }

        let mut pending = Vec::new();
        for (source_id, declarations) in collected {
            self.observers.notify(&LoaderEvent::SourceStarted {
                source: source_id.clone(),
                declarations: declarations.len(),
            });
            let Declarations {
                components,
                enumerations,
                archetypes,
                models,
                ..
            } = declarations;

            let batches = [
                (Category::Component, components.into_iter().map(Item::Component).collect::<Vec<_>>()),
                (Category::Enumeration, enumerations.into_iter().map(Item::Enumeration).collect()),
                (Category::Archetype, archetypes.into_iter().map(Item::Archetype).collect()),
                (Category::Model, models.into_iter().map(Item::Model).collect()),
            ];
            for (category, items) in batches {
                self.transition(LoaderState::LoadingSource {
                    source: source_id.clone(),
                    category,
                });
                for item in items {
                    if let Some(reason) = self.skip_reason(&item) {
                        log::debug!("Skipping {} {}: {}", category, item.type_key(), reason);
                        report.skipped.push(SkippedItem {
                            category,
                            item: item.type_key().name().to_string(),
                            reason: reason.to_string(),
                        });
                        continue;
                    }
                    if let Some(waiting) = self.try_item(item, &source_id, report)? {
                        pending.push(waiting);
                    }
                }
            }
            self.observers.notify(&LoaderEvent::SourceFinished { source: source_id });
        }

        let unresolved = self.retry(pending, report)?;
        for (archetype, error) in self.universe.complete_eager_splays() {
            self.observers.notify(&LoaderEvent::ItemFailed {
                category: Category::Archetype,
                item: archetype.key().to_string(),
                error: error.to_string(),
            });
            report.failures.push(LoadFailure {
                category: Category::Archetype,
                item: archetype.key().to_string(),
                source_id: None,
                error,
            });
        }

        self.transition(LoaderState::RunningModifications);
        if self.config.run_modifications {
            self.run_modifications(&order, report);
        }

        self.transition(LoaderState::FinishingTypes);
        for p in unresolved {
            let category = p.item.category();
            let item = p.item.type_key().name().to_string();
            if let Some(dependency) = self.deferred_dependency(&p) {
                log::debug!("Skipping {} {}: needs deferred {}", category, item, dependency);
                report.skipped.push(SkippedItem {
                    category,
                    item,
                    reason: format!("depends on '{}', which is not built in the initial load", dependency),
                });
                continue;
            }
            report.unresolved.push(LoadFailure {
                category,
                item,
                source_id: Some(p.source_id),
                error: p.last_error,
            });
        }
        for failure in &report.unresolved {
            self.observers.notify(&LoaderEvent::ItemFailed {
                category: failure.category,
                item: failure.item.clone(),
                error: failure.error.to_string(),
            });
        }
        if self.config.strict && !report.unresolved.is_empty() {
            return Err(Error::Unresolved(report.unresolved.clone()));
        }
        self.finish_types(report);

        self.transition(LoaderState::BuildingTestModels);
        if self.config.build_test_models {
            self.build_test_models(report);
        }

        self.transition(LoaderState::Finalizing);
        self.universe.seal();
        self.transition(LoaderState::Sealed);
        self.observers.notify(&LoaderEvent::Sealed {
            universe: self.universe.key().name().to_string(),
        });
        Ok(())
    }

    fn skip_reason(&self, item: &Item) -> Option<&'static str> {
        if item.flags().skip_initial_load {
            return Some("not built in the initial load");
        }
        let types = self.universe.types();
        if types.is_excluded(item.type_key()) {
            return Some("excluded with its descendants");
        }
        if types.is_deferred(item.type_key()) {
            return Some("an ancestor is not built in the initial load");
        }
        None
    }

    /// Dependency of a pending item that was left out of the initial load
    fn deferred_dependency(&self, pending: &Pending) -> Option<String> {
        match &pending.last_error {
            Error::DependencyNotReady { dependency, .. }
                if self.universe.types().is_deferred(&TypeKey::new(dependency)) =>
            {
                Some(dependency.clone())
            }
            _ => None,
        }
    }

    fn attempt(&self, item: &Item) -> Result<()> {
        match item {
            Item::Component(decl) => self.universe.initialize_component(decl),
            Item::Enumeration(decl) => self.universe.initialize_enumeration(decl).map(|_| ()),
            Item::Archetype(decl) => self.universe.initialize_archetype(decl).map(|_| ()),
            Item::Model(decl) => self.universe.initialize_model(decl).map(|_| ()),
        }
    }

    /// Attempt one item; returns it back when it is waiting on a dependency
    fn try_item(
        &self,
        item: Item,
        source_id: &str,
        report: &mut LoadReport,
    ) -> Result<Option<Pending>> {
        let category = item.category();
        let name = item.type_key().name().to_string();
        self.observers.notify(&LoaderEvent::ItemStarted {
            category,
            item: name.clone(),
        });

        match self.attempt(&item) {
            Ok(()) => {
                report.record_success(category);
                self.observers.notify(&LoaderEvent::ItemSucceeded { category, item: name });
                Ok(None)
            }
            Err(e) if e.is_dependency_not_ready() => {
                log::debug!("Deferring {} {}: {}", category, name, e);
                Ok(Some(Pending {
                    item,
                    source_id: source_id.to_string(),
                    last_error: e,
                }))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.observers.notify(&LoaderEvent::ItemFailed {
                    category,
                    item: name.clone(),
                    error: e.to_string(),
                });
                report.failures.push(LoadFailure {
                    category,
                    item: name,
                    source_id: Some(source_id.to_string()),
                    error: e,
                });
                Ok(None)
            }
        }
    }

    /// Retry queued items until a pass makes no progress
    fn retry(&mut self, mut pending: Vec<Pending>, report: &mut LoadReport) -> Result<Vec<Pending>> {
        let mut pass = 0;
        while !pending.is_empty() {
            if let Some(max) = self.config.max_retry_passes {
                if pass >= max {
                    log::warn!("Retry pass limit {} reached with {} item(s) pending", max, pending.len());
                    break;
                }
            }
            pass += 1;
            self.transition(LoaderState::RetryPasses { pass });
            self.observers.notify(&LoaderEvent::RetryPassStarted {
                pass,
                pending: pending.len(),
            });

            pending.sort_by_key(|p| p.item.retry_rank());
            let before = pending.len();
            let mut still_pending = Vec::new();
            for waiting in pending {
                let source_id = waiting.source_id;
                if let Some(again) = self.try_item(waiting.item, &source_id, report)? {
                    still_pending.push(again);
                }
            }
            pending = still_pending;

            let resolved = before - pending.len();
            report.retry_passes = pass;
            self.observers.notify(&LoaderEvent::RetryPassFinished { pass, resolved });
            if resolved == 0 {
                log::warn!("Retry loop reached a fixpoint with {} item(s) unresolved", pending.len());
                break;
            }
        }
        Ok(pending)
    }

    fn run_modifications(&self, order: &[usize], report: &mut LoadReport) {
        self.observers.notify(&LoaderEvent::ModificationsStarted);
        for &index in order {
            let source = &self.sources[index];
            if let Err(e) = source.modify(&self.universe) {
                let id = source.id().to_string();
                self.observers.notify(&LoaderEvent::ItemFailed {
                    category: Category::Modification,
                    item: id.clone(),
                    error: e.to_string(),
                });
                report.modification_failures.push(LoadFailure {
                    category: Category::Modification,
                    item: id.clone(),
                    source_id: Some(id),
                    error: e,
                });
            }
        }
        self.observers.notify(&LoaderEvent::ModificationsFinished);
    }

    fn finish_types(&self, report: &mut LoadReport) {
        for archetype in self.universe.archetypes().all() {
            if !archetype.has_finish_hook() {
                continue;
            }
            match archetype.finish() {
                Ok(()) => report.record_success(Category::Finish),
                Err(e) => {
                    self.observers.notify(&LoaderEvent::ItemFailed {
                        category: Category::Finish,
                        item: archetype.key().to_string(),
                        error: e.to_string(),
                    });
                    report.finish_failures.push(LoadFailure {
                        category: Category::Finish,
                        item: archetype.key().to_string(),
                        source_id: None,
                        error: e,
                    });
                }
            }
        }
    }

    fn build_test_models(&self, report: &mut LoadReport) {
        let candidates: Vec<_> = self
            .universe
            .archetypes()
            .all()
            .into_iter()
            .filter(|a| !a.flags().skip_test_build)
            .collect();
        self.observers.notify(&LoaderEvent::TestBuildsStarted {
            archetypes: candidates.len(),
        });

        for archetype in candidates {
            match archetype.test_build() {
                Ok(model) => {
                    // Trial instances are not kept in the unique cache.
                    if let Some(id) = model.unique_id() {
                        unique_cache().remove(id);
                    }
                    report.test_builds += 1;
                    report.record_success(Category::TestModel);
                }
                Err(e) => {
                    self.observers.notify(&LoaderEvent::ItemFailed {
                        category: Category::TestModel,
                        item: archetype.key().to_string(),
                        error: e.to_string(),
                    });
                    report.test_failures.push(LoadFailure {
                        category: Category::TestModel,
                        item: archetype.key().to_string(),
                        source_id: None,
                        error: e,
                    });
                }
            }
        }
        self.observers.notify(&LoaderEvent::TestBuildsFinished {
            failures: report.test_failures.len(),
        });
    }

    fn transition(&mut self, state: LoaderState) {
        log::debug!("Loader: {} -> {}", self.state, state);
        self.state = state.clone();
        self.observers.notify(&LoaderEvent::StateChanged { state });
    }

    fn notify_finished(&self) {
        self.observers.notify(&LoaderEvent::LoadFinished {
            universe: self.universe.key().name().to_string(),
            state: self.state.clone(),
        });
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("universe", self.universe.key())
            .field("config", &self.config)
            .field("sources", &self.sources.len())
            .field("observers", &self.observers)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{ArchetypeDecl, ModelDecl};
    use crate::factory::Constructors;
    use crate::source::StaticSource;

    #[derive(Debug, Default)]
    struct Stone;

    crate::impl_model!(Stone);

    #[test]
    fn test_states_end_sealed() {
        let universe = Universe::new("loader-states");
        let mut loader = Loader::new(universe.clone());
        loader.add_source(
            StaticSource::new("core")
                .archetype(ArchetypeDecl::new("Rock").model("Stone"))
                .model(ModelDecl::new("Stone").constructors(Constructors::default_of::<Stone>())),
        );

        let report = loader.load().unwrap();
        assert_eq!(*loader.state(), LoaderState::Sealed);
        assert_eq!(report.state, LoaderState::Sealed);
        assert!(report.is_clean(), "{}", report);
        assert_eq!(report.initialized(Category::Archetype), 1);
        assert_eq!(report.test_builds, 1);
        assert!(universe.is_sealed());

        assert!(matches!(loader.load(), Err(Error::SealedUniverse { .. })));
    }

    #[test]
    fn test_hard_failure_is_isolated() {
        let universe = Universe::new("loader-isolation");
        let mut loader = Loader::new(universe.clone());
        loader.add_source(
            StaticSource::new("core")
                .model(ModelDecl::new("Stone").constructors(Constructors::default_of::<Stone>()))
                .archetype(ArchetypeDecl::new("Orphan"))
                .archetype(ArchetypeDecl::new("Rock").model("Stone")),
        );

        let report = loader.load().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item, "Orphan");
        assert!(universe.try_get("Rock").is_some());
    }

    #[test]
    fn test_duplicate_identity_is_fatal() {
        let universe = Universe::new("loader-duplicate");
        let mut loader = Loader::with_config(
            universe.clone(),
            LoaderConfig {
                build_test_models: false,
                ..Default::default()
            },
        );
        loader.add_source(
            StaticSource::new("core")
                .model(ModelDecl::new("Stone").constructors(Constructors::default_of::<Stone>()))
                .archetype(ArchetypeDecl::new("Rock").model("Stone"))
                .archetype(ArchetypeDecl::new("Pebble").key("Rock").model("Stone")),
        );

        assert!(matches!(loader.load(), Err(Error::DuplicateIdentity { .. })));
        assert_eq!(*loader.state(), LoaderState::Failed);
        assert!(!universe.is_sealed());
    }
}

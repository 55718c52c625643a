//! Loader lifecycle observers
//!
//! Observers receive structured events at fixed hook points. They cannot
//! influence loading: an observer that errors or panics is logged and the
//! loader carries on.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::loader::LoaderState;

/// Item categories the loader initializes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Enumeration,
    Component,
    Archetype,
    Model,
    Modification,
    Finish,
    TestModel,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Enumeration => "enumeration",
            Category::Component => "component",
            Category::Archetype => "archetype",
            Category::Model => "model",
            Category::Modification => "modification",
            Category::Finish => "finish",
            Category::TestModel => "test model",
        };
        f.write_str(name)
    }
}

/// A lifecycle event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoaderEvent {
    LoadStarted { universe: String, sources: usize },
    LoadFinished { universe: String, state: LoaderState },
    StateChanged { state: LoaderState },
    SourceStarted { source: String, declarations: usize },
    SourceFinished { source: String },
    ItemStarted { category: Category, item: String },
    ItemSucceeded { category: Category, item: String },
    ItemFailed { category: Category, item: String, error: String },
    RetryPassStarted { pass: usize, pending: usize },
    RetryPassFinished { pass: usize, resolved: usize },
    ModificationsStarted,
    ModificationsFinished,
    TestBuildsStarted { archetypes: usize },
    TestBuildsFinished { failures: usize },
    Sealed { universe: String },
}

/// Subscriber to loader events
pub trait LoadObserver: Send + Sync {
    fn on_event(&self, event: &LoaderEvent) -> Result<(), String>;
}

impl<F> LoadObserver for F
where
    F: Fn(&LoaderEvent) -> Result<(), String> + Send + Sync,
{
    fn on_event(&self, event: &LoaderEvent) -> Result<(), String> {
        self(event)
    }
}

/// Forwards events to the `log` facade
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl LoadObserver for LogObserver {
    fn on_event(&self, event: &LoaderEvent) -> Result<(), String> {
        match event {
            LoaderEvent::LoadStarted { universe, sources } => {
                log::info!("Loading universe '{}' from {} source(s)", universe, sources)
            }
            LoaderEvent::LoadFinished { universe, state } => {
                log::info!("Loading universe '{}' finished in state {:?}", universe, state)
            }
            LoaderEvent::StateChanged { state } => log::debug!("Loader state: {:?}", state),
            LoaderEvent::SourceStarted { source, declarations } => {
                log::info!("Loading source '{}' ({} declarations)", source, declarations)
            }
            LoaderEvent::SourceFinished { source } => log::debug!("Finished source '{}'", source),
            LoaderEvent::ItemStarted { category, item } => {
                log::trace!("Initializing {} {}", category, item)
            }
            LoaderEvent::ItemSucceeded { category, item } => {
                log::debug!("Initialized {} {}", category, item)
            }
            LoaderEvent::ItemFailed { category, item, error } => {
                log::warn!("Failed to initialize {} {}: {}", category, item, error)
            }
            LoaderEvent::RetryPassStarted { pass, pending } => {
                log::debug!("Retry pass {} with {} pending item(s)", pass, pending)
            }
            LoaderEvent::RetryPassFinished { pass, resolved } => {
                log::debug!("Retry pass {} resolved {} item(s)", pass, resolved)
            }
            LoaderEvent::ModificationsStarted => log::debug!("Running modifications"),
            LoaderEvent::ModificationsFinished => log::debug!("Modifications finished"),
            LoaderEvent::TestBuildsStarted { archetypes } => {
                log::info!("Building test models for {} archetype(s)", archetypes)
            }
            LoaderEvent::TestBuildsFinished { failures } => {
                if *failures > 0 {
                    log::warn!("{} test model build(s) failed", failures)
                } else {
                    log::debug!("Test model builds finished")
                }
            }
            LoaderEvent::Sealed { universe } => log::info!("Universe '{}' is sealed", universe),
        }
        Ok(())
    }
}

/// Observer list that isolates failures
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Arc<dyn LoadObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver an event to every observer
    pub fn notify(&self, event: &LoaderEvent) {
        for observer in &self.observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Load observer failed on {:?}: {}", event, e),
                Err(_) => log::warn!("Load observer panicked on {:?}", event),
            }
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_failing_observers_are_isolated() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut observers = Observers::new();
        observers.add(Arc::new(|_: &LoaderEvent| -> Result<(), String> {
            Err("broken".to_string())
        }));
        observers.add(Arc::new(|_: &LoaderEvent| -> Result<(), String> { panic!("observer bug") }));
        observers.add(Arc::new(move |event: &LoaderEvent| -> Result<(), String> {
            sink.lock().push(event.clone());
            Ok(())
        }));
        observers.add(Arc::new(LogObserver));

        observers.notify(&LoaderEvent::ModificationsStarted);
        assert_eq!(*seen.lock(), vec![LoaderEvent::ModificationsStarted]);
    }
}

//! Construction strategies and the three-stage build protocol
//!
//! `Factory::build` runs `initialize -> configure -> finalize` and then the
//! validators. When the builder carries no initializer of its own, the
//! factory's constructors are tried in a fixed order:
//!
//! 1. a constructor taking the builder
//! 2. a zero-argument constructor
//! 3. serde activation of the parameter bag (the trial invocation decides
//!    viability)
//!
//! The same factory type backs both models and components.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use void_core::TypeKey;

use crate::builder::{Builder, Configurer, Finalizer, Initializer, Validator};
use crate::error::{Error, Result};
use crate::params::Params;

/// Boxes a concrete value as the erased instance type `Self`
pub trait Upcast<M> {
    fn upcast(value: M) -> Box<Self>;
}

type DefaultCtor<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;
type Activator<T> = Arc<dyn Fn(&Params) -> std::result::Result<Box<T>, String> + Send + Sync>;

/// The constructors a type declares
pub struct Constructors<T: ?Sized> {
    with_builder: Option<Initializer<T>>,
    default: Option<DefaultCtor<T>>,
    activate: Option<Activator<T>>,
}

impl<T: ?Sized + 'static> Constructors<T> {
    /// No constructors declared
    pub fn none() -> Self {
        Self {
            with_builder: None,
            default: None,
            activate: None,
        }
    }

    /// Constructor that reads the builder
    pub fn with_builder<M, F>(mut self, f: F) -> Self
    where
        M: 'static,
        T: Upcast<M>,
        F: Fn(&Builder<T>) -> Result<M> + Send + Sync + 'static,
    {
        self.with_builder = Some(Arc::new(move |builder: &Builder<T>| f(builder).map(T::upcast)));
        self
    }

    /// Zero-argument constructor via `Default`
    pub fn with_default<M>(mut self) -> Self
    where
        M: Default + 'static,
        T: Upcast<M>,
    {
        self.default = Some(Arc::new(|| T::upcast(M::default())));
        self
    }

    /// Generic activation: deserialize the parameter bag into `M`
    pub fn with_activation<M>(mut self) -> Self
    where
        M: DeserializeOwned + 'static,
        T: Upcast<M>,
    {
        self.activate = Some(Arc::new(|params: &Params| {
            serde_json::from_value::<M>(params.to_value())
                .map(T::upcast)
                .map_err(|e| e.to_string())
        }));
        self
    }

    /// Shorthand for `none().with_builder(f)`
    pub fn builder<M, F>(f: F) -> Self
    where
        M: 'static,
        T: Upcast<M>,
        F: Fn(&Builder<T>) -> Result<M> + Send + Sync + 'static,
    {
        Self::none().with_builder(f)
    }

    /// Shorthand for `none().with_default::<M>()`
    pub fn default_of<M>() -> Self
    where
        M: Default + 'static,
        T: Upcast<M>,
    {
        Self::none().with_default::<M>()
    }

    /// Shorthand for `none().with_activation::<M>()`
    pub fn activation_of<M>() -> Self
    where
        M: DeserializeOwned + 'static,
        T: Upcast<M>,
    {
        Self::none().with_activation::<M>()
    }

    /// Whether nothing is declared
    pub fn is_empty(&self) -> bool {
        self.with_builder.is_none() && self.default.is_none() && self.activate.is_none()
    }

    /// Run the first declared strategy
    pub fn construct(&self, builder: &Builder<T>) -> Result<Box<T>> {
        if let Some(ctor) = &self.with_builder {
            return ctor(builder);
        }
        if let Some(ctor) = &self.default {
            return Ok(ctor());
        }
        if let Some(activate) = &self.activate {
            return activate(builder.params()).map_err(|cause| Error::NoViableConstructor {
                model: builder.target().name().to_string(),
                cause: format!("activation failed: {}", cause),
            });
        }
        Err(Error::NoViableConstructor {
            model: builder.target().name().to_string(),
            cause: "no constructor declared".to_string(),
        })
    }
}

impl<T: ?Sized> Clone for Constructors<T> {
    fn clone(&self) -> Self {
        Self {
            with_builder: self.with_builder.clone(),
            default: self.default.clone(),
            activate: self.activate.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Constructors<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructors")
            .field("with_builder", &self.with_builder.is_some())
            .field("default", &self.default.is_some())
            .field("activate", &self.activate.is_some())
            .finish()
    }
}

/// Per-call stage overrides and validators declared on a type
pub struct Stages<T: ?Sized> {
    pub configure: Option<Configurer<T>>,
    pub finalize: Option<Finalizer<T>>,
    pub validators: Vec<Validator<T>>,
}

impl<T: ?Sized> Default for Stages<T> {
    fn default() -> Self {
        Self {
            configure: None,
            finalize: None,
            validators: Vec::new(),
        }
    }
}

impl<T: ?Sized> Stages<T> {
    /// Set the configure stage
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<T>, &mut T) -> Result<Option<Box<T>>> + Send + Sync + 'static,
    {
        self.configure = Some(Arc::new(f));
        self
    }

    /// Set the finalize stage
    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<T>, Box<T>) -> Result<Box<T>> + Send + Sync + 'static,
    {
        self.finalize = Some(Arc::new(f));
        self
    }

    /// Add a validator
    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<T>, &T) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }
}

impl<T: ?Sized> Clone for Stages<T> {
    fn clone(&self) -> Self {
        Self {
            configure: self.configure.clone(),
            finalize: self.finalize.clone(),
            validators: self.validators.clone(),
        }
    }
}

/// A resolved construction pipeline for one target type
pub struct Factory<T: ?Sized> {
    target: TypeKey,
    constructors: Constructors<T>,
    stages: Stages<T>,
}

impl<T: ?Sized + 'static> Factory<T> {
    /// Create a factory
    pub fn new(target: impl Into<TypeKey>, constructors: Constructors<T>) -> Self {
        Self {
            target: target.into(),
            constructors,
            stages: Stages::default(),
        }
    }

    /// Set the declared stages
    pub fn with_stages(mut self, stages: Stages<T>) -> Self {
        self.stages = stages;
        self
    }

    /// The type this factory builds
    pub fn target(&self) -> &TypeKey {
        &self.target
    }

    /// The declared constructors
    pub fn constructors(&self) -> &Constructors<T> {
        &self.constructors
    }

    /// Derive a factory for a descendant: declared constructors and stages
    /// replace the inherited ones, validators accumulate
    pub fn overlay(
        &self,
        target: impl Into<TypeKey>,
        constructors: Option<&Constructors<T>>,
        stages: &Stages<T>,
    ) -> Self {
        let mut validators = self.stages.validators.clone();
        validators.extend(stages.validators.iter().cloned());
        Self {
            target: target.into(),
            constructors: match constructors {
                Some(c) if !c.is_empty() => c.clone(),
                _ => self.constructors.clone(),
            },
            stages: Stages {
                configure: stages.configure.clone().or_else(|| self.stages.configure.clone()),
                finalize: stages.finalize.clone().or_else(|| self.stages.finalize.clone()),
                validators,
            },
        }
    }

    /// Fresh builder targeting this factory's type
    pub fn builder(&self) -> Builder<T> {
        Builder::new(self.target.clone())
    }

    /// Run the pipeline
    pub fn build(&self, builder: &Builder<T>) -> Result<Box<T>> {
        self.build_with(builder, |_, _| Ok(()))
    }

    /// Run the pipeline with a hook between initialize and configure
    pub fn build_with<F>(&self, builder: &Builder<T>, after_initialize: F) -> Result<Box<T>>
    where
        F: FnOnce(&Builder<T>, &mut T) -> Result<()>,
    {
        let mut instance = match builder.initializer() {
            Some(init) => init(builder)?,
            None => self.constructors.construct(builder)?,
        };

        after_initialize(builder, &mut *instance)?;

        if let Some(configure) = builder.configurer().or(self.stages.configure.as_ref()) {
            if let Some(replacement) = configure(builder, &mut *instance)? {
                instance = replacement;
            }
        }

        if let Some(finalize) = builder.finalizer().or(self.stages.finalize.as_ref()) {
            instance = finalize(builder, instance)?;
        }

        for validator in self.stages.validators.iter().chain(builder.validators()) {
            validator(builder, &*instance).map_err(|reason| Error::Validation {
                model: builder.target().name().to_string(),
                reason,
            })?;
        }

        Ok(instance)
    }
}

impl<T: ?Sized> Clone for Factory<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            constructors: self.constructors.clone(),
            stages: self.stages.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("target", &self.target)
            .field("constructors", &self.constructors)
            .field("configure", &self.stages.configure.is_some())
            .field("finalize", &self.stages.finalize.is_some())
            .field("validators", &self.stages.validators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    trait Shape: Send + Sync + fmt::Debug {
        fn sides(&self) -> u32;
    }

    #[derive(Debug, Default, Deserialize)]
    struct Polygon {
        #[serde(default)]
        sides: u32,
    }

    impl Shape for Polygon {
        fn sides(&self) -> u32 {
            self.sides
        }
    }

    impl Upcast<Polygon> for dyn Shape {
        fn upcast(value: Polygon) -> Box<Self> {
            Box::new(value)
        }
    }

    #[test]
    fn test_builder_ctor_preferred() {
        let ctors = Constructors::<dyn Shape>::builder(|b: &Builder<dyn Shape>| {
            Ok(Polygon { sides: b.require("sides")? })
        })
        .with_default::<Polygon>();
        let factory = Factory::new("Polygon", ctors);

        let shape = factory.build(&factory.builder().with("sides", 6)).unwrap();
        assert_eq!(shape.sides(), 6);
    }

    #[test]
    fn test_default_before_activation() {
        let ctors = Constructors::<dyn Shape>::default_of::<Polygon>().with_activation::<Polygon>();
        let factory = Factory::new("Polygon", ctors);
        let shape = factory.build(&factory.builder().with("sides", 6)).unwrap();
        assert_eq!(shape.sides(), 0);
    }

    #[test]
    fn test_activation_trial_failure() {
        let factory = Factory::new("Polygon", Constructors::<dyn Shape>::activation_of::<Polygon>());
        let shape = factory.build(&factory.builder().with("sides", 3)).unwrap();
        assert_eq!(shape.sides(), 3);

        let err = factory
            .build(&factory.builder().with("sides", "many"))
            .unwrap_err();
        match err {
            Error::NoViableConstructor { model, .. } => assert_eq!(model, "Polygon"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_no_constructor() {
        let factory: Factory<dyn Shape> = Factory::new("Nothing", Constructors::none());
        assert!(matches!(
            factory.build(&factory.builder()),
            Err(Error::NoViableConstructor { .. })
        ));
    }

    #[test]
    fn test_stages_and_validators() {
        let stages = Stages::<dyn Shape>::default()
            .configure(|b, _shape| {
                let sides: u32 = b.get_or("sides", 0)?;
                Ok(Some(Box::new(Polygon { sides: sides * 2 }) as Box<dyn Shape>))
            })
            .validate(|_b, shape| {
                if shape.sides() >= 3 {
                    Ok(())
                } else {
                    Err(format!("{} sides is not a polygon", shape.sides()))
                }
            });
        let factory = Factory::new("Polygon", Constructors::default_of::<Polygon>()).with_stages(stages);

        let shape = factory.build(&factory.builder().with("sides", 2)).unwrap();
        assert_eq!(shape.sides(), 4);

        let err = factory.build(&factory.builder().with("sides", 1)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_builder_override_wins() {
        let factory = Factory::new("Polygon", Constructors::<dyn Shape>::default_of::<Polygon>());
        let builder = factory
            .builder()
            .initialize(|_| Ok(Box::new(Polygon { sides: 8 }) as Box<dyn Shape>));
        assert_eq!(factory.build(&builder).unwrap().sides(), 8);
    }
}

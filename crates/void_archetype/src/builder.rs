//! Transient builders
//!
//! A builder carries the parameter bag for one construction call plus
//! optional per-call overrides of the three construction stages. Builders
//! are cheap to clone and are never shared between calls; the only cached
//! builder is the immutable default builder of an archetype or family.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use void_core::TypeKey;

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::params::{IntoParams, Params};

/// Stage 1: produce an instance from the builder
pub type Initializer<T> = Arc<dyn Fn(&Builder<T>) -> Result<Box<T>> + Send + Sync>;

/// Stage 2: mutate the instance, optionally returning a replacement
pub type Configurer<T> = Arc<dyn Fn(&Builder<T>, &mut T) -> Result<Option<Box<T>>> + Send + Sync>;

/// Stage 3: take the instance and return the final one
pub type Finalizer<T> = Arc<dyn Fn(&Builder<T>, Box<T>) -> Result<Box<T>> + Send + Sync>;

/// Post-construction check; the error string becomes a validation error
pub type Validator<T> = Arc<dyn Fn(&Builder<T>, &T) -> std::result::Result<(), String> + Send + Sync>;

/// Parameter-carrying builder for one construction call
pub struct Builder<T: ?Sized> {
    target: TypeKey,
    archetype: Option<Identity>,
    params: Params,
    initialize: Option<Initializer<T>>,
    configure: Option<Configurer<T>>,
    finalize: Option<Finalizer<T>>,
    validators: Vec<Validator<T>>,
}

impl<T: ?Sized> Builder<T> {
    /// Create an empty builder for a target type
    pub fn new(target: impl Into<TypeKey>) -> Self {
        Self {
            target: target.into(),
            archetype: None,
            params: Params::new(),
            initialize: None,
            configure: None,
            finalize: None,
            validators: Vec::new(),
        }
    }

    /// Attach the archetype this builder builds for
    pub fn for_archetype(mut self, identity: Identity) -> Self {
        self.archetype = Some(identity);
        self
    }

    /// The type being built
    pub fn target(&self) -> &TypeKey {
        &self.target
    }

    /// The archetype building this instance, if any
    pub fn archetype(&self) -> Option<&Identity> {
        self.archetype.as_ref()
    }

    /// The parameter bag
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Builder-style parameter insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.set(key, value);
        self
    }

    /// Set a parameter in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.params.set(key, value);
        self
    }

    /// Merge a parameter bag; incoming values win
    pub fn with_params(mut self, params: impl IntoParams) -> Self {
        self.params.merge(params.into_params());
        self
    }

    /// Typed optional parameter
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        self.params.get(key).map_err(|e| Error::InvalidParameter {
            model: self.target.name().to_string(),
            param: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Typed required parameter
    pub fn require<V: DeserializeOwned>(&self, key: &str) -> Result<V> {
        self.get(key)?.ok_or_else(|| Error::MissingParameter {
            model: self.target.name().to_string(),
            param: key.to_string(),
        })
    }

    /// Typed parameter with a fallback
    pub fn get_or<V: DeserializeOwned>(&self, key: &str, default: V) -> Result<V> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Override stage 1 for this call
    pub fn initialize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<T>) -> Result<Box<T>> + Send + Sync + 'static,
    {
        self.initialize = Some(Arc::new(f));
        self
    }

    /// Override stage 2 for this call
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<T>, &mut T) -> Result<Option<Box<T>>> + Send + Sync + 'static,
    {
        self.configure = Some(Arc::new(f));
        self
    }

    /// Override stage 3 for this call
    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<T>, Box<T>) -> Result<Box<T>> + Send + Sync + 'static,
    {
        self.finalize = Some(Arc::new(f));
        self
    }

    /// Attach a validator run after the pipeline
    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Builder<T>, &T) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }

    pub(crate) fn initializer(&self) -> Option<&Initializer<T>> {
        self.initialize.as_ref()
    }

    pub(crate) fn configurer(&self) -> Option<&Configurer<T>> {
        self.configure.as_ref()
    }

    pub(crate) fn finalizer(&self) -> Option<&Finalizer<T>> {
        self.finalize.as_ref()
    }

    pub(crate) fn validators(&self) -> &[Validator<T>] {
        &self.validators
    }
}

impl<T: ?Sized> Clone for Builder<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            archetype: self.archetype.clone(),
            params: self.params.clone(),
            initialize: self.initialize.clone(),
            configure: self.configure.clone(),
            finalize: self.finalize.clone(),
            validators: self.validators.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Builder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("target", &self.target)
            .field("archetype", &self.archetype)
            .field("params", &self.params)
            .field("initialize", &self.initialize.is_some())
            .field("configure", &self.configure.is_some())
            .field("finalize", &self.finalize.is_some())
            .field("validators", &self.validators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Probe;

    #[test]
    fn test_require_names_model_and_param() {
        let builder: Builder<Probe> = Builder::new("Sword").with("damage", 5);
        assert_eq!(builder.require::<i32>("damage").unwrap(), 5);

        match builder.require::<i32>("weight") {
            Err(Error::MissingParameter { model, param }) => {
                assert_eq!(model, "Sword");
                assert_eq!(param, "weight");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_parameter() {
        let builder: Builder<Probe> = Builder::new("Sword").with("damage", "high");
        assert!(matches!(
            builder.get::<u32>("damage"),
            Err(Error::InvalidParameter { .. })
        ));
        assert_eq!(builder.get_or("speed", 2u32).unwrap(), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let original: Builder<Probe> = Builder::new("Sword").with("damage", 1);
        let mut copy = original.clone();
        copy.set("damage", 9);
        assert_eq!(original.require::<i32>("damage").unwrap(), 1);
        assert_eq!(copy.require::<i32>("damage").unwrap(), 9);
    }
}

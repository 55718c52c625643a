//! Error taxonomy for the object model
//!
//! Registration and lookup failures, builder-pipeline failures and loader
//! failures share one enum so that the loader can aggregate per-item errors
//! into its report.

use thiserror::Error;
use void_core::{TypeKey, TypeRegistryError};

use crate::loader::LoadFailure;

/// Object model errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Duplicate identity '{key}' in universe '{universe}'")]
    DuplicateIdentity { key: String, universe: String },

    #[error("'{item}' depends on '{dependency}', which is not registered yet")]
    DependencyNotReady { item: String, dependency: String },

    #[error("No viable constructor for model type '{model}': {cause}")]
    NoViableConstructor { model: String, cause: String },

    #[error("Missing required parameter '{param}' for '{model}'")]
    MissingParameter { model: String, param: String },

    #[error("Invalid parameter '{param}' for '{model}': {reason}")]
    InvalidParameter {
        model: String,
        param: String,
        reason: String,
    },

    #[error("Validation failed for '{model}': {reason}")]
    Validation { model: String, reason: String },

    #[error("No contract registered between '{a}' and '{b}'")]
    ContractMissing { a: String, b: String },

    #[error("A contract between '{a}' and '{b}' is already registered")]
    DuplicateContract { a: String, b: String },

    #[error("Universe '{universe}' is sealed")]
    SealedUniverse { universe: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Invalid declaration '{item}': {reason}")]
    InvalidDeclaration { item: String, reason: String },

    #[error("Source '{source_id}' depends on unknown source '{dependency}'")]
    SourceDependency { source_id: String, dependency: String },

    #[error("Declaration sources form a cycle through '{0}'")]
    SourceCycle(String),

    #[error("{} item(s) remain unresolved after loading", .0.len())]
    Unresolved(Vec<LoadFailure>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Type registry error: {0}")]
    TypeRegistry(#[from] TypeRegistryError),
}

impl Error {
    /// Shorthand for a strict lookup miss
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Shorthand for a retryable dependency failure
    pub fn dependency_not_ready(item: &TypeKey, dependency: &TypeKey) -> Self {
        Self::DependencyNotReady {
            item: item.name().to_string(),
            dependency: dependency.name().to_string(),
        }
    }

    /// Shorthand for a rejected declaration
    pub fn invalid_declaration(item: &TypeKey, reason: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            item: item.name().to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the loader should queue the item for another pass
    pub fn is_dependency_not_ready(&self) -> bool {
        matches!(self, Self::DependencyNotReady { .. })
    }

    /// Whether the loader must stop immediately
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateIdentity { .. } | Self::SealedUniverse { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let dep = Error::dependency_not_ready(&TypeKey::new("Sword"), &TypeKey::new("Weapon"));
        assert!(dep.is_dependency_not_ready());
        assert!(!dep.is_fatal());
        assert_eq!(
            dep.to_string(),
            "'Sword' depends on 'Weapon', which is not registered yet"
        );

        let dup = Error::DuplicateIdentity {
            key: "Sword".into(),
            universe: "main".into(),
        };
        assert!(dup.is_fatal());
        assert!(!dup.is_dependency_not_ready());
    }

    #[test]
    fn test_unresolved_message_counts_items() {
        let err = Error::Unresolved(Vec::new());
        assert_eq!(err.to_string(), "0 item(s) remain unresolved after loading");
    }
}

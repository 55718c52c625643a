//! Loader configuration
//!
//! ```toml
//! strict = true
//! max_retry_passes = 16
//! run_modifications = true
//! build_test_models = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Loader configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Abort without sealing when items remain unresolved
    pub strict: bool,
    /// Hard ceiling on retry passes; `None` relies on the progress check
    pub max_retry_passes: Option<usize>,
    /// Run source modification hooks
    pub run_modifications: bool,
    /// Trial-build every archetype before sealing
    pub build_test_models: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            strict: true,
            max_retry_passes: None,
            run_modifications: true,
            build_test_models: true,
        }
    }
}

impl LoaderConfig {
    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e: toml::de::Error| Error::Config(e.to_string()))
    }

    /// Read a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LoaderConfig::from_toml_str("max_retry_passes = 4\nbuild_test_models = false").unwrap();
        assert_eq!(
            config,
            LoaderConfig {
                max_retry_passes: Some(4),
                build_test_models: false,
                ..Default::default()
            }
        );
        assert!(config.strict);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            LoaderConfig::from_toml_str("strict = \"yes\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            LoaderConfig::from_file("/nonexistent/loader.toml"),
            Err(Error::Config(_))
        ));
    }
}

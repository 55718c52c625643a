//! Process-wide unique instance cache
//!
//! Model types that opt into uniqueness get a generated id on construction
//! and are registered here; external codecs register instances they
//! deserialize through the same entry point.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::Model;

/// Globally unique model id
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id, e.g. one read back by a codec
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self.0)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// id -> instance cache
#[derive(Default)]
pub struct UniqueCache {
    instances: RwLock<HashMap<UniqueId, Arc<dyn Model>>>,
}

impl UniqueCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its id
    ///
    /// Re-registering the same instance is a no-op; a different instance
    /// under a taken id is a duplicate.
    pub fn register(&self, id: UniqueId, instance: Arc<dyn Model>) -> Result<()> {
        let mut instances = self.instances.write();
        if let Some(existing) = instances.get(&id) {
            if Arc::ptr_eq(existing, &instance) {
                return Ok(());
            }
            return Err(Error::DuplicateIdentity {
                key: id.to_string(),
                universe: "unique-cache".to_string(),
            });
        }
        log::trace!("Cached unique instance {}", id);
        instances.insert(id, instance);
        Ok(())
    }

    /// Strict lookup
    pub fn get(&self, id: &UniqueId) -> Result<Arc<dyn Model>> {
        self.try_get(id)
            .ok_or_else(|| Error::not_found("unique instance", id.as_str()))
    }

    /// Lookup
    pub fn try_get(&self, id: &UniqueId) -> Option<Arc<dyn Model>> {
        self.instances.read().get(id).cloned()
    }

    /// Drop an instance from the cache
    pub fn remove(&self, id: &UniqueId) -> Option<Arc<dyn Model>> {
        self.instances.write().remove(id)
    }

    /// Check if an id is cached
    pub fn contains(&self, id: &UniqueId) -> bool {
        self.instances.read().contains_key(id)
    }

    /// Number of cached instances
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl fmt::Debug for UniqueCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueCache")
            .field("instances", &self.len())
            .finish()
    }
}

static UNIQUE_CACHE: OnceLock<UniqueCache> = OnceLock::new();

/// The process-wide cache
pub fn unique_cache() -> &'static UniqueCache {
    UNIQUE_CACHE.get_or_init(UniqueCache::new)
}

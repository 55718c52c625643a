//! Parameter bag
//!
//! Every construction call normalizes its inputs (ordered pairs, maps, a
//! prepared builder) into one insertion-ordered bag of JSON values.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Insertion-ordered, mergeable parameter bag
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a value, keeping the original position on replace
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Merge another bag into this one; incoming values win
    pub fn merge(&mut self, other: Params) {
        for (key, value) in other.entries {
            self.set(key, value);
        }
    }

    /// Raw value lookup
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Typed lookup; `Ok(None)` when absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.value(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }

    /// Check if a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The bag as a JSON object, used by serde activation
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

/// Anything a caller may hand to `make_with`
pub trait IntoParams {
    fn into_params(self) -> Params;
}

impl IntoParams for Params {
    fn into_params(self) -> Params {
        self
    }
}

impl IntoParams for () {
    fn into_params(self) -> Params {
        Params::new()
    }
}

impl<K: Into<String>, V: Into<Value>> IntoParams for Vec<(K, V)> {
    fn into_params(self) -> Params {
        let mut params = Params::new();
        for (k, v) in self {
            params.set(k, v);
        }
        params
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoParams for [(K, V); N] {
    fn into_params(self) -> Params {
        let mut params = Params::new();
        for (k, v) in self {
            params.set(k, v);
        }
        params
    }
}

impl<K: Into<String> + Ord, V: Into<Value>> IntoParams for BTreeMap<K, V> {
    fn into_params(self) -> Params {
        let mut params = Params::new();
        for (k, v) in self {
            params.set(k, v);
        }
        params
    }
}

// HashMap iteration order is unspecified; sort keys so the bag is stable.
impl<K: Into<String>, V: Into<Value>> IntoParams for HashMap<K, V> {
    fn into_params(self) -> Params {
        let mut pairs: Vec<(String, Value)> =
            self.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.into_params()
    }
}

//! Named identifiers for declared types and registry keys

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use alloc::boxed::Box;
use alloc::string::String;

/// FNV-1a hash of a name
#[inline]
pub fn fnv1a(name: &str) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// A string-based identifier with a precomputed hash
///
/// Equality and ordering are defined by the name alone; the hash is a
/// cache of `fnv1a(name)` used for cheap hashing.
#[derive(Clone)]
pub struct NamedId {
    name: Box<str>,
    hash: u64,
}

impl NamedId {
    /// Create a new named ID
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            hash: fnv1a(name),
        }
    }

    /// Get the name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the precomputed hash
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for NamedId {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.name == other.name
    }
}

impl Eq for NamedId {}

impl PartialOrd for NamedId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NamedId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl Hash for NamedId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for NamedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedId({:?})", self.name)
    }
}

impl fmt::Display for NamedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for NamedId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NamedId {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// Key of a declared type (archetype, model, component, enumeration or
/// an abstract intermediate type)
///
/// Declared types stand in for compiled-in type metadata: every participant
/// registers its key and its direct parent key, and ancestry is answered
/// from that graph.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey(NamedId);

impl TypeKey {
    /// Create a new type key
    pub fn new(name: &str) -> Self {
        Self(NamedId::new(name))
    }

    /// The canonical type name
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Derive a child key, e.g. `Sword` + `Fire` -> `Sword.Fire`
    pub fn child(&self, suffix: &str) -> Self {
        let mut name = String::from(self.name());
        name.push('.');
        name.push_str(suffix);
        Self::new(&name)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({:?})", self.name())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for TypeKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TypeKey {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<&TypeKey> for TypeKey {
    fn from(key: &TypeKey) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_id_equality() {
        let a = NamedId::new("Weapon");
        let b = NamedId::from("Weapon");
        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_ne!(a, NamedId::new("Sword"));
    }

    #[test]
    fn test_type_key_child() {
        let key = TypeKey::new("Sword");
        assert_eq!(key.child("Fire").name(), "Sword.Fire");
        assert_eq!(key.to_string(), "Sword");
    }

    #[test]
    fn test_type_key_ordering() {
        let mut keys = alloc::vec![TypeKey::new("b"), TypeKey::new("a"), TypeKey::new("c")];
        keys.sort();
        assert_eq!(keys[0].name(), "a");
        assert_eq!(keys[2].name(), "c");
    }
}

//! Error types for the core library
//!
//! `TypeRegistryError` is the only error `void_core` raises; higher crates
//! wrap it in their own error enums.

use core::fmt;
use alloc::boxed::Box;

/// Type registry errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRegistryError {
    /// Type not registered
    NotRegistered(Box<str>),
    /// A different descriptor is already registered under this key
    AlreadyRegistered(Box<str>),
    /// A declared parent is not registered
    UnknownParent { child: Box<str>, parent: Box<str> },
    /// The parent chain loops back on itself
    Cycle(Box<str>),
}

impl fmt::Display for TypeRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRegistryError::NotRegistered(name) => write!(f, "Type not registered: {}", name),
            TypeRegistryError::AlreadyRegistered(name) => {
                write!(f, "Type already registered with a different descriptor: {}", name)
            }
            TypeRegistryError::UnknownParent { child, parent } => {
                write!(f, "Type '{}' declares unknown parent '{}'", child, parent)
            }
            TypeRegistryError::Cycle(name) => write!(f, "Type ancestry cycle at: {}", name),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TypeRegistryError {}

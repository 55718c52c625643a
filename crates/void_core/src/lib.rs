//! # void_core - Void Engine Core
//!
//! Zero-dependency primitives shared by the object-model crates:
//! - **Identity**: named keys with precomputed hashes
//! - **Declared types**: an explicit type graph that replaces runtime
//!   type introspection (parents, kinds, loader flags)
//! - **Errors**: small, cloneable error values

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod type_registry;
pub mod error;
pub mod id;

pub use type_registry::*;
pub use error::*;
pub use id::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::type_registry::{TypeRegistry, TypeInfo, TypeKind, TypeFlags};
    pub use crate::error::TypeRegistryError;
    pub use crate::id::{NamedId, TypeKey};
}

//! Splay: one sub-archetype per enumeration value
//!
//! Eager splays expand as soon as values of their enumeration are known;
//! lazy splays expand on the first `for_value` call. Either way each
//! (archetype, value) pair is built once and cached.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use void_core::{TypeInfo, TypeKind, TypeKey};

use crate::archetype::Archetype;
use crate::declaration::{ArchetypeDecl, SplayDecl};
use crate::enumeration::EnumValue;
use crate::error::{Error, Result};
use crate::universe::Universe;

/// When splayed archetypes are built
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SplayMode {
    /// At load time, for every known value
    Eager,
    /// On first lookup of a value
    Lazy,
}

/// Produces the declaration of the sub-archetype for one value
pub type SplayConstructor = Arc<dyn Fn(&Archetype, &EnumValue) -> Result<ArchetypeDecl> + Send + Sync>;

/// Splay state of one archetype
pub struct Splay {
    enumeration: TypeKey,
    mode: SplayMode,
    constructor: Option<SplayConstructor>,
    built: RwLock<BTreeMap<EnumValue, Arc<Archetype>>>,
}

impl Splay {
    pub(crate) fn new(decl: &SplayDecl) -> Self {
        Self {
            enumeration: decl.enumeration.clone(),
            mode: decl.mode,
            constructor: decl.constructor.clone(),
            built: RwLock::new(BTreeMap::new()),
        }
    }

    /// The governing enumeration
    pub fn enumeration(&self) -> &TypeKey {
        &self.enumeration
    }

    pub fn mode(&self) -> SplayMode {
        self.mode
    }

    /// Cached sub-archetype for a value
    pub fn cached(&self, value: &EnumValue) -> Option<Arc<Archetype>> {
        self.built.read().get(value).cloned()
    }

    /// All sub-archetypes built so far, in value order
    pub fn built(&self) -> Vec<Arc<Archetype>> {
        self.built.read().values().cloned().collect()
    }

    /// Number of sub-archetypes built so far
    pub fn len(&self) -> usize {
        self.built.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.read().is_empty()
    }

    /// Sub-archetype for a value, building it on first use
    pub(crate) fn get_or_build(
        &self,
        universe: &Universe,
        owner: &Archetype,
        value: &EnumValue,
    ) -> Result<Arc<Archetype>> {
        if let Some(existing) = self.cached(value) {
            return Ok(existing);
        }

        if !universe.enumerations().is_a(value.enum_type(), &self.enumeration) {
            return Err(Error::InvalidParameter {
                model: owner.type_key().name().to_string(),
                param: "splay value".to_string(),
                reason: format!("{} is not a value of {}", value, self.enumeration),
            });
        }

        let mut decl = match &self.constructor {
            Some(constructor) => constructor(owner, value)?,
            None => ArchetypeDecl::new(owner.type_key().child(value.key())),
        };
        decl.parent = Some(owner.type_key().clone());
        decl.splay = None;

        // Splay children may appear after sealing; their type entries bypass the seal.
        let info = TypeInfo::new(decl.type_key.clone(), TypeKind::Archetype)
            .with_parent(owner.type_key().clone());
        universe.scope().types().write().register(info)?;
        let candidate = Archetype::assemble(universe, &decl, Some(value.clone()))?;

        let mut built = self.built.write();
        if let Some(existing) = built.get(value) {
            return Ok(existing.clone());
        }
        universe.archetypes().register_splayed(candidate.clone())?;
        built.insert(value.clone(), candidate.clone());
        log::debug!("Splayed {} for {}", owner.identity(), value);
        Ok(candidate)
    }
}

impl fmt::Debug for Splay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Splay")
            .field("enumeration", &self.enumeration)
            .field("mode", &self.mode)
            .field("built", &self.len())
            .finish()
    }
}

/// Splayed archetypes of one universe, keyed by governing enumeration
#[derive(Default)]
pub struct SplayTable {
    by_enumeration: RwLock<HashMap<TypeKey, Vec<Arc<Archetype>>>>,
}

impl SplayTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, archetype: Arc<Archetype>) {
        let Some(splay) = archetype.splay() else {
            return;
        };
        self.by_enumeration
            .write()
            .entry(splay.enumeration().clone())
            .or_default()
            .push(archetype);
    }

    /// Splayed archetypes governed by an enumeration type
    pub fn governed_by(&self, enumeration: &TypeKey) -> Vec<Arc<Archetype>> {
        self.by_enumeration
            .read()
            .get(enumeration)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn forget(&self, archetype: &Archetype) {
        let Some(splay) = archetype.splay() else {
            return;
        };
        if let Some(list) = self.by_enumeration.write().get_mut(splay.enumeration()) {
            list.retain(|a| a.identity() != archetype.identity());
        }
    }

    /// Splayed archetypes that expand at load time
    pub fn eager(&self) -> Vec<Arc<Archetype>> {
        self.by_enumeration
            .read()
            .values()
            .flatten()
            .filter(|a| a.splay().map_or(false, |s| s.mode() == SplayMode::Eager))
            .cloned()
            .collect()
    }

    /// Splayed archetypes still building lazily
    pub fn pending(&self) -> Vec<Arc<Archetype>> {
        self.by_enumeration
            .read()
            .values()
            .flatten()
            .filter(|a| a.splay().map_or(false, |s| s.mode() == SplayMode::Lazy))
            .cloned()
            .collect()
    }
}

/// Build the sub-archetypes of an eager splay for the given values
pub(crate) fn expand(universe: &Universe, archetype: &Arc<Archetype>, values: &[EnumValue]) -> Result<usize> {
    let Some(splay) = archetype.splay() else {
        return Ok(0);
    };
    let mut count = 0;
    for value in values {
        if splay.cached(value).is_none() {
            splay.get_or_build(universe, archetype, value)?;
            count += 1;
        }
    }
    Ok(count)
}

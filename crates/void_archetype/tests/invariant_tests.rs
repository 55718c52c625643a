//! Invariant tests for void_archetype
//!
//! These tests verify object-model guarantees that must hold for every
//! loaded universe

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use void_archetype::prelude::*;
use void_archetype::{unique_cache, ComponentMap, LoaderState};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Default)]
struct Blade {
    damage: i64,
    components: ComponentMap,
}

impl_model!(Blade, components: components);

fn blade_model() -> ModelDecl {
    ModelDecl::new("Blade").constructors(Constructors::builder(|b: &ModelBuilder| {
        Ok(Blade {
            damage: b.get_or("damage", 0)?,
            components: ComponentMap::new(),
        })
    }))
}

#[derive(Clone, Debug, Deserialize)]
struct Color {
    color: String,
}

impl_component!(Color, "Color");

#[derive(Clone, Debug, Default)]
struct Crimson;

impl_component!(Crimson, "Crimson");

#[derive(Clone, Debug, Default, Deserialize)]
struct Material {
    #[serde(default)]
    tinted: bool,
}

impl_component!(Material, "Material");

#[derive(Debug, Default)]
struct Ticket {
    id: Option<UniqueId>,
}

impl_model!(Ticket, unique: id);

#[derive(Clone, Debug, Default)]
struct Glow;

impl_component!(Glow, "Glow");

fn quiet_config() -> LoaderConfig {
    LoaderConfig {
        build_test_models: false,
        ..Default::default()
    }
}

/// INVARIANT: An acyclic declaration set of N archetypes resolves within N passes
#[test]
fn invariant_retry_loop_converges() {
    init_logging();
    const N: usize = 8;

    // Declared most-derived first so each pass can resolve exactly one level.
    let mut source = StaticSource::new("chain");
    for level in (0..N).rev() {
        let mut decl = ArchetypeDecl::new(format!("Level{}", level));
        decl = if level == 0 {
            decl.model("Blade")
        } else {
            decl.parent(format!("Level{}", level - 1))
        };
        source = source.archetype(decl);
    }
    source = source.model(blade_model());

    let universe = Universe::new("invariant-convergence");
    let mut loader = Loader::with_config(universe.clone(), quiet_config());
    loader.add_source(source);
    let report = loader.load().unwrap();

    assert!(report.unresolved.is_empty());
    assert_eq!(report.initialized(void_archetype::Category::Archetype), N);
    assert!(report.retry_passes <= N, "took {} passes", report.retry_passes);

    let deepest = universe.get(&format!("Level{}", N - 1)).unwrap();
    assert!(deepest.is_descendant_of(&universe.get("Level0").unwrap()));
}

/// INVARIANT: The no-argument make reuses one cached default builder
#[test]
fn invariant_default_builder_is_idempotent() {
    init_logging();
    let universe = Universe::new("invariant-default-builder");
    universe.declare_model(blade_model()).unwrap();
    let sword = universe
        .declare_archetype(ArchetypeDecl::new("Sword").model("Blade").default_param("damage", 3))
        .unwrap();

    let first = sword.make().unwrap();
    let tweaked = sword.make_with([("damage", 99)]).unwrap();
    let second = sword.make().unwrap();

    assert_eq!(first.downcast_ref::<Blade>().unwrap().damage, 3);
    assert_eq!(tweaked.downcast_ref::<Blade>().unwrap().damage, 99);
    assert_eq!(second.downcast_ref::<Blade>().unwrap().damage, 3);
    assert!(!Arc::ptr_eq(&first, &second));
}

/// INVARIANT: Concurrent first builds share one default builder
#[test]
fn invariant_default_builder_built_once_under_contention() {
    init_logging();
    let universe = Universe::new("invariant-default-builder-threads");
    universe.declare_model(blade_model()).unwrap();
    let sword = universe
        .declare_archetype(ArchetypeDecl::new("Sword").model("Blade").default_param("damage", 3))
        .unwrap();

    let addresses: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                scope.spawn(|| {
                    let model = sword.make().unwrap();
                    assert_eq!(model.downcast_ref::<Blade>().unwrap().damage, 3);
                    sword.default_builder() as *const ModelBuilder as usize
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let cached = sword.default_builder() as *const ModelBuilder as usize;
    assert!(addresses.iter().all(|&address| address == cached));
}

/// INVARIANT: Unique models get distinct ids and are fetchable from the cache
#[test]
fn invariant_unique_ids() {
    init_logging();
    let universe = Universe::new("invariant-unique");
    universe
        .declare_model(
            ModelDecl::new("Ticket")
                .constructors(Constructors::default_of::<Ticket>())
                .unique("id"),
        )
        .unwrap();
    let pass = universe
        .declare_archetype(ArchetypeDecl::new("Pass").model("Ticket"))
        .unwrap();

    let a = pass.make_with(()).unwrap();
    let b = pass.make_with(()).unwrap();
    let id_a = a.unique_id().unwrap().clone();
    let id_b = b.unique_id().unwrap().clone();

    assert_ne!(id_a, id_b);
    assert!(Arc::ptr_eq(&unique_cache().get(&id_a).unwrap(), &a));
    assert!(Arc::ptr_eq(&unique_cache().get(&id_b).unwrap(), &b));
}

/// INVARIANT: One component per component-base key per owner
#[test]
fn invariant_component_key_is_unique_per_owner() {
    init_logging();
    let universe = Universe::new("invariant-component-key");
    universe
        .declare_component(
            ComponentDecl::new("Color")
                .root()
                .constructors(Constructors::activation_of::<Color>()),
        )
        .unwrap();
    universe
        .declare_component(
            ComponentDecl::new("Crimson")
                .parent("Color")
                .constructors(Constructors::default_of::<Crimson>()),
        )
        .unwrap();

    let system = universe.components();
    let owner = ComponentMap::new();
    system
        .attach(&owner, system.make(&TypeKey::new("Color"), [("color", "blue")]).unwrap())
        .unwrap();
    let replaced = system
        .attach(&owner, system.make(&TypeKey::new("Crimson"), ()).unwrap())
        .unwrap();

    assert_eq!(owner.len(), 1);
    assert!(replaced.unwrap().is::<Color>());
    assert!(owner.get_by_name("Color").unwrap().is::<Crimson>());
}

/// INVARIANT: A contract runs exactly once per owner, in either attach order
#[test]
fn invariant_contract_runs_once() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let universe = Universe::new("invariant-contract");
    universe
        .declare_component(
            ComponentDecl::new("Color")
                .root()
                .constructors(Constructors::activation_of::<Color>()),
        )
        .unwrap();
    universe
        .declare_component(
            ComponentDecl::new("Material")
                .root()
                .constructors(Constructors::activation_of::<Material>())
                .contract("Color", move |first, _second| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    assert!(first.is::<Color>());
                    Ok(ContractOutcome {
                        replace_first: None,
                        replace_second: Some(Arc::new(Material { tinted: true })),
                    })
                }),
        )
        .unwrap();

    let system = universe.components();
    let color = || system.make(&TypeKey::new("Color"), [("color", "red")]).unwrap();
    let material = || system.make(&TypeKey::new("Material"), ()).unwrap();

    let forward = ComponentMap::new();
    system.attach(&forward, color()).unwrap();
    system.attach(&forward, material()).unwrap();

    let backward = ComponentMap::new();
    system.attach(&backward, material()).unwrap();
    system.attach(&backward, color()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Replacing a component does not run the pair again
    system.attach(&forward, color()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(forward.get_as::<Material>("Material").unwrap().tinted);
    assert!(backward.get_as::<Material>("Material").unwrap().tinted);
    assert!(system
        .contract_for(&TypeKey::new("Color"), &TypeKey::new("Material"))
        .is_ok());
    assert!(matches!(
        system.contract_for(&TypeKey::new("Color"), &TypeKey::new("Color")),
        Err(Error::ContractMissing { .. })
    ));
}

fn splay_source() -> StaticSource {
    StaticSource::new("magic")
        .enumeration(EnumerationDecl::new("Element", ["Fire", "Ice"]))
        .enumeration(EnumerationDecl::new("ExoticElement", ["Void"]).base("Element"))
        .archetype(
            ArchetypeDecl::new("Staff")
                .model("Blade")
                .splay(SplayDecl::new("Element", SplayMode::Eager)),
        )
        .archetype(
            ArchetypeDecl::new("Wand")
                .model("Blade")
                .splay(SplayDecl::new("Element", SplayMode::Lazy)),
        )
        .model(blade_model())
}

/// INVARIANT: An eager splay over k values yields exactly k sub-archetypes
#[test]
fn invariant_eager_splay_cardinality() {
    init_logging();
    let universe = Universe::new("invariant-splay-eager");
    let mut loader = Loader::new(universe.clone());
    loader.add_source(splay_source());
    loader.load().unwrap();

    let staff = universe.get("Staff").unwrap();
    assert_eq!(staff.splayed().len(), 3);

    let fire = staff.for_key("Fire").unwrap();
    assert_eq!(staff.splayed().len(), 3);
    assert!(Arc::ptr_eq(&fire, &universe.get("Staff.Fire").unwrap()));
    assert_eq!(fire.base().unwrap().key(), "Staff");
    assert_eq!(fire.splay_value().unwrap().key(), "Fire");
    assert!(universe.get("Staff.Void").is_ok());
}

/// INVARIANT: A lazy splay builds each value once, on first lookup
#[test]
fn invariant_lazy_splay_cardinality() {
    init_logging();
    let universe = Universe::new("invariant-splay-lazy");
    let mut loader = Loader::new(universe.clone());
    loader.add_source(splay_source());
    loader.load().unwrap();

    let wand = universe.get("Wand").unwrap();
    assert!(wand.splayed().is_empty());
    assert!(universe.try_get("Wand.Fire").is_none());

    for _ in 0..2 {
        for key in ["Fire", "Ice", "Void"] {
            wand.for_key(key).unwrap();
        }
    }
    assert_eq!(wand.splayed().len(), 3);

    let ice = universe.get("Wand.Ice").unwrap();
    assert!(Arc::ptr_eq(&ice, &wand.for_key("Ice").unwrap()));
    assert!(matches!(wand.for_key("Earth"), Err(Error::NotFound { .. })));
}

/// INVARIANT: Concurrent first lookups of a lazy splay value build one archetype
#[test]
fn invariant_lazy_splay_built_once_under_contention() {
    init_logging();
    let universe = Universe::new("invariant-splay-lazy-threads");
    let mut loader = Loader::new(universe.clone());
    loader.add_source(splay_source());
    loader.load().unwrap();

    let wand = universe.get("Wand").unwrap();
    let built: Vec<Arc<Archetype>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| wand.for_key("Fire").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(built.iter().all(|fire| Arc::ptr_eq(fire, &built[0])));
    assert_eq!(wand.splayed().len(), 1);
    assert!(Arc::ptr_eq(&built[0], &universe.get("Wand.Fire").unwrap()));
}

/// INVARIANT: An eager splay whose children wait on a later source still
/// yields one sub-archetype per value
#[test]
fn invariant_eager_splay_waits_for_dependencies() {
    init_logging();
    let universe = Universe::new("invariant-splay-eager-waits");
    let mut loader = Loader::new(universe.clone());
    loader
        .add_source(
            StaticSource::new("models")
                .model(blade_model())
                .enumeration(EnumerationDecl::new("Element", ["Fire", "Ice"])),
        )
        .add_source(
            StaticSource::new("core").depends_on("models").archetype(
                ArchetypeDecl::new("Potion").model("Blade").splay(
                    SplayDecl::new("Element", SplayMode::Eager).constructor(
                        |owner: &Archetype, value: &EnumValue| {
                            Ok(ArchetypeDecl::new(owner.type_key().child(value.key()))
                                .model_component("Glow"))
                        },
                    ),
                ),
            ),
        )
        .add_source(
            StaticSource::new("late")
                .depends_on("core")
                .component(ComponentDecl::new("Glow").root().constructors(Constructors::default_of::<Glow>())),
        );

    let report = loader.load().unwrap();
    assert!(report.is_clean(), "{}", report);
    assert!(report.retry_passes >= 1);

    let potion = universe.get("Potion").unwrap();
    assert_eq!(potion.splayed().len(), 2);
    let fire = universe.get("Potion.Fire").unwrap().make().unwrap();
    assert!(fire.components().unwrap().get_by_name("Glow").is_some());
}

/// INVARIANT: A contract whose executor fails runs again on the next attach
#[test]
fn invariant_failed_contract_runs_again() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let universe = Universe::new("invariant-contract-failure");
    universe
        .declare_component(
            ComponentDecl::new("Color")
                .root()
                .constructors(Constructors::activation_of::<Color>()),
        )
        .unwrap();
    universe
        .declare_component(
            ComponentDecl::new("Material")
                .root()
                .constructors(Constructors::activation_of::<Material>())
                .contract("Color", move |_first, _second| {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(Error::Config("pigment not ready".to_string()));
                    }
                    Ok(ContractOutcome {
                        replace_first: None,
                        replace_second: Some(Arc::new(Material { tinted: true })),
                    })
                }),
        )
        .unwrap();

    let system = universe.components();
    let owner = ComponentMap::new();
    system
        .attach(&owner, system.make(&TypeKey::new("Color"), [("color", "red")]).unwrap())
        .unwrap();
    let material = || system.make(&TypeKey::new("Material"), ()).unwrap();

    assert!(system.attach(&owner, material()).is_err());
    assert_eq!(owner.len(), 1);

    system.attach(&owner, material()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(owner.get_as::<Material>("Material").unwrap().tinted);
    assert_eq!(system.execute_contracts(&owner).unwrap(), 0);
}

/// INVARIANT: Base links are independent of declaration order
#[test]
fn invariant_weapon_sword_in_either_order() {
    init_logging();
    let weapon = || ArchetypeDecl::new("Weapon").model("Blade");
    let sword = || ArchetypeDecl::new("Sword").parent("Weapon");

    let orders = [
        StaticSource::new("weapons").archetype(weapon()).archetype(sword()),
        StaticSource::new("weapons").archetype(sword()).archetype(weapon()),
    ];
    for (i, source) in orders.into_iter().enumerate() {
        let universe = Universe::new(&format!("invariant-weapon-order-{}", i));
        let mut loader = Loader::new(universe.clone());
        loader
            .add_source(StaticSource::new("models").model(blade_model()))
            .add_source(source.depends_on("models"));
        loader.load().unwrap();

        let weapon = universe.get("Weapon").unwrap();
        let sword = universe.get("Sword").unwrap();
        assert!(weapon.is_base());
        assert_eq!(**sword.base().unwrap(), *weapon);

        let model = sword.make_with([("damage", 5)]).unwrap();
        assert_eq!(model.downcast_ref::<Blade>().unwrap().damage, 5);
    }
}

/// INVARIANT: Component parameters reach the built component
#[test]
fn invariant_color_component() {
    init_logging();
    let universe = Universe::new("invariant-color");
    universe
        .declare_component(
            ComponentDecl::new("Color")
                .root()
                .constructors(Constructors::activation_of::<Color>()),
        )
        .unwrap();

    let system = universe.components();
    assert_eq!(system.key_of(&TypeKey::new("Color")).unwrap().name(), "Color");

    let color = system.make(&TypeKey::new("Color"), [("color", "red")]).unwrap();
    assert_eq!(color.downcast_ref::<Color>().unwrap().color, "red");
}

/// INVARIANT: Strict lookups fail on a sealed universe, try-lookups do not
#[test]
fn invariant_sealed_lookups() {
    init_logging();
    let universe = Universe::new("invariant-sealed-lookups");
    let mut loader = Loader::new(universe.clone());
    loader.add_source(
        StaticSource::new("weapons")
            .model(blade_model())
            .archetype(ArchetypeDecl::new("Weapon").model("Blade")),
    );
    loader.load().unwrap();
    assert_eq!(*loader.state(), LoaderState::Sealed);

    assert!(matches!(
        universe.get("nonexistent-key"),
        Err(Error::NotFound { .. })
    ));
    assert!(universe.try_get("nonexistent-key").is_none());
    assert!(matches!(
        universe.declare_archetype(ArchetypeDecl::new("Axe").parent("Weapon")),
        Err(Error::SealedUniverse { .. })
    ));
}

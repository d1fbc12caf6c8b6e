use std::{error::Error, sync::Arc};

use ::escdf::{
    dataset::DatasetError,
    group::{Group, GroupError, GroupOpenMode},
    specs::{escdf, register_escdf_specs, DefinitionsError, SpecError, SpecsRegistry},
    storage::{store::MemoryStore, HierarchyStorageTraits},
    validation::ValidationError,
};

fn escdf_registry() -> Result<SpecsRegistry, Box<dyn Error>> {
    let mut registry = SpecsRegistry::new();
    register_escdf_specs(&mut registry)?;
    Ok(registry)
}

#[test]
fn registry_lookup() -> Result<(), Box<dyn Error>> {
    let mut registry = escdf_registry()?;
    let system = registry.group(escdf::SYSTEM)?;
    assert!(Arc::ptr_eq(&system, &registry.group_by_name("system")?));
    assert_eq!(registry.group(escdf::DENSITY)?.default_path(), "fields/density");
    assert!(matches!(
        register_escdf_specs(&mut registry),
        Err(DefinitionsError::Spec(SpecError::DuplicateId { .. }))
    ));
    Ok(())
}

#[test]
fn system_attributes() -> Result<(), Box<dyn Error>> {
    let registry = escdf_registry()?;
    let store = Arc::new(MemoryStore::new());
    let root = store.root();
    let mut system = Group::open_or_create(store.clone(), &registry, &root, escdf::SYSTEM, None)?;
    assert_eq!(system.open_mode(), GroupOpenMode::Created);

    // dependent array before its governing scalar
    assert!(matches!(
        system.set_attribute(escdf::DIMENSION_TYPES, vec![0u32, 0, 0]),
        Err(GroupError::Validation(ValidationError::DimensionMissing { .. }))
    ));
    system.set_attribute(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS, 3u32)?;
    system.set_attribute(escdf::DIMENSION_TYPES, vec![0u32, 0, 0])?;
    assert_eq!(system.attribute::<u32>(escdf::DIMENSION_TYPES)?, vec![0, 0, 0]);

    // out of range leaves the previous value
    assert!(matches!(
        system.set_attribute(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS, 4u32),
        Err(GroupError::Validation(ValidationError::RangeError { .. }))
    ));
    assert_eq!(system.scalar::<u32>(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS)?, 3);

    assert!(matches!(
        system.scalar::<u32>(escdf::NUMBER_OF_SPECIES),
        Err(GroupError::Uninitialized(_))
    ));

    system.set_attribute(escdf::EMBEDDED_SYSTEM, false)?;
    system.set_attribute(escdf::SYSTEM_NAME, "NiO")?;
    system.set_attribute(
        escdf::LATTICE_VECTORS,
        vec![4.17, 0.0, 0.0, 0.0, 4.17, 0.0, 0.0, 0.0, 4.17],
    )?;
    assert!(!system.scalar::<bool>(escdf::EMBEDDED_SYSTEM)?);
    assert_eq!(system.scalar::<String>(escdf::SYSTEM_NAME)?, "NiO");
    assert_eq!(system.attribute_shape(escdf::LATTICE_VECTORS)?, vec![3, 3]);
    system.check_mandatory()?;
    system.close()?;

    let system = Group::open_or_create(store, &registry, &root, escdf::SYSTEM, None)?;
    assert_eq!(system.open_mode(), GroupOpenMode::Opened);
    assert_eq!(system.scalar::<String>(escdf::SYSTEM_NAME)?, "NiO");
    assert_eq!(system.attribute::<f64>(escdf::LATTICE_VECTORS)?[4], 4.17);
    assert!(!system.is_set(escdf::NUMBER_OF_SITES)?);
    Ok(())
}

#[test]
fn site_positions() -> Result<(), Box<dyn Error>> {
    let registry = escdf_registry()?;
    let store = Arc::new(MemoryStore::new());
    let root = store.root();
    let mut system = Group::open_or_create(store.clone(), &registry, &root, escdf::SYSTEM, None)?;
    system.set_attribute(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS, 3u32)?;
    system.set_attribute(escdf::NUMBER_OF_SITES, 3u32)?;

    let positions = [
        0.0, 0.0, 0.0, //
        0.0, 0.5, 0.333_333_3, //
        0.5, 0.0, 0.666_666_7,
    ];
    let mut dataset = system.create_dataset(escdf::FRACTIONAL_SITE_POSITIONS)?;
    assert_eq!(dataset.shape(), &[3, 3]);
    dataset.write_full(positions.as_slice())?;
    dataset.close()?;

    let dataset = system.open_dataset(escdf::FRACTIONAL_SITE_POSITIONS)?;
    let read = dataset.read_full::<f64>()?;
    assert_eq!(read.len(), 9);
    for (read, expected) in read.iter().zip(positions) {
        assert!((read - expected).abs() < 1e-7);
    }
    drop(dataset);

    // the stored shape no longer matches the number of sites
    system.set_attribute(escdf::NUMBER_OF_SITES, 4u32)?;
    assert!(matches!(
        system.open_dataset(escdf::FRACTIONAL_SITE_POSITIONS),
        Err(DatasetError::Validation(ValidationError::ShapeMismatch { .. }))
    ));
    Ok(())
}

#[test]
fn species_names() -> Result<(), Box<dyn Error>> {
    let registry = escdf_registry()?;
    let store = Arc::new(MemoryStore::new());
    let root = store.root();
    let mut system = Group::open_or_create(store.clone(), &registry, &root, escdf::SYSTEM, None)?;
    let names = ["Copper", "Oxygen", "Oxygen 2", "Nickel", "Empty"];
    system.set_attribute(escdf::NUMBER_OF_SPECIES, 5u32)?;
    let dataset = system.create_dataset(escdf::SPECIES_NAMES)?;
    dataset.write_full(names.to_vec())?;
    assert_eq!(dataset.read_full::<String>()?, names);
    assert_eq!(dataset.read_at::<String>(&[vec![3], vec![1]])?, ["Nickel", "Oxygen"]);
    Ok(())
}

#[test]
fn density_values_on_grid() -> Result<(), Box<dyn Error>> {
    let registry = escdf_registry()?;
    let store = Arc::new(MemoryStore::new());
    let root = store.root();
    let mut density = Group::open_or_create(store.clone(), &registry, &root, escdf::DENSITY, None)?;
    assert_eq!(density.path().as_str(), "/fields/density");
    assert!(store.group_exists(&root, "fields")?);

    density.set_attribute(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS, 3u32)?;
    density.set_attribute(escdf::NUMBER_OF_GRID_POINTS, vec![2u32, 3, 4])?;
    density.set_attribute(escdf::NUMBER_OF_COMPONENTS, 1u32)?;
    assert!(matches!(
        density.check_mandatory(),
        Err(GroupError::Uninitialized(_))
    ));
    density.set_attribute(escdf::DIMENSION_TYPES, vec![0u32, 0, 0])?;
    density.set_attribute(escdf::REAL_OR_COMPLEX, 1u32)?;
    density.check_mandatory()?;

    let values = density.create_dataset(escdf::VALUES_ON_GRID)?;
    assert_eq!(values.shape(), &[1, 24, 1]);
    let ordering = density.create_dataset(escdf::GRID_ORDERING)?;
    assert_eq!(ordering.shape(), &[24]);
    Ok(())
}

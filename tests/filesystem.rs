use std::{error::Error, sync::Arc};

use ::escdf::{
    group::{Group, GroupError, GroupOpenMode},
    selection::Hyperslab,
    specs::{escdf, register_escdf_specs, SpecsRegistry},
    storage::{store::FilesystemStore, HierarchyStorageTraits},
    validation::ValidationError,
};

#[test]
#[cfg_attr(miri, ignore)]
fn filesystem_system_group() -> Result<(), Box<dyn Error>> {
    let mut registry = SpecsRegistry::new();
    register_escdf_specs(&mut registry)?;
    let path = tempfile::TempDir::new()?;
    let names = ["Copper", "Oxygen", "Oxygen 2", "Nickel", "Empty"];

    {
        let store = Arc::new(FilesystemStore::new(path.path())?);
        let root = store.root();
        let mut system =
            Group::open_or_create(store.clone(), &registry, &root, escdf::SYSTEM, None)?;
        system.set_attribute(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS, 3u32)?;
        system.set_attribute(escdf::NUMBER_OF_SPECIES, 5u32)?;
        system.set_attribute(escdf::NUMBER_OF_SITES, 5u32)?;
        system.set_attribute(escdf::NUMBER_OF_SPECIES_AT_SITE, vec![1u32, 1, 1, 1, 1])?;

        let species = system.create_dataset(escdf::SPECIES_NAMES)?;
        species.write_full(names.to_vec())?;

        let positions = system.create_dataset(escdf::CARTESIAN_SITE_POSITIONS)?;
        positions.write_slice(
            &Hyperslab::new(vec![1, 0], vec![2, 3]),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )?;
    }

    let store = Arc::new(FilesystemStore::new(path.path())?);
    let root = store.root();
    let mut system = Group::open_or_create(store.clone(), &registry, &root, escdf::SYSTEM, None)?;
    assert_eq!(system.open_mode(), GroupOpenMode::Opened);
    assert!(system.is_dataset_present(escdf::SPECIES_NAMES)?);
    assert!(!system.is_dataset_present(escdf::FRACTIONAL_SITE_POSITIONS)?);
    assert_eq!(system.scalar::<u32>(escdf::NUMBER_OF_SPECIES)?, 5);
    assert_eq!(
        system.attribute::<u32>(escdf::NUMBER_OF_SPECIES_AT_SITE)?,
        vec![1, 1, 1, 1, 1]
    );

    let species = system.open_dataset(escdf::SPECIES_NAMES)?;
    assert_eq!(species.read_full::<String>()?, names);

    let positions = system.open_dataset(escdf::CARTESIAN_SITE_POSITIONS)?;
    assert_eq!(positions.shape(), &[5, 3]);
    let values = positions.read_full::<f64>()?;
    assert_eq!(&values[..3], &[0.0; 3]);
    assert_eq!(&values[3..9], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(&values[9..], &[0.0; 6]);
    drop(species);
    drop(positions);

    // stored positions no longer match the number of sites
    system.set_attribute(escdf::NUMBER_OF_SITES, 4u32)?;
    system.close()?;
    assert!(matches!(
        Group::open_or_create(store, &registry, &root, escdf::SYSTEM, None),
        Err(GroupError::Validation(ValidationError::ShapeMismatch { .. }))
    ));
    Ok(())
}

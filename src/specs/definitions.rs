//! Specification definitions in JSON.
//!
//! A definitions document lists attributes, datasets, and groups by name:
//! ```json
//! {
//!     "Version": "0.1",
//!     "Attributes": [
//!         { "Name": "number_of_sites", "Data_type": "uint", "Dimensions": 0, "Range": [1, null] }
//!     ],
//!     "Datasets": [
//!         { "Name": "fractional_site_positions", "Data_type": "double", "Dimensions": 2,
//!           "Dims_definitions": ["number_of_sites", 3] }
//!     ],
//!     "Groups": [
//!         { "Name": "system", "Attributes": ["number_of_sites"], "Datasets": ["fractional_site_positions"] }
//!     ]
//! }
//! ```
//! Ids are assigned in order of appearance within each section.
//! A dimension definition is either a fixed extent or the name of an attribute.
//! A missing range bound is unbounded.

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use crate::data_type::DataType;

use super::{
    AttributeId, AttributeSpec, DatasetId, DatasetSpec, Dimension, GroupId, GroupSpec,
    GroupSpecBuilder, SpecError, SpecKind, SpecsRegistry,
};

/// The built-in ESCDF definitions.
///
/// Their ids are listed in [`escdf`](super::escdf).
pub const ESCDF_DEFINITIONS: &str = include_str!("escdf.json");

/// A definitions error.
#[derive(Debug, Error)]
pub enum DefinitionsError {
    /// The definitions are not valid JSON or do not follow the definitions layout.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
    /// A name refers to an undefined attribute or dataset.
    #[error("{referrer} refers to undefined {kind} {name}")]
    UnknownName {
        /// The kind of the undefined specification.
        kind: SpecKind,
        /// The undefined name.
        name: String,
        /// The name of the referring specification.
        referrer: String,
    },
    /// The rank does not match the number of dimension definitions.
    #[error("{name} has rank {rank} but {dims} dimension definitions")]
    RankMismatch {
        /// The name of the attribute or dataset.
        name: String,
        /// The declared rank.
        rank: usize,
        /// The number of dimension definitions.
        dims: usize,
    },
    /// A specification error.
    #[error(transparent)]
    Spec(#[from] SpecError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DimensionDefinition {
    Fixed(u64),
    Attribute(String),
}

#[derive(Debug, Clone, Deserialize)]
struct ElementDefinition {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Data_type")]
    data_type: DataType,
    #[serde(rename = "Dimensions", default)]
    rank: usize,
    #[serde(rename = "Dims_definitions", default)]
    dims: Vec<DimensionDefinition>,
    #[serde(rename = "Stringlength", default)]
    string_length: Option<usize>,
    #[serde(rename = "Range", default)]
    range: Option<(Option<f64>, Option<f64>)>,
    #[serde(rename = "Mandatory", default)]
    mandatory: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GroupDefinition {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Path", default)]
    path: Option<String>,
    #[serde(rename = "Attributes", default)]
    attributes: Vec<String>,
    #[serde(rename = "Datasets", default)]
    datasets: Vec<String>,
}

/// Attribute, dataset, and group specifications defined in JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecDefinitions {
    #[serde(rename = "Version", default)]
    version: String,
    #[serde(rename = "Attributes", default)]
    attributes: Vec<ElementDefinition>,
    #[serde(rename = "Datasets", default)]
    datasets: Vec<ElementDefinition>,
    #[serde(rename = "Groups", default)]
    groups: Vec<GroupDefinition>,
}

impl SpecDefinitions {
    /// Parse definitions from JSON.
    ///
    /// # Errors
    /// Returns [`DefinitionsError::InvalidJson`] if `json` is not a valid definitions document.
    pub fn from_json(json: &str) -> Result<Self, DefinitionsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The definitions version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Build the group specifications.
    ///
    /// Attributes and datasets which no group refers to are logged as warnings.
    ///
    /// # Errors
    /// Returns a [`DefinitionsError`] if a name is undefined, a rank is inconsistent, or a group specification is invalid.
    pub fn group_specs(&self) -> Result<Vec<GroupSpec>, DefinitionsError> {
        let attribute_ids = ids_by_name(SpecKind::Attribute, &self.attributes)?;
        let dataset_ids = ids_by_name(SpecKind::Dataset, &self.datasets)?;

        let attributes = self
            .attributes
            .iter()
            .map(|definition| {
                let dims = resolve_dims(definition, &attribute_ids)?;
                let mut spec = AttributeSpec::new(
                    AttributeId(attribute_ids[definition.name.as_str()]),
                    &definition.name,
                    definition.data_type,
                )
                .with_dims(dims);
                if let Some((min, max)) = definition.range {
                    spec = spec.with_range(
                        min.unwrap_or(f64::NEG_INFINITY),
                        max.unwrap_or(f64::INFINITY),
                    );
                }
                if let Some(string_length) = definition.string_length.filter(|&l| l > 0) {
                    spec = spec.with_string_length(string_length);
                }
                if definition.mandatory {
                    spec = spec.mandatory();
                }
                Ok(Arc::new(spec))
            })
            .collect::<Result<Vec<_>, DefinitionsError>>()?;

        let datasets = self
            .datasets
            .iter()
            .map(|definition| {
                let dims = resolve_dims(definition, &attribute_ids)?;
                let mut spec = DatasetSpec::new(
                    DatasetId(dataset_ids[definition.name.as_str()]),
                    &definition.name,
                    definition.data_type,
                    dims,
                );
                if let Some((min, max)) = definition.range {
                    spec = spec.with_range(
                        min.unwrap_or(f64::NEG_INFINITY),
                        max.unwrap_or(f64::INFINITY),
                    );
                }
                if let Some(string_length) = definition.string_length.filter(|&l| l > 0) {
                    spec = spec.with_string_length(string_length);
                }
                Ok(Arc::new(spec))
            })
            .collect::<Result<Vec<_>, DefinitionsError>>()?;

        let mut attribute_uses = vec![0usize; attributes.len()];
        let mut dataset_uses = vec![0usize; datasets.len()];
        let mut group_specs = Vec::with_capacity(self.groups.len());
        for (index, group) in self.groups.iter().enumerate() {
            let mut builder = GroupSpecBuilder::new(GroupId(as_id(index)), &group.name);
            if let Some(path) = &group.path {
                builder.parent_path(path);
            }
            for name in &group.attributes {
                let id = lookup::<AttributeId>(&attribute_ids, SpecKind::Attribute, name, &group.name)?;
                attribute_uses[id.0 as usize] += 1;
                builder.attribute(attributes[id.0 as usize].clone());
            }
            for name in &group.datasets {
                let id = lookup::<DatasetId>(&dataset_ids, SpecKind::Dataset, name, &group.name)?;
                dataset_uses[id.0 as usize] += 1;
                builder.dataset(datasets[id.0 as usize].clone());
            }
            if group.attributes.is_empty() {
                log::warn!("group {} has no attributes", group.name);
            }
            group_specs.push(builder.build()?);
        }

        for (attribute, uses) in attributes.iter().zip(attribute_uses) {
            if uses == 0 {
                log::warn!("attribute {} is not referenced in any group", attribute.name());
            }
        }
        for (dataset, uses) in datasets.iter().zip(dataset_uses) {
            if uses == 0 {
                log::warn!("dataset {} is not referenced in any group", dataset.name());
            }
        }

        Ok(group_specs)
    }

    /// Build the group specifications and register them in `registry`.
    ///
    /// Groups registered before an error is encountered stay registered.
    ///
    /// # Errors
    /// Returns a [`DefinitionsError`] if a group specification is invalid or cannot be registered.
    pub fn register_into(
        &self,
        registry: &mut SpecsRegistry,
    ) -> Result<Vec<Arc<GroupSpec>>, DefinitionsError> {
        self.group_specs()?
            .into_iter()
            .map(|spec| Ok(registry.register(spec)?))
            .collect()
    }
}

/// Register the built-in ESCDF specifications in `registry`.
///
/// # Errors
/// Returns a [`DefinitionsError`] if they conflict with specifications already in `registry`.
pub fn register_escdf_specs(
    registry: &mut SpecsRegistry,
) -> Result<Vec<Arc<GroupSpec>>, DefinitionsError> {
    SpecDefinitions::from_json(ESCDF_DEFINITIONS)?.register_into(registry)
}

#[allow(clippy::cast_possible_truncation)]
fn as_id(index: usize) -> u32 {
    index as u32
}

fn ids_by_name(
    kind: SpecKind,
    definitions: &[ElementDefinition],
) -> Result<HashMap<&str, u32>, SpecError> {
    let mut ids = HashMap::with_capacity(definitions.len());
    for (index, definition) in definitions.iter().enumerate() {
        if ids.insert(definition.name.as_str(), as_id(index)).is_some() {
            return Err(SpecError::DuplicateName {
                kind,
                name: definition.name.clone(),
            });
        }
    }
    Ok(ids)
}

fn lookup<T: From<u32>>(
    ids: &HashMap<&str, u32>,
    kind: SpecKind,
    name: &str,
    referrer: &str,
) -> Result<T, DefinitionsError> {
    ids.get(name)
        .map(|&id| T::from(id))
        .ok_or_else(|| DefinitionsError::UnknownName {
            kind,
            name: name.to_string(),
            referrer: referrer.to_string(),
        })
}

fn resolve_dims(
    definition: &ElementDefinition,
    attribute_ids: &HashMap<&str, u32>,
) -> Result<Vec<Dimension>, DefinitionsError> {
    if definition.rank != definition.dims.len() {
        return Err(DefinitionsError::RankMismatch {
            name: definition.name.clone(),
            rank: definition.rank,
            dims: definition.dims.len(),
        });
    }
    definition
        .dims
        .iter()
        .map(|dim| match dim {
            DimensionDefinition::Fixed(extent) => Ok(Dimension::Fixed(*extent)),
            DimensionDefinition::Attribute(name) => Ok(Dimension::Attribute(lookup(
                attribute_ids,
                SpecKind::Attribute,
                name,
                &definition.name,
            )?)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::escdf;

    #[test]
    fn escdf_definitions_ids() {
        let mut registry = SpecsRegistry::new();
        let groups = register_escdf_specs(&mut registry).unwrap();
        assert_eq!(groups.len(), 2);

        let system = registry.group(escdf::SYSTEM).unwrap();
        assert_eq!(system.name(), "system");
        assert_eq!(system.default_path(), "system");
        let density = registry.group_by_name("density").unwrap();
        assert_eq!(density.id(), escdf::DENSITY);
        assert_eq!(density.default_path(), "fields/density");

        for (id, name) in [
            (escdf::NUMBER_OF_PHYSICAL_DIMENSIONS, "number_of_physical_dimensions"),
            (escdf::DIMENSION_TYPES, "dimension_types"),
            (escdf::EMBEDDED_SYSTEM, "embedded_system"),
            (escdf::SYSTEM_NAME, "system_name"),
            (escdf::NUMBER_OF_SPECIES, "number_of_species"),
            (escdf::NUMBER_OF_SITES, "number_of_sites"),
            (escdf::LATTICE_VECTORS, "lattice_vectors"),
            (escdf::NUMBER_OF_SPECIES_AT_SITE, "number_of_species_at_site"),
            (escdf::NUMBER_OF_GRID_POINTS, "number_of_grid_points"),
            (escdf::NUMBER_OF_COMPONENTS, "number_of_components"),
            (escdf::REAL_OR_COMPLEX, "real_or_complex"),
        ] {
            assert_eq!(registry.attribute(id).unwrap().name(), name);
        }
        for (id, name) in [
            (escdf::SPECIES_NAMES, "species_names"),
            (escdf::FRACTIONAL_SITE_POSITIONS, "fractional_site_positions"),
            (escdf::CARTESIAN_SITE_POSITIONS, "cartesian_site_positions"),
            (escdf::VALUES_ON_GRID, "values_on_grid"),
            (escdf::GRID_ORDERING, "grid_ordering"),
        ] {
            assert_eq!(registry.dataset(id).unwrap().name(), name);
        }
    }

    #[test]
    fn definitions_ranges_and_dims() {
        let definitions = SpecDefinitions::from_json(ESCDF_DEFINITIONS).unwrap();
        assert_eq!(definitions.version(), "0.1");
        let groups = definitions.group_specs().unwrap();
        let system = &groups[0];

        let lattice = system.attribute_by_name("lattice_vectors").unwrap();
        assert_eq!(lattice.rank(), 2);
        assert_eq!(lattice.range().unwrap().max(), f64::INFINITY);
        let nopd = system.attribute(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS).unwrap();
        assert!(nopd.is_mandatory());
        assert_eq!(nopd.range().unwrap().min(), 1.0);
        let species_names = system.dataset(escdf::SPECIES_NAMES).unwrap();
        assert_eq!(species_names.string_length(), 80);
    }

    #[test]
    fn definitions_errors() {
        let unknown = r#"{
            "Attributes": [
                { "Name": "values", "Data_type": "double", "Dimensions": 1, "Dims_definitions": ["count"] }
            ]
        }"#;
        let err = SpecDefinitions::from_json(unknown)
            .unwrap()
            .group_specs()
            .unwrap_err();
        assert!(matches!(err, DefinitionsError::UnknownName { .. }));

        let rank = r#"{
            "Attributes": [
                { "Name": "values", "Data_type": "double", "Dimensions": 2, "Dims_definitions": [3] }
            ]
        }"#;
        let err = SpecDefinitions::from_json(rank)
            .unwrap()
            .group_specs()
            .unwrap_err();
        assert!(matches!(err, DefinitionsError::RankMismatch { .. }));

        let cycle = r#"{
            "Attributes": [
                { "Name": "a", "Data_type": "uint", "Dimensions": 1, "Dims_definitions": ["b"] },
                { "Name": "b", "Data_type": "uint", "Dimensions": 1, "Dims_definitions": ["a"] }
            ],
            "Groups": [ { "Name": "g", "Attributes": ["a", "b"] } ]
        }"#;
        let err = SpecDefinitions::from_json(cycle)
            .unwrap()
            .group_specs()
            .unwrap_err();
        assert!(matches!(
            err,
            DefinitionsError::Spec(SpecError::DimensionCycle(_))
        ));

        assert!(matches!(
            SpecDefinitions::from_json("{ \"Attributes\": 1 }"),
            Err(DefinitionsError::InvalidJson(_))
        ));
    }
}

//! Group, attribute, and dataset specifications.
//!
//! A [`GroupSpec`] describes one kind of group: the attributes it may hold, the datasets it may hold, and how their shapes depend on each other.
//! Attribute and dataset shapes are lists of [`Dimension`]s, each either a fixed extent or the value of an integer attribute of the same group.
//!
//! Group specifications are checked when built with [`GroupSpecBuilder::build`]:
//!  - attribute and dataset ids and names are unique within the group,
//!  - every dependent dimension refers to an integer attribute of the group, and
//!  - the attribute dependencies are acyclic.
//!
//! Built specifications are registered in a [`SpecsRegistry`], explicitly owned by the caller.
//! Specifications can also be loaded from JSON with [`SpecDefinitions`].

mod definitions;
mod specs_registry;

use std::sync::Arc;

use derive_more::{Display, From};
use thiserror::Error;

use crate::{config::global_config, data_type::DataType};

pub use self::{
    definitions::{register_escdf_specs, DefinitionsError, SpecDefinitions, ESCDF_DEFINITIONS},
    specs_registry::SpecsRegistry,
};

/// The identifiers of the built-in ESCDF specifications registered by [`register_escdf_specs`].
pub mod escdf {
    use super::{AttributeId, DatasetId, GroupId};

    /// `number_of_physical_dimensions`
    pub const NUMBER_OF_PHYSICAL_DIMENSIONS: AttributeId = AttributeId(0);
    /// `dimension_types`
    pub const DIMENSION_TYPES: AttributeId = AttributeId(1);
    /// `embedded_system`
    pub const EMBEDDED_SYSTEM: AttributeId = AttributeId(2);
    /// `system_name`
    pub const SYSTEM_NAME: AttributeId = AttributeId(3);
    /// `number_of_species`
    pub const NUMBER_OF_SPECIES: AttributeId = AttributeId(4);
    /// `number_of_sites`
    pub const NUMBER_OF_SITES: AttributeId = AttributeId(5);
    /// `lattice_vectors`
    pub const LATTICE_VECTORS: AttributeId = AttributeId(6);
    /// `number_of_species_at_site`
    pub const NUMBER_OF_SPECIES_AT_SITE: AttributeId = AttributeId(7);
    /// `number_of_grid_points`
    pub const NUMBER_OF_GRID_POINTS: AttributeId = AttributeId(8);
    /// `number_of_components`
    pub const NUMBER_OF_COMPONENTS: AttributeId = AttributeId(9);
    /// `real_or_complex`
    pub const REAL_OR_COMPLEX: AttributeId = AttributeId(10);

    /// `species_names`
    pub const SPECIES_NAMES: DatasetId = DatasetId(0);
    /// `fractional_site_positions`
    pub const FRACTIONAL_SITE_POSITIONS: DatasetId = DatasetId(1);
    /// `cartesian_site_positions`
    pub const CARTESIAN_SITE_POSITIONS: DatasetId = DatasetId(2);
    /// `values_on_grid`
    pub const VALUES_ON_GRID: DatasetId = DatasetId(3);
    /// `grid_ordering`
    pub const GRID_ORDERING: DatasetId = DatasetId(4);

    /// `system`
    pub const SYSTEM: GroupId = GroupId(0);
    /// `density`
    pub const DENSITY: GroupId = GroupId(1);
}

/// An attribute identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct AttributeId(pub u32);

/// A dataset identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct DatasetId(pub u32);

/// A group identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct GroupId(pub u32);

/// The kind of a specification, used in errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SpecKind {
    /// An attribute.
    #[display("attribute")]
    Attribute,
    /// A dataset.
    #[display("dataset")]
    Dataset,
    /// A group.
    #[display("group")]
    Group,
}

/// A dimension of an attribute or dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// A fixed extent.
    Fixed(u64),
    /// An extent given by the value of an integer attribute of the same group.
    ///
    /// If the attribute is an array, the extent is the product of its elements.
    Attribute(AttributeId),
}

/// An inclusive range of permitted values.
#[derive(Clone, Copy, Debug, PartialEq, Display)]
#[display("[{min}, {max}]")]
pub struct ValueRange {
    min: f64,
    max: f64,
}

impl ValueRange {
    /// Create a new inclusive range.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// The minimum.
    #[must_use]
    pub const fn min(&self) -> f64 {
        self.min
    }

    /// The maximum.
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Returns true if `value` is within the range.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A specification error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SpecError {
    /// An id is already in use.
    #[error("duplicate {kind} id {id}")]
    DuplicateId {
        /// The kind of specification.
        kind: SpecKind,
        /// The id.
        id: u32,
    },
    /// A name is already in use.
    #[error("duplicate {kind} name {name}")]
    DuplicateName {
        /// The kind of specification.
        kind: SpecKind,
        /// The name.
        name: String,
    },
    /// A specification is not registered.
    #[error("{kind} {key} not found")]
    NotFound {
        /// The kind of specification.
        kind: SpecKind,
        /// The id or name that was looked up.
        key: String,
    },
    /// A dimension refers to an attribute which is not part of the group.
    #[error("dimension {dimension} of {name} refers to attribute {attribute} which is not in the group")]
    UnknownDimensionSource {
        /// The attribute or dataset name.
        name: String,
        /// The index of the dimension.
        dimension: usize,
        /// The referenced attribute.
        attribute: AttributeId,
    },
    /// A dimension refers to an attribute which is not an integer.
    #[error("dimension {dimension} of {name} refers to non-integer attribute {attribute}")]
    NonIntegerDimensionSource {
        /// The attribute or dataset name.
        name: String,
        /// The index of the dimension.
        dimension: usize,
        /// The referenced attribute.
        attribute: AttributeId,
    },
    /// The attribute dimension dependencies form a cycle.
    #[error("attribute dimensions form a cycle through {0}")]
    DimensionCycle(String),
    /// An attribute or dataset id is registered with a different specification.
    #[error("{kind} {id} is already registered with a different specification")]
    Conflicting {
        /// The kind of specification.
        kind: SpecKind,
        /// The id.
        id: u32,
    },
}

/// An attribute specification.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeSpec {
    id: AttributeId,
    name: String,
    data_type: DataType,
    dims: Vec<Dimension>,
    range: Option<ValueRange>,
    mandatory: bool,
    string_length: Option<usize>,
}

impl AttributeSpec {
    /// Create a new optional scalar attribute specification.
    #[must_use]
    pub fn new(id: AttributeId, name: &str, data_type: DataType) -> Self {
        Self {
            id,
            name: name.to_string(),
            data_type,
            dims: Vec::new(),
            range: None,
            mandatory: false,
            string_length: None,
        }
    }

    /// Set the dimensions.
    #[must_use]
    pub fn with_dims(mut self, dims: Vec<Dimension>) -> Self {
        self.dims = dims;
        self
    }

    /// Set the inclusive value range.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(ValueRange::new(min, max));
        self
    }

    /// Set the fixed width of string elements, including the terminating NUL.
    #[must_use]
    pub fn with_string_length(mut self, string_length: usize) -> Self {
        self.string_length = Some(string_length.max(1));
        self
    }

    /// Make the attribute mandatory.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// The id.
    #[must_use]
    pub const fn id(&self) -> AttributeId {
        self.id
    }

    /// The name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The data type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The dimensions.
    #[must_use]
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// The rank. Zero for a scalar.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// The value range.
    #[must_use]
    pub const fn range(&self) -> Option<&ValueRange> {
        self.range.as_ref()
    }

    /// Returns true if the attribute is mandatory.
    #[must_use]
    pub const fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// The fixed width of string elements.
    ///
    /// A string specification without an explicit width takes the [default string length](crate::config::Config#default-string-length) when its group specification is built.
    /// Before that, the current default is returned.
    #[must_use]
    pub fn string_length(&self) -> usize {
        self.string_length
            .unwrap_or_else(|| global_config().default_string_length())
    }
}

/// A dataset specification.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetSpec {
    id: DatasetId,
    name: String,
    data_type: DataType,
    dims: Vec<Dimension>,
    range: Option<ValueRange>,
    string_length: Option<usize>,
}

impl DatasetSpec {
    /// Create a new dataset specification.
    #[must_use]
    pub fn new(
        id: DatasetId,
        name: &str,
        data_type: DataType,
        dims: Vec<Dimension>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            data_type,
            dims,
            range: None,
            string_length: None,
        }
    }

    /// Set the inclusive value range.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(ValueRange::new(min, max));
        self
    }

    /// Set the fixed width of string elements, including the terminating NUL.
    #[must_use]
    pub fn with_string_length(mut self, string_length: usize) -> Self {
        self.string_length = Some(string_length.max(1));
        self
    }

    /// The id.
    #[must_use]
    pub const fn id(&self) -> DatasetId {
        self.id
    }

    /// The name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The data type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The dimensions.
    #[must_use]
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// The value range.
    #[must_use]
    pub const fn range(&self) -> Option<&ValueRange> {
        self.range.as_ref()
    }

    /// The fixed width of string elements.
    ///
    /// A string specification without an explicit width takes the [default string length](crate::config::Config#default-string-length) when its group specification is built.
    /// Before that, the current default is returned.
    #[must_use]
    pub fn string_length(&self) -> usize {
        self.string_length
            .unwrap_or_else(|| global_config().default_string_length())
    }
}

/// A group specification.
///
/// Create with [`GroupSpecBuilder`].
#[derive(Debug, PartialEq)]
pub struct GroupSpec {
    id: GroupId,
    name: String,
    parent_path: Option<String>,
    attributes: Vec<Arc<AttributeSpec>>,
    datasets: Vec<Arc<DatasetSpec>>,
    resolution_order: Vec<usize>,
}

impl GroupSpec {
    /// The id.
    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.id
    }

    /// The name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The path of the parent of the group relative to the location it is opened from, if any.
    #[must_use]
    pub fn parent_path(&self) -> Option<&str> {
        self.parent_path.as_deref()
    }

    /// The default path of the group relative to the location it is opened from.
    ///
    /// This is the name of the group, prefixed by the parent path if there is one.
    #[must_use]
    pub fn default_path(&self) -> String {
        match self.parent_path.as_deref().map(|p| p.trim_matches('/')) {
            Some(parent) if !parent.is_empty() => format!("{parent}/{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// The attribute specifications in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[Arc<AttributeSpec>] {
        &self.attributes
    }

    /// The attribute specifications ordered so that every attribute follows the attributes governing its dimensions.
    pub fn attributes_in_dependency_order(&self) -> impl Iterator<Item = &Arc<AttributeSpec>> {
        self.resolution_order.iter().map(|&i| &self.attributes[i])
    }

    /// The dataset specifications in declaration order.
    #[must_use]
    pub fn datasets(&self) -> &[Arc<DatasetSpec>] {
        &self.datasets
    }

    /// Get an attribute specification by id.
    #[must_use]
    pub fn attribute(&self, id: AttributeId) -> Option<&Arc<AttributeSpec>> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// Get an attribute specification by name.
    #[must_use]
    pub fn attribute_by_name(&self, name: &str) -> Option<&Arc<AttributeSpec>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Get a dataset specification by id.
    #[must_use]
    pub fn dataset(&self, id: DatasetId) -> Option<&Arc<DatasetSpec>> {
        self.datasets.iter().find(|d| d.id == id)
    }

    /// Get a dataset specification by name.
    #[must_use]
    pub fn dataset_by_name(&self, name: &str) -> Option<&Arc<DatasetSpec>> {
        self.datasets.iter().find(|d| d.name == name)
    }
}

/// A [`GroupSpec`] builder.
#[derive(Debug)]
pub struct GroupSpecBuilder {
    id: GroupId,
    name: String,
    parent_path: Option<String>,
    attributes: Vec<Arc<AttributeSpec>>,
    datasets: Vec<Arc<DatasetSpec>>,
}

impl GroupSpecBuilder {
    /// Create a new group specification builder.
    #[must_use]
    pub fn new(id: GroupId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            parent_path: None,
            attributes: Vec::new(),
            datasets: Vec::new(),
        }
    }

    /// Set the parent path.
    pub fn parent_path(&mut self, parent_path: &str) -> &mut Self {
        self.parent_path = Some(parent_path.to_string());
        self
    }

    /// Add an attribute specification.
    pub fn attribute(&mut self, attribute: impl Into<Arc<AttributeSpec>>) -> &mut Self {
        self.attributes.push(attribute.into());
        self
    }

    /// Add a dataset specification.
    pub fn dataset(&mut self, dataset: impl Into<Arc<DatasetSpec>>) -> &mut Self {
        self.datasets.push(dataset.into());
        self
    }

    /// Build into a [`GroupSpec`].
    ///
    /// # Errors
    /// Returns a [`SpecError`] if
    ///  - an attribute or dataset id or name is duplicated,
    ///  - a dimension refers to an attribute which is not in the group or is not an integer, or
    ///  - the attribute dimensions form a cycle.
    pub fn build(&self) -> Result<GroupSpec, SpecError> {
        check_unique(
            SpecKind::Attribute,
            self.attributes.iter().map(|a| (a.id.0, a.name.as_str())),
        )?;
        check_unique(
            SpecKind::Dataset,
            self.datasets.iter().map(|d| (d.id.0, d.name.as_str())),
        )?;

        let dims = self
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.dims.as_slice()))
            .chain(
                self.datasets
                    .iter()
                    .map(|d| (d.name.as_str(), d.dims.as_slice())),
            );
        for (name, dims) in dims {
            for (dimension, dim) in dims.iter().enumerate() {
                let Dimension::Attribute(attribute) = dim else {
                    continue;
                };
                let source = self
                    .attributes
                    .iter()
                    .find(|a| a.id == *attribute)
                    .ok_or_else(|| SpecError::UnknownDimensionSource {
                        name: name.to_string(),
                        dimension,
                        attribute: *attribute,
                    })?;
                if !source.data_type.is_integer() {
                    return Err(SpecError::NonIntegerDimensionSource {
                        name: name.to_string(),
                        dimension,
                        attribute: *attribute,
                    });
                }
            }
        }

        let resolution_order = self.resolution_order()?;

        let default_string_length = global_config().default_string_length();
        let attributes = self
            .attributes
            .iter()
            .map(|attribute| match attribute.string_length {
                None if attribute.data_type == DataType::String => Arc::new(AttributeSpec {
                    string_length: Some(default_string_length),
                    ..AttributeSpec::clone(attribute)
                }),
                _ => attribute.clone(),
            })
            .collect();
        let datasets = self
            .datasets
            .iter()
            .map(|dataset| match dataset.string_length {
                None if dataset.data_type == DataType::String => Arc::new(DatasetSpec {
                    string_length: Some(default_string_length),
                    ..DatasetSpec::clone(dataset)
                }),
                _ => dataset.clone(),
            })
            .collect();

        Ok(GroupSpec {
            id: self.id,
            name: self.name.clone(),
            parent_path: self.parent_path.clone(),
            attributes,
            datasets,
            resolution_order,
        })
    }

    /// Topologically sort the attributes by their dimension dependencies.
    fn resolution_order(&self) -> Result<Vec<usize>, SpecError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            attributes: &[Arc<AttributeSpec>],
            index: usize,
            marks: &mut [Mark],
            order: &mut Vec<usize>,
        ) -> Result<(), SpecError> {
            match marks[index] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(SpecError::DimensionCycle(attributes[index].name.clone()))
                }
                Mark::Unvisited => {}
            }
            marks[index] = Mark::InProgress;
            for dim in &attributes[index].dims {
                if let Dimension::Attribute(id) = dim {
                    if let Some(source) = attributes.iter().position(|a| a.id == *id) {
                        visit(attributes, source, marks, order)?;
                    }
                }
            }
            marks[index] = Mark::Done;
            order.push(index);
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.attributes.len()];
        let mut order = Vec::with_capacity(self.attributes.len());
        for index in 0..self.attributes.len() {
            visit(&self.attributes, index, &mut marks, &mut order)?;
        }
        Ok(order)
    }
}

fn check_unique<'a>(
    kind: SpecKind,
    ids_names: impl Iterator<Item = (u32, &'a str)>,
) -> Result<(), SpecError> {
    let mut ids = std::collections::HashSet::new();
    let mut names = std::collections::HashSet::new();
    for (id, name) in ids_names {
        if !ids.insert(id) {
            return Err(SpecError::DuplicateId { kind, id });
        }
        if !names.insert(name) {
            return Err(SpecError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nopd() -> AttributeSpec {
        AttributeSpec::new(AttributeId(0), "number_of_physical_dimensions", DataType::UInt)
            .with_range(1.0, 3.0)
            .mandatory()
    }

    fn dimension_types() -> AttributeSpec {
        AttributeSpec::new(AttributeId(1), "dimension_types", DataType::UInt)
            .with_dims(vec![Dimension::Attribute(AttributeId(0))])
            .with_range(0.0, 2.0)
    }

    #[test]
    fn group_spec_dependency_order() {
        let spec = GroupSpecBuilder::new(GroupId(0), "system")
            .attribute(dimension_types())
            .attribute(nopd())
            .build()
            .unwrap();
        let order: Vec<_> = spec
            .attributes_in_dependency_order()
            .map(|a| a.name())
            .collect();
        assert_eq!(order, ["number_of_physical_dimensions", "dimension_types"]);
        assert_eq!(spec.default_path(), "system");
        assert_eq!(
            spec.attribute_by_name("dimension_types").unwrap().id(),
            AttributeId(1)
        );
    }

    #[test]
    fn group_spec_duplicate() {
        let err = GroupSpecBuilder::new(GroupId(0), "system")
            .attribute(nopd())
            .attribute(AttributeSpec::new(AttributeId(0), "other", DataType::UInt))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SpecError::DuplicateId {
                kind: SpecKind::Attribute,
                id: 0
            }
        );
    }

    #[test]
    fn group_spec_unknown_dimension_source() {
        let err = GroupSpecBuilder::new(GroupId(0), "system")
            .attribute(dimension_types())
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownDimensionSource { .. }));

        let err = GroupSpecBuilder::new(GroupId(0), "system")
            .attribute(AttributeSpec::new(AttributeId(0), "scale", DataType::Double))
            .attribute(
                AttributeSpec::new(AttributeId(1), "values", DataType::Double)
                    .with_dims(vec![Dimension::Attribute(AttributeId(0))]),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::NonIntegerDimensionSource { .. }));
    }

    #[test]
    fn group_spec_cycle() {
        let a = AttributeSpec::new(AttributeId(0), "a", DataType::UInt)
            .with_dims(vec![Dimension::Attribute(AttributeId(1))]);
        let b = AttributeSpec::new(AttributeId(1), "b", DataType::UInt)
            .with_dims(vec![Dimension::Attribute(AttributeId(0))]);
        let err = GroupSpecBuilder::new(GroupId(0), "g")
            .attribute(a)
            .attribute(b)
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::DimensionCycle(_)));

        let own = AttributeSpec::new(AttributeId(0), "own", DataType::UInt)
            .with_dims(vec![Dimension::Attribute(AttributeId(0))]);
        assert!(matches!(
            GroupSpecBuilder::new(GroupId(0), "g").attribute(own).build(),
            Err(SpecError::DimensionCycle(_))
        ));
    }

    #[test]
    fn string_length_captured_on_build() {
        let default = global_config().default_string_length();
        let spec = GroupSpecBuilder::new(GroupId(0), "system")
            .attribute(AttributeSpec::new(AttributeId(0), "system_name", DataType::String))
            .attribute(
                AttributeSpec::new(AttributeId(1), "short_name", DataType::String)
                    .with_string_length(8),
            )
            .dataset(DatasetSpec::new(
                DatasetId(0),
                "species_names",
                DataType::String,
                vec![Dimension::Fixed(2)],
            ))
            .build()
            .unwrap();
        assert_eq!(spec.attribute(AttributeId(0)).unwrap().string_length, Some(default));
        assert_eq!(spec.attribute(AttributeId(1)).unwrap().string_length, Some(8));
        assert_eq!(spec.dataset(DatasetId(0)).unwrap().string_length, Some(default));
    }

    #[test]
    fn default_path_with_parent() {
        let spec = GroupSpecBuilder::new(GroupId(1), "density")
            .parent_path("/fields/")
            .build()
            .unwrap();
        assert_eq!(spec.default_path(), "fields/density");
    }
}

//! Groups.
//!
//! A [`Group`] is an open location in a store hierarchy, described by a registered [`GroupSpec`].
//! It owns a store [`GroupHandle`] and a cache of the attribute values described by its specification.
//!
//! Use [`Group::open_or_create`] to open an existing location or create a new one.
//! Opening an existing location loads and validates every stored attribute.
//!
//! Attributes are written through the typed marshaller:
//!  - [`Group::set_attribute`] validates the data type, the shape resolved from the current values of the attributes governing its dimensions, and the value range before writing to the store, and
//!  - [`Group::attribute`], [`Group::attribute_into`] and [`Group::scalar`] read the cached value back.
//!
//! ```rust
//! # use std::sync::Arc;
//! use ::escdf::group::Group;
//! use ::escdf::specs::{escdf, register_escdf_specs, SpecsRegistry};
//! use ::escdf::storage::{store::MemoryStore, HierarchyStorageTraits};
//!
//! let mut registry = SpecsRegistry::new();
//! register_escdf_specs(&mut registry)?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let root = store.root();
//! let mut system = Group::open_or_create(store.clone(), &registry, &root, escdf::SYSTEM, None)?;
//! system.set_attribute(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS, 3u32)?;
//! system.set_attribute(escdf::DIMENSION_TYPES, vec![0u32, 0, 0])?;
//! assert_eq!(system.scalar::<u32>(escdf::NUMBER_OF_PHYSICAL_DIMENSIONS)?, 3);
//! system.close()?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

mod attribute_value;

use std::{collections::HashMap, sync::Arc};

use derive_more::Display;
use itertools::Itertools;
use thiserror::Error;

use crate::{
    config::global_config,
    data_type::{Element, Elements},
    dataset::{Dataset, DatasetError},
    node::NodePath,
    specs::{
        AttributeId, AttributeSpec, DatasetId, Dimension, GroupId, GroupSpec, SpecError, SpecKind,
        SpecsRegistry,
    },
    storage::{GroupHandle, HierarchyStorageTraits, StorageError},
    validation::{
        check_data_type, check_num_elements, check_range, check_shape,
        resolve_shape, ValidationError,
    },
    ArrayShape,
};

use self::attribute_value::AttributeValue;

/// Whether a group was opened or created by [`Group::open_or_create`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum GroupOpenMode {
    /// The group existed and was opened.
    #[display("opened")]
    Opened,
    /// The group did not exist and was created.
    #[display("created")]
    Created,
}

/// A group error.
#[derive(Debug, Error)]
pub enum GroupError {
    /// A value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A specification error.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// A store error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An attribute has not been set.
    #[error("attribute {0} has not been set")]
    Uninitialized(String),
    /// The group was closed twice.
    #[error("group is already closed")]
    DoubleClose,
    /// The group was used after it was closed.
    #[error("group is closed")]
    UseAfterClose,
    /// An IO error while serialising.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl From<DatasetError> for GroupError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Validation(err) => Self::Validation(err),
            DatasetError::Spec(err) => Self::Spec(err),
            DatasetError::Storage(err) => Self::Storage(err),
            DatasetError::DoubleClose | DatasetError::UseAfterClose => Self::UseAfterClose,
        }
    }
}

/// An open group.
pub struct Group<TStorage: ?Sized + HierarchyStorageTraits> {
    storage: Arc<TStorage>,
    spec: Arc<GroupSpec>,
    path: NodePath,
    handle: Option<GroupHandle>,
    open_mode: GroupOpenMode,
    values: HashMap<AttributeId, AttributeValue>,
}

impl<TStorage: ?Sized + HierarchyStorageTraits> std::fmt::Debug for Group<TStorage> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("spec", &self.spec.name())
            .field("path", &self.path)
            .field("handle", &self.handle)
            .field("open_mode", &self.open_mode)
            .finish_non_exhaustive()
    }
}

impl<TStorage: ?Sized + HierarchyStorageTraits> Group<TStorage> {
    /// Open the group `group_id` at `path` relative to `parent`, creating it (and any missing intermediate groups) if it does not exist.
    ///
    /// If `path` is [`None`], the default path of the group specification is used.
    /// The attributes of an opened group are loaded from the store in dependency order.
    ///
    /// # Errors
    /// Returns a [`GroupError`] if:
    ///  - `group_id` is not registered,
    ///  - `path` is invalid or there is an underlying store error, or
    ///  - a stored attribute does not match its specification.
    pub fn open_or_create(
        storage: Arc<TStorage>,
        registry: &SpecsRegistry,
        parent: &GroupHandle,
        group_id: GroupId,
        path: Option<&str>,
    ) -> Result<Self, GroupError> {
        let spec = registry.group(group_id)?;
        let relative_path = path.map_or_else(|| spec.default_path(), str::to_string);
        let path = parent
            .path()
            .join(&relative_path)
            .map_err(StorageError::from)?;

        let (handle, open_mode) = if storage.group_exists(parent, &relative_path)? {
            (
                storage.group_open(parent, &relative_path)?,
                GroupOpenMode::Opened,
            )
        } else {
            (
                storage.group_create(parent, &relative_path)?,
                GroupOpenMode::Created,
            )
        };
        log::debug!("{open_mode} group {} at {path}", spec.name());

        let values = spec
            .attributes()
            .iter()
            .map(|attribute| {
                (
                    attribute.id(),
                    AttributeValue::unset(attribute.data_type(), attribute.rank()),
                )
            })
            .collect();
        let mut group = Self {
            storage,
            spec,
            path,
            handle: Some(handle),
            open_mode,
            values,
        };
        if open_mode == GroupOpenMode::Opened {
            group.load_attributes()?;
            group.check_datasets()?;
        }
        Ok(group)
    }

    /// Check the shape and data type of every stored dataset against the loaded attributes.
    fn check_datasets(&self) -> Result<(), GroupError> {
        for dataset in self.spec.datasets() {
            if !self.is_dataset_present(dataset.id())? {
                continue;
            }
            match Dataset::open(self, dataset.id()) {
                Ok(mut opened) => opened.close()?,
                Err(DatasetError::Validation(ValidationError::DimensionMissing {
                    attribute: source,
                    ..
                })) => {
                    log::warn!(
                        "not checking stored dataset {} of {}: dimension source {source} is not set",
                        dataset.name(),
                        self.path
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Load every stored attribute, in dependency order.
    fn load_attributes(&mut self) -> Result<(), GroupError> {
        let validate_ranges = global_config().validate_ranges_on_read();
        let spec = self.spec.clone();
        for attribute in spec.attributes_in_dependency_order() {
            let handle = self.handle()?;
            if !self.storage.attr_exists(handle, attribute.name())? {
                continue;
            }
            let expected_shape = match self.resolve_dims(attribute.dims()) {
                Ok(shape) => shape,
                Err(ValidationError::DimensionMissing { attribute: source, .. }) => {
                    log::warn!(
                        "skipping stored attribute {} of {}: dimension source {source} is not set",
                        attribute.name(),
                        self.path
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let metadata = self.storage.attr_metadata(handle, attribute.name())?;
            check_shape(&expected_shape, &metadata.shape)?;
            let elements = self.read_attribute(handle, attribute, &metadata.shape)?;
            check_num_elements(&expected_shape, elements.len())?;
            if validate_ranges {
                check_range(attribute.range(), &elements)?;
            }
            self.value_mut(attribute.id())?.set(elements);
        }
        Ok(())
    }

    fn read_attribute(
        &self,
        handle: &GroupHandle,
        attribute: &AttributeSpec,
        shape: &[u64],
    ) -> Result<Elements, GroupError> {
        let string_length = attribute.string_length();
        let bytes = self.storage.attr_read(
            handle,
            attribute.name(),
            attribute.data_type().store_data_type(string_length),
            shape,
        )?;
        Ok(Elements::from_store_bytes(
            attribute.data_type(),
            &bytes,
            string_length,
        )?)
    }

    /// The specification of the group.
    #[must_use]
    pub fn spec(&self) -> &Arc<GroupSpec> {
        &self.spec
    }

    /// The path of the group in the store.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Whether the group was opened or created.
    #[must_use]
    pub const fn open_mode(&self) -> GroupOpenMode {
        self.open_mode
    }

    /// Returns true if the group has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// The store handle of the group.
    ///
    /// # Errors
    /// Returns [`GroupError::UseAfterClose`] if the group is closed.
    pub fn handle(&self) -> Result<&GroupHandle, GroupError> {
        self.handle.as_ref().ok_or(GroupError::UseAfterClose)
    }

    /// The storage of the group.
    #[must_use]
    pub fn storage(&self) -> &Arc<TStorage> {
        &self.storage
    }

    fn attribute_spec(&self, id: AttributeId) -> Result<&Arc<AttributeSpec>, GroupError> {
        self.spec.attribute(id).ok_or_else(|| {
            SpecError::NotFound {
                kind: SpecKind::Attribute,
                key: format!("{id} in group {}", self.spec.name()),
            }
            .into()
        })
    }

    fn value(&self, id: AttributeId) -> Result<&AttributeValue, GroupError> {
        self.attribute_spec(id)?;
        self.values.get(&id).ok_or_else(|| {
            SpecError::NotFound {
                kind: SpecKind::Attribute,
                key: id.to_string(),
            }
            .into()
        })
    }

    fn value_mut(&mut self, id: AttributeId) -> Result<&mut AttributeValue, GroupError> {
        self.values.get_mut(&id).ok_or_else(|| {
            SpecError::NotFound {
                kind: SpecKind::Attribute,
                key: id.to_string(),
            }
            .into()
        })
    }

    /// Resolve `dims` from the current attribute values.
    ///
    /// # Errors
    /// Returns [`ValidationError::DimensionMissing`] if a governing attribute is unset, or [`ValidationError::NegativeExtent`] if it is negative.
    pub(crate) fn resolve_dims(&self, dims: &[Dimension]) -> Result<ArrayShape, ValidationError> {
        let mut extents = HashMap::new();
        for dim in dims {
            if let Dimension::Attribute(id) = dim {
                if let Some(elements) = self.values.get(id).and_then(AttributeValue::elements) {
                    if let Some(extent) = elements.extent()? {
                        extents.insert(*id, extent);
                    }
                }
            }
        }
        resolve_shape(dims, |id| extents.get(&id).copied())
    }

    /// The shape of attribute `id` resolved from the current attribute values.
    ///
    /// # Errors
    /// Returns a [`GroupError`] if `id` is not an attribute of the group or its shape cannot be resolved.
    pub fn attribute_shape(&self, id: AttributeId) -> Result<ArrayShape, GroupError> {
        let attribute = self.attribute_spec(id)?;
        Ok(self.resolve_dims(attribute.dims())?)
    }

    /// Set attribute `id` to `value` and write it to the store, replacing any stored value.
    ///
    /// `value` is validated against the attribute specification before the store is touched.
    /// The cached value is only updated once the store write succeeds.
    ///
    /// # Errors
    /// Returns a [`GroupError`] if:
    ///  - the group is closed ([`GroupError::UseAfterClose`]),
    ///  - `id` is not an attribute of the group,
    ///  - a dimension source is unset ([`ValidationError::DimensionMissing`]),
    ///  - `value` has the wrong data type ([`ValidationError::TypeMismatch`]) or number of elements ([`ValidationError::SizeMismatch`]),
    ///  - an element is out of range ([`ValidationError::RangeError`]) or a string does not fit, or
    ///  - there is an underlying store error.
    pub fn set_attribute(
        &mut self,
        id: AttributeId,
        value: impl Into<Elements>,
    ) -> Result<(), GroupError> {
        let handle = self.handle()?;
        let attribute = self.attribute_spec(id)?;
        let elements: Elements = value.into();
        check_data_type(attribute.data_type(), &elements)?;
        let shape = self.resolve_dims(attribute.dims())?;
        check_num_elements(&shape, elements.len())?;
        check_range(attribute.range(), &elements)?;
        let string_length = attribute.string_length();
        let bytes = elements.to_store_bytes(string_length)?;

        self.storage.attr_write(
            handle,
            attribute.name(),
            attribute.data_type().store_data_type(string_length),
            &shape,
            &bytes,
        )?;
        self.value_mut(id)?.set(elements);
        Ok(())
    }

    /// Returns true if attribute `id` holds a value.
    ///
    /// # Errors
    /// Returns a [`GroupError`] if the group is closed or `id` is not an attribute of the group.
    pub fn is_set(&self, id: AttributeId) -> Result<bool, GroupError> {
        self.handle()?;
        Ok(self.value(id)?.is_set())
    }

    /// Get the elements of attribute `id`.
    ///
    /// # Errors
    /// Returns a [`GroupError`] if:
    ///  - the group is closed,
    ///  - `id` is not an attribute of the group,
    ///  - the attribute is unset ([`GroupError::Uninitialized`]), or
    ///  - the cached value no longer matches the shape resolved from the current attribute values ([`ValidationError::SizeMismatch`]).
    pub fn attribute_elements(&self, id: AttributeId) -> Result<Elements, GroupError> {
        self.handle()?;
        let attribute = self.attribute_spec(id)?;
        let elements = self
            .value(id)?
            .elements()
            .ok_or_else(|| GroupError::Uninitialized(attribute.name().to_string()))?;
        let shape = self.resolve_dims(attribute.dims())?;
        check_num_elements(&shape, elements.len())?;
        Ok(elements)
    }

    /// Get the values of attribute `id`.
    ///
    /// # Errors
    /// See [`Group::attribute_elements`].
    /// Returns [`ValidationError::TypeMismatch`] if `T` does not match the attribute data type.
    pub fn attribute<T: Element>(&self, id: AttributeId) -> Result<Vec<T>, GroupError> {
        Ok(T::from_elements(self.attribute_elements(id)?)?)
    }

    /// Get the values of attribute `id` into `out`.
    ///
    /// # Errors
    /// See [`Group::attribute`].
    /// Returns [`ValidationError::SizeMismatch`] if the length of `out` does not match the resolved shape of the attribute.
    pub fn attribute_into<T: Element>(&self, id: AttributeId, out: &mut [T]) -> Result<(), GroupError> {
        self.handle()?;
        let attribute = self.attribute_spec(id)?;
        if !self.value(id)?.is_set() {
            return Err(GroupError::Uninitialized(attribute.name().to_string()));
        }
        let shape = self.resolve_dims(attribute.dims())?;
        check_num_elements(&shape, out.len())?;
        let values = self.attribute::<T>(id)?;
        out.clone_from_slice(&values);
        Ok(())
    }

    /// Get the value of a scalar attribute `id`.
    ///
    /// # Errors
    /// See [`Group::attribute`].
    /// Returns [`ValidationError::SizeMismatch`] if the attribute does not hold exactly one element.
    pub fn scalar<T: Element>(&self, id: AttributeId) -> Result<T, GroupError> {
        let mut values = self.attribute::<T>(id)?;
        match values.pop() {
            Some(value) if values.is_empty() => Ok(value),
            _ => Err(ValidationError::SizeMismatch {
                expected: 1,
                got: values.len() as u64 + 1,
            }
            .into()),
        }
    }

    /// Check that every mandatory attribute is set.
    ///
    /// # Errors
    /// Returns [`GroupError::Uninitialized`] naming the first unset mandatory attribute, or [`GroupError::UseAfterClose`] if the group is closed.
    pub fn check_mandatory(&self) -> Result<(), GroupError> {
        self.handle()?;
        for attribute in self.spec.attributes() {
            if attribute.is_mandatory() && !self.value(attribute.id())?.is_set() {
                return Err(GroupError::Uninitialized(attribute.name().to_string()));
            }
        }
        Ok(())
    }

    /// Returns true if dataset `id` exists in the store.
    ///
    /// # Errors
    /// Returns a [`GroupError`] if the group is closed, `id` is not a dataset of the group, or there is an underlying store error.
    pub fn is_dataset_present(&self, id: DatasetId) -> Result<bool, GroupError> {
        let handle = self.handle()?;
        let dataset = self.spec.dataset(id).ok_or_else(|| SpecError::NotFound {
            kind: SpecKind::Dataset,
            key: format!("{id} in group {}", self.spec.name()),
        })?;
        Ok(self.storage.dataset_exists(handle, dataset.name())?)
    }

    /// Write a summary of the group to `writer`.
    ///
    /// Every attribute of the group specification is listed with its value or `not set`, and every dataset as `present` or `absent`.
    ///
    /// ```text
    /// system:
    ///   path: /system
    ///   number_of_physical_dimensions: 3
    ///   dimension_types: [0, 0, 0]
    ///   system_name: "NiO"
    ///   number_of_sites: not set
    ///   datasets:
    ///     fractional_site_positions: present
    ///     cartesian_site_positions: absent
    /// ```
    ///
    /// # Errors
    /// Returns a [`GroupError`] if the group is closed, or there is an underlying store or IO error.
    pub fn serialise(&self, writer: &mut impl std::io::Write) -> Result<(), GroupError> {
        self.handle()?;
        writeln!(writer, "{}:", self.spec.name())?;
        writeln!(writer, "  path: {}", self.path)?;
        for attribute in self.spec.attributes() {
            match self.value(attribute.id())?.elements() {
                Some(elements) => writeln!(
                    writer,
                    "  {}: {}",
                    attribute.name(),
                    format_elements(&elements, attribute.rank() == 0)
                )?,
                None => writeln!(writer, "  {}: not set", attribute.name())?,
            }
        }
        if !self.spec.datasets().is_empty() {
            writeln!(writer, "  datasets:")?;
            for dataset in self.spec.datasets() {
                let presence = if self.is_dataset_present(dataset.id())? {
                    "present"
                } else {
                    "absent"
                };
                writeln!(writer, "    {}: {presence}", dataset.name())?;
            }
        }
        Ok(())
    }

    /// Create dataset `id` with a shape resolved from the current attribute values.
    ///
    /// # Errors
    /// See [`Dataset::create`].
    pub fn create_dataset(&self, id: DatasetId) -> Result<Dataset<TStorage>, DatasetError> {
        Dataset::create(self, id)
    }

    /// Open dataset `id` and check its stored shape against the shape resolved from the current attribute values.
    ///
    /// # Errors
    /// See [`Dataset::open`].
    pub fn open_dataset(&self, id: DatasetId) -> Result<Dataset<TStorage>, DatasetError> {
        Dataset::open(self, id)
    }

    /// Close the group, releasing its store handle and discarding cached attribute values.
    ///
    /// # Errors
    /// Returns [`GroupError::DoubleClose`] if the group is already closed, or a store error if the handle cannot be released.
    pub fn close(&mut self) -> Result<(), GroupError> {
        let handle = self.handle.take().ok_or(GroupError::DoubleClose)?;
        self.values.values_mut().for_each(AttributeValue::clear);
        self.storage.group_close(handle)?;
        Ok(())
    }
}

fn format_elements(elements: &Elements, scalar: bool) -> String {
    let values: Vec<String> = match elements {
        Elements::Bool(v) => v
            .iter()
            .map(|&b| String::from(if b { "yes" } else { "no" }))
            .collect(),
        Elements::UInt(v) => v.iter().map(ToString::to_string).collect(),
        Elements::Int(v) => v.iter().map(ToString::to_string).collect(),
        Elements::Double(v) => v.iter().map(ToString::to_string).collect(),
        Elements::String(v) => v.iter().map(|s| format!("{s:?}")).collect(),
    };
    match values.as_slice() {
        [value] if scalar => value.clone(),
        values => format!("[{}]", values.iter().format(", ")),
    }
}

impl<TStorage: ?Sized + HierarchyStorageTraits> Drop for Group<TStorage> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match self.storage.group_close(handle) {
                Ok(()) => log::debug!("group {} closed on drop", self.path),
                Err(err) => log::warn!("failed to close group {} on drop: {err}", self.path),
            }
        }
    }
}

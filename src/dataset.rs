//! Datasets.
//!
//! A [`Dataset`] is an open dataset of a [`Group`], described by one of the [`DatasetSpec`]s of the group specification.
//! Its shape is resolved from the attribute values of the group when it is created or opened:
//!  - [`Group::create_dataset`] allocates a zero initialised dataset of the resolved shape, and
//!  - [`Group::open_dataset`] opens an existing dataset and fails with [`ValidationError::ShapeMismatch`] if its stored shape differs.
//!
//! Elements are transferred with a [`Selection`]: the whole dataset, a [`Hyperslab`], or a list of points.
//! Every selection and value is validated before the store is touched.

use std::sync::Arc;

use derive_more::Display;
use thiserror::Error;

use crate::{
    config::global_config,
    data_type::{Element, Elements},
    group::Group,
    node::NodePath,
    selection::{Hyperslab, Selection},
    specs::{DatasetId, DatasetSpec, SpecError, SpecKind},
    storage::{DatasetHandle, HierarchyStorageTraits, StorageError, StoreDataType},
    validation::{check_data_type, check_num_elements, check_range, check_shape, ValidationError},
    ArrayIndices, ArrayShape,
};

/// The state of a [`Dataset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum DatasetState {
    /// The dataset was created.
    #[display("created")]
    Created,
    /// An existing dataset was opened.
    #[display("opened")]
    Opened,
    /// The dataset was closed.
    #[display("closed")]
    Closed,
}

/// A dataset error.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A selection or value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A specification error.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// A store error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The dataset was closed twice.
    #[error("dataset is already closed")]
    DoubleClose,
    /// The dataset, or the group it was requested from, was used after it was closed.
    #[error("dataset or group is closed")]
    UseAfterClose,
}

/// An open dataset.
pub struct Dataset<TStorage: ?Sized + HierarchyStorageTraits> {
    storage: Arc<TStorage>,
    spec: Arc<DatasetSpec>,
    path: NodePath,
    handle: Option<DatasetHandle>,
    state: DatasetState,
    shape: ArrayShape,
}

impl<TStorage: ?Sized + HierarchyStorageTraits> std::fmt::Debug for Dataset<TStorage> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("spec", &self.spec.name())
            .field("path", &self.path)
            .field("state", &self.state)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

fn dataset_spec<TStorage: ?Sized + HierarchyStorageTraits>(
    group: &Group<TStorage>,
    id: DatasetId,
) -> Result<Arc<DatasetSpec>, DatasetError> {
    group.spec().dataset(id).cloned().ok_or_else(|| {
        SpecError::NotFound {
            kind: SpecKind::Dataset,
            key: format!("{id} in group {}", group.spec().name()),
        }
        .into()
    })
}

impl<TStorage: ?Sized + HierarchyStorageTraits> Dataset<TStorage> {
    /// Create dataset `id` of `group` with a shape resolved from the current attribute values of `group`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if:
    ///  - `group` is closed ([`DatasetError::UseAfterClose`]),
    ///  - `id` is not a dataset of the group,
    ///  - an attribute governing a dimension is unset ([`ValidationError::DimensionMissing`]), or
    ///  - the dataset already exists or there is an underlying store error.
    pub fn create(group: &Group<TStorage>, id: DatasetId) -> Result<Self, DatasetError> {
        let group_handle = group.handle().map_err(|_| DatasetError::UseAfterClose)?;
        let spec = dataset_spec(group, id)?;
        let shape = group.resolve_dims(spec.dims())?;
        let storage = group.storage().clone();
        let handle = storage.dataset_create(
            group_handle,
            spec.name(),
            store_data_type(&spec),
            &shape,
        )?;
        log::debug!("created dataset {} with shape {shape:?}", handle.path());
        Ok(Self {
            storage,
            spec,
            path: handle.path().clone(),
            handle: Some(handle),
            state: DatasetState::Created,
            shape,
        })
    }

    /// Open dataset `id` of `group` and validate its stored shape against the shape resolved from the current attribute values of `group`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if:
    ///  - `group` is closed ([`DatasetError::UseAfterClose`]),
    ///  - `id` is not a dataset of the group,
    ///  - an attribute governing a dimension is unset ([`ValidationError::DimensionMissing`]),
    ///  - the stored shape differs from the resolved shape ([`ValidationError::ShapeMismatch`]), or
    ///  - the dataset does not exist, has a different data type, or there is an underlying store error.
    pub fn open(group: &Group<TStorage>, id: DatasetId) -> Result<Self, DatasetError> {
        let group_handle = group.handle().map_err(|_| DatasetError::UseAfterClose)?;
        let spec = dataset_spec(group, id)?;
        let expected_shape = group.resolve_dims(spec.dims())?;
        let storage = group.storage().clone();
        let handle = storage.dataset_open(group_handle, spec.name())?;
        let mut dataset = Self {
            storage,
            spec,
            path: handle.path().clone(),
            handle: Some(handle),
            state: DatasetState::Opened,
            shape: expected_shape,
        };

        let metadata = dataset.storage.dataset_metadata(dataset.handle()?)?;
        check_shape(&dataset.shape, &metadata.shape)?;
        let data_type = store_data_type(&dataset.spec);
        if metadata.data_type != data_type {
            return Err(StorageError::IncompatibleDataType {
                path: dataset.path.to_string(),
                actual: metadata.data_type,
                requested: data_type,
            }
            .into());
        }
        dataset.shape = metadata.shape;
        log::debug!("opened dataset {} with shape {:?}", dataset.path, dataset.shape);
        Ok(dataset)
    }

    /// The specification of the dataset.
    #[must_use]
    pub fn spec(&self) -> &Arc<DatasetSpec> {
        &self.spec
    }

    /// The path of the dataset in the store.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The state of the dataset.
    #[must_use]
    pub const fn state(&self) -> DatasetState {
        self.state
    }

    /// The shape of the dataset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The number of elements of the dataset.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    fn handle(&self) -> Result<&DatasetHandle, DatasetError> {
        self.handle.as_ref().ok_or(DatasetError::UseAfterClose)
    }

    /// Write `values` to the `selection` of the dataset.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if:
    ///  - the dataset is closed ([`DatasetError::UseAfterClose`]),
    ///  - `values` has the wrong data type ([`ValidationError::TypeMismatch`]),
    ///  - `selection` is out of bounds ([`ValidationError::OutOfBounds`]) or does not match the number of values ([`ValidationError::SizeMismatch`]),
    ///  - a value is out of range ([`ValidationError::RangeError`]) or a string does not fit, or
    ///  - there is an underlying store error.
    pub fn write_selection(
        &self,
        selection: &Selection,
        values: impl Into<Elements>,
    ) -> Result<(), DatasetError> {
        let handle = self.handle()?;
        let elements: Elements = values.into();
        check_data_type(self.spec.data_type(), &elements)?;
        let num_elements = selection.validate(&self.shape)?;
        if num_elements != elements.len() as u64 {
            return Err(ValidationError::SizeMismatch {
                expected: num_elements,
                got: elements.len() as u64,
            }
            .into());
        }
        check_range(self.spec.range(), &elements)?;
        if num_elements == 0 {
            return Ok(());
        }
        let bytes = elements.to_store_bytes(self.spec.string_length())?;
        self.storage.dataset_write(handle, selection, &bytes)?;
        Ok(())
    }

    /// Read the `selection` of the dataset as [`Elements`].
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if:
    ///  - the dataset is closed ([`DatasetError::UseAfterClose`]),
    ///  - `selection` is out of bounds ([`ValidationError::OutOfBounds`]),
    ///  - the stored values cannot be decoded ([`ValidationError::CorruptData`]) or are out of range, or
    ///  - there is an underlying store error.
    pub fn read_selection_elements(&self, selection: &Selection) -> Result<Elements, DatasetError> {
        let handle = self.handle()?;
        let num_elements = selection.validate(&self.shape)?;
        let data_type = self.spec.data_type();
        if num_elements == 0 {
            return Ok(Elements::empty(data_type));
        }
        let bytes = self.storage.dataset_read(handle, selection)?;
        let elements = Elements::from_store_bytes(data_type, &bytes, self.spec.string_length())?;
        if elements.len() as u64 != num_elements {
            return Err(ValidationError::CorruptData(format!(
                "read {} elements from {}, expected {num_elements}",
                elements.len(),
                self.path
            ))
            .into());
        }
        if global_config().validate_ranges_on_read() {
            check_range(self.spec.range(), &elements)?;
        }
        Ok(elements)
    }

    /// Read the `selection` of the dataset.
    ///
    /// # Errors
    /// See [`Dataset::read_selection_elements`].
    /// Returns [`ValidationError::TypeMismatch`] if `T` does not match the dataset data type.
    pub fn read_selection<T: Element>(&self, selection: &Selection) -> Result<Vec<T>, DatasetError> {
        Ok(T::from_elements(self.read_selection_elements(selection)?)?)
    }

    /// Write every element of the dataset.
    ///
    /// # Errors
    /// See [`Dataset::write_selection`].
    pub fn write_full(&self, values: impl Into<Elements>) -> Result<(), DatasetError> {
        self.write_selection(&Selection::All, values)
    }

    /// Read every element of the dataset.
    ///
    /// # Errors
    /// See [`Dataset::read_selection`].
    pub fn read_full<T: Element>(&self) -> Result<Vec<T>, DatasetError> {
        self.read_selection(&Selection::All)
    }

    /// Read every element of the dataset into `out`.
    ///
    /// # Errors
    /// See [`Dataset::read_selection`].
    /// Returns [`ValidationError::SizeMismatch`] if the length of `out` does not match the number of elements of the dataset.
    pub fn read_full_into<T: Element>(&self, out: &mut [T]) -> Result<(), DatasetError> {
        self.handle()?;
        check_num_elements(&self.shape, out.len())?;
        let values = self.read_full::<T>()?;
        out.clone_from_slice(&values);
        Ok(())
    }

    /// Write the `hyperslab` of the dataset.
    ///
    /// A hyperslab with no start or count selects the whole dataset.
    ///
    /// # Errors
    /// See [`Dataset::write_selection`].
    pub fn write_slice(
        &self,
        hyperslab: &Hyperslab,
        values: impl Into<Elements>,
    ) -> Result<(), DatasetError> {
        self.write_selection(&Selection::from(hyperslab.clone()), values)
    }

    /// Read the `hyperslab` of the dataset.
    ///
    /// A hyperslab with no start or count selects the whole dataset.
    ///
    /// # Errors
    /// See [`Dataset::read_selection`].
    pub fn read_slice<T: Element>(&self, hyperslab: &Hyperslab) -> Result<Vec<T>, DatasetError> {
        self.read_selection(&Selection::from(hyperslab.clone()))
    }

    /// Read the elements at `points`, in order.
    ///
    /// An empty list of points reads nothing.
    ///
    /// # Errors
    /// See [`Dataset::read_selection`].
    pub fn read_at<T: Element>(&self, points: &[ArrayIndices]) -> Result<Vec<T>, DatasetError> {
        self.read_selection(&Selection::Points(points.to_vec()))
    }

    /// Write `values` to the elements at `points`, in order.
    ///
    /// # Errors
    /// See [`Dataset::write_selection`].
    pub fn write_at(
        &self,
        points: &[ArrayIndices],
        values: impl Into<Elements>,
    ) -> Result<(), DatasetError> {
        self.write_selection(&Selection::Points(points.to_vec()), values)
    }

    /// Close the dataset, releasing its store handle.
    ///
    /// # Errors
    /// Returns [`DatasetError::DoubleClose`] if the dataset is already closed, or a store error if the handle cannot be released.
    pub fn close(&mut self) -> Result<(), DatasetError> {
        let handle = self.handle.take().ok_or(DatasetError::DoubleClose)?;
        self.state = DatasetState::Closed;
        self.storage.dataset_close(handle)?;
        Ok(())
    }
}

fn store_data_type(spec: &DatasetSpec) -> StoreDataType {
    spec.data_type().store_data_type(spec.string_length())
}

impl<TStorage: ?Sized + HierarchyStorageTraits> Drop for Dataset<TStorage> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match self.storage.dataset_close(handle) {
                Ok(()) => log::debug!("dataset {} closed on drop", self.path),
                Err(err) => log::warn!("failed to close dataset {} on drop: {err}", self.path),
            }
        }
    }
}

//! Hierarchical storage ([stores](store) and [storage adapters](storage_adapter)).
//!
//! A store holds a hierarchy of groups. Each group has named attributes, child groups, and datasets.
//! Attributes and datasets are typed n-dimensional arrays, described by [`ValueMetadata`].
//!
//! Stores implement [`HierarchyStorageTraits`]. Open groups and datasets are referred to by owned handles issued by the store:
//!  - a [`GroupHandle`] from [`root`](HierarchyStorageTraits::root), [`group_create`](HierarchyStorageTraits::group_create), or [`group_open`](HierarchyStorageTraits::group_open), and
//!  - a [`DatasetHandle`] from [`dataset_create`](HierarchyStorageTraits::dataset_create) or [`dataset_open`](HierarchyStorageTraits::dataset_open).
//!
//! Handles are released by passing them by value to [`group_close`](HierarchyStorageTraits::group_close) and [`dataset_close`](HierarchyStorageTraits::dataset_close).
//! Every store method given a handle it did not issue, or one which was already closed, fails with [`StorageError::InvalidHandle`].
//!
//! Stores do not interpret values beyond their [`StoreDataType`] and shape.

pub mod storage_adapter;
pub mod store;

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    node::{NodeNameError, NodePath, NodePathError},
    selection::Selection,
    validation::ValidationError,
    ArrayShape,
};

/// The identifier of the root group handle.
pub const ROOT_HANDLE_ID: u64 = 0;

/// The element data type of a stored attribute or dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreDataType {
    /// A native endian 32-bit unsigned integer.
    #[serde(rename = "uint32")]
    UInt32,
    /// A native endian 32-bit signed integer.
    Int32,
    /// A native endian 64-bit float.
    Float64,
    /// A NUL padded string of a fixed number of bytes.
    FixedString(usize),
}

impl StoreDataType {
    /// The size of an element in bytes.
    #[must_use]
    pub const fn element_size(&self) -> usize {
        match self {
            Self::UInt32 | Self::Int32 => 4,
            Self::Float64 => 8,
            Self::FixedString(length) => *length,
        }
    }
}

impl Display for StoreDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UInt32 => write!(f, "uint32"),
            Self::Int32 => write!(f, "int32"),
            Self::Float64 => write!(f, "float64"),
            Self::FixedString(length) => write!(f, "string[{length}]"),
        }
    }
}

/// The data type and shape of a stored attribute or dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMetadata {
    /// The element data type.
    pub data_type: StoreDataType,
    /// The shape. Empty for a scalar.
    pub shape: ArrayShape,
}

impl ValueMetadata {
    /// Create new value metadata.
    #[must_use]
    pub fn new(data_type: StoreDataType, shape: ArrayShape) -> Self {
        Self { data_type, shape }
    }

    /// The number of elements.
    ///
    /// # Errors
    /// Returns [`ValidationError::ExtentOverflow`] if the product of the extents does not fit in a `u64`.
    pub fn num_elements(&self) -> Result<u64, ValidationError> {
        crate::validation::num_elements(&self.shape)
    }

    /// The size of the value in bytes.
    ///
    /// # Errors
    /// Returns [`StorageError::Selection`] if the number of elements overflows, or [`StorageError::Other`] if the size is not addressable.
    pub fn size(&self) -> Result<usize, StorageError> {
        usize::try_from(self.num_elements()?)
            .ok()
            .and_then(|n| n.checked_mul(self.data_type.element_size()))
            .ok_or_else(|| format!("a value of shape {:?} is too large", self.shape).into())
    }

    /// Check `data_type` and `shape` against the stored metadata of the value at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::IncompatibleDataType`] or [`StorageError::IncompatibleShape`] on a mismatch.
    pub fn check(
        &self,
        path: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<(), StorageError> {
        if self.data_type != data_type {
            return Err(StorageError::IncompatibleDataType {
                path: path.to_string(),
                actual: self.data_type,
                requested: data_type,
            });
        }
        if self.shape != shape {
            return Err(StorageError::IncompatibleShape {
                path: path.to_string(),
                actual: self.shape.clone(),
                requested: shape.to_vec(),
            });
        }
        Ok(())
    }
}

/// An owned handle to an open group.
///
/// A handle is not [`Clone`]: it is released exactly once by [`HierarchyStorageTraits::group_close`].
#[derive(Debug, PartialEq, Eq)]
pub struct GroupHandle {
    id: u64,
    path: NodePath,
}

impl GroupHandle {
    /// Create a new group handle.
    ///
    /// Only stores should create handles.
    #[must_use]
    pub fn new(id: u64, path: NodePath) -> Self {
        Self { id, path }
    }

    /// The handle id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The path of the group.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Returns true if this is the handle of the root group.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id == ROOT_HANDLE_ID
    }
}

/// An owned handle to an open dataset.
///
/// A handle is not [`Clone`]: it is released exactly once by [`HierarchyStorageTraits::dataset_close`].
#[derive(Debug, PartialEq, Eq)]
pub struct DatasetHandle {
    id: u64,
    path: NodePath,
}

impl DatasetHandle {
    /// Create a new dataset handle.
    ///
    /// Only stores should create handles.
    #[must_use]
    pub fn new(id: u64, path: NodePath) -> Self {
        Self { id, path }
    }

    /// The handle id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The path of the dataset.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }
}

/// Traits for a store of a group hierarchy.
///
/// Relative `path` arguments may have several `/` separated segments.
pub trait HierarchyStorageTraits: Send + Sync {
    /// Returns a handle to the root group.
    ///
    /// The root handle is always valid and closing it has no effect.
    fn root(&self) -> GroupHandle;

    /// Returns true if a group exists at `path` relative to `parent`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if `parent` is invalid or there is an underlying store error.
    fn group_exists(&self, parent: &GroupHandle, path: &str) -> Result<bool, StorageError>;

    /// Create a group at `path` relative to `parent`, creating any missing intermediate groups, and open it.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeExists`] if a node already exists at `path`, or another [`StorageError`] on failure.
    fn group_create(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError>;

    /// Open the group at `path` relative to `parent`.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeNotFound`] if there is no group at `path`, or another [`StorageError`] on failure.
    fn group_open(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError>;

    /// Close an open group.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidHandle`] if `group` is not open.
    fn group_close(&self, group: GroupHandle) -> Result<(), StorageError>;

    /// Returns true if `group` has an attribute `name`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if `group` is invalid or there is an underlying store error.
    fn attr_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError>;

    /// Returns the data type and shape of attribute `name` of `group`.
    ///
    /// # Errors
    /// Returns [`StorageError::AttributeNotFound`] if the attribute does not exist, or another [`StorageError`] on failure.
    fn attr_metadata(&self, group: &GroupHandle, name: &str) -> Result<ValueMetadata, StorageError>;

    /// Write attribute `name` of `group`, replacing any existing attribute with that name.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidBytesLength`] if `bytes` does not match `data_type` and `shape`, or another [`StorageError`] on failure.
    fn attr_write(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    /// Read attribute `name` of `group`.
    ///
    /// # Errors
    /// Returns [`StorageError::IncompatibleDataType`] or [`StorageError::IncompatibleShape`] if the stored attribute differs from `data_type` and `shape`, or another [`StorageError`] on failure.
    fn attr_read(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<Vec<u8>, StorageError>;

    /// Returns true if `group` has a dataset `name`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if `group` is invalid or there is an underlying store error.
    fn dataset_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError>;

    /// Create a zero initialised dataset `name` in `group` and open it.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeExists`] if a node already exists at `name`, or another [`StorageError`] on failure.
    fn dataset_create(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<DatasetHandle, StorageError>;

    /// Open dataset `name` in `group`.
    ///
    /// # Errors
    /// Returns [`StorageError::NodeNotFound`] if there is no dataset `name`, or another [`StorageError`] on failure.
    fn dataset_open(&self, group: &GroupHandle, name: &str) -> Result<DatasetHandle, StorageError>;

    /// Returns the data type and shape of an open dataset.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidHandle`] if `dataset` is not open, or another [`StorageError`] on failure.
    fn dataset_metadata(&self, dataset: &DatasetHandle) -> Result<ValueMetadata, StorageError>;

    /// Returns the shape of an open dataset.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidHandle`] if `dataset` is not open, or another [`StorageError`] on failure.
    fn dataset_shape(&self, dataset: &DatasetHandle) -> Result<ArrayShape, StorageError> {
        Ok(self.dataset_metadata(dataset)?.shape)
    }

    /// Read the `selection` of an open dataset.
    ///
    /// The bytes of the selected elements are returned in selection order.
    ///
    /// # Errors
    /// Returns [`StorageError::Selection`] if `selection` is incompatible with the dataset shape, or another [`StorageError`] on failure.
    fn dataset_read(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
    ) -> Result<Vec<u8>, StorageError>;

    /// Write `bytes` to the `selection` of an open dataset.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidBytesLength`] if `bytes` does not match the selection, [`StorageError::Selection`] if `selection` is incompatible with the dataset shape, or another [`StorageError`] on failure.
    fn dataset_write(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    /// Close an open dataset.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidHandle`] if `dataset` is not open.
    fn dataset_close(&self, dataset: DatasetHandle) -> Result<(), StorageError>;
}

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A handle which is not open.
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// A node does not exist.
    #[error("node {0} not found")]
    NodeNotFound(String),
    /// A node already exists.
    #[error("node {0} already exists")]
    NodeExists(String),
    /// An attribute does not exist.
    #[error("attribute {name} not found in {path}")]
    AttributeNotFound {
        /// The group path.
        path: String,
        /// The attribute name.
        name: String,
    },
    /// A stored value has a different data type to the one requested.
    #[error("{path} has data type {actual}, requested {requested}")]
    IncompatibleDataType {
        /// The path of the value.
        path: String,
        /// The stored data type.
        actual: StoreDataType,
        /// The requested data type.
        requested: StoreDataType,
    },
    /// A stored value has a different shape to the one requested.
    #[error("{path} has shape {actual:?}, requested {requested:?}")]
    IncompatibleShape {
        /// The path of the value.
        path: String,
        /// The stored shape.
        actual: ArrayShape,
        /// The requested shape.
        requested: ArrayShape,
    },
    /// The number of bytes does not match the data type and shape.
    #[error("expected {expected} bytes, got {got}")]
    InvalidBytesLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },
    /// A selection or shape failed validation.
    #[error(transparent)]
    Selection(#[from] ValidationError),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An error parsing the metadata of a node.
    #[error("error parsing metadata for {0}: {1}")]
    InvalidMetadata(String, String),
    /// An invalid node path.
    #[error("invalid node path {0}")]
    NodePathError(#[from] NodePathError),
    /// An invalid node name.
    #[error("invalid node name {0}")]
    NodeNameError(#[from] NodeNameError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Check that `bytes` has `expected` length.
///
/// # Errors
/// Returns [`StorageError::InvalidBytesLength`] otherwise.
pub fn check_bytes_length(bytes: &[u8], expected: usize) -> Result<(), StorageError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(StorageError::InvalidBytesLength {
            expected,
            got: bytes.len(),
        })
    }
}

/// Group sorted or unsorted linearised indices into runs of consecutive indices.
///
/// Returns `(first index, number of elements)` pairs in the order of `indices`.
#[must_use]
pub fn contiguous_runs(indices: &[u64]) -> Vec<(u64, u64)> {
    let mut runs: Vec<(u64, u64)> = Vec::new();
    for &index in indices {
        match runs.last_mut() {
            Some((start, length)) if *start + *length == index => *length += 1,
            _ => runs.push((index, 1)),
        }
    }
    runs
}

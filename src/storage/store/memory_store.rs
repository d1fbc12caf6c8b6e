//! An in-memory store.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::{
    node::{NodeName, NodePath},
    selection::Selection,
    storage::{
        check_bytes_length, contiguous_runs, DatasetHandle, GroupHandle, HierarchyStorageTraits,
        StorageError, StoreDataType, ValueMetadata, ROOT_HANDLE_ID,
    },
};

use super::{ancestors_and_self, OpenHandles};

#[derive(Debug)]
struct MemoryValue {
    metadata: ValueMetadata,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct MemoryHierarchy {
    /// Group paths and their attributes.
    groups: BTreeMap<NodePath, BTreeMap<String, MemoryValue>>,
    datasets: BTreeMap<NodePath, MemoryValue>,
    handles: OpenHandles,
}

impl MemoryHierarchy {
    fn node_exists(&self, path: &NodePath) -> bool {
        self.groups.contains_key(path) || self.datasets.contains_key(path)
    }

    fn attributes(
        &self,
        group: &GroupHandle,
    ) -> Result<(NodePath, &BTreeMap<String, MemoryValue>), StorageError> {
        let path = self.handles.group_path(group)?;
        let attributes = self
            .groups
            .get(&path)
            .ok_or_else(|| StorageError::NodeNotFound(path.to_string()))?;
        Ok((path, attributes))
    }

    fn dataset(&self, dataset: &DatasetHandle) -> Result<(NodePath, &MemoryValue), StorageError> {
        let path = self.handles.dataset_path(dataset)?;
        let value = self
            .datasets
            .get(&path)
            .ok_or_else(|| StorageError::NodeNotFound(path.to_string()))?;
        Ok((path, value))
    }
}

/// An in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    hierarchy: Mutex<MemoryHierarchy>,
}

impl MemoryStore {
    /// Create a new memory store holding an empty root group.
    #[must_use]
    pub fn new() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(NodePath::root(), BTreeMap::new());
        Self {
            hierarchy: Mutex::new(MemoryHierarchy {
                groups,
                datasets: BTreeMap::new(),
                handles: OpenHandles::default(),
            }),
        }
    }

    /// The number of open group and dataset handles, excluding the root.
    #[must_use]
    pub fn num_open_handles(&self) -> usize {
        let hierarchy = self.hierarchy.lock();
        hierarchy.handles.groups.len() + hierarchy.handles.datasets.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn byte_range(
    (start, length): (u64, u64),
    element_size: usize,
) -> Result<std::ops::Range<usize>, StorageError> {
    let start = usize::try_from(start).map_err(|_| StorageError::from("index overflow"))?;
    let length = usize::try_from(length).map_err(|_| StorageError::from("index overflow"))?;
    Ok(start * element_size..(start + length) * element_size)
}

impl HierarchyStorageTraits for MemoryStore {
    fn root(&self) -> GroupHandle {
        GroupHandle::new(ROOT_HANDLE_ID, NodePath::root())
    }

    fn group_exists(&self, parent: &GroupHandle, path: &str) -> Result<bool, StorageError> {
        let hierarchy = self.hierarchy.lock();
        let path = hierarchy.handles.group_path(parent)?.join(path)?;
        Ok(hierarchy.groups.contains_key(&path))
    }

    fn group_create(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError> {
        let mut hierarchy = self.hierarchy.lock();
        let path = hierarchy.handles.group_path(parent)?.join(path)?;
        if hierarchy.node_exists(&path) {
            return Err(StorageError::NodeExists(path.to_string()));
        }
        let ancestors = ancestors_and_self(&path);
        if let Some(dataset) = ancestors.iter().find(|p| hierarchy.datasets.contains_key(*p)) {
            return Err(StorageError::NodeExists(dataset.to_string()));
        }
        for ancestor in ancestors {
            hierarchy.groups.entry(ancestor).or_default();
        }
        Ok(hierarchy.handles.open_group(path))
    }

    fn group_open(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError> {
        let mut hierarchy = self.hierarchy.lock();
        let path = hierarchy.handles.group_path(parent)?.join(path)?;
        if hierarchy.groups.contains_key(&path) {
            Ok(hierarchy.handles.open_group(path))
        } else {
            Err(StorageError::NodeNotFound(path.to_string()))
        }
    }

    fn group_close(&self, group: GroupHandle) -> Result<(), StorageError> {
        self.hierarchy.lock().handles.close_group(group)
    }

    fn attr_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError> {
        let hierarchy = self.hierarchy.lock();
        let (_, attributes) = hierarchy.attributes(group)?;
        Ok(attributes.contains_key(name))
    }

    fn attr_metadata(&self, group: &GroupHandle, name: &str) -> Result<ValueMetadata, StorageError> {
        let hierarchy = self.hierarchy.lock();
        let (path, attributes) = hierarchy.attributes(group)?;
        attributes
            .get(name)
            .map(|value| value.metadata.clone())
            .ok_or_else(|| StorageError::AttributeNotFound {
                path: path.to_string(),
                name: name.to_string(),
            })
    }

    fn attr_write(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let name = NodeName::new(name)?;
        let metadata = ValueMetadata::new(data_type, shape.to_vec());
        check_bytes_length(bytes, metadata.size()?)?;

        let mut hierarchy = self.hierarchy.lock();
        let path = hierarchy.handles.group_path(group)?;
        let attributes = hierarchy
            .groups
            .get_mut(&path)
            .ok_or_else(|| StorageError::NodeNotFound(path.to_string()))?;
        attributes.insert(
            name.as_str().to_string(),
            MemoryValue {
                metadata,
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }

    fn attr_read(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<Vec<u8>, StorageError> {
        let hierarchy = self.hierarchy.lock();
        let (path, attributes) = hierarchy.attributes(group)?;
        let value = attributes
            .get(name)
            .ok_or_else(|| StorageError::AttributeNotFound {
                path: path.to_string(),
                name: name.to_string(),
            })?;
        value
            .metadata
            .check(&format!("{path}@{name}"), data_type, shape)?;
        Ok(value.bytes.clone())
    }

    fn dataset_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError> {
        let hierarchy = self.hierarchy.lock();
        let path = hierarchy.handles.group_path(group)?.join(name)?;
        Ok(hierarchy.datasets.contains_key(&path))
    }

    fn dataset_create(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<DatasetHandle, StorageError> {
        let name = NodeName::new(name)?;
        let metadata = ValueMetadata::new(data_type, shape.to_vec());
        let size = metadata.size()?;

        let mut hierarchy = self.hierarchy.lock();
        let path = hierarchy
            .handles
            .group_path(group)?
            .join(name.as_str())?;
        if hierarchy.node_exists(&path) {
            return Err(StorageError::NodeExists(path.to_string()));
        }
        hierarchy.datasets.insert(
            path.clone(),
            MemoryValue {
                metadata,
                bytes: vec![0; size],
            },
        );
        Ok(hierarchy.handles.open_dataset(path))
    }

    fn dataset_open(&self, group: &GroupHandle, name: &str) -> Result<DatasetHandle, StorageError> {
        let mut hierarchy = self.hierarchy.lock();
        let path = hierarchy.handles.group_path(group)?.join(name)?;
        if hierarchy.datasets.contains_key(&path) {
            Ok(hierarchy.handles.open_dataset(path))
        } else {
            Err(StorageError::NodeNotFound(path.to_string()))
        }
    }

    fn dataset_metadata(&self, dataset: &DatasetHandle) -> Result<ValueMetadata, StorageError> {
        let hierarchy = self.hierarchy.lock();
        let (_, value) = hierarchy.dataset(dataset)?;
        Ok(value.metadata.clone())
    }

    fn dataset_read(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
    ) -> Result<Vec<u8>, StorageError> {
        let hierarchy = self.hierarchy.lock();
        let (_, value) = hierarchy.dataset(dataset)?;
        let element_size = value.metadata.data_type.element_size();
        let indices = selection.linearised_indices(&value.metadata.shape)?;
        let mut bytes = Vec::with_capacity(indices.len() * element_size);
        for run in contiguous_runs(&indices) {
            bytes.extend_from_slice(&value.bytes[byte_range(run, element_size)?]);
        }
        Ok(bytes)
    }

    fn dataset_write(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let mut hierarchy = self.hierarchy.lock();
        let path = hierarchy.handles.dataset_path(dataset)?;
        let value = hierarchy
            .datasets
            .get_mut(&path)
            .ok_or_else(|| StorageError::NodeNotFound(path.to_string()))?;
        let element_size = value.metadata.data_type.element_size();
        let indices = selection.linearised_indices(&value.metadata.shape)?;
        check_bytes_length(bytes, indices.len() * element_size)?;

        let mut offset = 0;
        for run in contiguous_runs(&indices) {
            let range = byte_range(run, element_size)?;
            let length = range.len();
            value.bytes[range].copy_from_slice(&bytes[offset..offset + length]);
            offset += length;
        }
        Ok(())
    }

    fn dataset_close(&self, dataset: DatasetHandle) -> Result<(), StorageError> {
        self.hierarchy.lock().handles.close_dataset(dataset)
    }
}

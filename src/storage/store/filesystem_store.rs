//! A filesystem store.
//!
//! Every node is a directory holding an `escdf.json` metadata file.
//! A group's metadata holds its attributes.
//! A dataset's metadata holds its data type and shape, and its elements are stored in C order in a raw `escdf.data` file.
//!
//! ```text
//! base_path/
//! ├── escdf.json          {"node_type":"group","attributes":{}}
//! └── system/
//!     ├── escdf.json      {"node_type":"group","attributes":{"number_of_physical_dimensions":{...}}}
//!     └── species_names/
//!         ├── escdf.json  {"node_type":"dataset","data_type":{"fixed_string":80},"shape":[5]}
//!         └── escdf.data
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    node::{NodeName, NodePath},
    selection::Selection,
    storage::{
        check_bytes_length, contiguous_runs, DatasetHandle, GroupHandle, HierarchyStorageTraits,
        StorageError, StoreDataType, ValueMetadata, ROOT_HANDLE_ID,
    },
    ArrayShape,
};

use super::{ancestors_and_self, OpenHandles};

const METADATA_FILE: &str = "escdf.json";
const DATA_FILE: &str = "escdf.data";

#[derive(Serialize, Deserialize, Debug, Clone)]
struct StoredAttribute {
    data_type: StoreDataType,
    shape: ArrayShape,
    bytes: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "node_type", rename_all = "lowercase")]
enum NodeMetadata {
    Group {
        attributes: BTreeMap<String, StoredAttribute>,
    },
    Dataset(ValueMetadata),
}

impl NodeMetadata {
    fn new_group() -> Self {
        Self::Group {
            attributes: BTreeMap::new(),
        }
    }
}

/// A synchronous filesystem store.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    handles: Mutex<OpenHandles>,
    nodes: Mutex<HashMap<NodePath, Weak<RwLock<()>>>>,
}

impl FilesystemStore {
    /// Create a new filesystem store at a given `base_path`.
    ///
    /// The base path is created with an empty root group if it does not exist.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path`:
    ///   - is not valid,
    ///   - points to an existing file rather than a directory, or
    ///   - is a directory which is not a group of this store.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() || base_path.is_file() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }

        let root_metadata = base_path.join(METADATA_FILE);
        let readonly = if base_path.exists() {
            let md = std::fs::metadata(&base_path)?;
            md.permissions().readonly()
        } else {
            std::fs::create_dir_all(&base_path)?;
            false
        };
        if !root_metadata.exists() {
            if readonly {
                return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
            }
            let metadata = serde_json::to_vec_pretty(&NodeMetadata::new_group())
                .map_err(|err| FilesystemStoreCreateError::IOError(err.into()))?;
            std::fs::write(&root_metadata, metadata)?;
        }

        Ok(Self {
            base_path,
            readonly,
            handles: Mutex::default(),
            nodes: Mutex::default(),
        })
    }

    /// The base path of the store.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns true if the store is read only.
    #[must_use]
    pub const fn readonly(&self) -> bool {
        self.readonly
    }

    /// Maps a [`NodePath`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn node_path_to_fspath(&self, path: &NodePath) -> PathBuf {
        let mut fspath = self.base_path.clone();
        fspath.extend(path.segments());
        fspath
    }

    /// The lock of the node at `path`.
    ///
    /// Only locks which are currently held are kept in the map.
    fn node_lock(&self, path: &NodePath) -> Arc<RwLock<()>> {
        let mut nodes = self.nodes.lock();
        if let Some(lock) = nodes.get(path).and_then(Weak::upgrade) {
            return lock;
        }
        nodes.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(RwLock::default());
        nodes.insert(path.clone(), Arc::downgrade(&lock));
        lock
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.readonly {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn read_metadata(&self, path: &NodePath) -> Result<Option<NodeMetadata>, StorageError> {
        let fspath = self.node_path_to_fspath(path).join(METADATA_FILE);
        let bytes = match std::fs::read(fspath) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| StorageError::InvalidMetadata(path.to_string(), err.to_string()))
    }

    fn write_metadata(&self, path: &NodePath, metadata: &NodeMetadata) -> Result<(), StorageError> {
        let fspath = self.node_path_to_fspath(path);
        std::fs::create_dir_all(&fspath)?;
        let bytes = serde_json::to_vec_pretty(metadata)
            .map_err(|err| StorageError::InvalidMetadata(path.to_string(), err.to_string()))?;
        std::fs::write(fspath.join(METADATA_FILE), bytes)?;
        Ok(())
    }

    fn group_attributes(
        &self,
        path: &NodePath,
    ) -> Result<BTreeMap<String, StoredAttribute>, StorageError> {
        match self.read_metadata(path)? {
            Some(NodeMetadata::Group { attributes }) => Ok(attributes),
            Some(NodeMetadata::Dataset(_)) | None => Err(StorageError::NodeNotFound(path.to_string())),
        }
    }

    fn dataset_value_metadata(&self, path: &NodePath) -> Result<ValueMetadata, StorageError> {
        match self.read_metadata(path)? {
            Some(NodeMetadata::Dataset(metadata)) => Ok(metadata),
            Some(NodeMetadata::Group { .. }) | None => Err(StorageError::NodeNotFound(path.to_string())),
        }
    }

    fn group_path(&self, group: &GroupHandle) -> Result<NodePath, StorageError> {
        self.handles.lock().group_path(group)
    }

    fn dataset_path(&self, dataset: &DatasetHandle) -> Result<NodePath, StorageError> {
        self.handles.lock().dataset_path(dataset)
    }
}

fn file_offset(index: u64, element_size: usize) -> u64 {
    index * element_size as u64
}

fn run_length(length: u64, element_size: usize) -> Result<usize, StorageError> {
    usize::try_from(length)
        .ok()
        .and_then(|length| length.checked_mul(element_size))
        .ok_or_else(|| StorageError::from("selection is too large"))
}

impl HierarchyStorageTraits for FilesystemStore {
    fn root(&self) -> GroupHandle {
        GroupHandle::new(ROOT_HANDLE_ID, NodePath::root())
    }

    fn group_exists(&self, parent: &GroupHandle, path: &str) -> Result<bool, StorageError> {
        let path = self.group_path(parent)?.join(path)?;
        Ok(matches!(
            self.read_metadata(&path)?,
            Some(NodeMetadata::Group { .. })
        ))
    }

    fn group_create(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError> {
        self.check_writable()?;
        let path = self.group_path(parent)?.join(path)?;
        let lock = self.node_lock(&NodePath::root());
        let _lock = lock.write();

        if self.read_metadata(&path)?.is_some() {
            return Err(StorageError::NodeExists(path.to_string()));
        }
        for ancestor in ancestors_and_self(&path) {
            match self.read_metadata(&ancestor)? {
                Some(NodeMetadata::Group { .. }) => {}
                Some(NodeMetadata::Dataset(_)) => {
                    return Err(StorageError::NodeExists(ancestor.to_string()))
                }
                None => self.write_metadata(&ancestor, &NodeMetadata::new_group())?,
            }
        }
        Ok(self.handles.lock().open_group(path))
    }

    fn group_open(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError> {
        let path = self.group_path(parent)?.join(path)?;
        match self.read_metadata(&path)? {
            Some(NodeMetadata::Group { .. }) => Ok(self.handles.lock().open_group(path)),
            Some(NodeMetadata::Dataset(_)) | None => Err(StorageError::NodeNotFound(path.to_string())),
        }
    }

    fn group_close(&self, group: GroupHandle) -> Result<(), StorageError> {
        self.handles.lock().close_group(group)
    }

    fn attr_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError> {
        let path = self.group_path(group)?;
        let lock = self.node_lock(&path);
        let _lock = lock.read();
        Ok(self.group_attributes(&path)?.contains_key(name))
    }

    fn attr_metadata(&self, group: &GroupHandle, name: &str) -> Result<ValueMetadata, StorageError> {
        let path = self.group_path(group)?;
        let lock = self.node_lock(&path);
        let _lock = lock.read();
        self.group_attributes(&path)?
            .remove(name)
            .map(|attribute| ValueMetadata::new(attribute.data_type, attribute.shape))
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
        self.check_writable()?;
        let name = NodeName::new(name)?;
        check_bytes_length(bytes, ValueMetadata::new(data_type, shape.to_vec()).size()?)?;

        let path = self.group_path(group)?;
        let lock = self.node_lock(&path);
        let _lock = lock.write();
        let mut attributes = self.group_attributes(&path)?;
        attributes.insert(
            name.as_str().to_string(),
            StoredAttribute {
                data_type,
                shape: shape.to_vec(),
                bytes: bytes.to_vec(),
            },
        );
        self.write_metadata(&path, &NodeMetadata::Group { attributes })
    }

    fn attr_read(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<Vec<u8>, StorageError> {
        let path = self.group_path(group)?;
        let lock = self.node_lock(&path);
        let _lock = lock.read();
        let attribute = self.group_attributes(&path)?.remove(name).ok_or_else(|| {
            StorageError::AttributeNotFound {
                path: path.to_string(),
                name: name.to_string(),
            }
        })?;
        ValueMetadata::new(attribute.data_type, attribute.shape).check(
            &format!("{path}@{name}"),
            data_type,
            shape,
        )?;
        Ok(attribute.bytes)
    }

    fn dataset_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError> {
        let path = self.group_path(group)?.join(name)?;
        Ok(matches!(
            self.read_metadata(&path)?,
            Some(NodeMetadata::Dataset(_))
        ))
    }

    fn dataset_create(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<DatasetHandle, StorageError> {
        self.check_writable()?;
        let name = NodeName::new(name)?;
        let metadata = ValueMetadata::new(data_type, shape.to_vec());
        let size = metadata.size()?;

        let path = self.group_path(group)?.join(name.as_str())?;
        let lock = self.node_lock(&path);
        let _lock = lock.write();
        if self.read_metadata(&path)?.is_some() {
            return Err(StorageError::NodeExists(path.to_string()));
        }

        // a dataset is present once its metadata file exists
        let fspath = self.node_path_to_fspath(&path);
        std::fs::create_dir_all(&fspath)?;
        let data_path = fspath.join(DATA_FILE);
        let file = File::create(&data_path)?;
        if let Err(err) = file
            .set_len(size as u64)
            .map_err(StorageError::from)
            .and_then(|()| self.write_metadata(&path, &NodeMetadata::Dataset(metadata)))
        {
            drop(file);
            let _ = std::fs::remove_file(&data_path);
            return Err(err);
        }
        Ok(self.handles.lock().open_dataset(path))
    }

    fn dataset_open(&self, group: &GroupHandle, name: &str) -> Result<DatasetHandle, StorageError> {
        let path = self.group_path(group)?.join(name)?;
        self.dataset_value_metadata(&path)?;
        Ok(self.handles.lock().open_dataset(path))
    }

    fn dataset_metadata(&self, dataset: &DatasetHandle) -> Result<ValueMetadata, StorageError> {
        let path = self.dataset_path(dataset)?;
        self.dataset_value_metadata(&path)
    }

    fn dataset_read(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
    ) -> Result<Vec<u8>, StorageError> {
        let path = self.dataset_path(dataset)?;
        let lock = self.node_lock(&path);
        let _lock = lock.read();
        let metadata = self.dataset_value_metadata(&path)?;
        let element_size = metadata.data_type.element_size();
        let indices = selection.linearised_indices(&metadata.shape)?;

        let mut file = File::open(self.node_path_to_fspath(&path).join(DATA_FILE))?;
        let mut bytes = Vec::with_capacity(indices.len() * element_size);
        for (start, length) in contiguous_runs(&indices) {
            let offset = bytes.len();
            bytes.resize(offset + run_length(length, element_size)?, 0);
            file.seek(SeekFrom::Start(file_offset(start, element_size)))?;
            file.read_exact(&mut bytes[offset..])?;
        }
        Ok(bytes)
    }

    fn dataset_write(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        let path = self.dataset_path(dataset)?;
        let lock = self.node_lock(&path);
        let _lock = lock.write();
        let metadata = self.dataset_value_metadata(&path)?;
        let element_size = metadata.data_type.element_size();
        let indices = selection.linearised_indices(&metadata.shape)?;
        check_bytes_length(bytes, indices.len() * element_size)?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(self.node_path_to_fspath(&path).join(DATA_FILE))?;
        let mut offset = 0;
        for (start, length) in contiguous_runs(&indices) {
            let length = run_length(length, element_size)?;
            file.seek(SeekFrom::Start(file_offset(start, element_size)))?;
            file.write_all(&bytes[offset..offset + length])?;
            offset += length;
        }
        Ok(())
    }

    fn dataset_close(&self, dataset: DatasetHandle) -> Result<(), StorageError> {
        self.handles.lock().close_dataset(dataset)
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use crate::selection::Hyperslab;

    use super::*;

    #[test]
    fn filesystem_layout() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        assert!(path.path().join(METADATA_FILE).is_file());

        let root = store.root();
        let group = store.group_create(&root, "fields/density")?;
        assert!(path.path().join("fields").join(METADATA_FILE).is_file());
        assert!(store.group_exists(&root, "fields")?);
        assert!(matches!(
            store.group_create(&root, "fields"),
            Err(StorageError::NodeExists(_))
        ));

        let dataset = store.dataset_create(&group, "values", StoreDataType::Float64, &[2, 3])?;
        let data_path = path
            .path()
            .join("fields")
            .join("density")
            .join("values")
            .join(DATA_FILE);
        assert_eq!(std::fs::metadata(data_path)?.len(), 48);
        assert!(store.dataset_exists(&group, "values")?);
        assert!(!store.group_exists(&group, "values")?);
        assert!(matches!(
            store.group_create(&group, "values/inner"),
            Err(StorageError::NodeExists(_))
        ));
        store.dataset_close(dataset)?;
        store.group_close(group)?;
        Ok(())
    }

    #[test]
    fn filesystem_attributes_persist() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        {
            let store = FilesystemStore::new(path.path())?;
            let group = store.group_create(&store.root(), "system")?;
            store.attr_write(&group, "flag", StoreDataType::FixedString(4), &[], b"yes\0")?;
            store.group_close(group)?;
        }

        let store = FilesystemStore::new(path.path())?;
        let group = store.group_open(&store.root(), "system")?;
        assert!(store.attr_exists(&group, "flag")?);
        assert_eq!(
            store.attr_read(&group, "flag", StoreDataType::FixedString(4), &[])?,
            b"yes\0"
        );
        assert!(matches!(
            store.attr_metadata(&group, "missing"),
            Err(StorageError::AttributeNotFound { .. })
        ));
        store.group_close(group)?;
        Ok(())
    }

    #[test]
    fn filesystem_partial_io() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        let root = store.root();
        let dataset = store.dataset_create(&root, "values", StoreDataType::Int32, &[5])?;
        store.dataset_write(
            &dataset,
            &Hyperslab::new(vec![1], vec![2]).into(),
            bytemuck::cast_slice::<i32, u8>(&[-1, -2]),
        )?;
        store.dataset_write(
            &dataset,
            &Selection::Points(vec![vec![4]]),
            bytemuck::cast_slice::<i32, u8>(&[9]),
        )?;
        let bytes = store.dataset_read(&dataset, &Selection::All)?;
        assert_eq!(
            bytemuck::allocation::pod_collect_to_vec::<u8, i32>(&bytes),
            vec![0, -1, -2, 0, 9]
        );
        store.dataset_close(dataset)?;

        let dataset = store.dataset_open(&root, "values")?;
        assert_eq!(store.dataset_shape(&dataset)?, vec![5]);
        let bytes = store.dataset_read(&dataset, &Selection::Points(vec![vec![4], vec![2]]))?;
        assert_eq!(
            bytemuck::allocation::pod_collect_to_vec::<u8, i32>(&bytes),
            vec![9, -2]
        );
        store.dataset_close(dataset)?;
        Ok(())
    }

    #[test]
    fn filesystem_dataset_create_failure() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        let root = store.root();
        // a directory in place of the data file
        std::fs::create_dir_all(path.path().join("values").join(DATA_FILE))?;
        assert!(store
            .dataset_create(&root, "values", StoreDataType::Float64, &[4])
            .is_err());
        assert!(!store.dataset_exists(&root, "values")?);
        assert!(!path.path().join("values").join(METADATA_FILE).exists());
        Ok(())
    }

    #[test]
    fn filesystem_node_locks_released() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        let root = store.root();
        for name in ["a", "b", "c"] {
            let group = store.group_create(&root, name)?;
            store.attr_write(&group, "n", StoreDataType::UInt32, &[], &[1, 0, 0, 0])?;
            assert!(store.attr_exists(&group, "n")?);
            store.group_close(group)?;
        }
        let held = store.node_lock(&NodePath::new("/d")?);
        assert_eq!(store.nodes.lock().len(), 1);
        assert!(Arc::ptr_eq(&held, &store.node_lock(&NodePath::new("/d")?)));
        drop(held);
        let _lock = store.node_lock(&NodePath::new("/e")?);
        assert_eq!(store.nodes.lock().len(), 1);
        Ok(())
    }

    #[test]
    fn filesystem_invalid_base_path() -> Result<(), Box<dyn Error>> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(matches!(
            FilesystemStore::new(file.path()),
            Err(FilesystemStoreCreateError::InvalidBasePath(_))
        ));
        Ok(())
    }
}

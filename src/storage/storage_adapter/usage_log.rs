//! A storage adapter which prints function calls.

use std::{io::Write, sync::Arc};

use itertools::Itertools;
use parking_lot::Mutex;

use crate::{
    selection::Selection,
    storage::{
        DatasetHandle, GroupHandle, HierarchyStorageTraits, StorageError, StoreDataType,
        ValueMetadata,
    },
};

/// The usage log storage adapter. Logs storage method calls.
///
/// It is intended to aid in debugging by revealing the storage access patterns of groups and datasets.
///
/// ### Example (log to stdout)
/// ```rust
/// # use std::sync::Arc;
/// # use parking_lot::Mutex;
/// # use escdf::storage::store::MemoryStore;
/// # use escdf::storage::storage_adapter::usage_log::UsageLogStorageAdapter;
/// let store = Arc::new(MemoryStore::new());
/// let log_writer = Arc::new(Mutex::new(std::io::stdout()));
/// let store = Arc::new(UsageLogStorageAdapter::new(store, log_writer, || {
///     "[escdf] ".to_string()
/// }));
/// ```
///
/// Creating a group and writing a dataset through the above [`UsageLogStorageAdapter`] prints outputs like:
/// ```text
/// [escdf] group_create(/, system) -> Ok(1)
/// [escdf] attr_write(/system, number_of_physical_dimensions, uint32, [], len=4) -> Ok(())
/// [escdf] dataset_create(/system, species_names, string[80], [5]) -> Ok(2)
/// [escdf] dataset_write(/system/species_names, all, len=400) -> Ok(())
/// [escdf] dataset_close(2) -> Ok(())
/// ```
pub struct UsageLogStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    handle: Arc<Mutex<dyn Write + Send + Sync>>,
    prefix_func: fn() -> String,
}

impl<TStorage: ?Sized> core::fmt::Debug for UsageLogStorageAdapter<TStorage> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(f, "usage log")
    }
}

impl<TStorage: ?Sized> UsageLogStorageAdapter<TStorage> {
    /// Create a new usage log storage adapter.
    pub fn new(
        storage: Arc<TStorage>,
        handle: Arc<Mutex<dyn Write + Send + Sync>>,
        prefix_func: fn() -> String,
    ) -> Self {
        Self {
            storage,
            handle,
            prefix_func,
        }
    }

    fn log(&self, call: std::fmt::Arguments) -> Result<(), StorageError> {
        writeln!(self.handle.lock(), "{}{call}", (self.prefix_func)())?;
        Ok(())
    }
}

fn handle_id<T>(
    result: &Result<T, StorageError>,
    id: impl Fn(&T) -> u64,
) -> Result<u64, &StorageError> {
    result.as_ref().map(id)
}

impl<TStorage: ?Sized + HierarchyStorageTraits> HierarchyStorageTraits
    for UsageLogStorageAdapter<TStorage>
{
    fn root(&self) -> GroupHandle {
        self.storage.root()
    }

    fn group_exists(&self, parent: &GroupHandle, path: &str) -> Result<bool, StorageError> {
        let result = self.storage.group_exists(parent, path);
        self.log(format_args!(
            "group_exists({}, {path}) -> {result:?}",
            parent.path()
        ))?;
        result
    }

    fn group_create(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError> {
        let result = self.storage.group_create(parent, path);
        self.log(format_args!(
            "group_create({}, {path}) -> {:?}",
            parent.path(),
            handle_id(&result, GroupHandle::id)
        ))?;
        result
    }

    fn group_open(&self, parent: &GroupHandle, path: &str) -> Result<GroupHandle, StorageError> {
        let result = self.storage.group_open(parent, path);
        self.log(format_args!(
            "group_open({}, {path}) -> {:?}",
            parent.path(),
            handle_id(&result, GroupHandle::id)
        ))?;
        result
    }

    fn group_close(&self, group: GroupHandle) -> Result<(), StorageError> {
        let id = group.id();
        let result = self.storage.group_close(group);
        self.log(format_args!("group_close({id}) -> {result:?}"))?;
        result
    }

    fn attr_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError> {
        let result = self.storage.attr_exists(group, name);
        self.log(format_args!(
            "attr_exists({}, {name}) -> {result:?}",
            group.path()
        ))?;
        result
    }

    fn attr_metadata(&self, group: &GroupHandle, name: &str) -> Result<ValueMetadata, StorageError> {
        let result = self.storage.attr_metadata(group, name);
        self.log(format_args!(
            "attr_metadata({}, {name}) -> {:?}",
            group.path(),
            result
                .as_ref()
                .map(|metadata| format!("{} {:?}", metadata.data_type, metadata.shape))
        ))?;
        result
    }

    fn attr_write(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let result = self
            .storage
            .attr_write(group, name, data_type, shape, bytes);
        self.log(format_args!(
            "attr_write({}, {name}, {data_type}, [{}], len={}) -> {result:?}",
            group.path(),
            shape.iter().format(", "),
            bytes.len()
        ))?;
        result
    }

    fn attr_read(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<Vec<u8>, StorageError> {
        let result = self.storage.attr_read(group, name, data_type, shape);
        self.log(format_args!(
            "attr_read({}, {name}, {data_type}, [{}]) -> len={:?}",
            group.path(),
            shape.iter().format(", "),
            result.as_ref().map(Vec::len)
        ))?;
        result
    }

    fn dataset_exists(&self, group: &GroupHandle, name: &str) -> Result<bool, StorageError> {
        let result = self.storage.dataset_exists(group, name);
        self.log(format_args!(
            "dataset_exists({}, {name}) -> {result:?}",
            group.path()
        ))?;
        result
    }

    fn dataset_create(
        &self,
        group: &GroupHandle,
        name: &str,
        data_type: StoreDataType,
        shape: &[u64],
    ) -> Result<DatasetHandle, StorageError> {
        let result = self.storage.dataset_create(group, name, data_type, shape);
        self.log(format_args!(
            "dataset_create({}, {name}, {data_type}, [{}]) -> {:?}",
            group.path(),
            shape.iter().format(", "),
            handle_id(&result, DatasetHandle::id)
        ))?;
        result
    }

    fn dataset_open(&self, group: &GroupHandle, name: &str) -> Result<DatasetHandle, StorageError> {
        let result = self.storage.dataset_open(group, name);
        self.log(format_args!(
            "dataset_open({}, {name}) -> {:?}",
            group.path(),
            handle_id(&result, DatasetHandle::id)
        ))?;
        result
    }

    fn dataset_metadata(&self, dataset: &DatasetHandle) -> Result<ValueMetadata, StorageError> {
        let result = self.storage.dataset_metadata(dataset);
        self.log(format_args!(
            "dataset_metadata({}) -> {:?}",
            dataset.path(),
            result
                .as_ref()
                .map(|metadata| format!("{} {:?}", metadata.data_type, metadata.shape))
        ))?;
        result
    }

    fn dataset_read(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
    ) -> Result<Vec<u8>, StorageError> {
        let result = self.storage.dataset_read(dataset, selection);
        self.log(format_args!(
            "dataset_read({}, {selection}) -> len={:?}",
            dataset.path(),
            result.as_ref().map(Vec::len)
        ))?;
        result
    }

    fn dataset_write(
        &self,
        dataset: &DatasetHandle,
        selection: &Selection,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let result = self.storage.dataset_write(dataset, selection, bytes);
        self.log(format_args!(
            "dataset_write({}, {selection}, len={}) -> {result:?}",
            dataset.path(),
            bytes.len()
        ))?;
        result
    }

    fn dataset_close(&self, dataset: DatasetHandle) -> Result<(), StorageError> {
        let id = dataset.id();
        let result = self.storage.dataset_close(dataset);
        self.log(format_args!("dataset_close({id}) -> {result:?}"))?;
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::store::MemoryStore;

    use super::*;

    #[test]
    fn usage_log() -> Result<(), Box<dyn std::error::Error>> {
        let log_writer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let store = UsageLogStorageAdapter::new(
            Arc::new(MemoryStore::new()),
            log_writer.clone(),
            || "[log] ".to_string(),
        );
        let root = store.root();
        let group = store.group_create(&root, "system")?;
        store.attr_write(&group, "nopd", StoreDataType::UInt32, &[], &[3, 0, 0, 0])?;
        let dataset = store.dataset_create(&group, "names", StoreDataType::FixedString(8), &[2])?;
        store.dataset_read(&dataset, &Selection::All)?;
        store.dataset_close(dataset)?;
        store.group_close(group)?;

        let log = String::from_utf8(log_writer.lock().clone())?;
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "[log] group_create(/, system) -> Ok(1)");
        assert_eq!(
            lines[1],
            "[log] attr_write(/system, nopd, uint32, [], len=4) -> Ok(())"
        );
        assert_eq!(
            lines[2],
            "[log] dataset_create(/system, names, string[8], [2]) -> Ok(2)"
        );
        assert_eq!(lines[3], "[log] dataset_read(/system/names, all) -> len=Ok(16)");
        assert!(lines[5].starts_with("[log] group_close(1)"));
        Ok(())
    }
}

//! Hierarchy stores.
//!
//! - [`MemoryStore`]: an in-memory hierarchy, useful for tests and scratch data.
//! - [`FilesystemStore`]: a hierarchy of directories on a filesystem.

mod filesystem_store;
mod memory_store;

use std::collections::HashMap;

pub use filesystem_store::{FilesystemStore, FilesystemStoreCreateError};
pub use memory_store::MemoryStore;

use crate::node::NodePath;

use super::{DatasetHandle, GroupHandle, StorageError, ROOT_HANDLE_ID};

/// The groups and datasets opened through a store.
///
/// Handle ids are never reused.
#[derive(Debug)]
struct OpenHandles {
    groups: HashMap<u64, NodePath>,
    datasets: HashMap<u64, NodePath>,
    next_id: u64,
}

impl Default for OpenHandles {
    fn default() -> Self {
        Self {
            groups: HashMap::default(),
            datasets: HashMap::default(),
            next_id: ROOT_HANDLE_ID + 1,
        }
    }
}

impl OpenHandles {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn open_group(&mut self, path: NodePath) -> GroupHandle {
        let id = self.next_id();
        self.groups.insert(id, path.clone());
        GroupHandle::new(id, path)
    }

    fn group_path(&self, group: &GroupHandle) -> Result<NodePath, StorageError> {
        if group.is_root() {
            Ok(NodePath::root())
        } else {
            self.groups
                .get(&group.id())
                .cloned()
                .ok_or(StorageError::InvalidHandle(group.id()))
        }
    }

    fn close_group(&mut self, group: GroupHandle) -> Result<(), StorageError> {
        if group.is_root() || self.groups.remove(&group.id()).is_some() {
            Ok(())
        } else {
            Err(StorageError::InvalidHandle(group.id()))
        }
    }

    fn open_dataset(&mut self, path: NodePath) -> DatasetHandle {
        let id = self.next_id();
        self.datasets.insert(id, path.clone());
        DatasetHandle::new(id, path)
    }

    fn dataset_path(&self, dataset: &DatasetHandle) -> Result<NodePath, StorageError> {
        self.datasets
            .get(&dataset.id())
            .cloned()
            .ok_or(StorageError::InvalidHandle(dataset.id()))
    }

    fn close_dataset(&mut self, dataset: DatasetHandle) -> Result<(), StorageError> {
        self.datasets
            .remove(&dataset.id())
            .map(|_| ())
            .ok_or(StorageError::InvalidHandle(dataset.id()))
    }
}

/// The paths from the first segment of `path` down to `path`, excluding the root.
fn ancestors_and_self(path: &NodePath) -> Vec<NodePath> {
    let mut paths = Vec::new();
    let mut current = NodePath::root();
    for segment in path.segments() {
        match current.join(segment) {
            Ok(next) => current = next,
            Err(_) => break,
        }
        paths.push(current.clone());
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_handles() {
        let mut handles = OpenHandles::default();
        let root = GroupHandle::new(ROOT_HANDLE_ID, NodePath::root());
        assert_eq!(handles.group_path(&root).unwrap(), NodePath::root());

        let path = NodePath::new("/system").unwrap();
        let group = handles.open_group(path.clone());
        assert_ne!(group.id(), ROOT_HANDLE_ID);
        assert_eq!(handles.group_path(&group).unwrap(), path);

        let id = group.id();
        handles.close_group(group).unwrap();
        let stale = GroupHandle::new(id, path);
        assert!(matches!(
            handles.group_path(&stale),
            Err(StorageError::InvalidHandle(i)) if i == id
        ));
        assert!(handles.close_group(stale).is_err());
        assert!(handles.close_group(root).is_ok());
    }

    #[test]
    fn ancestors() {
        let path = NodePath::new("/a/b/c").unwrap();
        let paths: Vec<_> = ancestors_and_self(&path)
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert_eq!(paths, ["/a", "/a/b", "/a/b/c"]);
        assert!(ancestors_and_self(&NodePath::root()).is_empty());
    }
}

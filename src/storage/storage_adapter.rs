//! Storage adapters.
//!
//! An adapter wraps another store and implements [`HierarchyStorageTraits`](super::HierarchyStorageTraits) itself, so it can be used anywhere a store can.

pub mod usage_log;

pub use usage_log::UsageLogStorageAdapter;

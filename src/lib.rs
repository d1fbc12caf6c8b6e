//! A rust library for schema-driven metadata and datasets of the Electronic Structure Common Data Format (ESCDF).
//!
//! An ESCDF file is a hierarchy of groups. Each group holds typed attributes and datasets, described by a registered group specification.
//! The shape of an attribute or dataset may depend on the values of other attributes of its group, so every value is validated against the current state of the group before it reaches the store.
//!
//! ## Getting Started
//! - Register specifications in a [`SpecsRegistry`](specs::SpecsRegistry), either the built-in ESCDF specifications with [`register_escdf_specs`](specs::register_escdf_specs) or your own from [JSON definitions](specs::SpecDefinitions) or a [`GroupSpecBuilder`](specs::GroupSpecBuilder).
//! - Pick a store from [`storage::store`]: [`MemoryStore`](storage::store::MemoryStore) or [`FilesystemStore`](storage::store::FilesystemStore).
//! - Open a [`Group`](group::Group), set its attributes, and create or open its [`Dataset`](dataset::Dataset)s.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use ::escdf::group::Group;
//! use ::escdf::selection::Hyperslab;
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
//! system.set_attribute(escdf::NUMBER_OF_SITES, 2u32)?;
//!
//! let positions = system.create_dataset(escdf::FRACTIONAL_SITE_POSITIONS)?;
//! assert_eq!(positions.shape(), &[2, 3]);
//! positions.write_full(vec![0.0, 0.0, 0.0, 0.5, 0.5, 0.5])?;
//! let second_site: Vec<f64> = positions.read_slice(&Hyperslab::new(vec![1, 0], vec![1, 3]))?;
//! assert_eq!(second_site, vec![0.5, 0.5, 0.5]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Logging
//! Diagnostic events are emitted through the [`log`] facade.
//! Store calls can be traced with the [`UsageLogStorageAdapter`](storage::storage_adapter::UsageLogStorageAdapter).

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]

pub mod config;
pub mod data_type;
pub mod dataset;
pub mod group;
pub mod node;
pub mod optional_scalar;
pub mod selection;
pub mod specs;
pub mod storage;
pub mod validation;

/// The shape of an attribute or dataset.
pub type ArrayShape = Vec<u64>;

/// The indices of an element of a dataset.
pub type ArrayIndices = Vec<u64>;

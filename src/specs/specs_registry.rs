use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use super::{
    AttributeId, AttributeSpec, DatasetId, DatasetSpec, GroupId, GroupSpec, SpecError, SpecKind,
};

/// A registry of group specifications.
///
/// Registration requires exclusive access. Lookups return shared references which outlive the registry.
///
/// Attribute and dataset ids are global to the registry: several groups may list the same attribute, provided its specification is identical in each.
#[derive(Debug, Default)]
pub struct SpecsRegistry {
    groups: BTreeMap<GroupId, Arc<GroupSpec>>,
    group_names: HashMap<String, GroupId>,
    attributes: BTreeMap<AttributeId, Arc<AttributeSpec>>,
    datasets: BTreeMap<DatasetId, Arc<DatasetSpec>>,
}

impl SpecsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group specification.
    ///
    /// Nothing is registered if an error is returned.
    ///
    /// # Errors
    /// Returns [`SpecError::DuplicateId`] or [`SpecError::DuplicateName`] if the group id or name is already registered.
    /// Returns [`SpecError::Conflicting`] if an attribute or dataset id is registered with a different specification.
    pub fn register(&mut self, spec: GroupSpec) -> Result<Arc<GroupSpec>, SpecError> {
        if self.groups.contains_key(&spec.id()) {
            return Err(SpecError::DuplicateId {
                kind: SpecKind::Group,
                id: spec.id().0,
            });
        }
        if self.group_names.contains_key(spec.name()) {
            return Err(SpecError::DuplicateName {
                kind: SpecKind::Group,
                name: spec.name().to_string(),
            });
        }
        for attribute in spec.attributes() {
            if let Some(existing) = self.attributes.get(&attribute.id()) {
                if existing != attribute {
                    return Err(SpecError::Conflicting {
                        kind: SpecKind::Attribute,
                        id: attribute.id().0,
                    });
                }
            }
        }
        for dataset in spec.datasets() {
            if let Some(existing) = self.datasets.get(&dataset.id()) {
                if existing != dataset {
                    return Err(SpecError::Conflicting {
                        kind: SpecKind::Dataset,
                        id: dataset.id().0,
                    });
                }
            }
        }

        for attribute in spec.attributes() {
            self.attributes
                .entry(attribute.id())
                .or_insert_with(|| attribute.clone());
        }
        for dataset in spec.datasets() {
            self.datasets
                .entry(dataset.id())
                .or_insert_with(|| dataset.clone());
        }
        let spec = Arc::new(spec);
        self.group_names.insert(spec.name().to_string(), spec.id());
        self.groups.insert(spec.id(), spec.clone());
        Ok(spec)
    }

    /// Look up a group specification by id.
    ///
    /// # Errors
    /// Returns [`SpecError::NotFound`] if no group is registered with `id`.
    pub fn group(&self, id: GroupId) -> Result<Arc<GroupSpec>, SpecError> {
        self.groups
            .get(&id)
            .cloned()
            .ok_or_else(|| SpecError::NotFound {
                kind: SpecKind::Group,
                key: id.to_string(),
            })
    }

    /// Look up a group specification by name.
    ///
    /// # Errors
    /// Returns [`SpecError::NotFound`] if no group is registered with `name`.
    pub fn group_by_name(&self, name: &str) -> Result<Arc<GroupSpec>, SpecError> {
        self.group_names
            .get(name)
            .and_then(|id| self.groups.get(id))
            .cloned()
            .ok_or_else(|| SpecError::NotFound {
                kind: SpecKind::Group,
                key: name.to_string(),
            })
    }

    /// Look up an attribute specification by id.
    ///
    /// # Errors
    /// Returns [`SpecError::NotFound`] if no registered group lists an attribute with `id`.
    pub fn attribute(&self, id: AttributeId) -> Result<Arc<AttributeSpec>, SpecError> {
        self.attributes
            .get(&id)
            .cloned()
            .ok_or_else(|| SpecError::NotFound {
                kind: SpecKind::Attribute,
                key: id.to_string(),
            })
    }

    /// Look up a dataset specification by id.
    ///
    /// # Errors
    /// Returns [`SpecError::NotFound`] if no registered group lists a dataset with `id`.
    pub fn dataset(&self, id: DatasetId) -> Result<Arc<DatasetSpec>, SpecError> {
        self.datasets
            .get(&id)
            .cloned()
            .ok_or_else(|| SpecError::NotFound {
                kind: SpecKind::Dataset,
                key: id.to_string(),
            })
    }

    /// The registered group specifications, ordered by id.
    pub fn groups(&self) -> impl Iterator<Item = &Arc<GroupSpec>> {
        self.groups.values()
    }

    /// The number of registered groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if no groups are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Remove every registered specification.
    ///
    /// Specifications already handed out stay valid.
    pub fn unregister_all(&mut self) {
        self.groups.clear();
        self.group_names.clear();
        self.attributes.clear();
        self.datasets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_type::DataType,
        specs::{Dimension, GroupSpecBuilder},
    };

    fn system_spec(id: u32, name: &str) -> GroupSpec {
        GroupSpecBuilder::new(GroupId(id), name)
            .attribute(
                AttributeSpec::new(AttributeId(0), "number_of_physical_dimensions", DataType::UInt)
                    .with_range(1.0, 3.0)
                    .mandatory(),
            )
            .attribute(
                AttributeSpec::new(AttributeId(1), "dimension_types", DataType::UInt)
                    .with_dims(vec![Dimension::Attribute(AttributeId(0))]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn registry_lookup() {
        let mut registry = SpecsRegistry::new();
        assert!(registry.is_empty());
        let spec = registry.register(system_spec(0, "system")).unwrap();

        let by_id = registry.group(GroupId(0)).unwrap();
        let by_name = registry.group_by_name("system").unwrap();
        assert!(Arc::ptr_eq(&by_id, &by_name));
        assert!(Arc::ptr_eq(&by_id, &spec));
        assert_eq!(
            registry.attribute(AttributeId(1)).unwrap().name(),
            "dimension_types"
        );
        assert_eq!(
            registry.group(GroupId(7)).unwrap_err(),
            SpecError::NotFound {
                kind: SpecKind::Group,
                key: "7".to_string()
            }
        );
    }

    #[test]
    fn registry_duplicate() {
        let mut registry = SpecsRegistry::new();
        registry.register(system_spec(0, "system")).unwrap();
        assert_eq!(
            registry.register(system_spec(0, "other")).unwrap_err(),
            SpecError::DuplicateId {
                kind: SpecKind::Group,
                id: 0
            }
        );
        assert!(matches!(
            registry.register(system_spec(1, "system")),
            Err(SpecError::DuplicateName { .. })
        ));
        // attributes shared with an identical specification
        registry.register(system_spec(2, "geometry")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_conflicting_attribute() {
        let mut registry = SpecsRegistry::new();
        registry.register(system_spec(0, "system")).unwrap();
        let conflicting = GroupSpecBuilder::new(GroupId(1), "other")
            .attribute(AttributeSpec::new(
                AttributeId(0),
                "number_of_physical_dimensions",
                DataType::Int,
            ))
            .build()
            .unwrap();
        assert!(matches!(
            registry.register(conflicting),
            Err(SpecError::Conflicting { .. })
        ));
        assert!(registry.group_by_name("other").is_err());
    }

    #[test]
    fn registry_unregister_all() {
        let mut registry = SpecsRegistry::new();
        let spec = registry.register(system_spec(0, "system")).unwrap();
        registry.unregister_all();
        assert!(registry.is_empty());
        assert!(registry.attribute(AttributeId(0)).is_err());
        assert_eq!(spec.name(), "system");
    }
}

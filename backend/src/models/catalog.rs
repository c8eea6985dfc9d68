//! Resource catalog
//!
//! Model-scoped index of resources. Every resource gets a dense
//! [`ResourceIndex`] so the hot allocation path works on vectors instead of
//! string-keyed maps. A requirement leaf can only name resources present in
//! the catalog of its own model, which is how tenant/model scoping is enforced.
//!
//! # Critical Invariants
//!
//! 1. Resource ids are unique within a catalog
//! 2. Capacities are non-negative
//! 3. `ResourceIndex(i)` is valid for every table derived from the catalog

use crate::models::definition::ResourceDef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors found while indexing a model's resources
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("Duplicate resource ID: {0}")]
    DuplicateResource(String),

    #[error("Resource '{resource_id}' has invalid capacity {capacity}")]
    InvalidCapacity { resource_id: String, capacity: i64 },
}

/// Dense position of a resource within its catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceIndex(pub usize);

impl fmt::Display for ResourceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resolved resources of one model
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
    model_id: String,
    ids: Vec<String>,
    names: Vec<String>,
    capacities: Vec<u32>,
    index: HashMap<String, ResourceIndex>,
}

impl ResourceCatalog {
    /// Index a model's resources
    ///
    /// All problems are collected, not just the first.
    ///
    /// # Example
    ///
    /// ```rust
    /// use resource_requirement_engine::models::{ResourceCatalog, ResourceDef};
    ///
    /// let catalog = ResourceCatalog::build(
    ///     "clinic",
    ///     &[ResourceDef::new("nurse", 2), ResourceDef::new("bed", 1)],
    /// ).unwrap();
    /// let bed = catalog.resolve("bed").unwrap();
    /// assert_eq!(catalog.capacity(bed), Some(1));
    /// ```
    pub fn build(model_id: &str, resources: &[ResourceDef]) -> Result<Self, Vec<CatalogError>> {
        let mut errors = Vec::new();
        let mut catalog = Self {
            model_id: model_id.to_string(),
            ids: Vec::with_capacity(resources.len()),
            names: Vec::with_capacity(resources.len()),
            capacities: Vec::with_capacity(resources.len()),
            index: HashMap::with_capacity(resources.len()),
        };

        for resource in resources {
            if catalog.index.contains_key(&resource.id) {
                errors.push(CatalogError::DuplicateResource(resource.id.clone()));
                continue;
            }
            let capacity = match u32::try_from(resource.capacity) {
                Ok(capacity) => capacity,
                Err(_) => {
                    errors.push(CatalogError::InvalidCapacity {
                        resource_id: resource.id.clone(),
                        capacity: resource.capacity,
                    });
                    continue;
                }
            };

            let idx = ResourceIndex(catalog.ids.len());
            catalog.index.insert(resource.id.clone(), idx);
            catalog.ids.push(resource.id.clone());
            catalog.names.push(resource.display_name().to_string());
            catalog.capacities.push(capacity);
        }

        if errors.is_empty() {
            Ok(catalog)
        } else {
            Err(errors)
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Look up a resource by its external id
    pub fn resolve(&self, resource_id: &str) -> Option<ResourceIndex> {
        self.index.get(resource_id).copied()
    }

    pub fn id(&self, idx: ResourceIndex) -> Option<&str> {
        self.ids.get(idx.0).map(String::as_str)
    }

    pub fn name(&self, idx: ResourceIndex) -> Option<&str> {
        self.names.get(idx.0).map(String::as_str)
    }

    /// Base-model capacity (before scenario overrides)
    pub fn capacity(&self, idx: ResourceIndex) -> Option<u32> {
        self.capacities.get(idx.0).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over (index, id) pairs in catalog order
    pub fn iter(&self) -> impl Iterator<Item = (ResourceIndex, &str)> {
        self.ids
            .iter()
            .enumerate()
            .map(|(i, id)| (ResourceIndex(i), id.as_str()))
    }

    /// Base capacities as a table, the starting point for scenario patches
    pub fn base_capacities(&self) -> CapacityTable {
        CapacityTable {
            ids: self.ids.clone(),
            capacities: self.capacities.clone(),
        }
    }
}

/// Capacity per resource, in catalog order
///
/// Produced from the catalog and patched by scenario overrides. Also usable as
/// an always-empty pool view for static satisfiability checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityTable {
    ids: Vec<String>,
    capacities: Vec<u32>,
}

impl CapacityTable {
    pub fn capacity(&self, idx: ResourceIndex) -> Option<u32> {
        self.capacities.get(idx.0).copied()
    }

    pub fn id(&self, idx: ResourceIndex) -> Option<&str> {
        self.ids.get(idx.0).map(String::as_str)
    }

    /// Replace one capacity; returns false if the index is out of range
    pub fn set_capacity(&mut self, idx: ResourceIndex, capacity: u32) -> bool {
        match self.capacities.get_mut(idx.0) {
            Some(slot) => {
                *slot = capacity;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.capacities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capacities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceIndex, &str, u32)> {
        self.ids
            .iter()
            .zip(self.capacities.iter())
            .enumerate()
            .map(|(i, (id, cap))| (ResourceIndex(i), id.as_str(), *cap))
    }
}

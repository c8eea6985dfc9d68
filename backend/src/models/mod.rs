//! Domain models for the resource requirement engine

pub mod catalog;
pub mod definition;
pub mod event;

// Re-exports
pub use catalog::{CapacityTable, CatalogError, ResourceCatalog, ResourceIndex};
pub use definition::{
    ClauseDef, DefinitionError, ModelDef, RequestDef, RequirementDef, ResourceDef,
    ScenarioDef, ScenarioOverride,
};
pub use event::{AllocationEvent, EventLog};

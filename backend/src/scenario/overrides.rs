//! Scenario Override Resolution
//!
//! Scenario overrides arrive as generic property-bag rows
//! (`target_object_type` / `target_object_id` / `property_name` /
//! `property_value`). They are resolved once, at scenario compile time, into a
//! typed [`ScenarioPatch`]. Nothing on the allocation path ever looks at the
//! raw rows.
//!
//! Supported overrides:
//!
//! | target_object_type | property_name | value                 |
//! |--------------------|---------------|-----------------------|
//! | `resource`         | `capacity`    | integer >= 0          |
//! | `resource_request` | `quantity`    | integer >= 1          |
//!
//! Rows for other object types (activities, generators, ...) configure other
//! subsystems and are skipped. When several rows set the same property of the
//! same object, the last row wins.
//!
//! A `resource_request` target is either `"<requirement_id>/<request_id>"` or
//! a bare request id that is unique across the model's requirements.

use crate::models::catalog::ResourceIndex;
use crate::models::definition::ScenarioOverride;
use crate::requirement::set::CompiledModel;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

pub const TARGET_RESOURCE: &str = "resource";
pub const TARGET_RESOURCE_REQUEST: &str = "resource_request";
pub const PROPERTY_CAPACITY: &str = "capacity";
pub const PROPERTY_QUANTITY: &str = "quantity";

/// Problems with a single override row
#[derive(Debug, Error, PartialEq)]
pub enum OverrideError {
    #[error("Override targets unknown {target_object_type} '{target_object_id}'")]
    UnknownTarget {
        target_object_type: String,
        target_object_id: String,
    },

    #[error("Override target '{target_object_id}' matches requests in several requirements")]
    AmbiguousTarget { target_object_id: String },

    #[error("Property '{property_name}' cannot be overridden on {target_object_type}")]
    UnsupportedProperty {
        target_object_type: String,
        property_name: String,
    },

    #[error("Invalid value {value} for {property_name} of '{target_object_id}'")]
    InvalidValue {
        target_object_id: String,
        property_name: String,
        value: String,
    },
}

/// Typed result of resolving a scenario's override rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioPatch {
    /// New capacity per resource
    pub capacities: BTreeMap<ResourceIndex, u32>,

    /// New leaf quantities: requirement id → request id → quantity
    pub quantities: BTreeMap<String, HashMap<String, u32>>,
}

impl ScenarioPatch {
    pub fn is_empty(&self) -> bool {
        self.capacities.is_empty() && self.quantities.is_empty()
    }
}

/// Resolve override rows against a compiled model
///
/// Every row is checked; all problems are returned together.
pub fn resolve_overrides(
    overrides: &[ScenarioOverride],
    model: &CompiledModel,
) -> Result<ScenarioPatch, Vec<OverrideError>> {
    let mut patch = ScenarioPatch::default();
    let mut errors = Vec::new();

    for row in overrides {
        let result = match row.target_object_type.as_str() {
            TARGET_RESOURCE => resolve_resource_row(row, model, &mut patch),
            TARGET_RESOURCE_REQUEST => resolve_request_row(row, model, &mut patch),
            other => {
                debug!(
                    target_object_type = other,
                    target_object_id = %row.target_object_id,
                    "override handled outside the resource engine"
                );
                Ok(())
            }
        };
        if let Err(e) = result {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(errors)
    }
}

fn resolve_resource_row(
    row: &ScenarioOverride,
    model: &CompiledModel,
    patch: &mut ScenarioPatch,
) -> Result<(), OverrideError> {
    if row.property_name != PROPERTY_CAPACITY {
        return Err(unsupported(row));
    }
    let resource = model
        .catalog()
        .resolve(&row.target_object_id)
        .ok_or_else(|| unknown_target(row))?;
    let capacity = integer_value(row, 0)?;
    patch.capacities.insert(resource, capacity);
    Ok(())
}

fn resolve_request_row(
    row: &ScenarioOverride,
    model: &CompiledModel,
    patch: &mut ScenarioPatch,
) -> Result<(), OverrideError> {
    if row.property_name != PROPERTY_QUANTITY {
        return Err(unsupported(row));
    }
    let (requirement_id, request_id) = locate_request(&row.target_object_id, model)?;
    let quantity = integer_value(row, 1)?;
    patch
        .quantities
        .entry(requirement_id)
        .or_default()
        .insert(request_id, quantity);
    Ok(())
}

/// Find the requirement owning a request target
fn locate_request(target: &str, model: &CompiledModel) -> Result<(String, String), OverrideError> {
    let requirements = model.requirements();

    if let Some((requirement_id, request_id)) = target.split_once('/') {
        let found = requirements
            .get(requirement_id)
            .ok()
            .map(|tree| tree.requests().any(|r| r.key == request_id))
            .unwrap_or(false);
        return if found {
            Ok((requirement_id.to_string(), request_id.to_string()))
        } else {
            Err(OverrideError::UnknownTarget {
                target_object_type: TARGET_RESOURCE_REQUEST.to_string(),
                target_object_id: target.to_string(),
            })
        };
    }

    let mut owners = requirements
        .iter()
        .filter(|tree| tree.requests().any(|r| r.key == target))
        .map(|tree| tree.requirement_id().to_string());

    match (owners.next(), owners.next()) {
        (Some(owner), None) => Ok((owner, target.to_string())),
        (Some(_), Some(_)) => Err(OverrideError::AmbiguousTarget {
            target_object_id: target.to_string(),
        }),
        (None, _) => Err(OverrideError::UnknownTarget {
            target_object_type: TARGET_RESOURCE_REQUEST.to_string(),
            target_object_id: target.to_string(),
        }),
    }
}

/// Parse a property value as an integer in `[min, u32::MAX]`
///
/// Property bags often carry numbers as strings, so both `4` and `"4"` are
/// accepted.
fn integer_value(row: &ScenarioOverride, min: u32) -> Result<u32, OverrideError> {
    let parsed = match &row.property_value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v >= min)
        .ok_or_else(|| OverrideError::InvalidValue {
            target_object_id: row.target_object_id.clone(),
            property_name: row.property_name.clone(),
            value: row.property_value.to_string(),
        })
}

fn unsupported(row: &ScenarioOverride) -> OverrideError {
    OverrideError::UnsupportedProperty {
        target_object_type: row.target_object_type.clone(),
        property_name: row.property_name.clone(),
    }
}

fn unknown_target(row: &ScenarioOverride) -> OverrideError {
    OverrideError::UnknownTarget {
        target_object_type: row.target_object_type.clone(),
        target_object_id: row.target_object_id.clone(),
    }
}

use rust_decimal::Decimal;
use serde::Deserialize;

use super::{optional_text, required_text};
use crate::db::{Farm, Role};
use crate::error::{ErrorCode, ValidationErrors};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FarmInput {
    pub name: Option<String>,
    pub agent_id: Option<i32>,
    pub location: Option<String>,
    pub size_acres: Option<Decimal>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl FarmInput {
    /// Fills every absent field from the stored row.
    pub fn over(self, current: &Farm) -> FarmInput {
        FarmInput {
            name: self.name.or_else(|| Some(current.name.clone())),
            agent_id: self.agent_id.or(Some(current.agent_id)),
            location: self.location.or_else(|| Some(current.location.clone())),
            size_acres: self.size_acres.or(Some(current.size_acres)),
            description: self.description.or_else(|| current.description.clone()),
            is_active: self.is_active.or(Some(current.is_active)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFarm {
    pub name: String,
    pub agent_id: i32,
    pub location: String,
    pub size_acres: Decimal,
    pub description: Option<String>,
    pub is_active: bool,
}

/// `agent_role` is the stored role of the user `agent_id` points at, `None`
/// when no such user exists.
pub fn validate_farm(input: &FarmInput, agent_role: Option<Role>) -> Result<NewFarm, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = required_text(&mut errors, "name", input.name.as_deref());
    let location = required_text(&mut errors, "location", input.location.as_deref());

    match input.size_acres {
        None => errors.required("size_acres"),
        Some(size) if size <= Decimal::ZERO => errors.push(
            "size_acres",
            ErrorCode::FieldOutOfRange,
            "size_acres must be greater than 0",
        ),
        Some(_) => {}
    }
    match (input.agent_id, agent_role) {
        (None, _) => errors.required("agent_id"),
        (Some(_), None) => errors.push("agent_id", ErrorCode::NotFound, "agent does not exist"),
        (Some(_), Some(role)) if role != Role::Agent => errors.push(
            "agent_id",
            ErrorCode::Invalid,
            "a farm must be managed by a user with role AGENT",
        ),
        _ => {}
    }

    match (name, location, input.size_acres, input.agent_id) {
        (Some(name), Some(location), Some(size_acres), Some(agent_id)) => {
            errors.into_result(NewFarm {
                name,
                agent_id,
                location,
                size_acres,
                description: optional_text(input.description.as_deref()),
                is_active: input.is_active.unwrap_or(true),
            })
        }
        _ => Err(errors),
    }
}

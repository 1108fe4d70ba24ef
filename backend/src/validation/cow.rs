use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{check_non_negative, check_not_future, optional_text, parse_choice, required_text};
use crate::db::{Breed, Cow, CowStatus, Role};
use crate::error::{ErrorCode, ValidationErrors};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CowInput {
    pub tag_number: Option<String>,
    pub name: Option<String>,
    pub breed: Option<String>,
    pub farmer_id: Option<i32>,
    pub farm_id: Option<i32>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_kg: Option<Decimal>,
    pub height_cm: Option<Decimal>,
    pub status: Option<String>,
    pub is_pregnant: Option<bool>,
    pub last_breeding_date: Option<NaiveDate>,
}

impl CowInput {
    pub fn over(self, current: &Cow) -> CowInput {
        CowInput {
            tag_number: self.tag_number.or_else(|| Some(current.tag_number.clone())),
            name: self.name.or_else(|| current.name.clone()),
            breed: self.breed.or_else(|| Some(current.breed.to_string())),
            farmer_id: self.farmer_id.or(Some(current.farmer_id)),
            farm_id: self.farm_id.or(Some(current.farm_id)),
            date_of_birth: self.date_of_birth.or(Some(current.date_of_birth)),
            weight_kg: self.weight_kg.or(current.weight_kg),
            height_cm: self.height_cm.or(current.height_cm),
            status: self.status.or_else(|| Some(current.status.to_string())),
            is_pregnant: self.is_pregnant.or(Some(current.is_pregnant)),
            last_breeding_date: self.last_breeding_date.or(current.last_breeding_date),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCow {
    pub tag_number: String,
    pub name: Option<String>,
    pub breed: Breed,
    pub farmer_id: i32,
    pub farm_id: i32,
    pub date_of_birth: NaiveDate,
    pub weight_kg: Option<Decimal>,
    pub height_cm: Option<Decimal>,
    pub status: CowStatus,
    pub is_pregnant: bool,
    pub last_breeding_date: Option<NaiveDate>,
}

/// What the store says about the rows a cow points at.
#[derive(Debug, Clone, Copy, Default)]
pub struct CowRefs {
    /// Role of the referenced farmer, `None` when the user does not exist.
    pub farmer_role: Option<Role>,
    /// Managing agent of the referenced farm, `None` when the farm does not exist.
    pub farm_agent_id: Option<i32>,
    /// Set when the writer is an agent: the farm must be one they manage.
    pub acting_agent: Option<i32>,
}

pub fn validate_cow(
    input: &CowInput,
    refs: CowRefs,
    today: NaiveDate,
) -> Result<NewCow, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let tag_number = required_text(&mut errors, "tag_number", input.tag_number.as_deref());
    let breed = parse_choice::<Breed>(
        &mut errors,
        "breed",
        input.breed.as_deref(),
        false,
        &Breed::names(),
    )
    .unwrap_or(Breed::Holstein);
    let status = parse_choice::<CowStatus>(
        &mut errors,
        "status",
        input.status.as_deref(),
        false,
        &CowStatus::names(),
    )
    .unwrap_or(CowStatus::Active);

    match (input.farmer_id, refs.farmer_role) {
        (None, _) => errors.required("farmer_id"),
        (Some(_), None) => errors.push("farmer_id", ErrorCode::NotFound, "farmer does not exist"),
        (Some(_), Some(role)) if role != Role::Farmer => errors.push(
            "farmer_id",
            ErrorCode::Invalid,
            "a cow must belong to a user with role FARMER",
        ),
        _ => {}
    }
    match (input.farm_id, refs.farm_agent_id) {
        (None, _) => errors.required("farm_id"),
        (Some(_), None) => errors.push("farm_id", ErrorCode::NotFound, "farm does not exist"),
        (Some(_), Some(agent)) => {
            if let Some(actor) = refs.acting_agent {
                if actor != agent {
                    errors.push(
                        "farm_id",
                        ErrorCode::Mismatch,
                        "agents may only place cows on farms they manage",
                    );
                }
            }
        }
    }
    match input.date_of_birth {
        None => errors.required("date_of_birth"),
        Some(dob) => check_not_future(&mut errors, "date_of_birth", dob, today),
    }
    if let Some(bred) = input.last_breeding_date {
        check_not_future(&mut errors, "last_breeding_date", bred, today);
    }
    check_non_negative(&mut errors, "weight_kg", input.weight_kg);
    check_non_negative(&mut errors, "height_cm", input.height_cm);

    match (tag_number, input.farmer_id, input.farm_id, input.date_of_birth) {
        (Some(tag_number), Some(farmer_id), Some(farm_id), Some(date_of_birth)) => {
            errors.into_result(NewCow {
                tag_number,
                name: optional_text(input.name.as_deref()),
                breed,
                farmer_id,
                farm_id,
                date_of_birth,
                weight_kg: input.weight_kg,
                height_cm: input.height_cm,
                status,
                is_pregnant: input.is_pregnant.unwrap_or(false),
                last_breeding_date: input.last_breeding_date,
            })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn input() -> CowInput {
        CowInput {
            tag_number: Some("COW001".into()),
            farmer_id: Some(3),
            farm_id: Some(10),
            date_of_birth: NaiveDate::from_ymd_opt(2021, 2, 1),
            ..Default::default()
        }
    }

    fn refs() -> CowRefs {
        CowRefs {
            farmer_role: Some(Role::Farmer),
            farm_agent_id: Some(2),
            acting_agent: None,
        }
    }

    #[test]
    fn defaults_breed_and_status() {
        let cow = validate_cow(&input(), refs(), today()).unwrap();
        assert_eq!(cow.breed, Breed::Holstein);
        assert_eq!(cow.status, CowStatus::Active);
        assert!(!cow.is_pregnant);
    }

    #[test]
    fn farmer_must_be_a_farmer() {
        let agent_as_owner = CowRefs {
            farmer_role: Some(Role::Agent),
            ..refs()
        };
        let errors = validate_cow(&input(), agent_as_owner, today()).unwrap_err();
        assert!(errors.has("farmer_id", ErrorCode::Invalid));
    }

    #[test]
    fn agents_only_stock_their_own_farms() {
        let foreign = CowRefs {
            acting_agent: Some(7),
            ..refs()
        };
        let errors = validate_cow(&input(), foreign, today()).unwrap_err();
        assert!(errors.has("farm_id", ErrorCode::Mismatch));

        let own = CowRefs {
            acting_agent: Some(2),
            ..refs()
        };
        assert!(validate_cow(&input(), own, today()).is_ok());
    }

    #[test]
    fn measurements_cannot_be_negative() {
        let bad = CowInput {
            weight_kg: Some(Decimal::from(-3)),
            height_cm: Some(Decimal::from(-1)),
            ..input()
        };
        let errors = validate_cow(&bad, refs(), today()).unwrap_err();
        assert!(errors.has("weight_kg", ErrorCode::FieldOutOfRange));
        assert!(errors.has("height_cm", ErrorCode::FieldOutOfRange));
    }
}

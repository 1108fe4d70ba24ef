use chrono::NaiveDate;
use serde::Deserialize;

use super::{is_valid_phone, optional_text, parse_choice, required_text};
use crate::db::{Role, User};
use crate::error::{ErrorCode, ValidationErrors};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

/// Profile fields written on create and update. The password travels
/// separately and is only ever stored hashed.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFields {
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub is_active: bool,
}

fn check_contact(errors: &mut ValidationErrors, input: &UserInput) -> (Option<String>, Option<String>) {
    let email = optional_text(input.email.as_deref());
    if let Some(e) = &email {
        if !e.contains('@') {
            errors.push("email", ErrorCode::Invalid, "enter a valid email address");
        }
    }
    let phone = optional_text(input.phone_number.as_deref());
    if let Some(p) = &phone {
        if !is_valid_phone(p) {
            errors.push(
                "phone_number",
                ErrorCode::Invalid,
                "phone number must be entered in the format '+999999999', 9 to 15 digits",
            );
        }
    }
    (email, phone)
}

/// New identity row plus its plain-text password. Role defaults to FARMER.
pub fn validate_new_user(input: &UserInput) -> Result<(UserFields, String), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let username = required_text(&mut errors, "username", input.username.as_deref());
    let password = required_text(&mut errors, "password", input.password.as_deref());
    let role = parse_choice::<Role>(
        &mut errors,
        "role",
        input.role.as_deref(),
        false,
        &Role::names(),
    )
    .unwrap_or(Role::Farmer);
    let (email, phone_number) = check_contact(&mut errors, input);

    match (username, password) {
        (Some(username), Some(password)) => errors.into_result((
            UserFields {
                username,
                email,
                first_name: optional_text(input.first_name.as_deref()).unwrap_or_default(),
                last_name: optional_text(input.last_name.as_deref()).unwrap_or_default(),
                role,
                phone_number,
                address: optional_text(input.address.as_deref()),
                date_of_birth: input.date_of_birth,
                is_active: input.is_active.unwrap_or(true),
            },
            password,
        )),
        _ => Err(errors),
    }
}

/// Applies an update over the stored row. The username is fixed after
/// creation and only super admins may change a role.
pub fn validate_user_update(
    current: &User,
    input: &UserInput,
    actor_is_super_admin: bool,
) -> Result<(UserFields, Option<String>), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Some(name) = optional_text(input.username.as_deref()) {
        if name != current.username {
            errors.push("username", ErrorCode::Invalid, "username cannot be changed");
        }
    }
    let requested = parse_choice::<Role>(
        &mut errors,
        "role",
        input.role.as_deref(),
        false,
        &Role::names(),
    );
    let role = match requested {
        Some(role) if role != current.role && !actor_is_super_admin => {
            errors.push(
                "role",
                ErrorCode::Invalid,
                "only a super admin may change a user's role",
            );
            current.role
        }
        Some(role) => role,
        None => current.role,
    };
    let (email, phone_number) = check_contact(&mut errors, input);
    let password = match input.password.as_deref() {
        None => None,
        Some(raw) => required_text(&mut errors, "password", Some(raw)),
    };

    errors.into_result((
        UserFields {
            username: current.username.clone(),
            email: email.or_else(|| current.email.clone()),
            first_name: optional_text(input.first_name.as_deref())
                .unwrap_or_else(|| current.first_name.clone()),
            last_name: optional_text(input.last_name.as_deref())
                .unwrap_or_else(|| current.last_name.clone()),
            role,
            phone_number: phone_number.or_else(|| current.phone_number.clone()),
            address: optional_text(input.address.as_deref()).or_else(|| current.address.clone()),
            date_of_birth: input.date_of_birth.or(current.date_of_birth),
            is_active: input.is_active.unwrap_or(current.is_active),
        },
        password,
    ))
}

//! Input validation for API requests.
//!
//! Field validators return `Err(message)` on failure. To collect several of
//! them into one `ApiError`, use `ValidationErrorBuilder` from the `error`
//! module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email shape: local part, one @, dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?)+$"
    ).unwrap();

    /// Digits with optional leading +, spaces, dashes, dots and parentheses
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9 ()\-.]{5,20}$"
    ).unwrap();

    /// Usernames end up in email markup, so keep them to plain characters
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

pub const USERNAME_MIN: usize = 5;
pub const USERNAME_MAX: usize = 16;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 10;
const NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 250;
const ADDITIONAL_INFO_MAX: usize = 1000;

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > EMAIL_MAX {
        return Err(format!("Email is too long (max {} characters)", EMAIL_MAX));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a username (display name chosen at signup)
pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if len < USERNAME_MIN {
        return Err(format!(
            "Username is too short (min {} characters)",
            USERNAME_MIN
        ));
    }

    if len > USERNAME_MAX {
        return Err(format!(
            "Username is too long (max {} characters)",
            USERNAME_MAX
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username may only contain letters, digits, dots, dashes and underscores".to_string(),
        );
    }

    Ok(())
}

/// Validate a signup password
pub fn validate_password(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < PASSWORD_MIN {
        return Err(format!(
            "Password is too short (min {} characters)",
            PASSWORD_MIN
        ));
    }

    if len > PASSWORD_MAX {
        return Err(format!(
            "Password is too long (max {} characters)",
            PASSWORD_MAX
        ));
    }

    Ok(())
}

/// Validate a first or last name
pub fn validate_name(name: &str, label: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(format!("{} is required", label));
    }

    if name.chars().count() > NAME_MAX {
        return Err(format!("{} is too long (max {} characters)", label, NAME_MAX));
    }

    Ok(())
}

/// Validate a phone number
pub fn validate_phone_number(phone: &str) -> Result<(), String> {
    if phone.is_empty() {
        return Err("Phone number is required".to_string());
    }

    if !PHONE_REGEX.is_match(phone) {
        return Err("Invalid phone number format".to_string());
    }

    if !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err("Phone number must contain digits".to_string());
    }

    Ok(())
}

/// Validate the optional free-text note on a contact
pub fn validate_additional_info(info: &Option<String>) -> Result<(), String> {
    if let Some(text) = info {
        if text.chars().count() > ADDITIONAL_INFO_MAX {
            return Err(format!(
                "Additional info is too long (max {} characters)",
                ADDITIONAL_INFO_MAX
            ));
        }
    }

    Ok(())
}

/// Validate a contact search query; it must be present and non-empty
pub fn validate_search_query(query: Option<&str>) -> Result<&str, String> {
    match query {
        Some(q) if !q.is_empty() => Ok(q),
        _ => Err("Search query must not be empty".to_string()),
    }
}

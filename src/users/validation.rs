use lazy_static::lazy_static;
use regex::Regex;

use super::errors::UserError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PHOTO_LEN: usize = 5000;

/// Logins are compared case-insensitively and without surrounding spaces.
pub fn normalize_login(login: &str) -> String {
    login.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn validate_name(name: &str) -> Result<(), UserError> {
    if name.trim().is_empty() {
        return Err(UserError::validation("name must not be empty"));
    }
    Ok(())
}

/// Expects an already normalized login.
pub fn validate_login(login: &str) -> Result<(), UserError> {
    if !is_valid_email(login) {
        return Err(UserError::validation("login must be a valid email"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), UserError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_photo(photo: Option<&str>) -> Result<(), UserError> {
    match photo {
        Some(p) if p.chars().count() > MAX_PHOTO_LEN => Err(UserError::validation(format!(
            "photo must be at most {MAX_PHOTO_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

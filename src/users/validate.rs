//! Input checks run before any store mutation.

use lazy_static::lazy_static;
use regex::Regex;

use super::repo_types::Role;
use crate::errors::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims and lowercases, then checks the format.
pub fn email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("Please provide an email address"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email"));
    }
    Ok(email)
}

pub fn name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("Please provide a name"));
    }
    Ok(name.to_string())
}

/// New password plus its confirmation.
pub fn new_password(password: Option<&str>, confirm: Option<&str>) -> Result<String, AppError> {
    let password = password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("Please provide a password"))?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let confirm = confirm
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::validation("Please confirm your password"))?;
    if password != confirm {
        return Err(AppError::validation("Passwords are not the same"));
    }
    Ok(password.to_string())
}

pub fn role(raw: &str) -> Result<Role, AppError> {
    raw.trim()
        .parse::<Role>()
        .map_err(|_| AppError::validation("Role must be one of: employee, manager, admin"))
}

use std::sync::OnceLock;

use regex::Regex;

use crate::error::StoreError;

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.-]+$").expect("username regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
    })
}

pub fn username(value: &str) -> Result<(), StoreError> {
    if value.len() < 2 || value.len() > 30 {
        return Err(StoreError::Validation(
            "Username must be between 2 and 30 characters long.".to_string(),
        ));
    }
    if !username_re().is_match(value) {
        return Err(StoreError::Validation(
            "Username can only contain letters, numbers, dots, and underscores.".to_string(),
        ));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), StoreError> {
    if !email_re().is_match(value) {
        return Err(StoreError::Validation(
            "Please enter a valid email address.".to_string(),
        ));
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), StoreError> {
    if value.len() < 8 {
        return Err(StoreError::Validation(
            "Password must be at least 8 characters long.".to_string(),
        ));
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(StoreError::Validation(
            "Password must contain at least one uppercase letter.".to_string(),
        ));
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(StoreError::Validation(
            "Password must contain at least one lowercase letter.".to_string(),
        ));
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(StoreError::Validation(
            "Password must contain at least one number.".to_string(),
        ));
    }
    Ok(())
}

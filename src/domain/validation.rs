//! Field rules shared by catalog writes.

use super::error::DomainError;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_SUMMARY_LEN: usize = 2_000;
pub const MAX_DURATION_DAYS: u16 = 365;

/// Trimmed, non-empty text of at most `max` characters.
pub fn required_text(field: &'static str, value: &str, max: usize) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Two ASCII letters, returned upper case.
pub fn country_code(value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.len() != 2 || !trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(DomainError::validation(format!(
            "country `{trimmed}` must be a two-letter code"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Three ASCII letters, returned upper case.
pub fn currency_code(value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(DomainError::validation(format!(
            "currency `{trimmed}` must be a three-letter code"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

pub fn price_cents(value: i64) -> Result<i64, DomainError> {
    if value < 0 {
        return Err(DomainError::validation("price must not be negative"));
    }
    Ok(value)
}

pub fn duration_days(value: u16) -> Result<u16, DomainError> {
    if value == 0 || value > MAX_DURATION_DAYS {
        return Err(DomainError::validation(format!(
            "duration must be between 1 and {MAX_DURATION_DAYS} days"
        )));
    }
    Ok(value)
}

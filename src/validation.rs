//! Input validation for request payloads.
//!
//! Every helper returns the normalized value so handlers can store exactly
//! what was validated.

use chrono::NaiveTime;
use thiserror::Error;

use crate::error::OpsError;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_COMMENT_LEN: usize = 4000;
pub const MAX_WHATSAPP_LEN: usize = 4096;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error(
        "Invalid kitchen code: '{0}'. Use 2-20 characters from A-Z, 0-9, '-' and '_'"
    )]
    InvalidKitchenCode(String),

    #[error("Invalid email: '{0}'")]
    InvalidEmail(String),

    #[error("Invalid time '{0}'. Expected HH:MM")]
    InvalidTime(String),

    #[error("Work start {start} must be before work end {end}")]
    WorkHoursOrder { start: String, end: String },

    #[error("Invalid phone number: '{0}'")]
    InvalidPhone(String),
}

impl From<ValidationError> for OpsError {
    fn from(e: ValidationError) -> Self {
        OpsError::Validation(e.to_string())
    }
}

/// Trimmed, non-empty text bounded by `max` characters.
pub fn required_text(
    field: &'static str,
    raw: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::Required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_string())
}

/// Like [`required_text`] but blank input collapses to `None`.
pub fn optional_text(
    field: &'static str,
    raw: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required_text(field, v, max).map(Some),
    }
}

pub fn kitchen_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_ascii_uppercase();
    let valid_len = (2..=20).contains(&code.len());
    let valid_chars = code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid_len && valid_chars {
        Ok(code)
    } else {
        Err(ValidationError::InvalidKitchenCode(raw.to_string()))
    }
}

/// One `@` with something on both sides; lower-cased, no whitespace.
pub fn email(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim().to_lowercase();
    let ok = match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if ok && !value.chars().any(char::is_whitespace) {
        Ok(value)
    } else {
        Err(ValidationError::InvalidEmail(raw.to_string()))
    }
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn clock_time(raw: &str) -> Result<NaiveTime, ValidationError> {
    let value = raw.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ValidationError::InvalidTime(raw.to_string()))
}

/// Validates optional work hours, returning them normalized to `HH:MM`.
pub fn work_hours(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<String>, Option<String>), ValidationError> {
    let start = start
        .filter(|s| !s.trim().is_empty())
        .map(clock_time)
        .transpose()?;
    let end = end
        .filter(|s| !s.trim().is_empty())
        .map(clock_time)
        .transpose()?;
    if let (Some(s), Some(e)) = (start, end)
        && s >= e
    {
        return Err(ValidationError::WorkHoursOrder {
            start: s.format("%H:%M").to_string(),
            end: e.format("%H:%M").to_string(),
        });
    }
    let fmt = |t: NaiveTime| t.format("%H:%M").to_string();
    Ok((start.map(fmt), end.map(fmt)))
}

/// Reduces a phone number to the digits the WhatsApp gateway expects.
///
/// Local numbers (10 or 11 digits) get `country_code` prepended.
pub fn phone(raw: &str, country_code: &str) -> Result<String, ValidationError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_start_matches('0');
    let full = match digits.len() {
        10 | 11 => format!("{country_code}{digits}"),
        12..=15 => digits.to_string(),
        _ => return Err(ValidationError::InvalidPhone(raw.to_string())),
    };
    if full.len() > 15 {
        return Err(ValidationError::InvalidPhone(raw.to_string()));
    }
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kitchen_code_is_uppercased_and_checked() {
        assert_eq!(kitchen_code(" cz-01 "), Ok("CZ-01".to_string()));
        assert!(kitchen_code("a").is_err());
        assert!(kitchen_code("has space").is_err());
        assert!(kitchen_code("ÇOZINHA").is_err());
    }

    #[test]
    fn required_text_trims_and_bounds() {
        assert_eq!(required_text("title", "  Lavar  ", 10), Ok("Lavar".into()));
        assert_eq!(
            required_text("title", "   ", 10),
            Err(ValidationError::Required("title"))
        );
        assert!(required_text("title", "abcdefghijk", 10).is_err());
        assert_eq!(optional_text("description", Some("  "), 10), Ok(None));
    }

    #[test]
    fn email_requires_single_at_with_both_parts() {
        assert_eq!(email("Ana@Cozinha.com.br"), Ok("ana@cozinha.com.br".into()));
        assert_eq!(email("ana@cozinha"), Ok("ana@cozinha".into()));
        assert!(email("ana@").is_err());
        assert!(email("a@b@c.com").is_err());
        assert!(email("@c.com").is_err());
        assert!(email("ana maria@c.com").is_err());
    }

    #[test]
    fn work_hours_must_be_ordered() {
        assert_eq!(
            work_hours(Some("7:30"), Some("16:00")),
            Ok((Some("07:30".into()), Some("16:00".into())))
        );
        assert!(matches!(
            work_hours(Some("18:00"), Some("08:00")),
            Err(ValidationError::WorkHoursOrder { .. })
        ));
        assert!(work_hours(Some("25:00"), None).is_err());
        assert_eq!(work_hours(None, Some("")), Ok((None, None)));
    }

    #[test]
    fn phone_gets_country_code() {
        assert_eq!(phone("(11) 98765-4321", "55"), Ok("5511987654321".into()));
        assert_eq!(phone("+55 11 98765-4321", "55"), Ok("5511987654321".into()));
        assert_eq!(phone("011 98765 4321", "55"), Ok("5511987654321".into()));
        assert!(phone("12345", "55").is_err());
        assert!(phone("1234567890123456", "55").is_err());
    }
}

//! Input validation for identifiers, amounts and free text.
//!
//! Slugs (currency, shop and item ids) are lowercase ASCII: a leading letter followed by
//! letters, digits or underscores. Free text is trimmed and length-capped so a single
//! record can never balloon a stored document.

/// Validation failures with user-presentable messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long (maximum {max} characters)")]
    TooLong { field: &'static str, max: usize },

    #[error("'{value}' is not a valid id (use lowercase letters, digits and _ starting with a letter)")]
    NotASlug { value: String },

    #[error("{field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: i64 },

    #[error("{field} cannot be negative (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("stock must be -1 (unlimited) or a non-negative count (got {value})")]
    InvalidStock { value: i64 },
}

/// Maximum length of a slug id.
pub const MAX_SLUG_LEN: usize = 32;
/// Maximum length of display names.
pub const MAX_NAME_LEN: usize = 50;
/// Maximum length of descriptions and messages.
pub const MAX_TEXT_LEN: usize = 500;

/// Check the slug rule `[a-z][a-z0-9_]*`.
pub fn is_slug(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Validate a slug id, returning it unchanged on success.
pub fn validate_slug(value: &str) -> Result<String, ValidationError> {
    if value.len() > MAX_SLUG_LEN {
        return Err(ValidationError::TooLong {
            field: "id",
            max: MAX_SLUG_LEN,
        });
    }
    if !is_slug(value) {
        return Err(ValidationError::NotASlug {
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

/// Validate a required display name (trimmed).
pub fn validate_name(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// Validate a required message (trimmed), allowed up to the free-text length.
pub fn validate_message(field: &'static str, value: &str) -> Result<String, ValidationError> {
    validate_text(field, Some(value))?.ok_or(ValidationError::Empty { field })
}

/// Validate optional free text. Blank input collapses to `None`.
pub fn validate_text(field: &'static str, value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_TEXT_LEN,
        });
    }
    Ok(Some(trimmed.to_string()))
}

/// Amounts moved by credit/debit/transfer/purchase must be strictly positive.
pub fn validate_positive(field: &'static str, value: i64) -> Result<i64, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(value)
}

/// Prices, bonuses and base rewards may be zero but never negative.
pub fn validate_non_negative(field: &'static str, value: i64) -> Result<i64, ValidationError> {
    if value < 0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(value)
}

/// Generate a safe filename from an arbitrary id using percent encoding.
pub fn safe_filename(id: &str) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    utf8_percent_encode(id, NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rule() {
        assert!(is_slug("gold"));
        assert!(is_slug("gold_2"));
        assert!(is_slug("a"));
        assert!(!is_slug(""));
        assert!(!is_slug("2gold"));
        assert!(!is_slug("_gold"));
        assert!(!is_slug("Gold"));
        assert!(!is_slug("gold-coin"));
        assert!(!is_slug("gold coin"));
        assert!(!is_slug("金幣"));
    }

    #[test]
    fn slug_length_is_capped() {
        let long = "a".repeat(MAX_SLUG_LEN + 1);
        assert!(matches!(
            validate_slug(&long),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(validate_slug(&"a".repeat(MAX_SLUG_LEN)).is_ok());
    }

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(validate_name("name", "  Gold  ").unwrap(), "Gold");
        assert_eq!(
            validate_name("name", "   "),
            Err(ValidationError::Empty { field: "name" })
        );
    }

    #[test]
    fn blank_text_is_none() {
        assert_eq!(validate_text("description", Some("  ")).unwrap(), None);
        assert_eq!(validate_text("description", None).unwrap(), None);
        assert_eq!(
            validate_text("description", Some(" shiny ")).unwrap(),
            Some("shiny".to_string())
        );
    }

    #[test]
    fn messages_allow_long_text_but_not_blank() {
        let long = "x".repeat(MAX_NAME_LEN + 30);
        assert_eq!(validate_message("success message", &long).unwrap(), long);
        assert_eq!(
            validate_message("success message", "  "),
            Err(ValidationError::Empty {
                field: "success message"
            })
        );
        assert!(validate_message("success message", &"x".repeat(MAX_TEXT_LEN + 1)).is_err());
    }

    #[test]
    fn amount_rules() {
        assert!(validate_positive("amount", 1).is_ok());
        assert!(validate_positive("amount", 0).is_err());
        assert!(validate_positive("amount", -5).is_err());
        assert!(validate_non_negative("price", 0).is_ok());
        assert!(validate_non_negative("price", -1).is_err());
    }

    #[test]
    fn safe_filename_escapes_separators() {
        assert_eq!(safe_filename("1234"), "1234");
        assert_eq!(safe_filename("../x"), "%2E%2E%2Fx");
    }
}

//! Field-level input checks shared by the services.

use crate::utils::error::{AppError, AppResult};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_PHONE_LEN: usize = 20;

/// Basic RFC 5322 shape check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > MAX_EMAIL_LEN {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    let valid_local = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');

    if !local.chars().all(valid_local) || !domain.chars().all(valid_domain) {
        return false;
    }

    domain.contains('.') && domain.split('.').all(|part| !part.is_empty())
}

/// Trims and lower-cases an email, rejecting malformed input.
pub fn normalize_email(field: &'static str, email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::invalid(field, "Email is required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::invalid(field, "Email address is not valid"));
    }
    Ok(email)
}

/// Returns the trimmed value, or an error when it is blank or too long.
pub fn required_text(field: &'static str, value: &str, max_len: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::invalid(field, format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(AppError::invalid(
            field,
            format!("{field} must be at most {max_len} characters"),
        ));
    }
    Ok(value.to_string())
}

/// Like [`required_text`] but blank input collapses to `None`.
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max_len: usize,
) -> AppResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required_text(field, v, max_len).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name+tag@sub.example.co.uk"));
        assert!(is_valid_email("a_b-c@example.io"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@example..com"));
        assert!(!is_valid_email("us er@example.com"));
    }

    #[test]
    fn test_normalize_email_lowercases_and_trims() {
        let email = normalize_email("email", "  Ada@Example.COM ").unwrap();
        assert_eq!(email, "ada@example.com");
    }

    #[test]
    fn test_required_text_rejects_blank() {
        let err = required_text("name", "   ", MAX_NAME_LEN).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { field: "name", .. }));
    }

    #[test]
    fn test_optional_text_collapses_blank() {
        assert_eq!(optional_text("phone", Some("  "), MAX_PHONE_LEN).unwrap(), None);
        assert!(optional_text("phone", Some("123456789012345678901"), MAX_PHONE_LEN).is_err());
    }
}

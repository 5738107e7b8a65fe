//! Validation Traits
//!
//! Request-body checks shared by route handlers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ApiError, ApiResult};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex")
});

/// Trait for validating non-empty strings.
///
/// # Example
/// ```ignore
/// use corral_api::validation::ValidateNonEmpty;
///
/// fn create_user(name: &str) -> ApiResult<()> {
///     name.validate_non_empty("name")?;
///     // ... rest of logic
/// }
/// ```
pub trait ValidateNonEmpty {
    /// Returns `ApiError::missing_field` if the value is absent, empty or
    /// whitespace-only.
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        if self.trim().is_empty() {
            return Err(ApiError::missing_field(field_name));
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        self.as_str().validate_non_empty(field_name)
    }
}

impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Err(ApiError::missing_field(field_name)),
        }
    }
}

/// Trait for validating email addresses.
pub trait ValidateEmail {
    fn validate_email(&self, field_name: &str) -> ApiResult<()>;
}

impl ValidateEmail for str {
    fn validate_email(&self, field_name: &str) -> ApiResult<()> {
        if !EMAIL_PATTERN.is_match(self.trim()) {
            return Err(ApiError::invalid_format(field_name, "an email address"));
        }
        Ok(())
    }
}

impl ValidateEmail for String {
    fn validate_email(&self, field_name: &str) -> ApiResult<()> {
        self.as_str().validate_email(field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_non_empty() {
        assert!("Alice".validate_non_empty("name").is_ok());
        let err = "   ".validate_non_empty("name").unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(None::<String>.validate_non_empty("name").is_err());
        assert!(Some("x".to_string()).validate_non_empty("name").is_ok());
    }

    #[test]
    fn test_email() {
        assert!("alice@gmail.com".validate_email("email").is_ok());
        assert!(" bob123@gmail.com ".validate_email("email").is_ok());
        for bad in ["", "alice", "alice@", "@gmail.com", "a b@c.d", "a@b"] {
            let err = bad.validate_email("email").unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidFormat, "{bad:?} was accepted");
        }
    }
}

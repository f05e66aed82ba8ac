//! Domain validation for user creation.

use std::sync::LazyLock;

use regex::Regex;

use super::NewUser;
use crate::error::GatewayError;

/// Matches common email shapes. Not RFC 5322 complete.
static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").ok());

/// Validates creation requests before they reach storage.
pub trait Validator: Send + Sync + std::fmt::Debug {
    /// Checks a creation request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ValidationFailed`] describing the first
    /// offending field.
    fn validate_create(&self, user: &NewUser) -> Result<(), GatewayError>;
}

/// Name and email checks used by the gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl DefaultValidator {
    /// Creates the validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Validator for DefaultValidator {
    fn validate_create(&self, user: &NewUser) -> Result<(), GatewayError> {
        if user.first_name.trim().is_empty() || user.last_name.trim().is_empty() {
            return Err(GatewayError::ValidationFailed(
                "first_name and last_name are required".to_string(),
            ));
        }
        let Some(re) = EMAIL_RE.as_ref() else {
            return Err(GatewayError::Internal("email pattern failed to compile".to_string()));
        };
        if !re.is_match(&user.email) {
            return Err(GatewayError::ValidationFailed("email is invalid".to_string()));
        }
        if user.age.is_some_and(|age| age < 0) {
            return Err(GatewayError::ValidationFailed("age must not be negative".to_string()));
        }
        tracing::debug!(email = %user.email, "user validated");
        Ok(())
    }
}

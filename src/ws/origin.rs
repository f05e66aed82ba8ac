//! Origin gate applied before a WebSocket upgrade.

use crate::error::GatewayError;

/// Allow-list of browser origins permitted to open sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    allow_empty: bool,
}

impl OriginPolicy {
    /// Creates a policy. `allow_empty` admits requests without an `Origin`
    /// header (non-browser tools); keep it off in production.
    #[must_use]
    pub fn new(allowed: Vec<String>, allow_empty: bool) -> Self {
        Self {
            allowed,
            allow_empty,
        }
    }

    /// Returns the configured allow-list.
    #[must_use]
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Checks the `Origin` header of an upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OriginRejected`] if the origin is absent
    /// while empty origins are disallowed, or not on the allow-list.
    pub fn check(&self, origin: Option<&str>) -> Result<(), GatewayError> {
        match origin.map(str::trim).filter(|o| !o.is_empty()) {
            None if self.allow_empty => {
                tracing::debug!("no origin header, allowing connection");
                Ok(())
            }
            None => Err(GatewayError::OriginRejected("<empty>".to_string())),
            Some(origin) if self.allowed.iter().any(|a| a == origin) => Ok(()),
            Some(origin) => {
                tracing::warn!(origin, "blocked websocket origin");
                Err(GatewayError::OriginRejected(origin.to_string()))
            }
        }
    }
}

//! Client error taxonomy.
//!
//! Errors are propagated to the caller for presentation; nothing is swallowed
//! except logout's best-effort server call. The only automatic retry anywhere
//! is the request gateway's single refresh-and-replay.

use thiserror::Error;

/// Errors surfaced by the client SDK.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credential expired and could not be refreshed; the session has been
    /// torn down and the user must sign in again.
    #[error("session expired, sign in again")]
    AuthExpired,

    /// Login or registration was rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The stored credential no longer identifies a user; local session
    /// state has been cleared.
    #[error("session expired")]
    SessionExpired,

    /// Local field-level validation failed; nothing reached the network.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Resource absent; rendered as an empty/explanatory state, not fatal.
    #[error("not found: {0}")]
    NotFound(String),

    /// Business-rule rejection (e.g. insufficient stock); backend message
    /// surfaced verbatim.
    #[error("{0}")]
    BusinessRule(String),

    /// Payment-session problem for an already-committed order. The order is
    /// not rolled back; the user may retry payment later.
    #[error("payment session error: {0}")]
    PaymentSession(String),

    /// Request was rejected as unauthorized and no recovery applies.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No response from the backend; generic retryable failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Backend failure (5xx).
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A request URL could not be formed from the configured base.
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

/// Result type alias for [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

/// A set of field-level validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

/// One rejected field with a user-presentable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Wire-casing field name (e.g. `postalCode`).
    pub field: &'static str,
    pub message: String,
}

impl ValidationErrors {
    /// Record a failure for `field`.
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Whether any field failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The individual field failures.
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// Convert into `Err(ClientError::Validation)` if any field failed.
    ///
    /// # Errors
    ///
    /// Returns the accumulated failures when non-empty.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

impl ClientError {
    /// Whether the caller may simply retry the same operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server { .. } | Self::PaymentSession(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_display() {
        let mut errors = ValidationErrors::default();
        errors.push("phone", "phone number needs at least 10 digits");
        errors.push("postalCode", "postal code must be 4-6 digits");

        let err = errors.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("phone"));
        assert!(text.contains("postalCode"));
    }

    #[test]
    fn test_empty_validation_is_ok() {
        assert!(ValidationErrors::default().into_result().is_ok());
    }

    #[test]
    fn test_business_rule_message_is_verbatim() {
        let err = ClientError::BusinessRule("insufficient stock for Wool scarf".to_string());
        assert_eq!(err.to_string(), "insufficient stock for Wool scarf");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            ClientError::Server {
                status: 502,
                message: "bad gateway".to_string(),
            }
            .is_retryable()
        );
        assert!(!ClientError::InvalidCredentials.is_retryable());
        assert!(!ClientError::AuthExpired.is_retryable());
    }
}

//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure the core raises lands in one of these buckets. Each bucket maps
/// to a fixed HTTP-style status code (`status_code`) so the boundary can
/// serialize it without inspecting messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The requested entity does not exist (or is soft-deleted).
    #[error("{0}")]
    NotFound(String),

    /// Role, scope, ownership or state-window denial.
    #[error("{0}")]
    Forbidden(String),

    /// Invalid state transition, duplicate write or incomplete work at submit time.
    #[error("{0}")]
    Conflict(String),

    /// Malformed input: missing evidence, bad pagination, rejected file.
    #[error("{0}")]
    BadRequest(String),

    /// Unexpected persistence or transaction failure.
    ///
    /// The message is safe to show to callers; details are logged where the
    /// error is raised.
    #[error("{0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Generic internal error. Never carries storage details.
    pub fn internal() -> Self {
        Self::Internal("an unexpected error occurred".to_string())
    }

    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            DomainError::NotFound(_) => 404,
            DomainError::Forbidden(_) => 403,
            DomainError::Conflict(_) => 409,
            DomainError::BadRequest(_) => 400,
            DomainError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code (used in logs and error envelopes).
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) => "not_found",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::Conflict(_) => "conflict",
            DomainError::BadRequest(_) => "bad_request",
            DomainError::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DomainError::NotFound(m)
            | DomainError::Forbidden(m)
            | DomainError::Conflict(m)
            | DomainError::BadRequest(m)
            | DomainError::Internal(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_fixed_per_kind() {
        assert_eq!(DomainError::not_found("x").status_code(), 404);
        assert_eq!(DomainError::forbidden("x").status_code(), 403);
        assert_eq!(DomainError::conflict("x").status_code(), 409);
        assert_eq!(DomainError::bad_request("x").status_code(), 400);
        assert_eq!(DomainError::internal().status_code(), 500);
    }

    #[test]
    fn internal_error_does_not_leak_details() {
        let err = DomainError::internal();
        assert_eq!(err.message(), "an unexpected error occurred");
        assert_eq!(err.to_string(), err.message());
    }
}

//! Error handling utilities for route handlers

use crate::error::{ApiError, ErrorCode};

/// Extension trait for logging errors and converting to [`ApiError`]
pub trait LogErr<T> {
    /// Log error with context and return `internal_error`
    fn log_500(self, context: &str) -> Result<T, ApiError>;

    /// Log error with context and return the given error code
    fn log_code(self, context: &str, code: ErrorCode) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            ApiError::internal(context.to_string())
        })
    }

    fn log_code(self, context: &str, code: ErrorCode) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::warn!(error = %e, "{}", context);
            ApiError::new(code, format!("{}: {}", context, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_500_hides_cause() {
        let result: Result<(), &str> = Err("connection refused");
        let err = result.log_500("Failed to store image").unwrap_err();
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.detail, "Failed to store image");
    }

    #[test]
    fn test_log_code_keeps_cause() {
        let result: Result<(), &str> = Err("bad base64");
        let err = result
            .log_code("Invalid message format", ErrorCode::BadRequest)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert_eq!(err.detail, "Invalid message format: bad base64");
    }
}

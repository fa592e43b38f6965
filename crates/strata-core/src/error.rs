//! Error types for strata operations.
//!
//! Every failure carries a structured [`ErrorCode`] and can be classified as
//! recoverable (worth retrying by the caller) or fatal to the calling unit.

use thiserror::Error;

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

/// Main error type for all strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    /// Input validation failed (payload, natural key, or schema descriptor).
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        field: Option<String>,
    },

    /// A write would reorder the history of a fact.
    #[error("Monotonicity violation for {table}: as_of {as_of} precedes {boundary}")]
    MonotonicityViolation {
        table: String,
        as_of: i64,
        boundary: i64,
        code: ErrorCode,
    },

    /// A selector cannot be applied to the field it targets.
    #[error("Selector mismatch on field '{field}': {message}")]
    SelectorMismatch {
        field: String,
        message: String,
        code: ErrorCode,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValUnknownField,
    ValTypeMismatch,
    ValInvalidSchema,

    // Versioning (VER_xxx)
    VerRetroactiveWrite,

    // Selectors (SEL_xxx)
    SelUnknownField,
    SelIncompatibleType,
    SelInvalidLiteral,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbBusy,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValUnknownField => "VAL_002",
            ErrorCode::ValTypeMismatch => "VAL_003",
            ErrorCode::ValInvalidSchema => "VAL_004",
            ErrorCode::VerRetroactiveWrite => "VER_001",
            ErrorCode::SelUnknownField => "SEL_001",
            ErrorCode::SelIncompatibleType => "SEL_002",
            ErrorCode::SelInvalidLiteral => "SEL_003",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbBusy => "DB_003",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl StrataError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            field: None,
        }
    }

    /// Create a validation error tied to one field.
    pub fn invalid_field(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code,
            field: Some(field.into()),
        }
    }

    /// Create a schema descriptor error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidSchema,
            field: None,
        }
    }

    /// Create a monotonicity violation.
    pub fn retroactive(table: impl Into<String>, as_of: i64, boundary: i64) -> Self {
        Self::MonotonicityViolation {
            table: table.into(),
            as_of,
            boundary,
            code: ErrorCode::VerRetroactiveWrite,
        }
    }

    /// Create a selector mismatch error.
    pub fn selector(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::SelectorMismatch {
            field: field.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::MonotonicityViolation { code, .. } => *code,
            Self::SelectorMismatch { code, .. } => *code,
            Self::Database { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the caller may retry the operation that produced this error.
    ///
    /// Only lock conflicts and connectivity loss qualify. The core never
    /// retries on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Database {
                code: ErrorCode::DbBusy | ErrorCode::DbConnectionFailed,
                ..
            }
        )
    }
}

impl From<rusqlite::Error> for StrataError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                ErrorCode::DbBusy
            }
            Some(rusqlite::ErrorCode::CannotOpen) => ErrorCode::DbConnectionFailed,
            _ => ErrorCode::DbOperationFailed,
        };
        Self::Database {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = StrataError::validation("Invalid input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("Invalid input"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_retroactive_is_fatal() {
        let err = StrataError::retroactive("balances", 50, 100);
        assert_eq!(err.code(), ErrorCode::VerRetroactiveWrite);
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("as_of 50 precedes 100"));
    }

    #[test]
    fn test_database_error_is_recoverable() {
        let err: StrataError = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        )
        .into();
        assert_eq!(err.code(), ErrorCode::DbBusy);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_constraint_failure_is_not_recoverable() {
        let err: StrataError = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("CHECK constraint failed: life_start < life_end".to_string()),
        )
        .into();
        assert_eq!(err.code(), ErrorCode::DbOperationFailed);
        assert!(!err.is_recoverable());
        assert!(!StrataError::database("disk image is malformed").is_recoverable());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ValInvalidInput.as_str(), "VAL_001");
        assert_eq!(ErrorCode::SelIncompatibleType.as_str(), "SEL_002");
        assert_eq!(ErrorCode::DbBusy.as_str(), "DB_003");
    }
}

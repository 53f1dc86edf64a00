//! Error types for dbcnx.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every failure a client operation can report collapses into one of four
//! [`ErrorKind`]s so callers can branch on the category without matching
//! individual variants.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String, suggestion: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Connection pool is not available: it could not be created at startup")]
    PoolUnavailable,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The setup map is missing keys or holds unusable values.
    ConfigurationInvalid,
    /// The driver refused or lost the connection, or no pool exists.
    ConnectionFailed,
    /// The statement itself failed, or its result could not be decoded.
    ExecutionFailed,
    /// The caller passed an argument this crate rejects before touching the driver.
    InvalidArgument,
}

impl DbError {
    /// Create a configuration error with a helpful suggestion.
    pub fn configuration(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration { suggestion, .. } => Some(suggestion),
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::PoolUnavailable => {
                Some("Check the startup logs for the pool creation error and restart")
            }
            _ => None,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::ConfigurationInvalid,
            Self::Connection { .. } | Self::PoolUnavailable => ErrorKind::ConnectionFailed,
            Self::Database { .. } | Self::Internal { .. } => ErrorKind::ExecutionFailed,
            Self::InvalidInput { .. } => ErrorKind::InvalidArgument,
        }
    }

    /// SQLSTATE reported by the server, when there is one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(
                msg.to_string(),
                "Check host, port, sdi, user and password in the setup",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "All pooled connections are busy; raise pool_size or shorten queries",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::internal(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(err.sql_state(), Some("42601"));
        assert_eq!(DbError::invalid_input("x").suggestion(), None);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DbError::configuration("missing host", "add it").kind(),
            ErrorKind::ConfigurationInvalid
        );
        assert_eq!(
            DbError::connection("refused", "start server").kind(),
            ErrorKind::ConnectionFailed
        );
        assert_eq!(DbError::PoolUnavailable.kind(), ErrorKind::ConnectionFailed);
        assert_eq!(
            DbError::database("bad", None, "fix").kind(),
            ErrorKind::ExecutionFailed
        );
        assert_eq!(DbError::internal("decode").kind(), ErrorKind::ExecutionFailed);
        assert_eq!(
            DbError::invalid_input("datatype").kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_sqlx_pool_closed_is_connection_error() {
        let err = DbError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    }

    #[test]
    fn test_sqlx_row_not_found_is_execution_error() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    }

    #[test]
    fn test_sqlx_configuration_is_configuration_error() {
        let err = DbError::from(sqlx::Error::Configuration("bad url".into()));
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
        assert!(err.to_string().contains("bad url"));
    }
}

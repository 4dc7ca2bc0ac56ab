//! Error types for rowferry-rdbc
//!
//! Provides granular error classification so callers can distinguish
//! configuration mistakes from runtime failures, and gives batch execution a
//! dedicated partial-failure shape carrying per-statement outcomes.

use std::fmt;
use thiserror::Error;

/// Result type for rowferry-rdbc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-related errors
    Connection,
    /// Query execution errors
    Query,
    /// Transaction errors
    Transaction,
    /// Constraint violation
    Constraint,
    /// Type conversion errors
    TypeConversion,
    /// Configuration error
    Configuration,
    /// Schema-related errors
    Schema,
    /// Unknown/other errors
    Other,
}

/// Main error type for rowferry-rdbc
#[derive(Error, Debug)]
pub enum Error {
    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        /// What went wrong
        message: String,
        /// Underlying driver error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution failed
    #[error("query error: {message}")]
    Query {
        /// What went wrong
        message: String,
        /// The SQL text, if available
        sql: Option<String>,
        /// Underlying driver error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Batch execution failed partway, with per-statement outcomes.
    ///
    /// `completed` holds the affected-row counts of the statements that
    /// succeeded before the failure, in submission order. The first failing
    /// statement is therefore at batch offset `completed.len()`.
    #[error("batch error after {} completed statements: {message}", .completed.len())]
    BatchPartial {
        /// Affected-row counts for the statements that succeeded
        completed: Vec<u64>,
        /// What went wrong on the failing statement
        message: String,
        /// Underlying driver error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction error
    #[error("transaction error: {message}")]
    Transaction {
        /// What went wrong
        message: String,
        /// Underlying driver error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Constraint violation (PK, FK, unique, check)
    #[error("constraint violation: {constraint_name} - {message}")]
    Constraint {
        /// Violated constraint
        constraint_name: String,
        /// Driver-reported detail
        message: String,
    },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion {
        /// What went wrong
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration {
        /// What went wrong
        message: String,
    },

    /// Schema error (table not found, column mismatch)
    #[error("schema error: {message}")]
    Schema {
        /// What went wrong
        message: String,
    },

    /// Table not found
    #[error("table not found: {table}")]
    TableNotFound {
        /// The missing table
        table: String,
    },

    /// Unsupported operation for this backend
    #[error("unsupported: {message}")]
    Unsupported {
        /// What was attempted
        message: String,
    },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } | Self::BatchPartial { .. } => ErrorCategory::Query,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Constraint { .. } => ErrorCategory::Constraint,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Schema { .. } | Self::TableNotFound { .. } => ErrorCategory::Schema,
            Self::Unsupported { .. } => ErrorCategory::Other,
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a query error with SQL text
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a partial batch error
    pub fn batch_partial(completed: Vec<u64>, message: impl Into<String>) -> Self {
        Self::BatchPartial {
            completed,
            message: message.into(),
            source: None,
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Transaction => write!(f, "transaction"),
            Self::Constraint => write!(f, "constraint"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Configuration => write!(f, "configuration"),
            Self::Schema => write!(f, "schema"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::connection("refused").category(),
            ErrorCategory::Connection
        );
        assert_eq!(Error::query("bad sql").category(), ErrorCategory::Query);
        assert_eq!(
            Error::batch_partial(vec![1, 1], "dup key").category(),
            ErrorCategory::Query
        );
        assert_eq!(Error::config("missing url").category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_batch_partial_offset() {
        let err = Error::batch_partial(vec![1, 1, 1], "duplicate key");
        if let Error::BatchPartial { completed, .. } = &err {
            // failing statement sits at batch offset 3
            assert_eq!(completed.len(), 3);
        } else {
            panic!("wrong variant");
        }
        assert!(err.to_string().contains("3 completed"));
    }

    #[test]
    fn test_error_display() {
        let err = Error::query_with_sql("syntax error", "SELEC 1");
        assert!(err.to_string().contains("syntax error"));

        let err = Error::TableNotFound {
            table: "public.users".into(),
        };
        assert!(err.to_string().contains("public.users"));
    }
}

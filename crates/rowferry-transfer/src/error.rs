//! Error types for the transfer engine
//!
//! Errors are never thrown across task boundaries; each pipeline task
//! captures its own failure into the shared run state and triggers a
//! cooperative stop. The taxonomy distinguishes setup-time failures
//! (configuration, matching) from streaming failures (read, write).

use thiserror::Error;

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Main error type for the transfer engine
#[derive(Error, Debug)]
pub enum TransferError {
    /// Invalid or missing configuration, raised synchronously during setup
    #[error("configuration error: {message}")]
    Configuration {
        /// What is missing or invalid
        message: String,
    },

    /// Strict-mode field matching failed during statement construction
    #[error("field matching failed: {0}")]
    Matching(#[from] MatchingError),

    /// `execute()` was called before `setup()`
    #[error("transfer not initialized: call setup() before execute()")]
    NotInitialized,

    /// Source-side failure, with the row number at failure
    #[error("read error at row {row}: {message}")]
    Read {
        /// 1-based number of the row being read when the failure occurred
        row: u64,
        /// What went wrong
        message: String,
        /// Underlying cause
        #[source]
        source: Option<rowferry_rdbc::Error>,
    },

    /// Sink-side failure
    #[error("write error{}: {message}", fmt_row(.row))]
    Write {
        /// Absolute 1-based source-row number of the first failing
        /// statement, when the driver reported per-item outcomes
        row: Option<u64>,
        /// What went wrong
        message: String,
        /// Underlying cause
        #[source]
        source: Option<rowferry_rdbc::Error>,
    },
}

fn fmt_row(row: &Option<u64>) -> String {
    match row {
        Some(r) => format!(" at row {}", r),
        None => String::new(),
    }
}

impl TransferError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a read error for the given row
    pub fn read(row: u64, message: impl Into<String>) -> Self {
        Self::Read {
            row,
            message: message.into(),
            source: None,
        }
    }

    /// Create a read error wrapping an rdbc cause
    pub fn read_with_source(row: u64, source: rowferry_rdbc::Error) -> Self {
        Self::Read {
            row,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a write error
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            row: None,
            message: message.into(),
            source: None,
        }
    }

    /// Create a write error attributed to an absolute source row
    pub fn write_at_row(row: u64, message: impl Into<String>) -> Self {
        Self::Write {
            row: Some(row),
            message: message.into(),
            source: None,
        }
    }

    /// Create a write error wrapping an rdbc cause
    pub fn write_with_source(row: Option<u64>, source: rowferry_rdbc::Error) -> Self {
        Self::Write {
            row,
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Strict-mode matching failure, enumerating every mismatched column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingError {
    /// Target fields without a same-named source column
    pub unmatched_target: Vec<String>,
    /// Source columns without a same-named target field
    pub unmatched_source: Vec<String>,
}

impl std::fmt::Display for MatchingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.unmatched_target.is_empty() {
            parts.push(format!(
                "target fields without source column: {}",
                self.unmatched_target.join(", ")
            ));
        }
        if !self.unmatched_source.is_empty() {
            parts.push(format!(
                "source columns without target field: {}",
                self.unmatched_source.join(", ")
            ));
        }
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for MatchingError {}

/// Coarse-grained run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnCode {
    /// Run completed without errors or warnings
    #[default]
    Ok,
    /// Source-side failure (or interruption observed by the reader)
    ErrorInput,
    /// Sink-side failure
    ErrorOutput,
    /// Advisory warnings were recorded; the run was not stopped
    Warn,
}

impl ReturnCode {
    /// Numeric code surfaced to callers
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::ErrorInput => 1,
            Self::ErrorOutput => 2,
            Self::Warn => 5,
        }
    }

    /// Whether this code counts as a successful run
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Warn)
    }

    /// Whether this code is a hard error
    pub const fn is_error(self) -> bool {
        matches!(self, Self::ErrorInput | Self::ErrorOutput)
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::ErrorInput => write!(f, "ERROR_INPUT"),
            Self::ErrorOutput => write!(f, "ERROR_OUTPUT"),
            Self::Warn => write!(f, "WARN"),
        }
    }
}

/// A non-fatal condition recorded during the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Human-readable description
    pub message: String,
}

impl Warning {
    /// Create a warning
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_codes() {
        assert_eq!(ReturnCode::Ok.code(), 0);
        assert_eq!(ReturnCode::ErrorInput.code(), 1);
        assert_eq!(ReturnCode::ErrorOutput.code(), 2);
        assert_eq!(ReturnCode::Warn.code(), 5);

        assert!(ReturnCode::Ok.is_success());
        assert!(ReturnCode::Warn.is_success());
        assert!(!ReturnCode::ErrorOutput.is_success());
    }

    #[test]
    fn test_matching_error_enumerates_both_sides() {
        let err = MatchingError {
            unmatched_target: vec!["created_at".into()],
            unmatched_source: vec!["legacy_id".into()],
        };
        let text = err.to_string();
        assert!(text.contains("created_at"));
        assert!(text.contains("legacy_id"));
    }

    #[test]
    fn test_write_error_row_attribution() {
        let err = TransferError::write_at_row(42, "duplicate key");
        assert!(err.to_string().contains("row 42"));

        let err = TransferError::write("connection lost");
        assert!(!err.to_string().contains("row"));
    }

    #[test]
    fn test_read_error_includes_row() {
        let err = TransferError::read(7, "bad column");
        assert!(err.to_string().contains("row 7"));
    }
}

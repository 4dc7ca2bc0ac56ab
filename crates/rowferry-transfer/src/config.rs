//! Configuration for a transfer run
//!
//! Programmatic builder plus a property-map loader for the documented
//! `source.*`/`target.*` keys. Property values support `${VAR}` and
//! `${VAR:-default}` environment expansion; where-clause templates support
//! `{placeholder}` substitution resolved against a caller-supplied map.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{Result, TransferError, Warning};
use crate::matcher::FixedColumn;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Pre-compiled regex for `{placeholder}` tokens in where-clause templates
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}")
        .expect("placeholder regex pattern is invalid - this is a bug")
});

/// Source side of a transfer: a table or an arbitrary query
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceOptions {
    /// Source table (`schema.table` or bare name); exclusive with `query`
    pub table: Option<String>,
    /// Arbitrary source query; exclusive with `table`
    pub query: Option<String>,
    /// WHERE clause template appended to a table source
    pub where_clause: Option<String>,
    /// Server-side fetch-size hint
    #[serde(default = "default_fetch_size")]
    pub fetch_size: u32,
}

/// Target table side of a transfer
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TargetOptions {
    /// Target table (`schema.table` or bare name)
    pub table: Option<String>,
    /// Rows per batched statement execution
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Which sinks are active and where the file sink writes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkOptions {
    /// Write rows into the target table
    #[serde(default = "default_true")]
    pub to_table: bool,
    /// Write rows into a delimited text file
    #[serde(default)]
    pub to_file: bool,
    /// Final path of the file sink output
    pub file_path: Option<PathBuf>,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            to_table: true,
            to_file: false,
            file_path: None,
        }
    }
}

/// Line ending style for the file sink
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Unix-style line endings (\n)
    #[default]
    Lf,
    /// Windows-style line endings (\r\n)
    Crlf,
}

impl LineEnding {
    /// The line terminator characters
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
        }
    }
}

/// Delimited-text formatting options for the file sink
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvOptions {
    /// Field separator
    #[serde(default = "default_separator")]
    pub separator: char,
    /// Quote character
    #[serde(default = "default_quote_char")]
    pub quote_char: char,
    /// Token written for NULL values
    #[serde(default)]
    pub null_token: String,
    /// Line ending style
    #[serde(default)]
    pub line_ending: LineEnding,
    /// Quote every value, not just non-numeric ones
    #[serde(default)]
    pub always_quote: bool,
    /// Write a header row with the source column names
    #[serde(default = "default_true")]
    pub write_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            quote_char: default_quote_char(),
            null_token: String::new(),
            line_ending: LineEnding::default(),
            always_quote: false,
            write_header: default_true(),
        }
    }
}

/// Field matching policy flags; all combinable
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MatchOptions {
    /// Fail when any target field lacks a same-named source column
    #[serde(default)]
    pub target_strict: bool,
    /// Fail when any source column lacks a same-named target field
    #[serde(default)]
    pub source_strict: bool,
    /// Normalize names (lowercase, `/` and space to `_`) before comparison
    #[serde(default)]
    pub tolerant: bool,
}

/// Opt-in for the shared schema-metadata cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelCacheOptions {
    /// Cache key for the resolved target table definition
    pub key: String,
}

/// Full configuration of a transfer run
#[derive(Debug, Clone, Default)]
pub struct TransferConfig {
    /// Source options
    pub source: SourceOptions,
    /// Target options
    pub target: TargetOptions,
    /// Sink toggles
    pub sinks: SinkOptions,
    /// File sink formatting
    pub csv: CsvOptions,
    /// Matching policy
    pub matching: MatchOptions,
    /// Target fields never written
    pub exclude_fields: Vec<String>,
    /// Constant values injected for target columns absent from the source
    pub fixed_columns: Vec<FixedColumn>,
    /// Stop the run on the first sink error instead of continuing
    pub abort_on_error: bool,
    /// Issue commits after each batch (when the connection is not in
    /// autocommit mode)
    pub do_commit: bool,
    /// Convert zero dates (year 0) to NULL
    pub zero_date_to_null: bool,
    /// Trim leading/trailing whitespace from text values
    pub trim_fields: bool,
    /// Strip code points that are invalid in strict UTF-8 interchange
    pub strip_invalid_utf8: bool,
    /// Null individual unreadable columns instead of failing the run
    pub tolerate_column_errors: bool,
    /// Column tracked for the value range watermark
    pub value_range_column: Option<String>,
    /// Column tracked for the time range watermark
    pub time_range_column: Option<String>,
    /// Schema-metadata cache opt-in
    pub model_cache: Option<ModelCacheOptions>,
    /// Values substituted into `{placeholder}` tokens in the where clause
    pub placeholders: HashMap<String, String>,
    /// Bounded wait used by idle sink writers before re-checking the stop
    /// flag; a liveness safeguard, not a correctness timeout
    pub poll_timeout: Duration,
}

fn default_fetch_size() -> u32 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_separator() -> char {
    ','
}

fn default_quote_char() -> char {
    '"'
}

fn default_true() -> bool {
    true
}

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(250);

impl TransferConfig {
    /// Configuration with defaults; callers fill in source/target
    pub fn new() -> Self {
        Self {
            source: SourceOptions {
                fetch_size: default_fetch_size(),
                ..Default::default()
            },
            target: TargetOptions {
                batch_size: default_batch_size(),
                ..Default::default()
            },
            do_commit: true,
            abort_on_error: true,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            ..Default::default()
        }
    }

    /// Set the source table
    pub fn with_source_table(mut self, table: impl Into<String>) -> Self {
        self.source.table = Some(table.into());
        self
    }

    /// Set the source query
    pub fn with_source_query(mut self, query: impl Into<String>) -> Self {
        self.source.query = Some(query.into());
        self
    }

    /// Set the where clause template
    pub fn with_where_clause(mut self, clause: impl Into<String>) -> Self {
        self.source.where_clause = Some(clause.into());
        self
    }

    /// Set the fetch-size hint
    pub fn with_fetch_size(mut self, size: u32) -> Self {
        self.source.fetch_size = size;
        self
    }

    /// Set the target table
    pub fn with_target_table(mut self, table: impl Into<String>) -> Self {
        self.target.table = Some(table.into());
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.target.batch_size = size.max(1);
        self
    }

    /// Enable/disable the table sink
    pub fn with_table_sink(mut self, on: bool) -> Self {
        self.sinks.to_table = on;
        self
    }

    /// Enable the file sink writing to the given path
    pub fn with_file_sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.sinks.to_file = true;
        self.sinks.file_path = Some(path.into());
        self
    }

    /// Set CSV formatting options
    pub fn with_csv(mut self, csv: CsvOptions) -> Self {
        self.csv = csv;
        self
    }

    /// Set the matching policy
    pub fn with_matching(mut self, matching: MatchOptions) -> Self {
        self.matching = matching;
        self
    }

    /// Exclude target fields from the transfer
    pub fn with_excluded_fields(mut self, fields: Vec<String>) -> Self {
        self.exclude_fields = fields;
        self
    }

    /// Add a fixed column value
    pub fn with_fixed_column(mut self, fixed: FixedColumn) -> Self {
        self.fixed_columns.push(fixed);
        self
    }

    /// Set abort-on-error behavior
    pub fn with_abort_on_error(mut self, on: bool) -> Self {
        self.abort_on_error = on;
        self
    }

    /// Set commit mode
    pub fn with_commit(mut self, on: bool) -> Self {
        self.do_commit = on;
        self
    }

    /// Track the value range of the named column
    pub fn with_value_range_column(mut self, column: impl Into<String>) -> Self {
        self.value_range_column = Some(column.into());
        self
    }

    /// Track the time range of the named column
    pub fn with_time_range_column(mut self, column: impl Into<String>) -> Self {
        self.time_range_column = Some(column.into());
        self
    }

    /// Opt into the shared schema-metadata cache under the given key
    pub fn with_model_cache_key(mut self, key: impl Into<String>) -> Self {
        self.model_cache = Some(ModelCacheOptions { key: key.into() });
        self
    }

    /// Provide where-clause placeholder values
    pub fn with_placeholders(mut self, values: HashMap<String, String>) -> Self {
        self.placeholders = values;
        self
    }

    /// Set the writer poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Load the documented property keys from a property map.
    ///
    /// Values run through `${VAR}`/`${VAR:-default}` environment expansion
    /// first. Unrecognized keys are ignored.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::new();

        for (key, raw) in props {
            let value = expand_env_vars(raw);
            match key.as_str() {
                "source.table" => config.source.table = Some(value),
                "source.query" => config.source.query = Some(value),
                "source.whereClause" => config.source.where_clause = Some(value),
                "source.fetchSize" => {
                    config.source.fetch_size = value.parse().map_err(|_| {
                        TransferError::config(format!("invalid source.fetchSize: {}", value))
                    })?;
                }
                "target.table" => config.target.table = Some(value),
                "target.batchSize" => {
                    let size: usize = value.parse().map_err(|_| {
                        TransferError::config(format!("invalid target.batchSize: {}", value))
                    })?;
                    config.target.batch_size = size.max(1);
                }
                "abortIfErrors" => {
                    config.abort_on_error = parse_bool(&value).ok_or_else(|| {
                        TransferError::config(format!("invalid abortIfErrors: {}", value))
                    })?;
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Validate the configuration; called by `setup()`
    pub fn validate(&self) -> Result<()> {
        match (&self.source.table, &self.source.query) {
            (None, None) => {
                return Err(TransferError::config(
                    "either source.table or source.query must be set",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(TransferError::config(
                    "source.table and source.query are mutually exclusive",
                ))
            }
            _ => {}
        }

        if self.source.query.is_some() && self.source.where_clause.is_some() {
            return Err(TransferError::config(
                "source.whereClause applies only to a table source",
            ));
        }

        if !self.sinks.to_table && !self.sinks.to_file {
            return Err(TransferError::config("no sink enabled"));
        }
        if self.sinks.to_table && self.target.table.is_none() {
            return Err(TransferError::config(
                "target.table must be set when the table sink is enabled",
            ));
        }
        if self.sinks.to_file && self.sinks.file_path.is_none() {
            return Err(TransferError::config(
                "file path must be set when the file sink is enabled",
            ));
        }

        let mut seen = Vec::new();
        for fixed in &self.fixed_columns {
            if seen.iter().any(|s: &String| s.eq_ignore_ascii_case(&fixed.name)) {
                return Err(TransferError::config(format!(
                    "duplicate fixed column: {}",
                    fixed.name
                )));
            }
            seen.push(fixed.name.clone());
        }

        Ok(())
    }

    /// Queue capacity shared by both sink queues
    pub fn queue_capacity(&self) -> usize {
        self.target
            .batch_size
            .max(self.source.fetch_size as usize)
            .max(1)
    }

    /// Resolve the where-clause template against the placeholder map.
    ///
    /// Unresolved `{placeholder}` tokens substitute an empty string and
    /// produce a warning; the run is not stopped.
    pub fn resolve_where_clause(&self) -> (Option<String>, Vec<Warning>) {
        let Some(template) = &self.source.where_clause else {
            return (None, Vec::new());
        };

        let mut warnings = Vec::new();
        let resolved = PLACEHOLDER_REGEX
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                match self.placeholders.get(name) {
                    Some(value) => value.clone(),
                    None => {
                        warnings.push(Warning::new(format!(
                            "unresolved placeholder {{{}}} in where clause, substituting empty string",
                            name
                        )));
                        String::new()
                    }
                }
            })
            .into_owned();

        (Some(resolved), warnings)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references from the environment
pub fn expand_env_vars(value: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let var = &caps[1];
            match std::env::var(var) {
                Ok(v) => v,
                Err(_) => caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            }
        })
        .into_owned()
}

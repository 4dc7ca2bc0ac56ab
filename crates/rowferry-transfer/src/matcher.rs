//! Field matching between source columns and target parameters
//!
//! Builds the parameter list for the target statement once per run, from the
//! target table's fields, the exclusion list, fixed column values, and the
//! configured matching policy. Every parameter bound during a write has
//! exactly one mapping entry; in the lenient policy, unmatched target fields
//! are dropped from the statement at build time rather than silently bound
//! to NULL at row time.

use std::str::FromStr;

use rowferry_rdbc::types::{TableMetadata, Value};

use crate::config::MatchOptions;
use crate::error::MatchingError;
use crate::row::TransferRow;

/// Which statements a column participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsageTag {
    /// Bound in both INSERT and UPDATE statements
    #[default]
    InsertAndUpdate,
    /// Bound only in INSERT statements
    InsertOnly,
    /// Bound only in UPDATE statements
    UpdateOnly,
}

impl FromStr for UsageTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "insertandupdate" | "both" => Ok(Self::InsertAndUpdate),
            "insertonly" | "insert" => Ok(Self::InsertOnly),
            "updateonly" | "update" => Ok(Self::UpdateOnly),
            other => Err(format!("invalid usage type: {}", other)),
        }
    }
}

/// A constant value injected into every row for a target column not present
/// in the source
#[derive(Debug, Clone, PartialEq)]
pub struct FixedColumn {
    /// Target column name
    pub name: String,
    /// The constant value
    pub value: Value,
    /// Statement participation
    pub usage: UsageTag,
}

impl FixedColumn {
    /// Create a fixed column bound in both statement kinds
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            usage: UsageTag::InsertAndUpdate,
        }
    }

    /// Set the usage tag
    pub fn with_usage(mut self, usage: UsageTag) -> Self {
        self.usage = usage;
        self
    }
}

/// Statement kind a parameter list is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// INSERT parameter list
    Insert,
    /// UPDATE parameter list
    Update,
}

/// Where a bound parameter's value comes from
#[derive(Debug, Clone, PartialEq)]
enum BindingSource {
    /// Positional index into the source row
    SourceColumn(usize),
    /// A fixed constant
    Fixed(Value),
}

/// One resolved target parameter
#[derive(Debug, Clone)]
struct ParameterBinding {
    target_column: String,
    source: BindingSource,
    usage: UsageTag,
}

impl ParameterBinding {
    fn applies_to(&self, kind: StatementKind) -> bool {
        match (kind, self.usage) {
            (_, UsageTag::InsertAndUpdate) => true,
            (StatementKind::Insert, UsageTag::InsertOnly) => true,
            (StatementKind::Update, UsageTag::UpdateOnly) => true,
            _ => false,
        }
    }
}

/// Normalize a name for tolerant comparison
fn normalize(name: &str) -> String {
    name.to_lowercase().replace(['/', ' '], "_")
}

/// Resolves source columns to target parameters under a matching policy
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    bindings: Vec<ParameterBinding>,
}

impl FieldMatcher {
    /// Build the matcher for a run.
    ///
    /// `source_columns` are the source result's column names in positional
    /// order. Target fields named in `exclude` or superseded by a fixed
    /// column are never matched; fixed columns are appended after the
    /// matched fields.
    pub fn build(
        target: &TableMetadata,
        source_columns: &[String],
        exclude: &[String],
        fixed: &[FixedColumn],
        options: MatchOptions,
    ) -> Result<Self, MatchingError> {
        let key = |name: &str| {
            if options.tolerant {
                normalize(name)
            } else {
                name.to_lowercase()
            }
        };

        let excluded = |name: &str| exclude.iter().any(|e| key(e) == key(name));
        let superseded = |name: &str| fixed.iter().any(|f| key(&f.name) == key(name));

        let mut bindings = Vec::new();
        let mut unmatched_target = Vec::new();

        for column in &target.columns {
            if excluded(&column.name) || superseded(&column.name) {
                continue;
            }
            match source_columns
                .iter()
                .position(|s| key(s) == key(&column.name))
            {
                Some(idx) => bindings.push(ParameterBinding {
                    target_column: column.name.clone(),
                    source: BindingSource::SourceColumn(idx),
                    usage: UsageTag::InsertAndUpdate,
                }),
                None => unmatched_target.push(column.name.clone()),
            }
        }

        for f in fixed {
            bindings.push(ParameterBinding {
                target_column: f.name.clone(),
                source: BindingSource::Fixed(f.value.clone()),
                usage: f.usage,
            });
        }

        // Source columns with no counterpart anywhere in the target table
        // (deliberate exclusions do not count as mismatches)
        let unmatched_source: Vec<String> = source_columns
            .iter()
            .filter(|s| !target.columns.iter().any(|c| key(&c.name) == key(s)))
            .cloned()
            .collect();

        let target_failures = if options.target_strict {
            unmatched_target.clone()
        } else {
            Vec::new()
        };
        let source_failures = if options.source_strict {
            unmatched_source
        } else {
            Vec::new()
        };

        if !target_failures.is_empty() || !source_failures.is_empty() {
            return Err(MatchingError {
                unmatched_target: target_failures,
                unmatched_source: source_failures,
            });
        }

        Ok(Self { bindings })
    }

    /// Ordered target column names for the given statement kind
    pub fn columns_for(&self, kind: StatementKind) -> Vec<String> {
        self.bindings
            .iter()
            .filter(|b| b.applies_to(kind))
            .map(|b| b.target_column.clone())
            .collect()
    }

    /// Resolve the parameter values of a row for the given statement kind,
    /// in the same order as [`columns_for`](Self::columns_for)
    pub fn bind_values(&self, row: &TransferRow, kind: StatementKind) -> Vec<Value> {
        self.bindings
            .iter()
            .filter(|b| b.applies_to(kind))
            .map(|b| match &b.source {
                BindingSource::SourceColumn(idx) => {
                    row.values().get(*idx).cloned().unwrap_or(Value::Null)
                }
                BindingSource::Fixed(value) => value.clone(),
            })
            .collect()
    }

    /// Number of resolved bindings across all statement kinds
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no bindings were resolved
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

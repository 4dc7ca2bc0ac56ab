//! Rows moving through the pipeline
//!
//! A `TransferRow` is an ordered tuple of typed values owned by the reader
//! until handed to a sink queue, then consumed exactly once by that queue's
//! writer. End-of-stream is an explicit variant of the queue event type, not
//! a sentinel object compared by identity.

use chrono::Datelike;
use rowferry_rdbc::types::{ColumnMetadata, Value, ValueKind};

/// An ordered tuple of typed values, by source column position
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRow {
    values: Vec<Value>,
}

impl TransferRow {
    /// Create a row from values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// The row's values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of values
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no values
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a column position
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

/// Event delivered through a sink queue
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    /// A data row
    Row(TransferRow),
    /// Termination signal; always the last event a writer sees from a
    /// healthy reader
    EndOfStream,
}

/// Per-column streaming plan, decided once before the first row
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    /// Column name as reported by the source result
    pub name: String,
    /// Value kind; from the declared type when mapped, otherwise filled in
    /// from the first non-null value the driver produces
    pub kind: Option<ValueKind>,
}

impl ColumnPlan {
    /// Build plans from the source result's column metadata
    pub fn from_columns(columns: &[ColumnMetadata]) -> Vec<Self> {
        columns
            .iter()
            .map(|c| Self {
                name: c.name.clone(),
                kind: c.declared_kind(),
            })
            .collect()
    }

    /// Fill the kind from a driver value when the declared type had no
    /// mapping
    pub fn observe(&mut self, value: &Value) {
        if self.kind.is_none() {
            self.kind = value.kind();
        }
    }
}

/// Row-level value policies applied during materialization
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuePolicies {
    /// Convert zero dates (year 0) to NULL
    pub zero_date_to_null: bool,
    /// Trim leading/trailing whitespace from text values
    pub trim_fields: bool,
    /// Strip code points invalid in strict UTF-8 interchange
    pub strip_invalid_utf8: bool,
}

impl ValuePolicies {
    /// Whether any policy is active
    pub const fn is_active(&self) -> bool {
        self.zero_date_to_null || self.trim_fields || self.strip_invalid_utf8
    }

    /// Apply the active policies to a value
    pub fn apply(&self, value: Value) -> Value {
        let value = if self.zero_date_to_null {
            match value {
                Value::Date(d) if d.year() == 0 => Value::Null,
                Value::Timestamp(t) if t.year() == 0 => Value::Null,
                other => other,
            }
        } else {
            value
        };

        match value {
            Value::Text(s) => {
                let s = if self.strip_invalid_utf8 {
                    s.chars().filter(|c| !is_invalid_interchange(*c)).collect()
                } else {
                    s
                };
                let s = if self.trim_fields {
                    s.trim().to_string()
                } else {
                    s
                };
                Value::Text(s)
            }
            other => other,
        }
    }
}

/// NUL, the replacement character, and Unicode noncharacters
fn is_invalid_interchange(c: char) -> bool {
    let cp = c as u32;
    c == '\u{0}'
        || c == '\u{FFFD}'
        || (0xFDD0..=0xFDEF).contains(&cp)
        || (cp & 0xFFFE) == 0xFFFE
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    #[test]
    fn test_row_event_is_explicit_variant() {
        let eos = RowEvent::EndOfStream;
        assert_ne!(eos, RowEvent::Row(TransferRow::new(vec![])));
    }

    #[test]
    fn test_column_plan_from_declared_types() {
        let columns = vec![
            ColumnMetadata::new("id", "integer"),
            ColumnMetadata::new("payload", "vendor_blob"),
        ];
        let plans = ColumnPlan::from_columns(&columns);
        assert_eq!(plans[0].kind, Some(ValueKind::Integer));
        assert_eq!(plans[1].kind, None);
    }

    #[test]
    fn test_column_plan_observe_fills_unmapped_kind() {
        let mut plan = ColumnPlan {
            name: "payload".into(),
            kind: None,
        };
        plan.observe(&Value::Null);
        assert_eq!(plan.kind, None);

        plan.observe(&Value::Text("x".into()));
        assert_eq!(plan.kind, Some(ValueKind::Text));

        // Decided once, not per row
        plan.observe(&Value::Integer(1));
        assert_eq!(plan.kind, Some(ValueKind::Text));
    }

    #[test]
    fn test_zero_date_to_null() {
        let policies = ValuePolicies {
            zero_date_to_null: true,
            ..Default::default()
        };

        let zero = Value::Date(NaiveDate::from_ymd_opt(0, 1, 1).unwrap());
        assert!(policies.apply(zero).is_null());

        let zero_ts = Value::Timestamp(
            NaiveDateTime::parse_from_str("0000-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        );
        assert!(policies.apply(zero_ts).is_null());

        let real = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(!policies.apply(real).is_null());
    }

    #[test]
    fn test_trim_fields() {
        let policies = ValuePolicies {
            trim_fields: true,
            ..Default::default()
        };
        assert_eq!(
            policies.apply(Value::Text("  padded  ".into())),
            Value::Text("padded".into())
        );
    }

    #[test]
    fn test_strip_invalid_utf8() {
        let policies = ValuePolicies {
            strip_invalid_utf8: true,
            ..Default::default()
        };
        let dirty = format!("ok{}\u{FFFD}{}", '\u{0}', '\u{FDD0}');
        assert_eq!(
            policies.apply(Value::Text(dirty)),
            Value::Text("ok".into())
        );
    }
}

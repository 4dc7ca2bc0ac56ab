//! Watermark range tracking
//!
//! Accumulates the running min/max of a designated value column and/or time
//! column across every row the reader produces. The result is read after the
//! run and persisted by the caller as the starting point of the next
//! incremental extraction. Only the reader touches the tracker; it is not
//! shared between tasks.

use chrono::{DateTime, NaiveDateTime};
use rowferry_rdbc::types::{Value, ValueKind};

use crate::row::{ColumnPlan, TransferRow};

/// Observed min/max of the tracked columns; widened per row, never narrowed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeState {
    /// Smallest observed value of the value-range column
    pub value_start: Option<String>,
    /// Largest observed value of the value-range column
    pub value_end: Option<String>,
    /// Earliest observed value of the time-range column
    pub time_start: Option<NaiveDateTime>,
    /// Latest observed value of the time-range column
    pub time_end: Option<NaiveDateTime>,
}

/// Accumulates the range state while rows stream by
#[derive(Debug)]
pub struct RangeTracker {
    value_column: Option<usize>,
    value_kind: Option<ValueKind>,
    time_column: Option<usize>,
    state: RangeState,
}

impl RangeTracker {
    /// Resolve the configured column names against the source column plans.
    ///
    /// Returns `None` when no range column is configured. A configured name
    /// that does not exist in the source is reported back for the caller to
    /// surface.
    pub fn resolve(
        plans: &[ColumnPlan],
        value_column: Option<&str>,
        time_column: Option<&str>,
    ) -> Result<Option<Self>, String> {
        if value_column.is_none() && time_column.is_none() {
            return Ok(None);
        }

        let find = |name: &str| {
            plans
                .iter()
                .position(|p| p.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("range column not in source result: {}", name))
        };

        let value_idx = value_column.map(find).transpose()?;
        let time_idx = time_column.map(find).transpose()?;
        let value_kind = value_idx.and_then(|i| plans[i].kind);

        Ok(Some(Self {
            value_column: value_idx,
            value_kind,
            time_column: time_idx,
            state: RangeState::default(),
        }))
    }

    /// Widen the range with one row; NULLs in the tracked columns are skipped
    pub fn observe(&mut self, row: &TransferRow) {
        if let Some(idx) = self.value_column {
            if let Some(value) = row.get(idx) {
                if !value.is_null() {
                    if self.value_kind.is_none() {
                        self.value_kind = value.kind();
                    }
                    self.widen_value(value);
                }
            }
        }

        if let Some(idx) = self.time_column {
            if let Some(value) = row.get(idx) {
                if let Some(ts) = as_timestamp(value) {
                    self.widen_time(ts);
                }
            }
        }
    }

    fn widen_value(&mut self, value: &Value) {
        let Some(text) = value.display_text() else {
            return;
        };
        let numeric = self.value_kind.map(ValueKind::is_numeric).unwrap_or(false);

        let replace_start = match &self.state.value_start {
            None => true,
            Some(current) => compare(&text, current, numeric) == std::cmp::Ordering::Less,
        };
        if replace_start {
            self.state.value_start = Some(text.clone());
        }

        let replace_end = match &self.state.value_end {
            None => true,
            Some(current) => compare(&text, current, numeric) == std::cmp::Ordering::Greater,
        };
        if replace_end {
            self.state.value_end = Some(text);
        }
    }

    fn widen_time(&mut self, ts: NaiveDateTime) {
        match self.state.time_start {
            Some(current) if current <= ts => {}
            _ => self.state.time_start = Some(ts),
        }
        match self.state.time_end {
            Some(current) if current >= ts => {}
            _ => self.state.time_end = Some(ts),
        }
    }

    /// The accumulated range so far
    pub fn state(&self) -> &RangeState {
        &self.state
    }

    /// Consume the tracker, returning the final range
    pub fn into_state(self) -> RangeState {
        self.state
    }
}

fn compare(a: &str, b: &str, numeric: bool) -> std::cmp::Ordering {
    if numeric {
        if let (Ok(na), Ok(nb)) = (a.parse::<f64>(), b.parse::<f64>()) {
            return na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal);
        }
    }
    a.cmp(b)
}

/// Interpret a tracked time value: epoch milliseconds, a date, or a
/// timestamp
fn as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Long(ms) => DateTime::from_timestamp_millis(*ms).map(|dt| dt.naive_utc()),
        Value::Integer(secs) => {
            DateTime::from_timestamp(i64::from(*secs), 0).map(|dt| dt.naive_utc())
        }
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::Timestamp(ts) => Some(*ts),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rowferry_rdbc::types::ColumnMetadata;

    fn plans(columns: &[(&str, &str)]) -> Vec<ColumnPlan> {
        let metadata: Vec<ColumnMetadata> = columns
            .iter()
            .map(|(name, ty)| ColumnMetadata::new(*name, *ty))
            .collect();
        ColumnPlan::from_columns(&metadata)
    }

    #[test]
    fn test_no_columns_configured() {
        let tracker = RangeTracker::resolve(&plans(&[("id", "integer")]), None, None).unwrap();
        assert!(tracker.is_none());
    }

    #[test]
    fn test_unknown_column_reported() {
        let err = RangeTracker::resolve(&plans(&[("id", "integer")]), Some("nope"), None)
            .unwrap_err();
        assert!(err.contains("nope"));
    }

    #[test]
    fn test_numeric_min_max_ignores_arrival_order() {
        let mut tracker =
            RangeTracker::resolve(&plans(&[("id", "integer")]), Some("id"), None)
                .unwrap()
                .unwrap();

        for v in [5, 1, 9, 3] {
            tracker.observe(&TransferRow::new(vec![Value::Integer(v)]));
        }

        assert_eq!(tracker.state().value_start.as_deref(), Some("1"));
        assert_eq!(tracker.state().value_end.as_deref(), Some("9"));
    }

    #[test]
    fn test_numeric_compares_numerically_not_lexically() {
        let mut tracker =
            RangeTracker::resolve(&plans(&[("id", "bigint")]), Some("id"), None)
                .unwrap()
                .unwrap();

        tracker.observe(&TransferRow::new(vec![Value::Long(9)]));
        tracker.observe(&TransferRow::new(vec![Value::Long(10)]));

        // Lexicographic comparison would call "9" the max
        assert_eq!(tracker.state().value_end.as_deref(), Some("10"));
    }

    #[test]
    fn test_text_compares_lexicographically() {
        let mut tracker =
            RangeTracker::resolve(&plans(&[("code", "varchar")]), Some("code"), None)
                .unwrap()
                .unwrap();

        for v in ["banana", "apple", "cherry"] {
            tracker.observe(&TransferRow::new(vec![Value::Text(v.into())]));
        }

        assert_eq!(tracker.state().value_start.as_deref(), Some("apple"));
        assert_eq!(tracker.state().value_end.as_deref(), Some("cherry"));
    }

    #[test]
    fn test_nulls_skipped() {
        let mut tracker =
            RangeTracker::resolve(&plans(&[("id", "integer")]), Some("id"), None)
                .unwrap()
                .unwrap();

        tracker.observe(&TransferRow::new(vec![Value::Null]));
        tracker.observe(&TransferRow::new(vec![Value::Integer(4)]));
        tracker.observe(&TransferRow::new(vec![Value::Null]));

        assert_eq!(tracker.state().value_start.as_deref(), Some("4"));
        assert_eq!(tracker.state().value_end.as_deref(), Some("4"));
    }

    #[test]
    fn test_time_range_accepts_epoch_and_timestamp() {
        let mut tracker = RangeTracker::resolve(
            &plans(&[("id", "integer"), ("seen_at", "bigint")]),
            None,
            Some("seen_at"),
        )
        .unwrap()
        .unwrap();

        // epoch millis
        tracker.observe(&TransferRow::new(vec![
            Value::Integer(1),
            Value::Long(1_700_000_000_000),
        ]));
        // a plain timestamp
        let ts = NaiveDate::from_ymd_opt(2022, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        tracker.observe(&TransferRow::new(vec![Value::Integer(2), Value::Timestamp(ts)]));

        let state = tracker.into_state();
        assert_eq!(state.time_start, Some(ts));
        assert!(state.time_end.unwrap() > ts);
    }
}

//! Value types for rowferry-rdbc
//!
//! Provides:
//! - Value: closed set of typed column values moved between source and sinks
//! - ValueKind: the per-column tag, decided once before streaming begins
//! - Row: an ordered tuple of values with column names
//! - ColumnMetadata / TableMetadata: catalog-level field descriptions

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A typed column value.
///
/// The set is closed: sinks dispatch on the variant tag to pick the matching
/// typed bind call, so adding a variant means touching every bind site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Character data (CHAR, VARCHAR, TEXT)
    Text(String),
    /// 32-bit signed integer (INTEGER)
    Integer(i32),
    /// 64-bit signed integer (BIGINT)
    Long(i64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// 64-bit floating point (DOUBLE PRECISION, FLOAT)
    Float64(f64),
    /// Boolean (BOOLEAN, BIT)
    Boolean(bool),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Timestamp without timezone (TIMESTAMP, DATETIME)
    Timestamp(NaiveDateTime),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Integer wider than 64 bits (BIGINT UNSIGNED, NUMBER(38))
    BigInt(BigInt),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the kind tag, or `None` for NULL
    pub const fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Text(_) => Some(ValueKind::Text),
            Self::Integer(_) => Some(ValueKind::Integer),
            Self::Long(_) => Some(ValueKind::Long),
            Self::Decimal(_) => Some(ValueKind::Decimal),
            Self::Float64(_) => Some(ValueKind::Float64),
            Self::Boolean(_) => Some(ValueKind::Boolean),
            Self::Date(_) => Some(ValueKind::Date),
            Self::Timestamp(_) => Some(ValueKind::Timestamp),
            Self::Time(_) => Some(ValueKind::Time),
            Self::BigInt(_) => Some(ValueKind::BigInt),
        }
    }

    /// Whether the value is numeric or boolean (unquoted in delimited output)
    pub const fn is_numeric_or_boolean(&self) -> bool {
        matches!(
            self,
            Self::Integer(_)
                | Self::Long(_)
                | Self::Decimal(_)
                | Self::Float64(_)
                | Self::Boolean(_)
                | Self::BigInt(_)
        )
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(i64::from(*n)),
            Self::Long(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(f64::from(*n)),
            Self::Long(n) => Some(*n as f64),
            Self::Float64(n) => Some(*n),
            Self::Decimal(d) => d.to_string().parse().ok(),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to borrow as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render the value as display text, `None` for NULL.
    ///
    /// This is the representation used for range watermarks and delimited
    /// output; temporal values render in ISO-8601 form.
    pub fn display_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Long(n) => Some(n.to_string()),
            Self::Decimal(d) => Some(d.to_string()),
            Self::Float64(n) => Some(n.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::Timestamp(t) => Some(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Self::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            Self::BigInt(n) => Some(n.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self {
        Self::BigInt(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Tag identifying the type of a column's values.
///
/// Decided once per column before streaming begins, either from the declared
/// database type or from the driver's native type for that column — never
/// re-derived per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Character data
    Text,
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    Long,
    /// Arbitrary precision decimal
    Decimal,
    /// 64-bit float
    Float64,
    /// Boolean
    Boolean,
    /// Date
    Date,
    /// Timestamp
    Timestamp,
    /// Time of day
    Time,
    /// Integer wider than 64 bits
    BigInt,
}

impl ValueKind {
    /// Map a declared database type name to a kind.
    ///
    /// Returns `None` for type names with no explicit mapping; the caller
    /// falls back to the driver's native type for the column.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let upper = type_name.trim().to_uppercase();
        // Strip length/precision suffixes: VARCHAR(255), NUMERIC(10,2)
        let base = upper.split('(').next().unwrap_or(&upper).trim();
        match base {
            "CHAR" | "VARCHAR" | "NVARCHAR" | "TEXT" | "CLOB" | "STRING" => Some(Self::Text),
            "TINYINT" | "SMALLINT" | "INT" | "INTEGER" | "INT2" | "INT4" | "SERIAL" => {
                Some(Self::Integer)
            }
            "BIGINT" | "INT8" | "BIGSERIAL" => Some(Self::Long),
            "BIGINT UNSIGNED" | "UNSIGNED BIGINT" => Some(Self::BigInt),
            "DECIMAL" | "NUMERIC" | "NUMBER" | "MONEY" => Some(Self::Decimal),
            "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" => {
                Some(Self::Float64)
            }
            "BOOL" | "BOOLEAN" | "BIT" => Some(Self::Boolean),
            "DATE" => Some(Self::Date),
            "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "DATETIME2" | "SMALLDATETIME" => {
                Some(Self::Timestamp)
            }
            "TIME" | "TIMETZ" => Some(Self::Time),
            _ => None,
        }
    }

    /// Whether values of this kind compare numerically (as opposed to
    /// lexicographically) for range tracking.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Long | Self::Decimal | Self::Float64 | Self::BigInt
        )
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Consume the row, returning its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Column metadata
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,
    /// Declared SQL type name (vendor-specific)
    pub type_name: String,
    /// Whether column is nullable
    pub nullable: bool,
    /// Whether the column is part of the primary key
    pub primary_key: bool,
    /// Column ordinal (1-based)
    pub ordinal: u32,
}

impl ColumnMetadata {
    /// Create basic column metadata
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: true,
            primary_key: false,
            ordinal: 0,
        }
    }

    /// Mark the column as a primary key member
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Kind derived from the declared type, if mapped
    pub fn declared_kind(&self) -> Option<ValueKind> {
        ValueKind::from_type_name(&self.type_name)
    }
}

/// Table metadata
#[derive(Debug, Clone)]
pub struct TableMetadata {
    /// Schema (or database for MySQL)
    pub schema: Option<String>,
    /// Table name
    pub name: String,
    /// Column metadata (in ordinal order)
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    /// Create new table metadata
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Parse a `schema.table` identifier into metadata
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
                columns: Vec::new(),
            },
            None => Self::new(qualified),
        }
    }

    /// Get fully qualified name
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(s) => format!("{}.{}", s, self.name),
            None => self.name.clone(),
        }
    }

    /// Get column by name (case-insensitive)
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Get primary key columns
    pub fn primary_key_columns(&self) -> Vec<&ColumnMetadata> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Integer(0).is_null());
        assert_eq!(Value::Null.kind(), None);
    }

    #[test]
    fn test_value_kind_tags() {
        assert_eq!(Value::Integer(1).kind(), Some(ValueKind::Integer));
        assert_eq!(Value::Text("x".into()).kind(), Some(ValueKind::Text));
        assert_eq!(Value::Boolean(true).kind(), Some(ValueKind::Boolean));
    }

    #[test]
    fn test_value_from_impl() {
        let v: Value = 42_i32.into();
        assert!(matches!(v, Value::Integer(42)));

        let v: Value = "hello".into();
        assert!(matches!(v, Value::Text(s) if s == "hello"));

        let v: Value = None::<i64>.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_kind_from_type_name() {
        assert_eq!(ValueKind::from_type_name("VARCHAR(255)"), Some(ValueKind::Text));
        assert_eq!(ValueKind::from_type_name("int"), Some(ValueKind::Integer));
        assert_eq!(ValueKind::from_type_name("BIGINT"), Some(ValueKind::Long));
        assert_eq!(
            ValueKind::from_type_name("BIGINT UNSIGNED"),
            Some(ValueKind::BigInt)
        );
        assert_eq!(
            ValueKind::from_type_name("NUMERIC(10,2)"),
            Some(ValueKind::Decimal)
        );
        assert_eq!(ValueKind::from_type_name("datetime"), Some(ValueKind::Timestamp));
        assert_eq!(ValueKind::from_type_name("GEOGRAPHY"), None);
    }

    #[test]
    fn test_numeric_not_quoted() {
        assert!(Value::Integer(5).is_numeric_or_boolean());
        assert!(Value::Boolean(false).is_numeric_or_boolean());
        assert!(!Value::Text("5".into()).is_numeric_or_boolean());
        assert!(!Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).is_numeric_or_boolean());
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::Integer(1), Value::Text("Alice".into())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Integer(1)));
        assert_eq!(row.get_by_name("NAME"), Some(&Value::Text("Alice".into())));
    }

    #[test]
    fn test_table_metadata_parse() {
        let table = TableMetadata::parse("public.users");
        assert_eq!(table.schema.as_deref(), Some("public"));
        assert_eq!(table.name, "users");
        assert_eq!(table.qualified_name(), "public.users");

        let bare = TableMetadata::parse("users");
        assert!(bare.schema.is_none());
    }

    #[test]
    fn test_primary_key_columns() {
        let mut table = TableMetadata::new("users");
        table
            .columns
            .push(ColumnMetadata::new("id", "integer").primary_key());
        table.columns.push(ColumnMetadata::new("name", "varchar"));

        assert_eq!(table.primary_key_columns().len(), 1);
        assert!(table.column("ID").unwrap().primary_key);
    }
}

//! In-memory backend for tests
//!
//! A small `Connection`/`SchemaCatalog` implementation over shared in-memory
//! tables, with failure injection, so the transfer engine can be exercised
//! without an external database.
//!
//! Supported SQL is deliberately narrow: `SELECT * FROM <table>` (a WHERE
//! clause is accepted and ignored), result sets registered verbatim with
//! [`MemoryConnection::with_query`], and the INSERT text produced by this
//! crate's statement builder.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::catalog::SchemaCatalog;
use crate::connection::{
    Connection, DatabaseDriver, FetchedRow, PreparedStatement, RowStream,
};
use crate::error::{Error, Result};
use crate::types::{ColumnMetadata, Row, TableMetadata, Value};

/// A single in-memory table
#[derive(Debug, Clone)]
pub struct MemoryTable {
    /// Table definition
    pub metadata: TableMetadata,
    /// Committed rows, in table column order
    pub rows: Vec<Vec<Value>>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
}

/// Shared in-memory database
#[derive(Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDb {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    fn key(qualified: &str) -> String {
        qualified.to_lowercase()
    }

    /// Create (or replace) a table with the given rows
    pub fn create_table(&self, metadata: TableMetadata, rows: Vec<Vec<Value>>) {
        let key = Self::key(&metadata.qualified_name());
        self.state
            .lock()
            .tables
            .insert(key, MemoryTable { metadata, rows });
    }

    /// Definition of a table, if it exists
    pub fn table_metadata(&self, qualified: &str) -> Option<TableMetadata> {
        self.get(qualified).map(|t| t.metadata)
    }

    /// Committed rows of a table, if it exists
    pub fn table_rows(&self, qualified: &str) -> Option<Vec<Vec<Value>>> {
        self.state
            .lock()
            .tables
            .get(&Self::key(qualified))
            .map(|t| t.rows.clone())
    }

    /// Number of committed rows in a table
    pub fn row_count(&self, qualified: &str) -> usize {
        self.table_rows(qualified).map(|r| r.len()).unwrap_or(0)
    }

    /// Open a connection to this database
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection::new(self.clone())
    }

    /// Create a catalog over this database
    pub fn catalog(&self) -> MemoryCatalog {
        MemoryCatalog { db: self.clone() }
    }

    fn get(&self, qualified: &str) -> Option<MemoryTable> {
        self.state.lock().tables.get(&Self::key(qualified)).cloned()
    }

    fn append(&self, qualified: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let mut state = self.state.lock();
        let table = state
            .tables
            .get_mut(&Self::key(qualified))
            .ok_or_else(|| Error::TableNotFound {
                table: qualified.to_string(),
            })?;
        table.rows.extend(rows);
        Ok(())
    }
}

/// Failure rule for batch execution
#[derive(Debug, Clone)]
enum BatchFailure {
    /// Fail the item whose named parameter equals the value
    OnValue { column: String, value: Value },
    /// Fail every batch outright, without per-item outcomes
    Always { message: String },
}

#[derive(Default)]
struct ConnectionFaults {
    read_fail_at: Option<(usize, String)>,
    column_fail: Option<(usize, usize, String)>,
    batch_failure: Option<BatchFailure>,
}

/// In-memory connection with failure injection
pub struct MemoryConnection {
    db: MemoryDb,
    registered: Mutex<HashMap<String, (Vec<ColumnMetadata>, Vec<Vec<Value>>)>>,
    faults: Arc<Mutex<ConnectionFaults>>,
    staged: Arc<Mutex<Vec<(String, Vec<Vec<Value>>)>>>,
    autocommit: AtomicBool,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn new(db: MemoryDb) -> Self {
        Self {
            db,
            registered: Mutex::new(HashMap::new()),
            faults: Arc::new(Mutex::new(ConnectionFaults::default())),
            staged: Arc::new(Mutex::new(Vec::new())),
            autocommit: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a verbatim result set for a query text
    pub fn with_query(
        self,
        sql: impl Into<String>,
        columns: Vec<ColumnMetadata>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.registered.lock().insert(sql.into(), (columns, rows));
        self
    }

    /// Make row reads fail at the given zero-based row index
    pub fn fail_read_at(self, row: usize, message: impl Into<String>) -> Self {
        self.faults.lock().read_fail_at = Some((row, message.into()));
        self
    }

    /// Make one column of one row unreadable; the driver nulls it and
    /// reports the failure on the fetched row
    pub fn fail_column_at(
        self,
        row: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        self.faults.lock().column_fail = Some((row, column, message.into()));
        self
    }

    /// Make batch execution fail on the item whose named parameter matches
    /// the value, reporting per-item outcomes for the preceding items
    pub fn fail_batch_on(self, column: impl Into<String>, value: Value) -> Self {
        self.faults.lock().batch_failure = Some(BatchFailure::OnValue {
            column: column.into(),
            value,
        });
        self
    }

    /// Make every batch execution fail without per-item outcomes
    pub fn fail_batch_always(self, message: impl Into<String>) -> Self {
        self.faults.lock().batch_failure = Some(BatchFailure::Always {
            message: message.into(),
        });
        self
    }

    /// Switch autocommit mode
    pub fn with_autocommit(self, on: bool) -> Self {
        self.autocommit.store(on, Ordering::Relaxed);
        self
    }

    /// Rows staged but not yet committed
    pub fn staged_row_count(&self) -> usize {
        self.staged.lock().iter().map(|(_, rows)| rows.len()).sum()
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn resolve_select(&self, sql: &str) -> Result<(Vec<ColumnMetadata>, Vec<Vec<Value>>)> {
        if let Some((columns, rows)) = self.registered.lock().get(sql) {
            return Ok((columns.clone(), rows.clone()));
        }

        let table_name = parse_select_table(sql)
            .ok_or_else(|| Error::query_with_sql("unsupported query for memory backend", sql))?;
        let table = self.db.get(&table_name).ok_or(Error::TableNotFound {
            table: table_name.clone(),
        })?;
        Ok((table.metadata.columns.clone(), table.rows.clone()))
    }
}

/// Extract the table name from `SELECT * FROM <table> [WHERE ...]`
fn parse_select_table(sql: &str) -> Option<String> {
    let lower = sql.to_lowercase();
    let from = lower.find(" from ")?;
    let rest = sql[from + 6..].trim();
    let table = rest.split_whitespace().next()?;
    Some(
        table
            .split('.')
            .map(|p| p.trim_matches(|c| c == '"' || c == '`'))
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// Extract target table and column list from an INSERT statement
fn parse_insert(sql: &str) -> Option<(String, Vec<String>)> {
    let lower = sql.to_lowercase();
    let into = lower.find("insert into ")?;
    let after = &sql[into + 12..];
    let paren = after.find('(')?;
    let table = after[..paren]
        .trim()
        .split('.')
        .map(|p| p.trim_matches(|c| c == '"' || c == '`'))
        .collect::<Vec<_>>()
        .join(".");
    let close = after.find(')')?;
    let columns = after[paren + 1..close]
        .split(',')
        .map(|c| c.trim().trim_matches(|ch| ch == '"' || ch == '`').to_string())
        .collect();
    Some((table, columns))
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query_stream(&self, sql: &str, _fetch_size: u32) -> Result<Box<dyn RowStream>> {
        let (columns, rows) = self.resolve_select(sql)?;
        let faults = self.faults.lock();
        Ok(Box::new(MemoryRowStream {
            columns,
            rows: rows.into(),
            fail_at: faults.read_fail_at.clone(),
            column_fail: faults.column_fail.clone(),
            emitted: 0,
        }))
    }

    async fn describe(&self, sql: &str) -> Result<Vec<ColumnMetadata>> {
        Ok(self.resolve_select(sql)?.0)
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        Err(Error::unsupported(format!(
            "memory backend only executes prepared batches, got: {}",
            sql
        )))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let (table, columns) = parse_insert(sql).ok_or_else(|| {
            Error::query_with_sql("unsupported statement for memory backend", sql)
        })?;
        let width = columns.len();
        Ok(Box::new(MemoryStatement {
            sql: sql.to_string(),
            table,
            columns,
            current: vec![None; width],
            pending: Vec::new(),
            db: self.db.clone(),
            faults: Arc::clone(&self.faults),
            staged: Arc::clone(&self.staged),
            autocommit: self.autocommit.load(Ordering::Relaxed),
        }))
    }

    fn autocommit(&self) -> bool {
        self.autocommit.load(Ordering::Relaxed)
    }

    async fn commit(&self) -> Result<()> {
        let staged: Vec<_> = self.staged.lock().drain(..).collect();
        for (table, rows) in staged {
            self.db.append(&table, rows)?;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.staged.lock().clear();
        Ok(())
    }

    async fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Memory
    }
}

struct MemoryRowStream {
    columns: Vec<ColumnMetadata>,
    rows: VecDeque<Vec<Value>>,
    fail_at: Option<(usize, String)>,
    column_fail: Option<(usize, usize, String)>,
    emitted: usize,
}

#[async_trait]
impl RowStream for MemoryRowStream {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<FetchedRow>> {
        if let Some((at, message)) = &self.fail_at {
            if self.emitted == *at {
                return Err(Error::query(message.clone()));
            }
        }
        match self.rows.pop_front() {
            Some(mut values) => {
                let mut column_errors = Vec::new();
                if let Some((row, col, message)) = &self.column_fail {
                    if self.emitted == *row && *col < values.len() {
                        values[*col] = Value::Null;
                        column_errors.push((*col, message.clone()));
                    }
                }
                self.emitted += 1;
                let names = self.columns.iter().map(|c| c.name.clone()).collect();
                Ok(Some(FetchedRow {
                    row: Row::new(names, values),
                    column_errors,
                }))
            }
            None => Ok(None),
        }
    }
}

struct MemoryStatement {
    sql: String,
    table: String,
    columns: Vec<String>,
    current: Vec<Option<Value>>,
    pending: Vec<Vec<Value>>,
    db: MemoryDb,
    faults: Arc<Mutex<ConnectionFaults>>,
    staged: Arc<Mutex<Vec<(String, Vec<Vec<Value>>)>>>,
    autocommit: bool,
}

impl MemoryStatement {
    fn set(&mut self, idx: usize, value: Value) -> Result<()> {
        let slot = self.current.get_mut(idx).ok_or_else(|| {
            Error::type_conversion(format!(
                "parameter index {} out of range (statement has {} parameters)",
                idx,
                self.columns.len()
            ))
        })?;
        *slot = Some(value);
        Ok(())
    }

    fn item_matches(&self, params: &[Value], column: &str, value: &Value) -> bool {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| params.get(idx))
            .map(|v| v == value)
            .unwrap_or(false)
    }

    fn stage(&self, rows: Vec<Vec<Value>>) {
        if rows.is_empty() {
            return;
        }
        let remapped = self.remap(rows);
        if self.autocommit {
            let _ = self.db.append(&self.table, remapped);
        } else {
            self.staged.lock().push((self.table.clone(), remapped));
        }
    }

    /// Reorder parameter tuples into the target table's column order,
    /// nulling columns the statement does not set
    fn remap(&self, rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
        let Some(table) = self.db.get(&self.table) else {
            return rows;
        };
        let positions: Vec<Option<usize>> = table
            .metadata
            .columns
            .iter()
            .map(|col| {
                self.columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(&col.name))
            })
            .collect();

        rows.into_iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|pos| pos.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null))
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl PreparedStatement for MemoryStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind_null(&mut self, idx: usize) -> Result<()> {
        self.set(idx, Value::Null)
    }

    fn bind_text(&mut self, idx: usize, value: &str) -> Result<()> {
        self.set(idx, Value::Text(value.to_owned()))
    }

    fn bind_integer(&mut self, idx: usize, value: i32) -> Result<()> {
        self.set(idx, Value::Integer(value))
    }

    fn bind_long(&mut self, idx: usize, value: i64) -> Result<()> {
        self.set(idx, Value::Long(value))
    }

    fn bind_decimal(&mut self, idx: usize, value: Decimal) -> Result<()> {
        self.set(idx, Value::Decimal(value))
    }

    fn bind_float64(&mut self, idx: usize, value: f64) -> Result<()> {
        self.set(idx, Value::Float64(value))
    }

    fn bind_boolean(&mut self, idx: usize, value: bool) -> Result<()> {
        self.set(idx, Value::Boolean(value))
    }

    fn bind_date(&mut self, idx: usize, value: NaiveDate) -> Result<()> {
        self.set(idx, Value::Date(value))
    }

    fn bind_timestamp(&mut self, idx: usize, value: NaiveDateTime) -> Result<()> {
        self.set(idx, Value::Timestamp(value))
    }

    fn bind_time(&mut self, idx: usize, value: NaiveTime) -> Result<()> {
        self.set(idx, Value::Time(value))
    }

    fn bind_bigint(&mut self, idx: usize, value: &BigInt) -> Result<()> {
        self.set(idx, Value::BigInt(value.clone()))
    }

    fn add_batch(&mut self) -> Result<()> {
        let mut tuple = Vec::with_capacity(self.current.len());
        for (idx, slot) in self.current.iter_mut().enumerate() {
            match slot.take() {
                Some(value) => tuple.push(value),
                None => {
                    return Err(Error::type_conversion(format!(
                        "parameter {} not bound",
                        idx
                    )))
                }
            }
        }
        self.pending.push(tuple);
        Ok(())
    }

    fn batch_len(&self) -> usize {
        self.pending.len()
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let items = std::mem::take(&mut self.pending);
        let failure = self.faults.lock().batch_failure.clone();

        if let Some(BatchFailure::Always { message }) = &failure {
            return Err(Error::query(message.clone()));
        }

        let mut accepted = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            if let Some(BatchFailure::OnValue { column, value }) = &failure {
                if self.item_matches(item, column, value) {
                    // Keep what succeeded so the caller can commit it
                    self.stage(accepted);
                    return Err(Error::batch_partial(
                        vec![1; idx],
                        format!("rejected value in column {}", column),
                    ));
                }
            }
            accepted.push(item.clone());
        }

        let count = accepted.len();
        self.stage(accepted);
        Ok(vec![1; count])
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.current.iter_mut().for_each(|slot| *slot = None);
        Ok(())
    }
}

/// Catalog over a [`MemoryDb`]
pub struct MemoryCatalog {
    db: MemoryDb,
}

#[async_trait]
impl SchemaCatalog for MemoryCatalog {
    async fn get_table(&self, qualified: &str) -> Result<Option<TableMetadata>> {
        Ok(self.db.get(qualified).map(|t| TableMetadata {
            schema: t.metadata.schema.clone(),
            name: t.metadata.name.clone(),
            columns: Vec::new(),
        }))
    }

    async fn load_columns(&self, table: &mut TableMetadata) -> Result<()> {
        let qualified = table.qualified_name();
        let stored = self
            .db
            .get(&qualified)
            .ok_or(Error::TableNotFound { table: qualified })?;
        table.columns = stored.metadata.columns;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_db() -> MemoryDb {
        let db = MemoryDb::new();
        let mut meta = TableMetadata::new("people");
        meta.columns
            .push(ColumnMetadata::new("id", "integer").primary_key());
        meta.columns.push(ColumnMetadata::new("name", "varchar"));
        db.create_table(
            meta,
            vec![
                vec![Value::Integer(1), Value::Text("Ada".into())],
                vec![Value::Integer(2), Value::Text("Grace".into())],
            ],
        );
        db
    }

    async fn add_person(stmt: &mut Box<dyn PreparedStatement>, id: i32, name: &str) {
        stmt.bind_integer(0, id).unwrap();
        stmt.bind_text(1, name).unwrap();
        stmt.add_batch().unwrap();
    }

    #[tokio::test]
    async fn test_select_star_stream() {
        let db = sample_db();
        let conn = db.connect();
        let mut stream = conn.query_stream("SELECT * FROM people", 100).await.unwrap();

        assert_eq!(stream.columns().len(), 2);
        let first = stream.next_row().await.unwrap().unwrap();
        assert_eq!(first.row.get(0), Some(&Value::Integer(1)));
        assert!(first.column_errors.is_empty());
        assert!(stream.next_row().await.unwrap().is_some());
        assert!(stream.next_row().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_failure_injection() {
        let db = sample_db();
        let conn = db.connect().fail_read_at(1, "disk on fire");
        let mut stream = conn.query_stream("SELECT * FROM people", 100).await.unwrap();

        assert!(stream.next_row().await.is_ok());
        assert!(stream.next_row().await.is_err());
    }

    #[tokio::test]
    async fn test_column_failure_nulls_and_reports() {
        let db = sample_db();
        let conn = db.connect().fail_column_at(0, 1, "bad encoding");
        let mut stream = conn.query_stream("SELECT * FROM people", 100).await.unwrap();

        let fetch = stream.next_row().await.unwrap().unwrap();
        assert_eq!(fetch.row.get(1), Some(&Value::Null));
        assert_eq!(fetch.column_errors.len(), 1);
        assert_eq!(fetch.column_errors[0].0, 1);
    }

    #[tokio::test]
    async fn test_prepare_insert_and_commit() {
        let db = sample_db();
        let conn = db.connect();
        let mut stmt = conn
            .prepare("INSERT INTO people (\"id\", \"name\") VALUES (?, ?)")
            .await
            .unwrap();

        add_person(&mut stmt, 3, "Edsger").await;
        let counts = stmt.execute_batch().await.unwrap();
        assert_eq!(counts, vec![1]);

        // Staged, not yet visible
        assert_eq!(db.row_count("people"), 2);
        conn.commit().await.unwrap();
        assert_eq!(db.row_count("people"), 3);
    }

    #[tokio::test]
    async fn test_unbound_parameter_rejected() {
        let db = sample_db();
        let conn = db.connect();
        let mut stmt = conn
            .prepare("INSERT INTO people (\"id\", \"name\") VALUES (?, ?)")
            .await
            .unwrap();
        stmt.bind_integer(0, 5).unwrap();
        assert!(stmt.add_batch().is_err());
    }

    #[tokio::test]
    async fn test_rollback_discards_staged() {
        let db = sample_db();
        let conn = db.connect();
        let mut stmt = conn
            .prepare("INSERT INTO people (\"id\", \"name\") VALUES (?, ?)")
            .await
            .unwrap();
        add_person(&mut stmt, 9, "x").await;
        stmt.execute_batch().await.unwrap();

        conn.rollback().await.unwrap();
        conn.commit().await.unwrap();
        assert_eq!(db.row_count("people"), 2);
    }

    #[tokio::test]
    async fn test_partial_batch_failure() {
        let db = sample_db();
        let conn = db.connect().fail_batch_on("id", Value::Integer(4));
        let mut stmt = conn
            .prepare("INSERT INTO people (\"id\", \"name\") VALUES (?, ?)")
            .await
            .unwrap();
        for i in 3..6 {
            add_person(&mut stmt, i, &format!("p{}", i)).await;
        }

        let err = stmt.execute_batch().await.unwrap_err();
        match err {
            Error::BatchPartial { completed, .. } => assert_eq!(completed.len(), 1),
            other => panic!("expected BatchPartial, got {:?}", other),
        }

        // The successful prefix stays staged
        conn.commit().await.unwrap();
        assert_eq!(db.row_count("people"), 3);
    }

    #[tokio::test]
    async fn test_catalog_roundtrip() {
        let db = sample_db();
        let catalog = db.catalog();
        let mut table = catalog.get_table("people").await.unwrap().unwrap();
        assert!(table.columns.is_empty());

        catalog.load_columns(&mut table).await.unwrap();
        assert_eq!(table.columns.len(), 2);
        assert!(table.column("id").unwrap().primary_key);

        assert!(catalog.get_table("ghosts").await.unwrap().is_none());
    }
}

//! Dialect-aware statement construction
//!
//! Turns a table definition plus a column list into parameterized INSERT or
//! UPDATE text and the ordered parameter list the engine binds against.
//! PostgreSQL and MySQL statements are assembled with sea-query; the ANSI
//! fallback builds SQL manually.

use sea_query::{Alias, Expr, IntoIden, MysqlQueryBuilder, PostgresQueryBuilder, Query, TableRef};

use crate::connection::DatabaseDriver;
use crate::error::{Error, Result};
use crate::types::TableMetadata;

fn sea_table_ref(schema: Option<&str>, table: &str) -> TableRef {
    match schema {
        Some(s) => TableRef::SchemaTable(Alias::new(s).into_iden(), Alias::new(table).into_iden()),
        None => TableRef::Table(Alias::new(table).into_iden()),
    }
}

/// SQL dialect for vendor-specific SQL text
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Get the placeholder for a parameter (e.g., $1, ?)
    fn placeholder(&self, index: usize) -> String;
}

/// PostgreSQL dialect
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}

/// MySQL dialect
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// ANSI dialect for drivers without a dedicated builder
#[derive(Debug, Clone, Default)]
pub struct AnsiDialect;

impl SqlDialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ANSI"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// Resolve a dialect for a driver
pub fn dialect_for(driver: DatabaseDriver) -> Box<dyn SqlDialect> {
    match driver {
        DatabaseDriver::Postgres => Box::new(PostgresDialect),
        DatabaseDriver::MySql => Box::new(MySqlDialect),
        _ => Box::new(AnsiDialect),
    }
}

/// A parameterized statement plus its ordered parameter columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltStatement {
    /// The SQL text with placeholders
    pub sql: String,
    /// Target column name per parameter position, in bind order
    pub parameters: Vec<String>,
}

/// Builds dialect-correct parameterized DML from table definitions
pub trait StatementBuilder: Send + Sync {
    /// Build `INSERT INTO t (a, b) VALUES (?, ?)` for the given columns
    fn insert(&self, table: &TableMetadata, columns: &[String]) -> Result<BuiltStatement>;

    /// Build `UPDATE t SET a = ? WHERE k = ?`; parameters are the set
    /// columns followed by the key columns
    fn update(
        &self,
        table: &TableMetadata,
        set_columns: &[String],
        key_columns: &[String],
    ) -> Result<BuiltStatement>;
}

/// Statement builder for a fixed target driver
pub struct DialectStatementBuilder {
    driver: DatabaseDriver,
    dialect: Box<dyn SqlDialect>,
}

impl DialectStatementBuilder {
    /// Create a builder for the given driver
    pub fn new(driver: DatabaseDriver) -> Self {
        Self {
            driver,
            dialect: dialect_for(driver),
        }
    }

    fn placeholders(&self, count: usize) -> Vec<String> {
        (1..=count).map(|i| self.dialect.placeholder(i)).collect()
    }

    fn manual_insert(&self, table: &TableMetadata, columns: &[String]) -> String {
        let cols: Vec<String> = columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified(table),
            cols.join(", "),
            self.placeholders(columns.len()).join(", ")
        )
    }

    fn qualified(&self, table: &TableMetadata) -> String {
        match &table.schema {
            Some(s) => format!(
                "{}.{}",
                self.dialect.quote_identifier(s),
                self.dialect.quote_identifier(&table.name)
            ),
            None => self.dialect.quote_identifier(&table.name),
        }
    }
}

impl StatementBuilder for DialectStatementBuilder {
    fn insert(&self, table: &TableMetadata, columns: &[String]) -> Result<BuiltStatement> {
        if columns.is_empty() {
            return Err(Error::config(format!(
                "no insertable columns for table {}",
                table.qualified_name()
            )));
        }

        let sql = match self.driver {
            DatabaseDriver::Postgres | DatabaseDriver::MySql => {
                let tbl = sea_table_ref(table.schema.as_deref(), &table.name);
                let col_idens: Vec<_> = columns
                    .iter()
                    .map(|c| Alias::new(c.as_str()).into_iden())
                    .collect();
                let values: Vec<_> = (1..=columns.len())
                    .map(|i| Expr::cust(self.dialect.placeholder(i)))
                    .collect();

                let mut stmt = Query::insert();
                stmt.into_table(tbl).columns(col_idens).values_panic(values);

                if self.driver == DatabaseDriver::Postgres {
                    stmt.to_string(PostgresQueryBuilder)
                } else {
                    stmt.to_string(MysqlQueryBuilder)
                }
            }
            _ => self.manual_insert(table, columns),
        };

        Ok(BuiltStatement {
            sql,
            parameters: columns.to_vec(),
        })
    }

    fn update(
        &self,
        table: &TableMetadata,
        set_columns: &[String],
        key_columns: &[String],
    ) -> Result<BuiltStatement> {
        if set_columns.is_empty() {
            return Err(Error::config(format!(
                "no updatable columns for table {}",
                table.qualified_name()
            )));
        }
        if key_columns.is_empty() {
            return Err(Error::config(format!(
                "update on {} requires key columns",
                table.qualified_name()
            )));
        }

        let mut index = 0;
        let sets: Vec<String> = set_columns
            .iter()
            .map(|c| {
                index += 1;
                format!(
                    "{} = {}",
                    self.dialect.quote_identifier(c),
                    self.dialect.placeholder(index)
                )
            })
            .collect();
        let conds: Vec<String> = key_columns
            .iter()
            .map(|c| {
                index += 1;
                format!(
                    "{} = {}",
                    self.dialect.quote_identifier(c),
                    self.dialect.placeholder(index)
                )
            })
            .collect();

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.qualified(table),
            sets.join(", "),
            conds.join(" AND ")
        );

        let mut parameters = set_columns.to_vec();
        parameters.extend_from_slice(key_columns);

        Ok(BuiltStatement { sql, parameters })
    }
}

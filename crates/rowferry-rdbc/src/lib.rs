//! # rowferry-rdbc
//!
//! Relational database connectivity layer for the rowferry data mover.
//!
//! This crate defines the collaborator interfaces the transfer engine is
//! built against, plus the shared value/type system:
//!
//! - **Typed Values**: closed value set with per-column kind tags decided
//!   once before streaming
//! - **Connection Traits**: streaming query execution, batched prepared
//!   statements, transaction control
//! - **Schema Catalog**: table and column metadata discovery
//! - **Statement Builder**: dialect-correct parameterized INSERT/UPDATE text
//! - **Driver Capabilities**: per-driver feature registry resolved at setup
//! - **Memory Backend**: in-memory implementation with failure injection for
//!   tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowferry_rdbc::prelude::*;
//!
//! let builder = DialectStatementBuilder::new(DatabaseDriver::Postgres);
//! let stmt = builder.insert(&table, &columns)?;
//!
//! let mut prepared = conn.prepare(&stmt.sql).await?;
//! prepared.add_batch(&[Value::Integer(1), Value::Text("a".into())])?;
//! prepared.execute_batch().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod builder;
pub mod capability;
pub mod catalog;
pub mod connection;
pub mod error;
pub mod memory;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::{
        dialect_for, AnsiDialect, BuiltStatement, DialectStatementBuilder, MySqlDialect,
        PostgresDialect, SqlDialect, StatementBuilder,
    };
    pub use crate::capability::{CapabilityRegistry, DriverCapabilities};
    pub use crate::catalog::SchemaCatalog;
    pub use crate::connection::{
        Connection, ConnectionSettings, DatabaseDriver, FetchedRow, PreparedStatement, RowStream,
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::memory::{MemoryCatalog, MemoryConnection, MemoryDb};
    pub use crate::types::{ColumnMetadata, Row, TableMetadata, Value, ValueKind};
}

pub use error::{Error, Result};
pub use types::{Value, ValueKind};

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _value = Value::Long(42);
        let _settings = ConnectionSettings::new("postgres://localhost/test");
        let _registry = CapabilityRegistry::builtin();
    }

    #[test]
    fn test_dialect_selection() {
        assert_eq!(dialect_for(DatabaseDriver::Postgres).name(), "PostgreSQL");
        assert_eq!(dialect_for(DatabaseDriver::MySql).name(), "MySQL");
        assert_eq!(dialect_for(DatabaseDriver::Memory).name(), "ANSI");
    }
}

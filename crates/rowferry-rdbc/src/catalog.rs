//! Schema catalog collaborator interface
//!
//! The transfer engine resolves table definitions through this trait; the
//! concrete implementation (driver metadata, information_schema queries)
//! lives with each backend.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ColumnMetadata, TableMetadata};

/// Read-only schema discovery
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Resolve a `schema.table` (or bare `table`) identifier to metadata,
    /// without columns loaded. Returns `None` when the table does not exist.
    async fn get_table(&self, qualified: &str) -> Result<Option<TableMetadata>>;

    /// Load column metadata for a previously resolved table
    async fn load_columns(&self, table: &mut TableMetadata) -> Result<()>;

    /// Resolve a table with its columns in one step
    async fn get_table_with_columns(&self, qualified: &str) -> Result<Option<TableMetadata>> {
        match self.get_table(qualified).await? {
            Some(mut table) => {
                self.load_columns(&mut table).await?;
                Ok(Some(table))
            }
            None => Ok(None),
        }
    }

    /// Get all columns for a table
    async fn get_columns(&self, qualified: &str) -> Result<Vec<ColumnMetadata>> {
        Ok(self
            .get_table_with_columns(qualified)
            .await?
            .map(|t| t.columns)
            .unwrap_or_default())
    }
}

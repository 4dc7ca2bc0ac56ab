//! # rowferry-transfer
//!
//! Concurrent transfer engine moving rows from one relational source (a
//! table or an arbitrary query) to a target table and/or a delimited text
//! file, built for unattended batch jobs processing millions of rows.
//!
//! A single reader task streams the source result and fans rows out into
//! independent bounded queues, one per enabled sink. Each sink writer
//! applies its own batching, commit, and failure policy. A full queue
//! throttles the reader (backpressure); a slow sink never drops data.
//! Within one sink, rows arrive in production order; across sinks no
//! ordering is guaranteed or needed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowferry_transfer::prelude::*;
//!
//! let config = TransferConfig::new()
//!     .with_source_table("public.orders")
//!     .with_target_table("archive.orders")
//!     .with_batch_size(500)
//!     .with_value_range_column("id");
//!
//! let mut controller = TransferController::new(config, source)
//!     .with_target(target, catalog);
//!
//! controller.setup().await?;
//! controller.execute()?;
//! while controller.is_running() {
//!     println!("read so far: {}", controller.stats().rows_read);
//!     tokio::time::sleep(Duration::from_secs(1)).await;
//! }
//! assert!(controller.is_successful());
//! let watermark = controller.range_state();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod controller;
pub mod counters;
pub mod error;
pub mod matcher;
pub mod range;
pub mod row;
pub mod state;

mod file_writer;
mod reader;
mod table_writer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::SchemaCache;
    pub use crate::config::{
        CsvOptions, LineEnding, MatchOptions, ModelCacheOptions, SinkOptions, SourceOptions,
        TargetOptions, TransferConfig,
    };
    pub use crate::controller::TransferController;
    pub use crate::counters::{RunCounters, TransferStats};
    pub use crate::error::{
        MatchingError, Result, ReturnCode, TransferError, Warning,
    };
    pub use crate::matcher::{FieldMatcher, FixedColumn, StatementKind, UsageTag};
    pub use crate::range::{RangeState, RangeTracker};
    pub use crate::row::{ColumnPlan, RowEvent, TransferRow, ValuePolicies};
}

pub use controller::TransferController;
pub use error::{Result, ReturnCode, TransferError};

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _config = TransferConfig::new();
        let _cache = SchemaCache::new();
        let _code = ReturnCode::Ok;
    }
}

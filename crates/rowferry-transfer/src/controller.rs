//! Transfer controller
//!
//! Owns configuration and lifecycle: `setup()` resolves metadata and builds
//! statements, `execute()` starts the writer task(s) first and then the
//! reader and returns immediately, `stop()` requests cooperative
//! cancellation, `disconnect()` closes the owned connections. Callers poll
//! `is_running()` and the counters for progress, and read the return code
//! after the run settles.

use std::sync::Arc;

use parking_lot::Mutex;
use rowferry_rdbc::builder::{dialect_for, DialectStatementBuilder, StatementBuilder};
use rowferry_rdbc::capability::CapabilityRegistry;
use rowferry_rdbc::catalog::SchemaCatalog;
use rowferry_rdbc::connection::{Connection, PreparedStatement};
use rowferry_rdbc::types::TableMetadata;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SchemaCache;
use crate::config::TransferConfig;
use crate::counters::{RunCounters, TransferStats};
use crate::error::{Result, ReturnCode, TransferError, Warning};
use crate::file_writer::FileSinkWriter;
use crate::matcher::{FieldMatcher, StatementKind};
use crate::range::{RangeState, RangeTracker};
use crate::reader::SourceReader;
use crate::row::{ColumnPlan, ValuePolicies};
use crate::state::RunState;
use crate::table_writer::TableSinkWriter;

/// Everything `setup()` resolved for the run
struct Prepared {
    select_sql: String,
    plans: Vec<ColumnPlan>,
    header: Vec<String>,
    range: Option<RangeTracker>,
    matcher: Option<FieldMatcher>,
    statement: Option<Box<dyn PreparedStatement>>,
    queue_capacity: usize,
}

/// Drives one transfer run from setup to settlement
pub struct TransferController {
    config: TransferConfig,
    source: Arc<dyn Connection>,
    target: Option<Arc<dyn Connection>>,
    catalog: Option<Arc<dyn SchemaCatalog>>,
    builder: Option<Arc<dyn StatementBuilder>>,
    capabilities: CapabilityRegistry,
    cache: Option<SchemaCache>,
    state: Arc<RunState>,
    counters: Arc<RunCounters>,
    range_out: Arc<Mutex<Option<RangeState>>>,
    prepared: Option<Prepared>,
    handles: Vec<JoinHandle<()>>,
}

impl TransferController {
    /// Create a controller over a source connection
    pub fn new(config: TransferConfig, source: Arc<dyn Connection>) -> Self {
        Self {
            config,
            source,
            target: None,
            catalog: None,
            builder: None,
            capabilities: CapabilityRegistry::builtin(),
            cache: None,
            state: RunState::new(),
            counters: Arc::new(RunCounters::new()),
            range_out: Arc::new(Mutex::new(None)),
            prepared: None,
            handles: Vec::new(),
        }
    }

    /// Attach the target connection and its schema catalog; required when
    /// the table sink is enabled. Source and target must be distinct
    /// connection instances.
    pub fn with_target(
        mut self,
        target: Arc<dyn Connection>,
        catalog: Arc<dyn SchemaCatalog>,
    ) -> Self {
        self.target = Some(target);
        self.catalog = Some(catalog);
        self
    }

    /// Override the statement builder (defaults to the dialect builder for
    /// the target driver)
    pub fn with_statement_builder(mut self, builder: Arc<dyn StatementBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Override the driver capability registry
    pub fn with_capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Share a schema-metadata cache across runs; consulted only when the
    /// configuration opts in with a model key
    pub fn with_schema_cache(mut self, cache: SchemaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve metadata, build statements, and size the queues. Must be
    /// called exactly once before [`execute`](Self::execute).
    pub async fn setup(&mut self) -> Result<()> {
        if self.prepared.is_some() {
            return Err(TransferError::config("setup() already called"));
        }
        self.config.validate()?;

        let (where_clause, warnings) = self.config.resolve_where_clause();
        for warning in warnings {
            self.state.record_warning(warning);
        }

        let select_sql = self.build_select(where_clause.as_deref());

        let caps = self.capabilities.resolve(self.source.driver());
        if !caps.streaming_fetch {
            debug!(
                driver = %self.source.driver(),
                "driver does not honor streaming fetch hints; the full result may be buffered"
            );
        }

        let source_columns = self
            .source
            .describe(&select_sql)
            .await
            .map_err(|e| TransferError::config(format!("cannot describe source: {}", e)))?;
        let plans = ColumnPlan::from_columns(&source_columns);
        let header: Vec<String> = plans.iter().map(|p| p.name.clone()).collect();

        let range = RangeTracker::resolve(
            &plans,
            self.config.value_range_column.as_deref(),
            self.config.time_range_column.as_deref(),
        )
        .map_err(TransferError::config)?;

        let (matcher, statement) = if self.config.sinks.to_table {
            let (matcher, statement) = self.prepare_table_sink(&header).await?;
            (Some(matcher), Some(statement))
        } else {
            (None, None)
        };

        self.prepared = Some(Prepared {
            select_sql,
            plans,
            header,
            range,
            matcher,
            statement,
            queue_capacity: self.config.queue_capacity(),
        });

        info!("transfer setup complete");
        Ok(())
    }

    fn build_select(&self, where_clause: Option<&str>) -> String {
        if let Some(query) = &self.config.source.query {
            return query.clone();
        }

        // validate() guarantees a table when no query is configured
        let table = self.config.source.table.as_deref().unwrap_or_default();
        let dialect = dialect_for(self.source.driver());
        let qualified = table
            .split('.')
            .map(|part| dialect.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".");

        match where_clause {
            Some(clause) if !clause.trim().is_empty() => {
                format!("SELECT * FROM {} WHERE {}", qualified, clause)
            }
            _ => format!("SELECT * FROM {}", qualified),
        }
    }

    async fn prepare_table_sink(
        &mut self,
        source_columns: &[String],
    ) -> Result<(FieldMatcher, Box<dyn PreparedStatement>)> {
        let target = self
            .target
            .clone()
            .ok_or_else(|| TransferError::config("table sink enabled but no target connection"))?;
        let catalog = self
            .catalog
            .clone()
            .ok_or_else(|| TransferError::config("table sink enabled but no schema catalog"))?;

        // validate() guarantees the table name
        let table_name = self.config.target.table.clone().unwrap_or_default();
        let table = self.resolve_target_table(&catalog, &table_name).await?;

        let matcher = FieldMatcher::build(
            &table,
            source_columns,
            &self.config.exclude_fields,
            &self.config.fixed_columns,
            self.config.matching,
        )?;

        let builder: Arc<dyn StatementBuilder> = match &self.builder {
            Some(b) => Arc::clone(b),
            None => Arc::new(DialectStatementBuilder::new(target.driver())),
        };
        let built = builder
            .insert(&table, &matcher.columns_for(StatementKind::Insert))
            .map_err(|e| TransferError::config(e.to_string()))?;
        debug!(sql = %built.sql, "prepared target statement");

        let statement = target
            .prepare(&built.sql)
            .await
            .map_err(|e| TransferError::write_with_source(None, e))?;

        Ok((matcher, statement))
    }

    /// Resolve the target table definition, through the shared cache when
    /// the configuration opted in with a model key
    async fn resolve_target_table(
        &self,
        catalog: &Arc<dyn SchemaCatalog>,
        table_name: &str,
    ) -> Result<TableMetadata> {
        let cache_key = self.config.model_cache.as_ref().map(|m| m.key.clone());

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(cached) = cache.get(key) {
                debug!(key = %key, "target table definition served from cache");
                return Ok((*cached).clone());
            }
        }

        let table = catalog
            .get_table_with_columns(table_name)
            .await
            .map_err(|e| TransferError::config(format!("cannot resolve target table: {}", e)))?
            .ok_or_else(|| {
                TransferError::config(format!("target table not found: {}", table_name))
            })?;

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            cache.insert(key.clone(), table.clone());
        }

        Ok(table)
    }

    /// Start the enabled writer task(s), then the reader, and return
    /// immediately. Poll [`is_running`](Self::is_running) and
    /// [`stats`](Self::stats) for progress.
    pub fn execute(&mut self) -> Result<()> {
        let Some(mut prepared) = self.prepared.take() else {
            return Err(TransferError::NotInitialized);
        };

        let mut table_tx = None;
        let mut file_tx = None;

        // Writers first, so their queues are being drained by the time the
        // reader starts producing
        if self.config.sinks.to_table {
            let statement = prepared
                .statement
                .take()
                .ok_or(TransferError::NotInitialized)?;
            let matcher = prepared.matcher.take().ok_or(TransferError::NotInitialized)?;
            let target = self
                .target
                .clone()
                .ok_or_else(|| TransferError::config("no target connection"))?;

            let (tx, rx) = mpsc::channel(prepared.queue_capacity);
            table_tx = Some(tx);
            let writer = TableSinkWriter {
                rx,
                connection: target,
                statement,
                matcher,
                batch_size: self.config.target.batch_size,
                do_commit: self.config.do_commit,
                abort_on_error: self.config.abort_on_error,
                poll_timeout: self.config.poll_timeout,
                counters: Arc::clone(&self.counters),
                state: Arc::clone(&self.state),
            };
            self.state.task_started();
            self.handles.push(tokio::spawn(writer.run()));
        }

        if self.config.sinks.to_file {
            // validate() guarantees the path
            let path = self.config.sinks.file_path.clone().unwrap_or_default();
            let (tx, rx) = mpsc::channel(prepared.queue_capacity);
            file_tx = Some(tx);
            let writer = FileSinkWriter {
                rx,
                path,
                header: self
                    .config
                    .csv
                    .write_header
                    .then(|| prepared.header.clone()),
                csv: self.config.csv.clone(),
                poll_timeout: self.config.poll_timeout,
                counters: Arc::clone(&self.counters),
                state: Arc::clone(&self.state),
            };
            self.state.task_started();
            self.handles.push(tokio::spawn(writer.run()));
        }

        let reader = SourceReader {
            connection: Arc::clone(&self.source),
            sql: prepared.select_sql,
            fetch_size: self.config.source.fetch_size,
            plans: prepared.plans,
            policies: ValuePolicies {
                zero_date_to_null: self.config.zero_date_to_null,
                trim_fields: self.config.trim_fields,
                strip_invalid_utf8: self.config.strip_invalid_utf8,
            },
            tolerate_column_errors: self.config.tolerate_column_errors,
            range: prepared.range,
            range_out: Arc::clone(&self.range_out),
            table_tx,
            file_tx,
            counters: Arc::clone(&self.counters),
            state: Arc::clone(&self.state),
        };
        self.state.task_started();
        self.handles.push(tokio::spawn(reader.run()));

        info!("transfer started");
        Ok(())
    }

    /// Request cooperative cancellation of all pipeline tasks; idempotent
    /// and callable from any thread
    pub fn stop(&self) {
        self.state.request_stop();
    }

    /// Whether any pipeline task is still running
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Await the termination of every pipeline task
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Convenience: `setup()` + `execute()` + `join()`
    pub async fn run_to_completion(&mut self) -> Result<()> {
        self.setup().await?;
        self.execute()?;
        self.join().await;
        Ok(())
    }

    /// Close the owned connections. Call [`stop`](Self::stop) and await
    /// `is_running() == false` first; closing a connection mid-use by a
    /// writer is not supported.
    pub async fn disconnect(&self) {
        if let Err(e) = self.source.close().await {
            debug!("closing source connection failed: {}", e);
        }
        if let Some(target) = &self.target {
            if let Err(e) = target.close().await {
                debug!("closing target connection failed: {}", e);
            }
        }
    }

    /// Snapshot of the progress counters
    pub fn stats(&self) -> TransferStats {
        self.counters.snapshot()
    }

    /// Current return code; authoritative only after the run settles
    pub fn return_code(&self) -> ReturnCode {
        self.state.return_code()
    }

    /// Whether the run settled successfully (OK or WARN)
    pub fn is_successful(&self) -> bool {
        self.state.is_successful()
    }

    /// Last recorded error message
    pub fn error_message(&self) -> Option<String> {
        self.state.error_message()
    }

    /// Last recorded error cause
    pub fn error_cause(&self) -> Option<Arc<TransferError>> {
        self.state.error_cause()
    }

    /// Warnings recorded during the run
    pub fn warnings(&self) -> Vec<Warning> {
        self.state.warnings()
    }

    /// Final watermark range, available after the reader terminates
    pub fn range_state(&self) -> Option<RangeState> {
        self.range_out.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowferry_rdbc::memory::MemoryDb;
    use rowferry_rdbc::types::{ColumnMetadata, Value};

    fn source_db() -> MemoryDb {
        let db = MemoryDb::new();
        let mut meta = TableMetadata::new("src");
        meta.columns.push(ColumnMetadata::new("id", "integer"));
        db.create_table(meta, vec![vec![Value::Integer(1)]]);
        db
    }

    #[tokio::test]
    async fn test_execute_before_setup_fails() {
        let db = source_db();
        let mut controller = TransferController::new(
            TransferConfig::new()
                .with_source_table("src")
                .with_target_table("src"),
            Arc::new(db.connect()),
        );

        assert!(matches!(
            controller.execute(),
            Err(TransferError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_setup_twice_fails() {
        let db = source_db();
        let mut controller = TransferController::new(
            TransferConfig::new()
                .with_source_table("src")
                .with_target_table("src"),
            Arc::new(db.connect()),
        )
        .with_target(Arc::new(db.connect()), Arc::new(db.catalog()));

        controller.setup().await.unwrap();
        assert!(controller.setup().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_target_table_is_config_error() {
        let db = source_db();
        let mut controller = TransferController::new(
            TransferConfig::new()
                .with_source_table("src")
                .with_target_table("no_such_table"),
            Arc::new(db.connect()),
        )
        .with_target(Arc::new(db.connect()), Arc::new(db.catalog()));

        let err = controller.setup().await.unwrap_err();
        assert!(err.to_string().contains("no_such_table"), "{}", err);
    }

    #[tokio::test]
    async fn test_select_built_with_where_clause() {
        let db = source_db();
        let controller = TransferController::new(
            TransferConfig::new()
                .with_source_table("src")
                .with_target_table("src")
                .with_where_clause("id > 5"),
            Arc::new(db.connect()),
        );

        let sql = controller.build_select(Some("id > 5"));
        assert_eq!(sql, "SELECT * FROM \"src\" WHERE id > 5");
    }

    #[tokio::test]
    async fn test_stop_is_callable_before_execute() {
        let db = source_db();
        let controller = TransferController::new(
            TransferConfig::new()
                .with_source_table("src")
                .with_target_table("src"),
            Arc::new(db.connect()),
        );
        controller.stop();
        controller.stop();
        assert!(!controller.is_running());
    }
}

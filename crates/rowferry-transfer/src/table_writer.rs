//! Table sink writer task
//!
//! Consumes rows from its queue with a bounded poll (so the stop flag is
//! revisited even when idle), binds typed parameters through the field
//! matcher, batches, executes, and commits. Batch failures that report
//! per-statement outcomes are translated to the absolute source-row index of
//! the first failing statement.

use std::sync::Arc;
use std::time::Duration;

use rowferry_rdbc::connection::{Connection, PreparedStatement};
use rowferry_rdbc::types::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::counters::RunCounters;
use crate::error::{ReturnCode, TransferError, Warning};
use crate::matcher::{FieldMatcher, StatementKind};
use crate::row::{RowEvent, TransferRow};
use crate::state::RunState;

/// Dispatch one value to the driver's matching typed bind call.
///
/// A single match over the closed tag set; no runtime type probing.
fn bind_value(
    statement: &mut dyn PreparedStatement,
    idx: usize,
    value: &Value,
) -> rowferry_rdbc::Result<()> {
    match value {
        Value::Null => statement.bind_null(idx),
        Value::Text(s) => statement.bind_text(idx, s),
        Value::Integer(n) => statement.bind_integer(idx, *n),
        Value::Long(n) => statement.bind_long(idx, *n),
        Value::Decimal(d) => statement.bind_decimal(idx, *d),
        Value::Float64(f) => statement.bind_float64(idx, *f),
        Value::Boolean(b) => statement.bind_boolean(idx, *b),
        Value::Date(d) => statement.bind_date(idx, *d),
        Value::Timestamp(t) => statement.bind_timestamp(idx, *t),
        Value::Time(t) => statement.bind_time(idx, *t),
        Value::BigInt(n) => statement.bind_bigint(idx, n),
    }
}

/// The table sink half of the pipeline; one instance per run
pub(crate) struct TableSinkWriter {
    pub rx: mpsc::Receiver<RowEvent>,
    pub connection: Arc<dyn Connection>,
    pub statement: Box<dyn PreparedStatement>,
    pub matcher: FieldMatcher,
    pub batch_size: usize,
    pub do_commit: bool,
    pub abort_on_error: bool,
    pub poll_timeout: Duration,
    pub counters: Arc<RunCounters>,
    pub state: Arc<RunState>,
}

impl TableSinkWriter {
    /// Run the write loop to completion.
    ///
    /// On terminating for any reason the writer requests a stop of the whole
    /// run, so the reader and the file writer unwind promptly instead of
    /// running to a now-useless completion.
    pub async fn run(mut self) {
        debug!(batch_size = self.batch_size, "table writer starting");

        if let Err(error) = self.write_loop().await {
            self.state.record_output_error(error);
        }

        let _ = self.statement.close().await;
        self.state.request_stop();

        info!(
            committed = self.counters.rows_committed(),
            "table writer finished"
        );
        self.state.task_finished();
    }

    async fn write_loop(&mut self) -> Result<(), TransferError> {
        // Rows handed to the statement so far; the current batch starts at
        // submitted - pending
        let mut submitted: u64 = 0;
        let mut pending: usize = 0;

        'outer: loop {
            if self.state.stop_requested() {
                break;
            }

            // Bounded wait, then drain what is already queued without
            // waiting, up to one batch
            let first = match timeout(self.poll_timeout, self.rx.recv()).await {
                Err(_) => continue,  // idle; revisit the stop flag
                Ok(None) => break,   // reader gone without a terminator
                Ok(Some(event)) => event,
            };

            let mut events = vec![first];
            while events.len() < self.batch_size {
                match self.rx.try_recv() {
                    Ok(event) => events.push(event),
                    Err(_) => break,
                }
            }

            for event in events {
                match event {
                    RowEvent::EndOfStream => {
                        if pending > 0 && self.state.return_code() != ReturnCode::ErrorOutput {
                            self.flush(submitted - pending as u64, &mut pending).await?;
                        }
                        break 'outer;
                    }
                    RowEvent::Row(row) => {
                        self.bind_row(&row)?;
                        self.counters.add_queued_insert();
                        submitted += 1;
                        pending += 1;
                        if pending == self.batch_size {
                            self.flush(submitted - pending as u64, &mut pending).await?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn bind_row(&mut self, row: &TransferRow) -> Result<(), TransferError> {
        let values = self.matcher.bind_values(row, StatementKind::Insert);
        for (idx, value) in values.iter().enumerate() {
            bind_value(self.statement.as_mut(), idx, value)
                .map_err(|e| TransferError::write_with_source(None, e))?;
        }
        self.statement
            .add_batch()
            .map_err(|e| TransferError::write_with_source(None, e))
    }

    /// Execute and commit the pending batch. `batch_start` is the absolute
    /// zero-based source-row offset of the batch's first item.
    async fn flush(&mut self, batch_start: u64, pending: &mut usize) -> Result<(), TransferError> {
        let batch_len = *pending;
        *pending = 0;

        match self.statement.execute_batch().await {
            Ok(counts) => {
                debug_assert_eq!(counts.len(), batch_len);
                self.counters.add_committed(counts.len() as u64);
                self.commit_if_needed().await
            }
            Err(err @ rowferry_rdbc::Error::BatchPartial { .. }) => {
                let (completed_count, message) = match &err {
                    rowferry_rdbc::Error::BatchPartial {
                        completed, message, ..
                    } => (completed.len() as u64, message.clone()),
                    _ => unreachable!(),
                };
                // Per-item outcomes are assumed positionally aligned with
                // the batch as submitted
                let failing_row = batch_start + completed_count + 1;
                if self.abort_on_error {
                    self.rollback_if_needed().await;
                    Err(TransferError::Write {
                        row: Some(failing_row),
                        message,
                        source: Some(err),
                    })
                } else {
                    // Keep what the driver reported as individually
                    // successful and carry on with the next batch
                    self.counters.add_committed(completed_count);
                    self.commit_if_needed().await?;
                    self.state.record_warning(Warning::new(format!(
                        "batch failed at row {}: {}; continuing",
                        failing_row, message
                    )));
                    Ok(())
                }
            }
            Err(other) => Err(TransferError::write_with_source(None, other)),
        }
    }

    async fn commit_if_needed(&self) -> Result<(), TransferError> {
        if self.do_commit && !self.connection.autocommit() {
            self.connection
                .commit()
                .await
                .map_err(|e| TransferError::write_with_source(None, e))?;
        }
        Ok(())
    }

    async fn rollback_if_needed(&self) {
        if self.do_commit && !self.connection.autocommit() {
            if let Err(e) = self.connection.rollback().await {
                debug!("rollback after batch failure failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchOptions;
    use rowferry_rdbc::builder::{DialectStatementBuilder, StatementBuilder};
    use rowferry_rdbc::connection::DatabaseDriver;
    use rowferry_rdbc::memory::MemoryDb;
    use rowferry_rdbc::types::{ColumnMetadata, TableMetadata};

    fn target_db() -> (MemoryDb, TableMetadata) {
        let db = MemoryDb::new();
        let mut meta = TableMetadata::new("people");
        meta.columns
            .push(ColumnMetadata::new("id", "integer").primary_key());
        meta.columns.push(ColumnMetadata::new("name", "varchar"));
        db.create_table(meta.clone(), vec![]);
        (db, meta)
    }

    async fn writer_for(
        connection: Arc<dyn Connection>,
        meta: &TableMetadata,
        rx: mpsc::Receiver<RowEvent>,
        batch_size: usize,
        abort_on_error: bool,
        state: Arc<RunState>,
    ) -> TableSinkWriter {
        let matcher = FieldMatcher::build(
            meta,
            &["id".to_string(), "name".to_string()],
            &[],
            &[],
            MatchOptions::default(),
        )
        .unwrap();
        let built = DialectStatementBuilder::new(DatabaseDriver::Memory)
            .insert(meta, &matcher.columns_for(StatementKind::Insert))
            .unwrap();
        let statement = connection.prepare(&built.sql).await.unwrap();
        state.task_started();
        TableSinkWriter {
            rx,
            connection,
            statement,
            matcher,
            batch_size,
            do_commit: true,
            abort_on_error,
            poll_timeout: Duration::from_millis(50),
            counters: Arc::new(RunCounters::new()),
            state,
        }
    }

    fn person(id: i32, name: &str) -> RowEvent {
        RowEvent::Row(TransferRow::new(vec![
            Value::Integer(id),
            Value::Text(name.into()),
        ]))
    }

    #[tokio::test]
    async fn test_batches_of_two_and_one() {
        let (db, meta) = target_db();
        let state = RunState::new();
        let (tx, rx) = mpsc::channel(16);
        let conn: Arc<dyn Connection> = Arc::new(db.connect());
        let writer = writer_for(Arc::clone(&conn), &meta, rx, 2, true, Arc::clone(&state)).await;
        let counters = Arc::clone(&writer.counters);

        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            tx.send(person(id, name)).await.unwrap();
        }
        tx.send(RowEvent::EndOfStream).await.unwrap();
        writer.run().await;

        assert_eq!(db.row_count("people"), 3);
        assert_eq!(counters.rows_committed(), 3);
        assert_eq!(counters.rows_queued_insert(), 3);
        assert!(state.is_successful());
        // Termination requests a stop of the whole run
        assert!(state.stop_requested());
    }

    #[tokio::test]
    async fn test_partial_batch_abort_rolls_back_and_reports_row() {
        let (db, meta) = target_db();
        let state = RunState::new();
        let (tx, rx) = mpsc::channel(16);
        let conn: Arc<dyn Connection> =
            Arc::new(db.connect().fail_batch_on("id", Value::Integer(2)));
        let writer = writer_for(Arc::clone(&conn), &meta, rx, 10, true, Arc::clone(&state)).await;

        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            tx.send(person(id, name)).await.unwrap();
        }
        tx.send(RowEvent::EndOfStream).await.unwrap();
        writer.run().await;

        assert_eq!(state.return_code(), ReturnCode::ErrorOutput);
        let message = state.error_message().unwrap();
        assert!(message.contains("row 2"), "unexpected message: {}", message);
        // Rolled back: nothing committed
        assert_eq!(db.row_count("people"), 0);
    }

    #[tokio::test]
    async fn test_partial_batch_continue_commits_survivors() {
        let (db, meta) = target_db();
        let state = RunState::new();
        let (tx, rx) = mpsc::channel(16);
        let conn: Arc<dyn Connection> =
            Arc::new(db.connect().fail_batch_on("id", Value::Integer(2)));
        let writer = writer_for(Arc::clone(&conn), &meta, rx, 2, false, Arc::clone(&state)).await;
        let counters = Arc::clone(&writer.counters);

        for (id, name) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            tx.send(person(id, name)).await.unwrap();
        }
        tx.send(RowEvent::EndOfStream).await.unwrap();
        writer.run().await;

        // First batch (1,2) fails at item 2 with one success; second batch
        // (3,4) goes through untouched
        assert_eq!(db.row_count("people"), 3);
        assert_eq!(counters.rows_committed(), 3);
        assert!(state.is_successful());
        assert_eq!(state.return_code(), ReturnCode::Warn);
    }

    #[tokio::test]
    async fn test_hard_batch_error_stops_writer() {
        let (db, meta) = target_db();
        let state = RunState::new();
        let (tx, rx) = mpsc::channel(16);
        let conn: Arc<dyn Connection> =
            Arc::new(db.connect().fail_batch_always("target gone away"));
        // abort_on_error=false does not rescue a non-partial failure
        let writer = writer_for(Arc::clone(&conn), &meta, rx, 2, false, Arc::clone(&state)).await;

        tx.send(person(1, "a")).await.unwrap();
        tx.send(person(2, "b")).await.unwrap();
        writer.run().await;

        assert_eq!(state.return_code(), ReturnCode::ErrorOutput);
        assert_eq!(db.row_count("people"), 0);
    }

    #[tokio::test]
    async fn test_idle_writer_notices_stop() {
        let (db, meta) = target_db();
        let state = RunState::new();
        let (tx, rx) = mpsc::channel(16);
        let conn: Arc<dyn Connection> = Arc::new(db.connect());
        let writer = writer_for(Arc::clone(&conn), &meta, rx, 2, true, Arc::clone(&state)).await;

        let handle = tokio::spawn(writer.run());
        // No rows arrive; the stop flag must still be noticed
        state.request_stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("writer must terminate within a bounded multiple of the poll timeout")
            .unwrap();
        drop(tx);
    }
}

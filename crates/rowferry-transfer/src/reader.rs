//! Source reader task
//!
//! Executes the source query once, materializes rows, feeds the range
//! tracker, and fans rows out into every enabled sink queue with a blocking
//! put (the sole backpressure mechanism). Whatever way the read loop ends,
//! the reader always terminates its outputs with an end-of-stream event so
//! writers can finish deterministically.

use std::sync::Arc;

use parking_lot::Mutex;
use rowferry_rdbc::connection::Connection;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::counters::RunCounters;
use crate::error::{TransferError, Warning};
use crate::range::{RangeState, RangeTracker};
use crate::row::{ColumnPlan, RowEvent, TransferRow, ValuePolicies};
use crate::state::RunState;

/// The reader half of the pipeline; one instance per run
pub(crate) struct SourceReader {
    pub connection: Arc<dyn Connection>,
    pub sql: String,
    pub fetch_size: u32,
    pub plans: Vec<ColumnPlan>,
    pub policies: ValuePolicies,
    pub tolerate_column_errors: bool,
    pub range: Option<RangeTracker>,
    pub range_out: Arc<Mutex<Option<RangeState>>>,
    pub table_tx: Option<mpsc::Sender<RowEvent>>,
    pub file_tx: Option<mpsc::Sender<RowEvent>>,
    pub counters: Arc<RunCounters>,
    pub state: Arc<RunState>,
}

impl SourceReader {
    /// Run the read loop to completion.
    ///
    /// Errors are captured into the shared run state, never propagated; the
    /// end-of-stream events and source cleanup happen on every exit path.
    pub async fn run(mut self) {
        debug!(sql = %self.sql, fetch_size = self.fetch_size, "reader starting");

        if let Err(error) = self.stream_rows().await {
            // An interruption observed before any other failure also
            // resolves to an input error: the interrupt most likely
            // originates from a downstream failure.
            self.state.record_input_error(error);
            self.state.request_stop();
        }

        // Always terminate the outputs, whatever happened above, so writers
        // can finish deterministically. The file queue is terminated first:
        // the table writer requests a run-wide stop when it finishes, and
        // the file writer must already have its terminator queued by then.
        if let Some(tx) = self.file_tx.take() {
            let _ = tx.send(RowEvent::EndOfStream).await;
        }
        if let Some(tx) = self.table_tx.take() {
            let _ = tx.send(RowEvent::EndOfStream).await;
        }

        // Publish the final watermark range
        if let Some(tracker) = self.range.take() {
            *self.range_out.lock() = Some(tracker.into_state());
        }

        // Best-effort release of the source statement's snapshot
        if let Err(e) = self.connection.commit().await {
            debug!("source cleanup commit failed: {}", e);
        }

        info!(rows = self.counters.rows_read(), "reader finished");
        self.state.task_finished();
    }

    async fn stream_rows(&mut self) -> Result<(), TransferError> {
        let mut stream = self
            .connection
            .query_stream(&self.sql, self.fetch_size)
            .await
            .map_err(|e| TransferError::read_with_source(0, e))?;

        let mut row_number: u64 = 0;

        loop {
            if self.state.stop_requested() {
                return Err(TransferError::read(row_number, "read interrupted"));
            }

            let fetch = stream
                .next_row()
                .await
                .map_err(|e| TransferError::read_with_source(row_number + 1, e))?;
            let Some(fetch) = fetch else {
                break;
            };
            row_number += 1;

            if !fetch.column_errors.is_empty() {
                if self.tolerate_column_errors {
                    for (idx, message) in &fetch.column_errors {
                        let column = self
                            .plans
                            .get(*idx)
                            .map(|p| p.name.as_str())
                            .unwrap_or("?");
                        self.state.record_warning(Warning::new(format!(
                            "row {}: column {} unreadable, substituting NULL: {}",
                            row_number, column, message
                        )));
                    }
                } else {
                    let (idx, message) = &fetch.column_errors[0];
                    return Err(TransferError::read(
                        row_number,
                        format!("column {} unreadable: {}", idx, message),
                    ));
                }
            }

            let row = self.materialize(fetch.row.into_values());

            self.counters.add_read();
            if let Some(tracker) = &mut self.range {
                tracker.observe(&row);
            }

            self.dispatch(row, row_number).await?;
        }

        Ok(())
    }

    /// Apply value policies and settle per-column kinds for columns whose
    /// declared type had no mapping
    fn materialize(&mut self, values: Vec<rowferry_rdbc::Value>) -> TransferRow {
        let values: Vec<_> = if self.policies.is_active() {
            values.into_iter().map(|v| self.policies.apply(v)).collect()
        } else {
            values
        };

        for (plan, value) in self.plans.iter_mut().zip(values.iter()) {
            plan.observe(value);
        }

        TransferRow::new(values)
    }

    /// Blocking put into every enabled sink queue.
    ///
    /// A dead file-sink consumer disables the file sink for the remainder of
    /// the run; rows already enqueued there are not retried. A dead
    /// table-sink consumer ends the read loop (the writer has already
    /// recorded its failure and requested a stop).
    async fn dispatch(&mut self, row: TransferRow, row_number: u64) -> Result<(), TransferError> {
        if let Some(tx) = &self.file_tx {
            if tx.send(RowEvent::Row(row.clone())).await.is_err() {
                warn!(
                    "file sink consumer died at row {}; disabling file sink for the remainder \
                     of the run (rows already enqueued are lost)",
                    row_number
                );
                self.file_tx = None;
            }
        }

        if let Some(tx) = &self.table_tx {
            if tx.send(RowEvent::Row(row)).await.is_err() {
                return Err(TransferError::read(row_number, "table sink queue closed"));
            }
        }

        Ok(())
    }
}

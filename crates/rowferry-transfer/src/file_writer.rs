//! File sink writer task
//!
//! Consumes rows from its own queue with the same poll/drain pattern as the
//! table writer, formats them as delimited text into a `<target>.tmp` file,
//! and at the end either publishes the temp file atomically to the final
//! path (clean end-of-stream, no run error) or renames it to
//! `<target>.error`. No `.tmp` artifact remains in either outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rowferry_rdbc::types::Value;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CsvOptions;
use crate::counters::RunCounters;
use crate::error::TransferError;
use crate::row::{RowEvent, TransferRow};
use crate::state::RunState;

/// How the write loop ended
#[derive(Debug, PartialEq, Eq)]
enum LoopEnd {
    /// The end-of-stream event was consumed; every produced row is written
    EndOfStream,
    /// The loop gave up early (stop observed or queue lost)
    Abandoned,
}

/// The file sink half of the pipeline; one instance per run
pub(crate) struct FileSinkWriter {
    pub rx: mpsc::Receiver<RowEvent>,
    pub path: PathBuf,
    pub header: Option<Vec<String>>,
    pub csv: CsvOptions,
    pub poll_timeout: Duration,
    pub counters: Arc<RunCounters>,
    pub state: Arc<RunState>,
}

impl FileSinkWriter {
    /// Run the write loop to completion and settle the output artifact.
    pub async fn run(mut self) {
        debug!(path = %self.path.display(), "file writer starting");
        self.counters.reset_file_rows();

        let tmp_path = suffixed(&self.path, ".tmp");
        let outcome = self.write_all(&tmp_path).await;

        let publish = match &outcome {
            Ok(LoopEnd::EndOfStream) => !self.state.has_error(),
            Ok(LoopEnd::Abandoned) => false,
            Err(_) => false,
        };

        if let Err(error) = outcome {
            self.state.record_output_error(error);
            self.state.request_stop();
        }

        if let Err(e) = self.settle(&tmp_path, publish).await {
            self.state
                .record_output_error(TransferError::write(format!(
                    "failed to settle file sink output: {}",
                    e
                )));
        }

        info!(
            rows = self.counters.file_rows(),
            published = publish,
            "file writer finished"
        );
        self.state.task_finished();
    }

    async fn write_all(&mut self, tmp_path: &Path) -> Result<LoopEnd, TransferError> {
        let file = File::create(tmp_path).await.map_err(|e| {
            TransferError::write(format!("cannot create {}: {}", tmp_path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);

        if let Some(header) = self.header.take() {
            let line = self.header_line(&header);
            self.write_line(&mut writer, &line).await?;
        }

        let end = loop {
            if self.state.stop_requested() {
                // Drain what the reader already queued; either the
                // terminator is in there (every row was produced) or the
                // output is abandoned
                break self.drain_queued(&mut writer).await?;
            }

            let first = match timeout(self.poll_timeout, self.rx.recv()).await {
                Err(_) => continue,  // idle; revisit the stop flag
                Ok(None) => break LoopEnd::Abandoned,
                Ok(Some(event)) => event,
            };

            match self.handle(&mut writer, first).await? {
                Some(end) => break end,
                None => {
                    // Drain without waiting
                    let mut ended = None;
                    while ended.is_none() {
                        match self.rx.try_recv() {
                            Ok(event) => ended = self.handle(&mut writer, event).await?,
                            Err(_) => break,
                        }
                    }
                    if let Some(end) = ended {
                        break end;
                    }
                }
            }
        };

        writer
            .flush()
            .await
            .map_err(|e| TransferError::write(format!("flush failed: {}", e)))?;
        let mut file = writer.into_inner();
        file.shutdown()
            .await
            .map_err(|e| TransferError::write(format!("close failed: {}", e)))?;

        Ok(end)
    }

    async fn handle(
        &mut self,
        writer: &mut BufWriter<File>,
        event: RowEvent,
    ) -> Result<Option<LoopEnd>, TransferError> {
        match event {
            RowEvent::EndOfStream => Ok(Some(LoopEnd::EndOfStream)),
            RowEvent::Row(row) => {
                let line = self.format_row(&row);
                self.write_line(writer, &line).await?;
                self.counters.add_file_row();
                Ok(None)
            }
        }
    }

    async fn drain_queued(
        &mut self,
        writer: &mut BufWriter<File>,
    ) -> Result<LoopEnd, TransferError> {
        while let Ok(event) = self.rx.try_recv() {
            if let Some(end) = self.handle(writer, event).await? {
                return Ok(end);
            }
        }
        Ok(LoopEnd::Abandoned)
    }

    async fn write_line(
        &self,
        writer: &mut BufWriter<File>,
        line: &str,
    ) -> Result<(), TransferError> {
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransferError::write(format!("write failed: {}", e)))?;
        writer
            .write_all(self.csv.line_ending.as_str().as_bytes())
            .await
            .map_err(|e| TransferError::write(format!("write failed: {}", e)))
    }

    fn header_line(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|name| self.quoted(name))
            .collect::<Vec<_>>()
            .join(&self.csv.separator.to_string())
    }

    fn format_row(&self, row: &TransferRow) -> String {
        row.values()
            .iter()
            .map(|value| self.format_value(value))
            .collect::<Vec<_>>()
            .join(&self.csv.separator.to_string())
    }

    /// Quoting applies to non-numeric/non-boolean values always, and to all
    /// values under `always_quote`. The null token is written bare.
    fn format_value(&self, value: &Value) -> String {
        match value.display_text() {
            None => self.csv.null_token.clone(),
            Some(text) => {
                if self.csv.always_quote || !value.is_numeric_or_boolean() {
                    self.quoted(&text)
                } else {
                    text
                }
            }
        }
    }

    /// Escape for the configured quote and backslash characters, then wrap
    /// in quotes
    fn quoted(&self, text: &str) -> String {
        let quote = self.csv.quote_char;
        let escaped = text
            .replace('\\', "\\\\")
            .replace(quote, &format!("\\{}", quote));
        format!("{}{}{}", quote, escaped, quote)
    }

    /// Publish or park the temp file; no `.tmp` remains either way.
    async fn settle(&self, tmp_path: &Path, publish: bool) -> std::io::Result<()> {
        if publish {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            tokio::fs::rename(tmp_path, &self.path).await
        } else {
            let error_path = suffixed(&self.path, ".error");
            warn!(
                "file sink parking output as {} after failed run",
                error_path.display()
            );
            tokio::fs::rename(tmp_path, &error_path).await
        }
    }
}

/// `<path>` plus a literal suffix, keeping the original extension
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

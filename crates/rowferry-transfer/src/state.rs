//! Shared run state
//!
//! Each pipeline task captures its own failure here and triggers a
//! cooperative stop; errors never cross task boundaries as panics. The
//! return code is authoritative only after every task has terminated —
//! live reads are for display and may observe transient values.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::error::{ReturnCode, TransferError, Warning};

/// Shared outcome and cancellation state of one run
#[derive(Debug, Default)]
pub struct RunState {
    stop_requested: AtomicBool,
    active_tasks: AtomicUsize,
    outcome: Mutex<Outcome>,
}

#[derive(Debug, Default)]
struct Outcome {
    code: ReturnCode,
    error_message: Option<String>,
    error_cause: Option<Arc<TransferError>>,
    warnings: Vec<Warning>,
}

impl RunState {
    /// Create a fresh run state
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Request cooperative cancellation; idempotent and callable from any
    /// task or thread
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Register a pipeline task as running
    pub fn task_started(&self) {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
    }

    /// Register a pipeline task as terminated
    pub fn task_finished(&self) {
        self.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }

    /// Whether any pipeline task is still running
    pub fn is_running(&self) -> bool {
        self.active_tasks.load(Ordering::SeqCst) > 0
    }

    /// Record a source-side failure; the first hard error wins
    pub fn record_input_error(&self, error: TransferError) {
        self.record_error(ReturnCode::ErrorInput, error);
    }

    /// Record a sink-side failure; the first hard error wins
    pub fn record_output_error(&self, error: TransferError) {
        self.record_error(ReturnCode::ErrorOutput, error);
    }

    fn record_error(&self, code: ReturnCode, error: TransferError) {
        let mut outcome = self.outcome.lock();
        if outcome.code.is_error() {
            // A hard error is already recorded; keep the original
            warn!("suppressing subsequent error: {}", error);
            return;
        }
        outcome.code = code;
        outcome.error_message = Some(error.to_string());
        outcome.error_cause = Some(Arc::new(error));
    }

    /// Record an advisory warning; never stops the run and never overrides
    /// a hard error
    pub fn record_warning(&self, warning: Warning) {
        warn!("{}", warning.message);
        let mut outcome = self.outcome.lock();
        if outcome.code == ReturnCode::Ok {
            outcome.code = ReturnCode::Warn;
        }
        outcome.warnings.push(warning);
    }

    /// Whether a hard error has been recorded
    pub fn has_error(&self) -> bool {
        self.outcome.lock().code.is_error()
    }

    /// Current return code
    pub fn return_code(&self) -> ReturnCode {
        self.outcome.lock().code
    }

    /// Whether the run settled successfully (OK or WARN)
    pub fn is_successful(&self) -> bool {
        self.return_code().is_success()
    }

    /// Last recorded error message
    pub fn error_message(&self) -> Option<String> {
        self.outcome.lock().error_message.clone()
    }

    /// Last recorded error cause
    pub fn error_cause(&self) -> Option<Arc<TransferError>> {
        self.outcome.lock().error_cause.clone()
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> Vec<Warning> {
        self.outcome.lock().warnings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let state = RunState::new();
        assert!(!state.stop_requested());
        state.request_stop();
        state.request_stop();
        assert!(state.stop_requested());
    }

    #[test]
    fn test_first_error_wins() {
        let state = RunState::new();
        state.record_output_error(TransferError::write("disk full"));
        state.record_input_error(TransferError::read(3, "late failure"));

        assert_eq!(state.return_code(), ReturnCode::ErrorOutput);
        assert!(state.error_message().unwrap().contains("disk full"));
    }

    #[test]
    fn test_warning_does_not_override_error() {
        let state = RunState::new();
        state.record_input_error(TransferError::read(1, "boom"));
        state.record_warning(Warning::new("minor thing"));

        assert_eq!(state.return_code(), ReturnCode::ErrorInput);
        assert_eq!(state.warnings().len(), 1);
    }

    #[test]
    fn test_warning_alone_yields_warn() {
        let state = RunState::new();
        state.record_warning(Warning::new("placeholder unresolved"));

        assert_eq!(state.return_code(), ReturnCode::Warn);
        assert!(state.is_successful());
    }

    #[test]
    fn test_task_accounting() {
        let state = RunState::new();
        assert!(!state.is_running());
        state.task_started();
        state.task_started();
        assert!(state.is_running());
        state.task_finished();
        state.task_finished();
        assert!(!state.is_running());
    }
}

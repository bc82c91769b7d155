//! Business processing used by the demo endpoints.
//!
//! Every operation logs through `tracing` only; the request context the
//! interceptor installed is what makes those lines attributable.

use std::sync::Arc;
use std::time::Duration;

use reqctx_core::{context, BusinessScope};
use tracing::{debug, error, info, trace, warn};

use super::executor::{ContextExecutor, ExecutorError};

/// Answer for blank input.
pub const INVALID_INPUT: &str = "Invalid input";
/// Inputs longer than this are processed but logged as oversized.
pub const SOFT_INPUT_LIMIT: usize = 100;
/// Simulated latency of asynchronous processing.
pub const ASYNC_WORK_DELAY: Duration = Duration::from_millis(100);

/// Demo business logic, shared by all handlers.
#[derive(Debug, Clone)]
pub struct ProcessingService {
    executor: Arc<ContextExecutor>,
}

impl ProcessingService {
    #[must_use]
    pub fn new(executor: Arc<ContextExecutor>) -> Self {
        Self { executor }
    }

    /// Upper-cases `input` inside a `processData` business scope.
    ///
    /// Blank input yields [`INVALID_INPUT`]. The business context is cleared
    /// again on every exit path.
    pub fn process_data(&self, input: &str) -> String {
        let scope = BusinessScope::begin("processData");
        info!(input, "Processing data");

        if input.trim().is_empty() {
            warn!("Received blank input");
            return INVALID_INPUT.to_string();
        }

        debug!("Step 1: Validating input");
        let length = input.chars().count();
        debug!(length, "Validating input");
        if length > SOFT_INPUT_LIMIT {
            warn!(length, limit = SOFT_INPUT_LIMIT, "Input length exceeds maximum allowed");
        }

        debug!("Step 2: Transforming input");
        let result = input.to_uppercase();
        debug!(original = input, transformed = %result, "Transformation completed");

        info!(
            transaction_id = scope.transaction_id(),
            "Data processing completed successfully"
        );
        result
    }

    /// Emits one line per level, TRACE through ERROR.
    pub fn demonstrate_logging(&self) {
        trace!("This is a TRACE level log message");
        debug!("This is a DEBUG level log message");
        info!("This is an INFO level log message");
        warn!("This is a WARN level log message");
        error!("This is an ERROR level log message");
    }

    /// Shows single-key and multi-key scoped mutation around nested work.
    ///
    /// The context is identical before and after the call.
    pub fn demonstrate_context(&self) {
        info!("Demonstrating context management");
        context::log_current_context();

        context::with_scoped_value("businessProcess", "dataValidation", || {
            info!("Executing business process");
            debug!("Executing core business logic");
            info!("Business logic executed successfully");
        });

        context::with_scoped_values(
            [("module", "reporting"), ("reportType", "daily"), ("format", "PDF")],
            || {
                info!("Generating report with specific context");
                debug!("Starting report generation");
                info!("Report generated successfully");
            },
        );

        info!("Context demonstration completed");
    }

    /// Runs simulated slow work on the executor under the caller's context.
    ///
    /// When the pool is saturated under
    /// [`RejectionPolicy::CallerRuns`](super::RejectionPolicy::CallerRuns) the
    /// work runs on the calling thread; on a multi-thread runtime that thread
    /// is first handed off with `block_in_place`.
    ///
    /// # Errors
    ///
    /// Returns the executor's error if the task is rejected, panics, or is
    /// dropped unexecuted.
    pub async fn process_data_async(&self, input: &str) -> Result<String, ExecutorError> {
        let input = input.to_string();
        let handle = self.executor.submit(move || {
            info!("Starting async processing");
            std::thread::sleep(ASYNC_WORK_DELAY);
            debug!("Async processing in progress");
            format!("Async result for: {input}")
        })?;

        match handle.join().await {
            Ok(result) => {
                info!("Async processing completed successfully");
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "Async processing failed");
                Err(e)
            }
        }
    }
}

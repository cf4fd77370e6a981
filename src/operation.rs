use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::batch::{BatchItemResult, FileBatchProcessor, ItemOperation, failure_messages};
use crate::error::{Result, SojiError};
use crate::parse::LineParser;
use crate::process::{CancelToken, ExternalCommand, ProcessEnd, ProcessRunner};
use crate::progress::{ProgressAggregator, ProgressSnapshot};

/// How many stderr lines to keep for the failure report.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Final outcome of one orchestrated run. Exactly one of these is produced
/// per operation, whatever happened underneath.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub success: bool,
    pub cancelled: bool,
    pub failures: Vec<String>,
    pub items: Vec<BatchItemResult>,
    pub produced_files: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// One-shot façade around either an external process or a local file batch.
/// Wires the runner through the parser into the aggregator, forwards
/// deduplicated progress snapshots, and owns cancellation for the run.
pub struct Operation {
    state: Mutex<OperationState>,
    cancel: CancelToken,
}

impl Operation {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OperationState::Idle),
            cancel: CancelToken::new(),
        }
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != OperationState::Idle {
            return Err(SojiError::Operation(
                "operation has already been run".to_string(),
            ));
        }
        *state = OperationState::Running;
        Ok(())
    }

    fn finish(&self, terminal: OperationState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = terminal;
    }

    /// Drive an external process to completion. Progress snapshots are sent
    /// only when the aggregated state actually changes. `expected_total` is
    /// the item count when known up front. A positive `min_artifacts` makes
    /// the produced-file count alone decide success: yt-dlp exits non-zero
    /// when `--max-downloads` stops the run early, so the exit code says
    /// nothing once the required files exist. With `min_artifacts` of zero
    /// the exit status decides.
    pub async fn run_process(
        &self,
        command: ExternalCommand,
        parser: LineParser,
        expected_total: Option<u64>,
        min_artifacts: usize,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OperationResult> {
        self.begin()?;
        let started = Instant::now();
        let description = command.description.clone();

        let mut process = match ProcessRunner::spawn(&command, self.cancel.clone()) {
            Ok(process) => process,
            Err(e) => {
                self.finish(OperationState::Failed);
                return Err(e);
            }
        };

        let mut aggregator = ProgressAggregator::new(expected_total);
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        while let Some(line) = process.next_line().await {
            if line.is_stderr() {
                if stderr_tail.len() == STDERR_TAIL_LINES {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(line.text().to_string());
            }
            for event in parser.parse(line.text()) {
                if aggregator.apply(&event) {
                    let _ = progress.send(aggregator.snapshot()).await;
                }
            }
        }

        let end = match process.wait().await {
            Ok(end) => end,
            Err(e) => {
                self.finish(OperationState::Failed);
                return Err(e);
            }
        };

        let elapsed = started.elapsed();
        let produced_files = aggregator.produced_files();

        match end {
            ProcessEnd::Cancelled => {
                warn!("{} cancelled after {:?}", description, elapsed);
                self.finish(OperationState::Cancelled);
                Ok(OperationResult {
                    success: false,
                    cancelled: true,
                    failures: vec![format!("{} was cancelled", description)],
                    items: Vec::new(),
                    produced_files,
                    elapsed,
                })
            }
            ProcessEnd::Exited(status) => {
                let success = if min_artifacts > 0 {
                    produced_files.len() >= min_artifacts
                } else {
                    status.success()
                };
                if success {
                    info!(
                        "{} completed in {:?} ({} files)",
                        description,
                        elapsed,
                        produced_files.len()
                    );
                    self.finish(OperationState::Completed);
                    Ok(OperationResult {
                        success: true,
                        cancelled: false,
                        failures: Vec::new(),
                        items: Vec::new(),
                        produced_files,
                        elapsed,
                    })
                } else {
                    let mut failures = vec![format!(
                        "{} exited with {} ({} usable files)",
                        description,
                        status,
                        produced_files.len()
                    )];
                    failures.extend(stderr_tail);
                    warn!("{} failed after {:?}", description, elapsed);
                    self.finish(OperationState::Failed);
                    Ok(OperationResult {
                        success: false,
                        cancelled: false,
                        failures,
                        items: Vec::new(),
                        produced_files,
                        elapsed,
                    })
                }
            }
        }
    }

    /// Run a local file batch. Per-item failures are recorded in the result,
    /// never fatal: a batch that ran to the end completes even when every
    /// item failed.
    pub async fn run_batch(
        &self,
        paths: Vec<PathBuf>,
        operation: Arc<dyn ItemOperation>,
        max_parallelism: usize,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OperationResult> {
        self.begin()?;
        let started = Instant::now();

        let processor = FileBatchProcessor::new(max_parallelism);
        let items = processor
            .run(paths, operation, progress, self.cancel.clone())
            .await;
        let elapsed = started.elapsed();

        let cancelled = self.cancel.is_cancelled();
        let failures = failure_messages(&items);

        if cancelled {
            warn!("Batch cancelled after {:?}", elapsed);
            self.finish(OperationState::Cancelled);
        } else {
            info!(
                "Batch completed in {:?}: {}/{} items succeeded",
                elapsed,
                items.iter().filter(|r| r.is_success()).count(),
                items.len()
            );
            self.finish(OperationState::Completed);
        }

        Ok(OperationResult {
            success: !cancelled,
            cancelled,
            failures,
            items,
            produced_files: Vec::new(),
            elapsed,
        })
    }
}

impl Default for Operation {
    fn default() -> Self {
        Self::new()
    }
}

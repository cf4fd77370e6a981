use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::Result;
use crate::process::CancelToken;
use crate::progress::ProgressSnapshot;

/// One unit of local file work. `index` is the item's position in the
/// original (sorted) input, so operations that need an ordinal (track
/// numbers) get a stable one regardless of completion order.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub path: PathBuf,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone)]
pub struct BatchItemResult {
    pub path: PathBuf,
    pub outcome: ItemOutcome,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        self.outcome == ItemOutcome::Success
    }

    pub fn failure_message(&self) -> Option<String> {
        match &self.outcome {
            ItemOutcome::Success => None,
            ItemOutcome::Failure(reason) => {
                Some(format!("{}: {}", self.path.display(), reason))
            }
        }
    }
}

/// A per-item transform applied by the batch processor.
#[async_trait]
pub trait ItemOperation: Send + Sync {
    async fn apply(&self, item: &BatchItem) -> Result<()>;
}

/// Runs an `ItemOperation` over a set of files with bounded parallelism.
/// Item failures are recorded, never propagated; every item yields exactly
/// one result and bumps the shared completion counter exactly once.
pub struct FileBatchProcessor {
    max_parallelism: usize,
}

impl FileBatchProcessor {
    pub fn new(max_parallelism: usize) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
        }
    }

    /// Process every path and return results in completion order. After
    /// cancellation, in-flight items finish normally and items not yet
    /// admitted are recorded as failures without running.
    pub async fn run(
        &self,
        paths: Vec<PathBuf>,
        operation: Arc<dyn ItemOperation>,
        progress: mpsc::Sender<ProgressSnapshot>,
        cancel: CancelToken,
    ) -> Vec<BatchItemResult> {
        let total = paths.len() as u64;
        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let counter = Arc::new(Mutex::new(0u64));
        let mut tasks = JoinSet::new();

        for (index, path) in paths.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let operation = operation.clone();
            let progress = progress.clone();
            let counter = counter.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                let item = BatchItem {
                    path: path.clone(),
                    index,
                };

                let outcome = if cancel.is_cancelled() {
                    ItemOutcome::Failure("cancelled before start".to_string())
                } else {
                    match operation.apply(&item).await {
                        Ok(()) => ItemOutcome::Success,
                        Err(e) => {
                            warn!("Batch item failed ({}): {}", path.display(), e);
                            ItemOutcome::Failure(e.to_string())
                        }
                    }
                };

                // Single critical section: count and notify are serialized
                // across items so callers see strictly increasing counts.
                {
                    let mut completed = counter.lock().await;
                    *completed += 1;
                    let _ = progress
                        .send(ProgressSnapshot::from_counts(*completed, Some(total)))
                        .await;
                }

                BatchItemResult { path, outcome }
            });
        }

        let mut results = Vec::with_capacity(total as usize);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("Batch task panicked: {}", e),
            }
        }
        results
    }
}

/// Convenience for collecting failure messages out of a finished batch.
pub fn failure_messages(results: &[BatchItemResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(BatchItemResult::failure_message)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FlakyOperation;

    #[async_trait]
    impl ItemOperation for FlakyOperation {
        async fn apply(&self, item: &BatchItem) -> Result<()> {
            if item.path.to_string_lossy().contains("bad") {
                Err(crate::error::SojiError::Operation("instrumented failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct CountingOperation {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ItemOperation for CountingOperation {
        async fn apply(&self, _item: &BatchItem) -> Result<()> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let (tx, mut rx) = mpsc::channel(16);
        let results = FileBatchProcessor::new(2)
            .run(
                paths(&["a.mp3", "bad-1.mp3", "b.mp3", "bad-2.mp3", "c.mp3"]),
                Arc::new(FlakyOperation),
                tx,
                CancelToken::new(),
            )
            .await;

        assert_eq!(results.len(), 5);
        let failures: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failures.len(), 2);

        let mut last = None;
        while let Some(snap) = rx.recv().await {
            last = Some(snap);
        }
        assert_eq!(last.map(|s| s.completed), Some(5));
    }

    #[tokio::test]
    async fn test_three_items_report_increasing_counts() {
        let (tx, mut rx) = mpsc::channel(16);
        let results = FileBatchProcessor::new(2)
            .run(
                paths(&["a.mp3", "b.mp3", "c.mp3"]),
                Arc::new(FlakyOperation),
                tx,
                CancelToken::new(),
            )
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(BatchItemResult::is_success));

        let mut counts = Vec::new();
        while let Some(snap) = rx.recv().await {
            counts.push(snap.completed);
        }
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = mpsc::channel(64);

        FileBatchProcessor::new(2)
            .run(
                paths(&["1", "2", "3", "4", "5", "6"]),
                Arc::new(CountingOperation {
                    in_flight: in_flight.clone(),
                    peak: peak.clone(),
                }),
                tx,
                CancelToken::new(),
            )
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancel_skips_unstarted_items() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel(16);

        let results = FileBatchProcessor::new(1)
            .run(paths(&["a.mp3", "b.mp3"]), Arc::new(FlakyOperation), tx, cancel)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_success()));
    }
}

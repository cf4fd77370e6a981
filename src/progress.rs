use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::parse::OutputEvent;

/// Immutable view of how far an operation has come. `total` is `None` when
/// the item count cannot be known up front (an uncapped playlist download).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: Option<u64>,
    pub fraction: f64,
}

impl ProgressSnapshot {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            completed: 0,
            total,
            fraction: 0.0,
        }
    }

    /// Snapshot derived from plain completion counts (batch operations).
    pub fn from_counts(completed: u64, total: Option<u64>) -> Self {
        let fraction = match total {
            Some(total) if total > 0 => (completed as f64 / total as f64).clamp(0.0, 1.0),
            _ => 0.0,
        };
        Self {
            completed,
            total,
            fraction,
        }
    }
}

/// Folds parsed output events into the canonical progress state for one
/// operation. The completed count never decreases and the fraction stays
/// in [0, 1]; `apply` reports whether anything visible actually changed so
/// callers only notify on real transitions.
pub struct ProgressAggregator {
    produced: HashSet<PathBuf>,
    snapshot: ProgressSnapshot,
}

impl ProgressAggregator {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            produced: HashSet::new(),
            snapshot: ProgressSnapshot::new(total),
        }
    }

    pub fn apply(&mut self, event: &OutputEvent) -> bool {
        match event {
            OutputEvent::FileProduced(path) => {
                if !self.produced.insert(path.clone()) {
                    return false;
                }
                self.snapshot.completed = self.produced.len() as u64;
                if let Some(total) = self.snapshot.total {
                    if total > 0 {
                        self.snapshot.fraction =
                            (self.snapshot.completed as f64 / total as f64).clamp(0.0, 1.0);
                    }
                }
                true
            }
            OutputEvent::Progress(fraction) => {
                let fraction = fraction.clamp(0.0, 1.0);
                if (fraction - self.snapshot.fraction).abs() < f64::EPSILON {
                    return false;
                }
                self.snapshot.fraction = fraction;
                true
            }
            OutputEvent::ThroughputSample(rate) => {
                debug!("Transfer rate: {}", rate);
                false
            }
            OutputEvent::Unrecognized(line) => {
                trace!("Unrecognized output: {}", line);
                false
            }
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot
    }

    pub fn produced_count(&self) -> usize {
        self.produced.len()
    }

    /// The distinct files seen so far, in sorted order.
    pub fn produced_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = self.produced.iter().cloned().collect();
        files.sort();
        files
    }
}

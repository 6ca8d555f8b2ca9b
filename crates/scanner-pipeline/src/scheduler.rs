//! # Scheduler (spec §4.8)
//!
//! Parallelizes the Analyzer Suite across a Work Set's items while keeping
//! the final threat order deterministic. Work is partitioned into chunks of
//! at least [`MIN_CHUNK_SIZE`]; each chunk runs on its own OS thread and
//! streams threats back over a channel, mirroring the message-passing model
//! of spec §5 (no shared mutable state besides the cache, which the
//! Analyzer Suite doesn't touch). Parallel mode only activates once there
//! are enough items to amortize thread setup; a small Work Set runs
//! sequentially in the calling thread instead.

use std::sync::mpsc;
use std::sync::Arc;

use scanner_core::{CancellationToken, Threat};

use crate::target::WorkItem;

pub const MIN_CHUNK_SIZE: usize = 5;

pub struct Scheduler {
    workers: usize,
    parallel: bool,
}

impl Scheduler {
    #[must_use]
    pub fn new(workers: usize, parallel: bool) -> Self {
        Self { workers: workers.max(1), parallel }
    }

    /// Runs `analyze` over every item in `items`. Emission order into the
    /// internal channel is nondeterministic under parallel execution; the
    /// Result Aggregator imposes total order afterward, so this function
    /// does not sort its output.
    pub fn run<F>(&self, items: Vec<WorkItem>, cancellation: &CancellationToken, analyze: F) -> Vec<Threat>
    where
        F: Fn(&WorkItem) -> Vec<Threat> + Send + Sync + 'static,
    {
        if items.len() < MIN_CHUNK_SIZE || !self.parallel {
            return self.run_sequential(items, cancellation, &analyze);
        }

        let analyze = Arc::new(analyze);
        let chunk_size = (items.len() / self.workers).max(MIN_CHUNK_SIZE);
        let chunks: Vec<Vec<WorkItem>> = items
            .chunks(chunk_size)
            .map(<[WorkItem]>::to_vec)
            .collect();

        let (tx, rx) = mpsc::channel();
        std::thread::scope(|scope| {
            for chunk in chunks {
                let tx = tx.clone();
                let analyze = Arc::clone(&analyze);
                let cancellation = cancellation.clone();
                scope.spawn(move || {
                    for item in &chunk {
                        if cancellation.is_cancelled() {
                            break;
                        }
                        let threats = analyze(item);
                        if tx.send(threats).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);
        });

        rx.into_iter().flatten().collect()
    }

    fn run_sequential<F>(&self, items: Vec<WorkItem>, cancellation: &CancellationToken, analyze: &F) -> Vec<Threat>
    where
        F: Fn(&WorkItem) -> Vec<Threat>,
    {
        let mut threats = Vec::new();
        for item in &items {
            if cancellation.is_cancelled() {
                break;
            }
            threats.extend(analyze(item));
        }
        threats
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::{Artifact, ArtifactKind, ContentKind, Fingerprint, PackageRef, Severity, ThreatKind};

    fn item(n: u32) -> WorkItem {
        WorkItem {
            artifact: Artifact {
                package: PackageRef::file(format!("file-{n}.js")),
                kind: ArtifactKind::File,
                path: None,
                size_bytes: 0,
                fingerprint: Fingerprint::of_bytes(format!("{n}").as_bytes()),
                content_kind: ContentKind::Source,
            },
            content: Some(format!("content {n}")),
            analyzable: true,
        }
    }

    fn count_threat(item: &WorkItem) -> Vec<Threat> {
        vec![Threat::new(ThreatKind::HighEntropy, Severity::Low, 0.3, "x", item.artifact.package.clone())]
    }

    #[test]
    fn small_work_set_runs_sequentially_and_produces_one_threat_each() {
        let scheduler = Scheduler::new(4, true);
        let items: Vec<WorkItem> = (0..3).map(item).collect();
        let threats = scheduler.run(items, &CancellationToken::new(), count_threat);
        assert_eq!(threats.len(), 3);
    }

    #[test]
    fn large_work_set_runs_in_parallel_and_produces_all_threats() {
        let scheduler = Scheduler::new(4, true);
        let items: Vec<WorkItem> = (0..20).map(item).collect();
        let threats = scheduler.run(items, &CancellationToken::new(), count_threat);
        assert_eq!(threats.len(), 20);
    }

    #[test]
    fn disabled_parallel_mode_still_processes_every_item() {
        let scheduler = Scheduler::new(4, false);
        let items: Vec<WorkItem> = (0..20).map(item).collect();
        let threats = scheduler.run(items, &CancellationToken::new(), count_threat);
        assert_eq!(threats.len(), 20);
    }

    #[test]
    fn cancellation_stops_further_dispatch() {
        let scheduler = Scheduler::new(1, false);
        let items: Vec<WorkItem> = (0..5).map(item).collect();
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let threats = scheduler.run(items, &cancellation, count_threat);
        assert!(threats.is_empty());
    }

    #[test]
    fn parallel_and_sequential_runs_agree_on_total_threat_count() {
        let items: Vec<WorkItem> = (0..20).map(item).collect();
        let sequential = Scheduler::new(1, false).run(items.clone(), &CancellationToken::new(), count_threat);
        let parallel = Scheduler::new(8, true).run(items, &CancellationToken::new(), count_threat);
        assert_eq!(sequential.len(), parallel.len());
    }
}

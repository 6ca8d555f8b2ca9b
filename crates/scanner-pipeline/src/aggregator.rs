//! # Result Aggregator (spec §4.9)
//!
//! Builds the final `ScanResult` on top of `scanner_core::ScanResult::finalize`
//! (which already deduplicates and totally orders the threat list per §3):
//! this module's own job is assembling the dependency tree, computing the
//! performance counters, and reading the cache's hit-rate analytics.

use std::collections::HashMap;

use scanner_core::{DependencyTreeNode, Performance, ScanMetadata, ScanResult, Threat};
use scanner_registry::CacheSnapshot;

pub struct ResultAggregator;

impl ResultAggregator {
    /// `dependencies` is `(name, version) -> threats scoped to that
    /// dependency`; when empty or the caller didn't request a tree, the
    /// result carries `dependency_tree: None`.
    #[must_use]
    pub fn aggregate(
        threats: Vec<Threat>,
        packages_scanned: u64,
        files_scanned: u64,
        duration_ms: u64,
        tree_show: bool,
        root_name: &str,
        root_version: &str,
        dependencies: HashMap<(String, String), Vec<Threat>>,
        counters: PerformanceInputs,
        metadata: ScanMetadata,
    ) -> ScanResult {
        let dependency_tree = if tree_show {
            Some(Self::build_tree(root_name, root_version, dependencies))
        } else {
            None
        };

        let performance = Self::compute_performance(duration_ms, packages_scanned, counters);

        ScanResult::finalize(threats, packages_scanned, files_scanned, duration_ms, dependency_tree, performance, metadata)
    }

    fn build_tree(root_name: &str, root_version: &str, dependencies: HashMap<(String, String), Vec<Threat>>) -> DependencyTreeNode {
        let mut root = DependencyTreeNode::new(root_name, root_version);
        for ((name, version), threats) in dependencies {
            let mut child = DependencyTreeNode::new(&name, &version);
            child.threats = threats;
            root.children.insert(name, child);
        }
        root
    }

    fn compute_performance(duration_ms: u64, packages_scanned: u64, counters: PerformanceInputs) -> Performance {
        let packages_per_second = if duration_ms == 0 {
            0.0
        } else {
            packages_scanned as f64 / (duration_ms as f64 / 1000.0)
        };
        Performance {
            cache_hit_rate: counters.cache.hit_rate,
            packages_per_second,
            network_requests: counters.network_requests,
            errors: counters.errors,
            files_skipped: counters.files_skipped,
            bytes_scanned: counters.bytes_scanned,
        }
    }
}

/// The raw counters the Result Aggregator doesn't compute itself: collected
/// by the caller from the cache, the IoC Aggregator, and the Target
/// Resolver over the course of one scan.
#[derive(Debug, Clone, Default)]
pub struct PerformanceInputs {
    pub cache: CacheSnapshot,
    pub network_requests: u64,
    pub errors: u64,
    pub files_skipped: u64,
    pub bytes_scanned: u64,
}

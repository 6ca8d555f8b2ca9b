//! The final `ScanResult` and its supporting performance/metadata types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::threat::{dedup_and_sort, Threat};

/// One node of the resolved dependency tree. Cycles are broken at first
/// repeat; depth is bounded by `ScanConfig::max_depth` (default 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyTreeNode {
    pub name: String,
    pub version: String,
    pub threats: Vec<Threat>,
    pub children: HashMap<String, DependencyTreeNode>,
}

impl DependencyTreeNode {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            threats: Vec::new(),
            children: HashMap::new(),
        }
    }
}

/// Performance counters for one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Performance {
    pub cache_hit_rate: f64,
    pub packages_per_second: f64,
    pub network_requests: u64,
    pub errors: u64,
    pub files_skipped: u64,
    pub bytes_scanned: u64,
}

/// Free-form scan metadata (target string, start time, etc).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub target: String,
    pub started_at: String,
    pub extra: HashMap<String, String>,
}

/// The final result of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub threats: Vec<Threat>,
    pub packages_scanned: u64,
    pub files_scanned: u64,
    pub duration_ms: u64,
    pub dependency_tree: Option<DependencyTreeNode>,
    pub performance: Performance,
    pub metadata: ScanMetadata,
}

impl ScanResult {
    /// Build a result from raw (possibly duplicate, unsorted) threats,
    /// applying the canonical dedup-then-sort pass.
    #[must_use]
    pub fn finalize(
        threats: Vec<Threat>,
        packages_scanned: u64,
        files_scanned: u64,
        duration_ms: u64,
        dependency_tree: Option<DependencyTreeNode>,
        performance: Performance,
        metadata: ScanMetadata,
    ) -> Self {
        Self {
            threats: dedup_and_sort(threats),
            packages_scanned,
            files_scanned,
            duration_ms,
            dependency_tree,
            performance,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::PackageRef;
    use crate::threat::{Severity, ThreatKind};

    #[test]
    fn finalize_deduplicates_and_sorts() {
        let t1 = Threat::new(ThreatKind::EvalUsage, Severity::High, 0.4, "a", PackageRef::file("a.js"));
        let t2 = Threat::new(ThreatKind::WalletHijacking, Severity::Critical, 0.9, "b", PackageRef::file("b.js"));
        let result = ScanResult::finalize(
            vec![t1, t2],
            1,
            2,
            10,
            None,
            Performance::default(),
            ScanMetadata::default(),
        );
        assert_eq!(result.threats.len(), 2);
        assert_eq!(result.threats[0].severity, Severity::Critical);
    }

    #[test]
    fn serde_round_trip_is_structurally_identical() {
        let result = ScanResult::finalize(
            vec![],
            0,
            0,
            0,
            None,
            Performance::default(),
            ScanMetadata {
                target: "lodash".to_string(),
                started_at: "2024-01-01T00:00:00Z".to_string(),
                extra: HashMap::new(),
            },
        );
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ScanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.metadata.target, result.metadata.target);
        assert_eq!(parsed.threats.len(), result.threats.len());
    }
}

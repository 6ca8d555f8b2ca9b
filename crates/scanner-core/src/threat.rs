//! Threat records: the primary finding type emitted by every analyzer.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::artifact::PackageRef;

/// Qualitative impact level, totally ordered `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        };
        write!(f, "{s}")
    }
}

/// Numeric certainty in `[0, 0.95]`. The ceiling is enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence(f64);

impl Confidence {
    pub const CEILING: f64 = 0.95;

    /// Clamp `value` into `[0, CEILING]`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, Self::CEILING))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Eq for Confidence {}

impl PartialOrd for Confidence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Confidence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A stable finding identifier.
///
/// Fixed variants cover the catalog in the analyzer suite; the two
/// rule-driven variants interpolate the triggering rule's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreatKind {
    WalletHijacking,
    NetworkManipulation,
    ObfuscatedCode,
    SuspiciousModule,
    MaliciousCodeStructure,
    SuspiciousScript,
    SuspiciousDependency,
    SuspiciousKeyword,
    UnusualMainFile,
    HighEntropy,
    DynamicRequire,
    EvalUsage,
    FunctionConstructor,
    StringTimer,
    DependencyConfusionTimeline,
    DependencyConfusionScope,
    DependencyConfusionPattern,
    DependencyConfusionActivity,
    VulnerablePackage,
    IntegrityMismatch,
    InvalidSignature,
    WeakKey,
    PathEscape,
    ModuleLoadingAttempt,
    CodeGenerationAttempt,
    ExecutionTimeout,
    MemoryExhaustion,
    AnalysisError,
    TarballError,
    /// `ENHANCED_RULE_<RULENAME>` — a single rule pattern matched.
    EnhancedRule(String),
    /// `AGGREGATE_<RULENAME>` — two or more patterns of one rule matched.
    Aggregate(String),
}

impl ThreatKind {
    /// A rule-driven threat naming the rule that fired.
    #[must_use]
    pub fn enhanced_rule(rule_name: &str) -> Self {
        Self::EnhancedRule(rule_name.to_uppercase())
    }

    /// An aggregate threat for multiple co-firing patterns of one rule.
    #[must_use]
    pub fn aggregate(rule_name: &str) -> Self {
        Self::Aggregate(rule_name.to_uppercase())
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WalletHijacking => "WALLET_HIJACKING",
            Self::NetworkManipulation => "NETWORK_MANIPULATION",
            Self::ObfuscatedCode => "OBFUSCATED_CODE",
            Self::SuspiciousModule => "SUSPICIOUS_MODULE",
            Self::MaliciousCodeStructure => "MALICIOUS_CODE_STRUCTURE",
            Self::SuspiciousScript => "SUSPICIOUS_SCRIPT",
            Self::SuspiciousDependency => "SUSPICIOUS_DEPENDENCY",
            Self::SuspiciousKeyword => "SUSPICIOUS_KEYWORD",
            Self::UnusualMainFile => "UNUSUAL_MAIN_FILE",
            Self::HighEntropy => "HIGH_ENTROPY",
            Self::DynamicRequire => "DYNAMIC_REQUIRE",
            Self::EvalUsage => "EVAL_USAGE",
            Self::FunctionConstructor => "FUNCTION_CONSTRUCTOR",
            Self::StringTimer => "STRING_TIMER",
            Self::DependencyConfusionTimeline => "DEPENDENCY_CONFUSION_TIMELINE",
            Self::DependencyConfusionScope => "DEPENDENCY_CONFUSION_SCOPE",
            Self::DependencyConfusionPattern => "DEPENDENCY_CONFUSION_PATTERN",
            Self::DependencyConfusionActivity => "DEPENDENCY_CONFUSION_ACTIVITY",
            Self::VulnerablePackage => "VULNERABLE_PACKAGE",
            Self::IntegrityMismatch => "INTEGRITY_MISMATCH",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::WeakKey => "WEAK_KEY",
            Self::PathEscape => "PATH_ESCAPE",
            Self::ModuleLoadingAttempt => "MODULE_LOADING_ATTEMPT",
            Self::CodeGenerationAttempt => "CODE_GENERATION_ATTEMPT",
            Self::ExecutionTimeout => "EXECUTION_TIMEOUT",
            Self::MemoryExhaustion => "MEMORY_EXHAUSTION",
            Self::AnalysisError => "ANALYSIS_ERROR",
            Self::TarballError => "TARBALL_ERROR",
            Self::EnhancedRule(name) => return write!(f, "ENHANCED_RULE_{name}"),
            Self::Aggregate(name) => return write!(f, "AGGREGATE_{name}"),
        };
        write!(f, "{s}")
    }
}

impl Serialize for ThreatKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ThreatKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ThreatKind::from(s.as_str()))
    }
}

impl From<&str> for ThreatKind {
    fn from(s: &str) -> Self {
        match s {
            "WALLET_HIJACKING" => Self::WalletHijacking,
            "NETWORK_MANIPULATION" => Self::NetworkManipulation,
            "OBFUSCATED_CODE" => Self::ObfuscatedCode,
            "SUSPICIOUS_MODULE" => Self::SuspiciousModule,
            "MALICIOUS_CODE_STRUCTURE" => Self::MaliciousCodeStructure,
            "SUSPICIOUS_SCRIPT" => Self::SuspiciousScript,
            "SUSPICIOUS_DEPENDENCY" => Self::SuspiciousDependency,
            "SUSPICIOUS_KEYWORD" => Self::SuspiciousKeyword,
            "UNUSUAL_MAIN_FILE" => Self::UnusualMainFile,
            "HIGH_ENTROPY" => Self::HighEntropy,
            "DYNAMIC_REQUIRE" => Self::DynamicRequire,
            "EVAL_USAGE" => Self::EvalUsage,
            "FUNCTION_CONSTRUCTOR" => Self::FunctionConstructor,
            "STRING_TIMER" => Self::StringTimer,
            "DEPENDENCY_CONFUSION_TIMELINE" => Self::DependencyConfusionTimeline,
            "DEPENDENCY_CONFUSION_SCOPE" => Self::DependencyConfusionScope,
            "DEPENDENCY_CONFUSION_PATTERN" => Self::DependencyConfusionPattern,
            "DEPENDENCY_CONFUSION_ACTIVITY" => Self::DependencyConfusionActivity,
            "VULNERABLE_PACKAGE" => Self::VulnerablePackage,
            "INTEGRITY_MISMATCH" => Self::IntegrityMismatch,
            "INVALID_SIGNATURE" => Self::InvalidSignature,
            "WEAK_KEY" => Self::WeakKey,
            "PATH_ESCAPE" => Self::PathEscape,
            "MODULE_LOADING_ATTEMPT" => Self::ModuleLoadingAttempt,
            "CODE_GENERATION_ATTEMPT" => Self::CodeGenerationAttempt,
            "EXECUTION_TIMEOUT" => Self::ExecutionTimeout,
            "MEMORY_EXHAUSTION" => Self::MemoryExhaustion,
            "ANALYSIS_ERROR" => Self::AnalysisError,
            "TARBALL_ERROR" => Self::TarballError,
            other if other.starts_with("ENHANCED_RULE_") => {
                Self::EnhancedRule(other["ENHANCED_RULE_".len()..].to_string())
            }
            other if other.starts_with("AGGREGATE_") => {
                Self::Aggregate(other["AGGREGATE_".len()..].to_string())
            }
            other => Self::EnhancedRule(other.to_string()),
        }
    }
}

/// Optional rule-engine provenance for a threat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuleMatch {
    pub rule: Option<String>,
    pub pattern: Option<String>,
    pub matches: Vec<String>,
}

/// The primary finding record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub kind: ThreatKind,
    pub severity: Severity,
    pub confidence: Confidence,
    pub message: String,
    pub details: String,
    pub package: PackageRef,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub sample_code: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_rule_match")]
    pub rule_match: RuleMatch,
}

fn is_default_rule_match(r: &RuleMatch) -> bool {
    r == &RuleMatch::default()
}

impl Threat {
    #[must_use]
    pub fn new(kind: ThreatKind, severity: Severity, confidence: f64, message: impl Into<String>, package: PackageRef) -> Self {
        Self {
            kind,
            severity,
            confidence: Confidence::new(confidence),
            message: message.into(),
            details: String::new(),
            package,
            file_path: None,
            line_number: None,
            sample_code: None,
            rule_match: RuleMatch::default(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    #[must_use]
    pub fn with_location(mut self, file_path: impl Into<String>, line_number: Option<u32>) -> Self {
        self.file_path = Some(file_path.into());
        self.line_number = line_number;
        self
    }

    #[must_use]
    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample_code = Some(sample.into());
        self
    }

    #[must_use]
    pub fn with_rule_match(mut self, rule_match: RuleMatch) -> Self {
        self.rule_match = rule_match;
        self
    }

    /// Equivalence key used to detect duplicates: `(type, package, filePath, lineNumber ?? 0)`.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String, String, u32) {
        (
            self.kind.to_string(),
            self.package.canonical(),
            self.file_path.clone().unwrap_or_default(),
            self.line_number.unwrap_or(0),
        )
    }

    /// Cap this threat's severity at LOW and tag its message, used by the
    /// false-positive allowlist (never drops a finding, only demotes it).
    #[must_use]
    pub fn suppressed(mut self, tag: &str) -> Self {
        self.severity = Severity::Low;
        self.message = format!("[{tag}] {}", self.message);
        self
    }
}

/// Total order for the final threat list: severity desc, confidence desc,
/// then `(type, package, filePath, lineNumber)` for determinism.
pub fn sort_key(t: &Threat) -> impl Ord + '_ {
    (
        std::cmp::Reverse(t.severity),
        std::cmp::Reverse(t.confidence),
        t.kind.to_string(),
        t.package.canonical(),
        t.file_path.clone().unwrap_or_default(),
        t.line_number.unwrap_or(0),
    )
}

/// Deduplicate threats per the `(type, package, filePath, lineNumber)`
/// equivalence, keeping the higher-confidence member of each group, then
/// sort by [`sort_key`]. Idempotent: running this twice is a no-op.
#[must_use]
pub fn dedup_and_sort(threats: Vec<Threat>) -> Vec<Threat> {
    use std::collections::HashMap;

    let mut best: HashMap<(String, String, String, u32), Threat> = HashMap::new();
    for t in threats {
        let key = t.dedup_key();
        match best.get(&key) {
            Some(existing) if existing.confidence >= t.confidence => {}
            _ => {
                best.insert(key, t);
            }
        }
    }

    let mut out: Vec<Threat> = best.into_values().collect();
    out.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg() -> PackageRef {
        PackageRef::file("/tmp/a.js")
    }

    #[test]
    fn severity_total_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn confidence_clamped_to_ceiling() {
        let c = Confidence::new(5.0);
        assert_eq!(c.value(), Confidence::CEILING);
        let c = Confidence::new(-1.0);
        assert_eq!(c.value(), 0.0);
    }

    #[test]
    fn dedup_keeps_higher_confidence() {
        let low = Threat::new(ThreatKind::HighEntropy, Severity::Medium, 0.3, "a", pkg())
            .with_location("a.js", Some(1));
        let high = Threat::new(ThreatKind::HighEntropy, Severity::Medium, 0.9, "a", pkg())
            .with_location("a.js", Some(1));
        let result = dedup_and_sort(vec![low, high.clone()]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, high.confidence);
    }

    #[test]
    fn dedup_is_idempotent() {
        let t1 = Threat::new(ThreatKind::WalletHijacking, Severity::Critical, 0.9, "a", pkg());
        let t2 = Threat::new(ThreatKind::EvalUsage, Severity::High, 0.5, "b", pkg());
        let once = dedup_and_sort(vec![t1, t2]);
        let twice = dedup_and_sort(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn sort_is_severity_then_confidence_desc() {
        let low_sev = Threat::new(ThreatKind::SuspiciousKeyword, Severity::Low, 0.9, "x", pkg());
        let high_sev = Threat::new(ThreatKind::WalletHijacking, Severity::Critical, 0.1, "y", pkg());
        let result = dedup_and_sort(vec![low_sev, high_sev]);
        assert_eq!(result[0].severity, Severity::Critical);
    }

    #[test]
    fn rule_driven_kinds_round_trip_through_display() {
        let k = ThreatKind::enhanced_rule("crypto-miner");
        assert_eq!(k.to_string(), "ENHANCED_RULE_CRYPTO-MINER");
        let agg = ThreatKind::aggregate("crypto-miner");
        assert_eq!(agg.to_string(), "AGGREGATE_CRYPTO-MINER");
    }
}

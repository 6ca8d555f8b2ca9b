//! # Sandboxed Evaluator
//!
//! Simulated execution of an artifact's JavaScript source, contained
//! entirely within this process rather than a real VM (spec §4.4). The
//! evaluator never executes the artifact; it pattern-matches the source
//! for capability-acquisition attempts and reports whatever it sees,
//! under a gas budget, a capture-buffer bound, and a wall-clock timeout.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            SandboxedEvaluator                │
//! │  ┌─────────────┬──────────┬──────────────┐  │
//! │  │   Cycle     │   Gas    │   Capture    │  │
//! │  │  Detector   │  Budget  │   Buffer     │  │
//! │  └─────────────┴──────────┴──────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Security Notes
//!
//! - No filesystem access, no network access, no module loading, no
//!   dynamic code generation is ever performed by the evaluator itself;
//!   it only recognizes the *syntax* of an attempt to do so.
//! - A clean evaluation (`safe: true`) is weak evidence of safety. It
//!   never overrides a CRITICAL finding from a static analyzer; that
//!   precedence is enforced by the result aggregator, not here.
//!
//! ## References
//!
//! - Floyd, R. W. (1967). "Nondeterministic Algorithms"
//! - Tarjan, R. E. (1972). "Depth-first search and linear graph algorithms"
//! - Ethereum Yellow Paper, Section 9: Execution Model
//!
//! ## Example
//!
//! ```rust
//! use scanner_core::SandboxConfig;
//! use scanner_monitor::SandboxedEvaluator;
//!
//! let evaluator = SandboxedEvaluator::new(SandboxConfig::default());
//! let outcome = evaluator.evaluate("index.js", b"function hello() { return 1; }");
//! assert!(outcome.safe);
//! assert!(outcome.threats.is_empty());
//! ```

use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use scanner_core::{PackageRef, SandboxConfig, Severity, Threat, ThreatKind};

use crate::cycle::{CycleDetector, ExecutionNode};
use crate::flush::{ContextManager, Frame};
use crate::gas::{GasBudget, OperationType};

/// Result of one sandboxed evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// Threats raised by capability-acquisition attempts or resource
    /// exhaustion, empty on a clean run.
    pub threats: Vec<Threat>,
    /// `true` iff no capability attempt and no resource violation was
    /// observed. Does not imply the artifact is free of static findings.
    pub safe: bool,
    /// Wall-clock duration of the simulated evaluation.
    pub execution_ms: u64,
}

struct CapabilityRule {
    kind: ThreatKind,
    pattern: &'static Regex,
}

fn module_loading_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:require|import)\s*\(\s*["'](?:fs|child_process|vm|net|tls|dgram|cluster)["']\s*\)"#)
            .expect("module loading pattern is valid")
    })
}

fn code_generation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:eval|Function|new\s+Function)\s*\(").expect("code generation pattern is valid")
    })
}

/// Simulates artifact execution within fixed resource bounds and reports
/// any attempt to acquire a host capability.
///
/// # Thread Safety
///
/// `SandboxedEvaluator` holds only its config and is safe to share across
/// threads; each [`evaluate`](Self::evaluate) call builds its own gas
/// budget, capture buffer, and cycle detector, so concurrent calls never
/// interfere with one another.
#[derive(Debug, Clone)]
pub struct SandboxedEvaluator {
    config: SandboxConfig,
}

impl SandboxedEvaluator {
    #[must_use]
    pub const fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Returns `true` if `label` (a package-relative file path) should
    /// skip evaluation entirely: the scanner's own files and test files
    /// carry no runtime risk worth simulating (spec §4.4 bypass clause).
    #[must_use]
    pub fn is_bypassed(label: &str) -> bool {
        let lower = label.to_ascii_lowercase();
        let is_test_file = lower.contains(".test.")
            || lower.contains(".spec.")
            || lower.contains("/test/")
            || lower.contains("/tests/")
            || lower.contains("/__tests__/")
            || lower.starts_with("test/")
            || lower.starts_with("tests/")
            || lower.starts_with("__tests__/");
        let is_scanner_owned = lower.starts_with(".scanner/") || lower.contains("/.scanner/");
        is_test_file || is_scanner_owned
    }

    /// Evaluates one artifact's source bytes under `label` (its filename,
    /// used only for bypass classification and threat attribution).
    ///
    /// Runs entirely in-process: no subprocess, no real VM, no I/O. A
    /// capability-acquisition pattern match is simulated work, consuming
    /// gas and occupying a slot in the capture buffer; exhausting either
    /// is reported as `MEMORY_EXHAUSTION` rather than growing without
    /// bound. Wall-clock elapsed time is checked between matches and
    /// reported as `EXECUTION_TIMEOUT` once it exceeds the configured
    /// ceiling, as is a repeating capability-probe cycle that would
    /// otherwise spin forever under real execution.
    #[must_use]
    pub fn evaluate(&self, label: &str, bytes: &[u8]) -> EvaluationOutcome {
        let start = Instant::now();

        if !self.config.enabled || Self::is_bypassed(label) {
            tracing::debug!(file = %label, "sandboxed evaluation bypassed");
            return EvaluationOutcome {
                threats: Vec::new(),
                safe: true,
                execution_ms: Self::elapsed_ms(start),
            };
        }

        let content = String::from_utf8_lossy(bytes);
        let package = PackageRef::file(label);

        let mut gas = GasBudget::new(self.approximate_gas_budget());
        let mut capture = ContextManager::new(Self::capture_capacity(&self.config));
        let mut cycles = CycleDetector::new();
        let mut threats = Vec::new();
        let mut step = 0u64;

        let rules = [
            CapabilityRule {
                kind: ThreatKind::ModuleLoadingAttempt,
                pattern: module_loading_pattern(),
            },
            CapabilityRule {
                kind: ThreatKind::CodeGenerationAttempt,
                pattern: code_generation_pattern(),
            },
        ];

        'scan: for rule in &rules {
            for m in rule.pattern.find_iter(&content) {
                if Self::timed_out(start, self.config.wall_clock_timeout_ms) {
                    threats.push(self.timeout_threat(package.clone(), label));
                    break 'scan;
                }

                if gas.consume(OperationType::PatternMatch).is_err() {
                    threats.push(self.exhaustion_threat(package.clone(), label));
                    break 'scan;
                }

                step += 1;
                let line_number = line_of(&content, m.start());
                cycles.record_step(ExecutionNode::new(rule.kind.to_string(), step));
                if cycles.detect_cycle().is_some() {
                    threats.push(self.timeout_threat(package.clone(), label));
                    break 'scan;
                }

                if capture.is_full() {
                    threats.push(self.exhaustion_threat(package.clone(), label));
                    break 'scan;
                }
                capture.push(Frame::new(format!("{label}:{line_number}"), m.as_str()));

                if gas.consume(OperationType::CapabilityAttempt).is_err() {
                    threats.push(self.exhaustion_threat(package.clone(), label));
                    break 'scan;
                }

                threats.push(
                    Threat::new(
                        rule.kind.clone(),
                        Severity::High,
                        0.7,
                        format!("sandboxed evaluation observed a capability attempt: {}", m.as_str()),
                        package.clone(),
                    )
                    .with_location(label, Some(line_number))
                    .with_sample(m.as_str()),
                );
            }
        }

        let safe = threats.is_empty();
        if !safe {
            tracing::warn!(file = %label, count = threats.len(), "sandboxed evaluation observed capability attempts");
        }
        EvaluationOutcome {
            threats,
            safe,
            execution_ms: Self::elapsed_ms(start),
        }
    }

    fn approximate_gas_budget(&self) -> u64 {
        self.config.memory_ceiling_bytes / (1024 * 1024)
    }

    fn timed_out(start: Instant, limit_ms: u64) -> bool {
        start.elapsed().as_millis() as u64 >= limit_ms
    }

    fn elapsed_ms(start: Instant) -> u64 {
        start.elapsed().as_millis() as u64
    }

    fn timeout_threat(&self, package: PackageRef, label: &str) -> Threat {
        Threat::new(
            ThreatKind::ExecutionTimeout,
            Severity::High,
            0.8,
            "sandboxed evaluation exceeded its wall-clock budget or repeated a capability probe",
            package,
        )
        .with_location(label, None)
    }

    fn exhaustion_threat(&self, package: PackageRef, label: &str) -> Threat {
        Threat::new(
            ThreatKind::MemoryExhaustion,
            Severity::High,
            0.8,
            "sandboxed evaluation exhausted its gas budget or capture buffer",
            package,
        )
        .with_location(label, None)
    }

    fn capture_capacity(config: &SandboxConfig) -> usize {
        (config.memory_ceiling_bytes / (64 * 1024)).clamp(8, 4096) as usize
    }
}

fn line_of(content: &str, byte_offset: usize) -> u32 {
    content[..byte_offset].matches('\n').count() as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SandboxConfig {
        SandboxConfig::default()
    }

    #[test]
    fn clean_source_is_safe() {
        let evaluator = SandboxedEvaluator::new(cfg());
        let outcome = evaluator.evaluate("index.js", b"function hello() { return 1; }");
        assert!(outcome.safe);
        assert!(outcome.threats.is_empty());
    }

    #[test]
    fn module_loading_attempt_is_reported() {
        let evaluator = SandboxedEvaluator::new(cfg());
        let outcome = evaluator.evaluate("index.js", br#"const fs = require("fs");"#);
        assert!(!outcome.safe);
        assert!(outcome
            .threats
            .iter()
            .any(|t| t.kind == ThreatKind::ModuleLoadingAttempt));
    }

    #[test]
    fn code_generation_attempt_is_reported() {
        let evaluator = SandboxedEvaluator::new(cfg());
        let outcome = evaluator.evaluate("index.js", b"eval(atob(payload));");
        assert!(!outcome.safe);
        assert!(outcome
            .threats
            .iter()
            .any(|t| t.kind == ThreatKind::CodeGenerationAttempt));
    }

    #[test]
    fn new_function_constructor_is_reported() {
        let evaluator = SandboxedEvaluator::new(cfg());
        let outcome = evaluator.evaluate("index.js", b"const f = new Function('return 1');");
        assert!(!outcome.safe);
    }

    #[test]
    fn test_files_bypass_evaluation() {
        assert!(SandboxedEvaluator::is_bypassed("src/index.test.js"));
        assert!(SandboxedEvaluator::is_bypassed("__tests__/index.js"));
        assert!(SandboxedEvaluator::is_bypassed("tests/fixture.js"));
        assert!(!SandboxedEvaluator::is_bypassed("src/index.js"));
    }

    #[test]
    fn bypassed_file_is_never_evaluated() {
        let evaluator = SandboxedEvaluator::new(cfg());
        let outcome = evaluator.evaluate("index.test.js", br#"require("child_process")"#);
        assert!(outcome.safe);
        assert!(outcome.threats.is_empty());
    }

    #[test]
    fn disabled_sandbox_skips_evaluation() {
        let mut config = cfg();
        config.enabled = false;
        let evaluator = SandboxedEvaluator::new(config);
        let outcome = evaluator.evaluate("index.js", br#"eval("x")"#);
        assert!(outcome.safe);
    }

    #[test]
    fn line_number_is_attributed() {
        let evaluator = SandboxedEvaluator::new(cfg());
        let src = b"line one\nline two\nrequire(\"vm\")\n";
        let outcome = evaluator.evaluate("payload.js", src);
        let threat = outcome
            .threats
            .iter()
            .find(|t| t.kind == ThreatKind::ModuleLoadingAttempt)
            .expect("module loading threat present");
        assert_eq!(threat.line_number, Some(3));
    }

    #[test]
    fn capture_buffer_overflow_reports_memory_exhaustion() {
        let mut config = cfg();
        config.memory_ceiling_bytes = 64 * 1024; // capture capacity clamps to 8
        let evaluator = SandboxedEvaluator::new(config);
        let mut src = String::new();
        for _ in 0..32 {
            src.push_str("eval(\"x\");\n");
        }
        let outcome = evaluator.evaluate("payload.js", src.as_bytes());
        assert!(outcome
            .threats
            .iter()
            .any(|t| t.kind == ThreatKind::MemoryExhaustion || t.kind == ThreatKind::ExecutionTimeout));
    }
}

//! Integration tests for the Sandboxed Evaluator's single-call contract:
//! bytes and a filename in, `{threats, safe, executionMs}` out.

use scanner_core::{SandboxConfig, ThreatKind};
use scanner_monitor::SandboxedEvaluator;

fn evaluator() -> SandboxedEvaluator {
    SandboxedEvaluator::new(SandboxConfig::default())
}

// --- Clean evaluation ---

#[test]
fn clean_function_body_is_safe() {
    let outcome = evaluator().evaluate("hello.js", b"function hello() { return \"world\"; }");
    assert!(outcome.safe);
    assert!(outcome.threats.is_empty());
}

#[test]
fn empty_file_is_safe() {
    let outcome = evaluator().evaluate("empty.js", b"");
    assert!(outcome.safe);
}

// --- Module loading attempts ---

#[test]
fn require_fs_is_flagged() {
    let outcome = evaluator().evaluate("index.js", br#"const fs = require("fs");"#);
    assert!(!outcome.safe);
    assert!(outcome
        .threats
        .iter()
        .any(|t| t.kind == ThreatKind::ModuleLoadingAttempt));
}

#[test]
fn require_child_process_is_flagged() {
    let outcome = evaluator().evaluate(
        "index.js",
        br#"const cp = require("child_process"); cp.exec("id");"#,
    );
    assert!(outcome
        .threats
        .iter()
        .any(|t| t.kind == ThreatKind::ModuleLoadingAttempt));
}

#[test]
fn require_net_is_flagged() {
    let outcome = evaluator().evaluate("index.js", br#"require("net").createServer();"#);
    assert!(outcome
        .threats
        .iter()
        .any(|t| t.kind == ThreatKind::ModuleLoadingAttempt));
}

#[test]
fn requiring_an_ordinary_dependency_is_not_flagged() {
    let outcome = evaluator().evaluate("index.js", br#"const lodash = require("lodash");"#);
    assert!(outcome.safe);
}

// --- Code generation attempts ---

#[test]
fn eval_is_flagged() {
    let outcome = evaluator().evaluate("index.js", b"eval(atob(payload));");
    assert!(outcome
        .threats
        .iter()
        .any(|t| t.kind == ThreatKind::CodeGenerationAttempt));
}

#[test]
fn function_constructor_is_flagged() {
    let outcome = evaluator().evaluate("index.js", b"const f = new Function('return 1');");
    assert!(outcome
        .threats
        .iter()
        .any(|t| t.kind == ThreatKind::CodeGenerationAttempt));
}

// --- Bypass clause ---

#[test]
fn test_file_bypasses_evaluation_even_with_capability_attempts() {
    let outcome = evaluator().evaluate("src/index.test.js", br#"require("child_process")"#);
    assert!(outcome.safe);
    assert!(outcome.threats.is_empty());
}

#[test]
fn scanner_owned_file_bypasses_evaluation() {
    let outcome = evaluator().evaluate(".scanner/cache.js", b"eval('x')");
    assert!(outcome.safe);
}

#[test]
fn disabled_sandbox_bypasses_every_file() {
    let mut config = SandboxConfig::default();
    config.enabled = false;
    let outcome = SandboxedEvaluator::new(config).evaluate("index.js", br#"require("vm")"#);
    assert!(outcome.safe);
}

// --- Resource enforcement ---

#[test]
fn tight_memory_ceiling_eventually_reports_resource_exhaustion() {
    let mut config = SandboxConfig::default();
    config.memory_ceiling_bytes = 64 * 1024;
    let mut src = String::new();
    for _ in 0..64 {
        src.push_str("eval(\"x\");\n");
    }
    let outcome = SandboxedEvaluator::new(config).evaluate("payload.js", src.as_bytes());
    assert!(!outcome.safe);
    assert!(outcome
        .threats
        .iter()
        .any(|t| t.kind == ThreatKind::MemoryExhaustion || t.kind == ThreatKind::ExecutionTimeout));
}

#[test]
fn repeating_capability_probe_reports_timeout() {
    let mut src = String::new();
    for _ in 0..10 {
        src.push_str("require(\"fs\");\n");
    }
    let outcome = evaluator().evaluate("payload.js", src.as_bytes());
    assert!(!outcome.safe);
}

// --- Attribution ---

#[test]
fn threat_is_attributed_to_the_filename_and_line() {
    let src = b"line one\nline two\nrequire(\"vm\")\n";
    let outcome = evaluator().evaluate("payload.js", src);
    let threat = outcome
        .threats
        .iter()
        .find(|t| t.kind == ThreatKind::ModuleLoadingAttempt)
        .expect("module loading threat present");
    assert_eq!(threat.file_path.as_deref(), Some("payload.js"));
    assert_eq!(threat.line_number, Some(3));
}

#[test]
fn execution_ms_is_recorded() {
    let outcome = evaluator().evaluate("index.js", b"function ok() {}");
    // No upper bound asserted: only that the field is populated and the
    // contract's timing field round-trips through the outcome.
    let _ = outcome.execution_ms;
}

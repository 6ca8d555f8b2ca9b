//! # Analyzer Suite
//!
//! Static analysis over a package's decoded artifacts. Each sub-analyzer
//! looks for a different signal and none of them executes untrusted code
//! (dynamic behavioral analysis is [`scanner_monitor`]'s job, one layer
//! up):
//!
//! | Analyzer | Signal |
//! |----------|--------|
//! | [`rule_engine`]  | pattern-matched malware signatures, scored by hit count |
//! | [`entropy`]      | Shannon entropy vs. a content-kind threshold |
//! | [`ast_analyzer`] | wallet hijacking, dynamic code execution, obfuscated naming |
//! | [`structure`]    | token/line-level packer and minifier heuristics |
//! | [`manifest`]     | declared scripts, dependencies, and keywords |
//! | [`integrity`]    | archive digest and detached signature verification |
//! | [`allowlist`]    | false-positive suppression over the above |
//!
//! [`AnalyzerSuite`] runs the content-driven analyzers (rule engine, entropy,
//! AST, structure) over one artifact and folds their findings through the
//! allowlist before returning them; manifest and integrity analysis operate
//! on different inputs (the manifest document, the archive digest) and are
//! invoked directly by callers that have those inputs in hand.

pub mod allowlist;
pub mod ast_analyzer;
pub mod entropy;
pub mod error;
pub mod integrity;
pub mod manifest;
pub mod rule_engine;
pub mod structure;

pub use allowlist::{is_test_or_scanner_file, suppress};
pub use ast_analyzer::AstAnalyzer;
pub use entropy::EntropyAnalyzer;
pub use error::{AnalyzerError, Result};
pub use integrity::IntegrityAnalyzer;
pub use manifest::ManifestAnalyzer;
pub use rule_engine::RuleEngine;
pub use structure::StructureAnalyzer;

use scanner_core::{AllowlistConfig, Artifact, PackageRef, RuleSet, Threat};

/// Runs the content-driven analyzers over one artifact's decoded text and
/// applies allowlist suppression to the combined findings.
pub struct AnalyzerSuite {
    rule_engine: RuleEngine,
    ast_analyzer: std::sync::Mutex<AstAnalyzer>,
    allowlist: AllowlistConfig,
}

impl AnalyzerSuite {
    #[must_use]
    pub fn new(rules: RuleSet, allowlist: AllowlistConfig) -> Self {
        Self {
            rule_engine: RuleEngine::new(rules),
            ast_analyzer: std::sync::Mutex::new(AstAnalyzer::new()),
            allowlist,
        }
    }

    #[must_use]
    pub fn with_default_rules(allowlist: AllowlistConfig) -> Self {
        Self::new(RuleEngine::default_rules(), allowlist)
    }

    /// Analyze one text artifact. `file_path` is the artifact's path within
    /// its package, used both for threat attribution and allowlist
    /// classification.
    #[must_use]
    pub fn analyze_artifact(&self, artifact: &Artifact, file_path: &str, content: &str) -> Vec<Threat> {
        let package: &PackageRef = &artifact.package;

        let mut threats = Vec::new();
        threats.extend(self.rule_engine.evaluate(package, file_path, content));
        threats.extend(EntropyAnalyzer::analyze(artifact, file_path, content));
        threats.extend(StructureAnalyzer::analyze(artifact, file_path, content));
        {
            let mut ast = self.ast_analyzer.lock().expect("ast analyzer mutex poisoned");
            threats.extend(ast.analyze(artifact, file_path, content));
        }

        suppress(&self.allowlist, &package.canonical(), Some(file_path), threats)
    }
}

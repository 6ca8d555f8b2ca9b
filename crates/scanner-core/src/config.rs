//! Scan configuration: CLI options, environment overlay, and the
//! project-root configuration file (spec §6).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Output format for the final `ScanResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Table,
    Yaml,
    Sarif,
}

/// Worker count: an explicit number or "pick `min(cores, 8)`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Workers {
    Auto,
    Fixed(usize),
}

impl Workers {
    #[must_use]
    pub fn resolve(self, available_cores: usize) -> usize {
        match self {
            Self::Auto => available_cores.min(8).max(1),
            Self::Fixed(n) => n.max(1),
        }
    }
}

/// Per-layer cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub l1_max_entries: usize,
    pub l2_enabled: bool,
    pub l3_enabled: bool,
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".cache"),
            l1_max_entries: 1000,
            l2_enabled: true,
            l3_enabled: false,
            default_ttl_secs: 3600,
        }
    }
}

/// Network client settings shared by the Artifact Fetcher and the IoC
/// Aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub connection_pool_enabled: bool,
    pub request_batching_enabled: bool,
    pub compression_enabled: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            connection_pool_enabled: true,
            request_batching_enabled: true,
            compression_enabled: true,
        }
    }
}

/// Resource limits for the Sandboxed Evaluator (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub enabled: bool,
    pub wall_clock_timeout_ms: u64,
    pub memory_ceiling_bytes: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wall_clock_timeout_ms: 100,
            memory_ceiling_bytes: 128 * 1024 * 1024,
        }
    }
}

/// False-positive allowlist for the Analyzer Suite (spec §4.3, False-positive
/// suppression). Never populated with compiled-in identifiers: every entry is
/// either the scanner's own configuration default or a caller-supplied
/// override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistConfig {
    /// Package names (bare, no version) whose circular-dependency or
    /// high-entropy quirks are known-benign.
    pub packages: HashSet<String>,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            packages: ["lodash", "react", "express", "chalk", "commander", "webpack"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Top-level scan configuration (file < env < CLI precedence, applied by
/// the caller in that order via repeated `with_*` calls).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub max_depth: u32,
    pub include_dev: bool,
    pub registry_base_url: String,
    pub skip_cache: bool,
    pub workers: Workers,
    pub parallel: bool,
    pub show_all: bool,
    pub ioc_enabled: bool,
    pub ioc_providers: HashSet<String>,
    pub ioc_budget: u32,
    pub output_format: OutputFormat,
    pub sarif_file_path: Option<PathBuf>,
    pub tree_show: bool,
    pub verbose: bool,
    pub max_file_size_bytes: u64,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub sandbox: SandboxConfig,
    pub allowlist: AllowlistConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            include_dev: false,
            registry_base_url: "https://registry.npmjs.org".to_string(),
            skip_cache: false,
            workers: Workers::Auto,
            parallel: true,
            show_all: false,
            ioc_enabled: true,
            ioc_providers: ["npm", "ghsa", "cve-nvd", "snyk"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            ioc_budget: 30,
            output_format: OutputFormat::Json,
            sarif_file_path: None,
            tree_show: false,
            verbose: false,
            max_file_size_bytes: 10 * 1024 * 1024,
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
            sandbox: SandboxConfig::default(),
            allowlist: AllowlistConfig::default(),
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub const fn with_include_dev(mut self, include_dev: bool) -> Self {
        self.include_dev = include_dev;
        self
    }

    #[must_use]
    pub fn with_registry_base_url(mut self, registry_base_url: impl Into<String>) -> Self {
        self.registry_base_url = registry_base_url.into();
        self
    }

    #[must_use]
    pub const fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    #[must_use]
    pub const fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub const fn with_ioc_enabled(mut self, ioc_enabled: bool) -> Self {
        self.ioc_enabled = ioc_enabled;
        self
    }

    #[must_use]
    pub const fn with_ioc_budget(mut self, ioc_budget: u32) -> Self {
        self.ioc_budget = ioc_budget;
        self
    }

    #[must_use]
    pub const fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_ioc_providers(mut self, providers: HashSet<String>) -> Self {
        self.ioc_providers = providers;
        self
    }

    #[must_use]
    pub fn with_sarif_file_path(mut self, path: PathBuf) -> Self {
        self.sarif_file_path = Some(path);
        self
    }

    #[must_use]
    pub fn with_allowlisted_packages(mut self, packages: HashSet<String>) -> Self {
        self.allowlist.packages = packages;
        self
    }

    /// Load a config document (JSON or YAML, detected by a leading `{`).
    ///
    /// # Errors
    /// Returns an error if the document is neither valid JSON nor valid YAML.
    pub fn merge_document(mut self, raw: &str) -> Result<Self, ConfigDocError> {
        let trimmed = raw.trim_start();
        let file_config: ScanConfigFile = if trimmed.starts_with('{') {
            serde_json::from_str(raw)?
        } else {
            serde_yaml::from_str(raw)?
        };
        file_config.apply(&mut self);
        Ok(self)
    }

    /// Apply the enumerated `*_` environment variable overlay (spec §6).
    /// Unset variables leave the corresponding field untouched.
    #[must_use]
    pub fn apply_env_overlay(mut self, prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{prefix}_{suffix}"));

        if let Some(v) = var("MAX_WORKERS") {
            if let Ok(n) = v.parse::<usize>() {
                self.workers = Workers::Fixed(n);
            }
        }
        if let Some(v) = var("MAX_FILE_SIZE") {
            if let Ok(n) = v.parse::<u64>() {
                self.max_file_size_bytes = n;
            }
        }
        if let Some(v) = var("NETWORK_TIMEOUT") {
            if let Ok(n) = v.parse::<u64>() {
                self.network.timeout_secs = n;
            }
        }
        if let Some(v) = var("CACHE_DIR") {
            self.cache.dir = PathBuf::from(v);
        }
        if let Some(v) = var("CACHE_TTL") {
            if let Ok(n) = v.parse::<u64>() {
                self.cache.default_ttl_secs = n;
            }
        }
        if let Some(v) = var("CACHE_MAX_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                self.cache.l1_max_entries = n;
            }
        }
        if let Some(v) = var("CACHE_L2_ENABLED") {
            self.cache.l2_enabled = parse_bool(&v);
        }
        if let Some(v) = var("CACHE_L3_ENABLED") {
            self.cache.l3_enabled = parse_bool(&v);
        }
        if let Some(v) = var("CONNECTION_POOL_ENABLED") {
            self.network.connection_pool_enabled = parse_bool(&v);
        }
        if let Some(v) = var("REQUEST_BATCHING_ENABLED") {
            self.network.request_batching_enabled = parse_bool(&v);
        }
        if let Some(v) = var("COMPRESSION_ENABLED") {
            self.network.compression_enabled = parse_bool(&v);
        }
        if let Some(v) = var("SANDBOX_TIMEOUT_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.sandbox.wall_clock_timeout_ms = n;
            }
        }
        if let Some(v) = var("SANDBOX_ENABLED") {
            self.sandbox.enabled = parse_bool(&v);
        }
        self
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// A project-root configuration document that is neither valid JSON nor
/// valid YAML.
#[derive(Debug, thiserror::Error)]
pub enum ConfigDocError {
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// The on-disk shape of the project-root configuration file (spec §6);
/// every field is optional so a file need only mention what it overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanConfigFile {
    ioc_enabled: Option<bool>,
    ioc_providers: Option<Vec<String>>,
    cache: Option<ScanConfigFileCache>,
    network: Option<ScanConfigFileNetwork>,
    parallel: Option<ScanConfigFileParallel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanConfigFileCache {
    enabled: Option<bool>,
    dir: Option<PathBuf>,
    ttl: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScanConfigFileNetwork {
    timeout: Option<u64>,
    retries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScanConfigFileParallel {
    enabled: Option<bool>,
    workers: Option<usize>,
}

impl ScanConfigFile {
    fn apply(self, config: &mut ScanConfig) {
        if let Some(v) = self.ioc_enabled {
            config.ioc_enabled = v;
        }
        if let Some(v) = self.ioc_providers {
            config.ioc_providers = v.into_iter().collect();
        }
        if let Some(cache) = self.cache {
            if let Some(v) = cache.enabled {
                config.cache.enabled = v;
            }
            if let Some(v) = cache.dir {
                config.cache.dir = v;
            }
            if let Some(v) = cache.ttl {
                config.cache.default_ttl_secs = v;
            }
        }
        if let Some(network) = self.network {
            if let Some(v) = network.timeout {
                config.network.timeout_secs = v;
            }
            if let Some(v) = network.retries {
                config.network.max_retries = v;
            }
        }
        if let Some(parallel) = self.parallel {
            if let Some(v) = parallel.enabled {
                config.parallel = v;
            }
            if let Some(v) = parallel.workers {
                config.workers = Workers::Fixed(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.ioc_budget, 30);
        assert_eq!(config.cache.l1_max_entries, 1000);
        assert_eq!(config.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.sandbox.wall_clock_timeout_ms, 100);
        assert_eq!(config.sandbox.memory_ceiling_bytes, 128 * 1024 * 1024);
        assert!(config.allowlist.packages.contains("lodash"));
    }

    #[test]
    fn allowlisted_packages_override_defaults() {
        let custom: HashSet<String> = ["left-pad".to_string()].into_iter().collect();
        let config = ScanConfig::default().with_allowlisted_packages(custom.clone());
        assert_eq!(config.allowlist.packages, custom);
    }

    #[test]
    fn workers_auto_caps_at_eight() {
        assert_eq!(Workers::Auto.resolve(32), 8);
        assert_eq!(Workers::Auto.resolve(2), 2);
        assert_eq!(Workers::Fixed(16).resolve(2), 16);
    }

    #[test]
    fn json_document_overrides_ioc_enabled() {
        let config = ScanConfig::default()
            .merge_document(r#"{"iocEnabled": false}"#)
            .unwrap();
        assert!(!config.ioc_enabled);
    }

    #[test]
    fn yaml_document_overrides_cache_dir() {
        let config = ScanConfig::default()
            .merge_document("cache:\n  dir: /tmp/scan-cache\n")
            .unwrap();
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/scan-cache"));
    }

    #[test]
    fn env_overlay_applies_only_set_variables() {
        let config = ScanConfig::default().apply_env_overlay("SCANNER", |key| {
            if key == "SCANNER_MAX_WORKERS" {
                Some("4".to_string())
            } else {
                None
            }
        });
        assert_eq!(config.workers, Workers::Fixed(4));
        assert_eq!(config.cache.default_ttl_secs, 3600);
    }

    #[test]
    fn precedence_is_file_then_env_then_cli() {
        let config = ScanConfig::default()
            .merge_document(r#"{"cache": {"ttl": 100}}"#)
            .unwrap()
            .apply_env_overlay("SCANNER", |key| {
                if key == "SCANNER_CACHE_TTL" {
                    Some("200".to_string())
                } else {
                    None
                }
            })
            .with_skip_cache(true);
        assert_eq!(config.cache.default_ttl_secs, 200);
        assert!(config.skip_cache);
    }
}

//! # IoC Aggregator (spec §4.7)
//!
//! Queries the fixed provider set (`npm`, `ghsa`, `cve-nvd`, `snyk`) for
//! vulnerability records affecting a package, merges same-identifier records
//! from different providers into one equivalence class (union of
//! references, highest severity observed), and emits one `VULNERABLE_PACKAGE`
//! threat per package+identifier. A shared per-scan request budget caps
//! total outbound calls; each provider is additionally rate-limited by a
//! token bucket so a burst of packages can't starve the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use scanner_core::{NetworkConfig, PackageRef, Severity, Threat, ThreatKind};
use scanner_registry::Cache;
use serde::{Deserialize, Serialize};

/// A batch holds at most this many packages per outbound request.
const MAX_BATCH_SIZE: usize = 25;

/// Upper bound on how long one provider's batched request is allowed to run
/// before the aggregator gives up on it and treats it as a miss.
const FLUSH_DEADLINE: Duration = Duration::from_millis(800);

/// One vulnerability record as reported by a single provider, before
/// cross-provider merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoCRecord {
    pub identifier: String,
    pub affected_range: String,
    pub fixed_version: Option<String>,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub references: Vec<String>,
    pub provider: String,
}

/// The wire shape a provider returns per affected package, keyed by the
/// package's canonical `name@version` string in the response body.
#[derive(Debug, Deserialize)]
struct ProviderAdvisory {
    id: String,
    vulnerable_range: String,
    patched_version: Option<String>,
    severity: Severity,
    cvss_score: Option<f64>,
    #[serde(default)]
    references: Vec<String>,
}

/// A token bucket shared across calls into one provider, refilled lazily on
/// each `try_acquire` so it needs no background task.
struct RateLimiter {
    capacity: f64,
    tokens: Mutex<f64>,
    refill_per_sec: f64,
    last_refill: Mutex<Instant>,
}

impl RateLimiter {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: Mutex::new(capacity),
            refill_per_sec,
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Blocks the current thread until a token is available. Pauses rather
    /// than erroring, per §4.7's "limiter pauses without erroring" contract.
    async fn acquire(&self) {
        loop {
            {
                let mut tokens = self.tokens.lock().expect("rate limiter lock poisoned");
                let mut last = self.last_refill.lock().expect("rate limiter lock poisoned");
                let elapsed = last.elapsed().as_secs_f64();
                *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
                *last = Instant::now();
                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// Known provider base URL and the environment variable holding its
/// credential, when it needs one. `npm`'s endpoint shape mirrors the public
/// bulk-advisory lookup; the others follow the same batched contract so one
/// code path can drive all four.
const KNOWN: &[(&str, f64, &str, Option<&str>)] = &[
    ("npm", 5.0, "https://registry.npmjs.org/-/npm/v1/security/advisories/bulk", None),
    ("ghsa", 5.0, "https://api.github.com/advisories/bulk", Some("GITHUB_TOKEN")),
    ("cve-nvd", 3.0, "https://services.nvd.nist.gov/rest/json/cves/2.0/bulk", Some("NVD_API_KEY")),
    ("snyk", 2.0, "https://api.snyk.io/rest/vulnerabilities/bulk", Some("SNYK_API_KEY")),
];

struct Provider {
    name: &'static str,
    base_url: &'static str,
    credential_env: Option<&'static str>,
    limiter: RateLimiter,
}

/// Degrades a failed provider query to zero records rather than propagating
/// the error, per §7's component-degradation policy.
pub struct IoCAggregator {
    providers: Vec<Provider>,
    budget: AtomicU32,
    requests_made: AtomicU64,
    cache: Arc<Cache<Vec<IoCRecord>>>,
    client: Client,
    max_retries: u32,
    batching_enabled: bool,
}

impl IoCAggregator {
    #[must_use]
    pub fn new(
        enabled_providers: &std::collections::HashSet<String>,
        budget: u32,
        cache: Arc<Cache<Vec<IoCRecord>>>,
        network: &NetworkConfig,
    ) -> Self {
        let providers = KNOWN
            .iter()
            .filter(|(name, ..)| enabled_providers.contains(*name))
            .map(|(name, rate, base_url, credential_env)| Provider {
                name,
                base_url,
                credential_env: *credential_env,
                limiter: RateLimiter::new(*rate, *rate),
            })
            .collect();
        let client = Client::builder()
            .timeout(Duration::from_secs(network.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            providers,
            budget: AtomicU32::new(budget),
            requests_made: AtomicU64::new(0),
            cache,
            client,
            max_retries: network.max_retries,
            batching_enabled: network.request_batching_enabled,
        }
    }

    #[must_use]
    pub fn network_requests(&self) -> u64 {
        self.requests_made.load(Ordering::Relaxed)
    }

    /// Queries every enabled provider for `name@version`, merges the
    /// results, and returns the `VULNERABLE_PACKAGE` threats they imply.
    /// Never errors: exhausted providers or budget simply contribute no
    /// records.
    pub async fn query(&self, name: &str, version: &str) -> Vec<Threat> {
        let key = (name.to_string(), version.to_string());
        self.query_many(std::slice::from_ref(&key)).await.remove(&key).unwrap_or_default()
    }

    /// Batched form of [`Self::query`]: every package lacking a fresh cache
    /// entry is grouped into requests of up to [`MAX_BATCH_SIZE`] packages,
    /// one outbound call per provider per batch, so scanning a manifest's
    /// whole dependency set costs a handful of calls rather than one per
    /// dependency.
    pub async fn query_many(&self, packages: &[(String, String)]) -> HashMap<(String, String), Vec<Threat>> {
        let mut out = HashMap::new();
        let mut to_fetch = Vec::new();

        for (name, version) in packages {
            let cache_key = format!("ioc:{name}:{version}");
            if let Some(cached) = self.cache.get(&cache_key) {
                out.insert((name.clone(), version.clone()), Self::to_threats(name, version, Self::merge(cached)));
            } else {
                to_fetch.push((name.clone(), version.clone()));
            }
        }

        let batch_size = if self.batching_enabled { MAX_BATCH_SIZE } else { 1 };
        for chunk in to_fetch.chunks(batch_size) {
            let mut per_package: HashMap<(String, String), Vec<IoCRecord>> =
                chunk.iter().cloned().map(|pkg| (pkg, Vec::new())).collect();

            for provider in &self.providers {
                if self.budget.load(Ordering::Relaxed) == 0 {
                    break;
                }
                provider.limiter.acquire().await;
                self.budget.fetch_sub(1, Ordering::Relaxed);
                self.requests_made.fetch_add(1, Ordering::Relaxed);

                let fetched = tokio::time::timeout(
                    FLUSH_DEADLINE,
                    Self::fetch_provider_batch(&self.client, provider, chunk, self.max_retries),
                )
                .await
                .unwrap_or_default();

                for (pkg, records) in fetched {
                    per_package.entry(pkg).or_default().extend(records);
                }
            }

            for (pkg, records) in per_package {
                let cache_key = format!("ioc:{}:{}", pkg.0, pkg.1);
                self.cache.put(&cache_key, records.clone(), 3600);
                let threats = Self::to_threats(&pkg.0, &pkg.1, Self::merge(records));
                out.insert(pkg, threats);
            }
        }

        out
    }

    /// Issues one batched HTTP call to `provider` for every package in
    /// `chunk`, retrying transient failures with exponential backoff and
    /// jitter and honoring `Retry-After` on HTTP 429. Any failure that
    /// survives the retry budget degrades to an empty result rather than
    /// propagating, matching `query`'s never-errors contract.
    async fn fetch_provider_batch(
        client: &Client,
        provider: &Provider,
        chunk: &[(String, String)],
        max_retries: u32,
    ) -> HashMap<(String, String), Vec<IoCRecord>> {
        let keys: Vec<String> = chunk.iter().map(|(name, version)| format!("{name}@{version}")).collect();
        let body = serde_json::json!({ "packages": keys });

        let mut attempt = 0u32;
        loop {
            let mut request = client.post(provider.base_url).json(&body);
            if let Some(env_var) = provider.credential_env {
                if let Ok(token) = std::env::var(env_var) {
                    request = request.bearer_auth(token);
                }
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(_) if attempt < max_retries => {
                    Self::backoff_sleep(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(_) => return HashMap::new(),
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= max_retries {
                    return HashMap::new();
                }
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                tokio::time::sleep(retry_after.unwrap_or_else(|| Self::backoff_delay(attempt))).await;
                attempt += 1;
                continue;
            }

            if response.status().is_server_error() && attempt < max_retries {
                Self::backoff_sleep(attempt).await;
                attempt += 1;
                continue;
            }

            if !response.status().is_success() {
                return HashMap::new();
            }

            let Ok(parsed) = response.json::<HashMap<String, Vec<ProviderAdvisory>>>().await else {
                return HashMap::new();
            };

            let mut out = HashMap::new();
            for (name, version) in chunk {
                let key = format!("{name}@{version}");
                if let Some(advisories) = parsed.get(&key) {
                    let records = advisories
                        .iter()
                        .map(|advisory| IoCRecord {
                            identifier: advisory.id.clone(),
                            affected_range: advisory.vulnerable_range.clone(),
                            fixed_version: advisory.patched_version.clone(),
                            severity: advisory.severity,
                            cvss_score: advisory.cvss_score,
                            references: advisory.references.clone(),
                            provider: provider.name.to_string(),
                        })
                        .collect();
                    out.insert((name.clone(), version.clone()), records);
                }
            }
            return out;
        }
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let base_ms = 100u64.saturating_mul(1u64 << attempt.min(10));
        let jitter_ms = rand::thread_rng().gen_range(0..=(base_ms / 2 + 1));
        Duration::from_millis(base_ms + jitter_ms)
    }

    async fn backoff_sleep(attempt: u32) {
        tokio::time::sleep(Self::backoff_delay(attempt)).await;
    }

    /// Merges same-identifier records: union of references, highest
    /// severity and CVSS observed, first non-empty fixed version.
    fn merge(records: Vec<IoCRecord>) -> Vec<IoCRecord> {
        let mut by_identifier: HashMap<String, IoCRecord> = HashMap::new();
        for record in records {
            by_identifier
                .entry(record.identifier.clone())
                .and_modify(|existing| {
                    existing.severity = existing.severity.max(record.severity);
                    existing.cvss_score = match (existing.cvss_score, record.cvss_score) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        (Some(a), None) => Some(a),
                        (None, b) => b,
                    };
                    existing.fixed_version = existing.fixed_version.clone().or_else(|| record.fixed_version.clone());
                    for reference in &record.references {
                        if !existing.references.contains(reference) {
                            existing.references.push(reference.clone());
                        }
                    }
                })
                .or_insert(record);
        }
        by_identifier.into_values().collect()
    }

    fn to_threats(name: &str, version: &str, records: Vec<IoCRecord>) -> Vec<Threat> {
        let package = PackageRef::named(name, version);
        records
            .into_iter()
            .map(|record| {
                let confidence = record.cvss_score.map_or(0.6, |score| (score / 10.0).clamp(0.3, 0.95));
                let details = format!(
                    "{} affects {} (fixed in {}); references: {}",
                    record.identifier,
                    record.affected_range,
                    record.fixed_version.as_deref().unwrap_or("unknown"),
                    record.references.join(", "),
                );
                Threat::new(
                    ThreatKind::VulnerablePackage,
                    record.severity,
                    confidence,
                    format!("{name}@{version} is affected by {}", record.identifier),
                    package.clone(),
                )
                .with_details(details)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn providers() -> std::collections::HashSet<String> {
        ["npm", "ghsa", "cve-nvd", "snyk"].into_iter().map(String::from).collect()
    }

    fn network() -> NetworkConfig {
        NetworkConfig::default()
    }

    fn aggregator_against(server: &MockServer, max_retries: u32) -> IoCAggregator {
        IoCAggregator {
            providers: vec![Provider {
                name: "npm",
                base_url: Box::leak(server.uri().into_boxed_str()),
                credential_env: None,
                limiter: RateLimiter::new(5.0, 5.0),
            }],
            budget: AtomicU32::new(30),
            requests_made: AtomicU64::new(0),
            cache: Arc::new(Cache::in_memory(100)),
            client: Client::new(),
            max_retries,
            batching_enabled: true,
        }
    }

    #[test]
    fn merge_keeps_highest_severity_and_unions_references() {
        let records = vec![
            IoCRecord {
                identifier: "CVE-2021-23337".to_string(),
                affected_range: "<4.17.21".to_string(),
                fixed_version: Some("4.17.21".to_string()),
                severity: Severity::Medium,
                cvss_score: Some(5.0),
                references: vec!["https://npm.example/advisory".to_string()],
                provider: "npm".to_string(),
            },
            IoCRecord {
                identifier: "CVE-2021-23337".to_string(),
                affected_range: "<4.17.21".to_string(),
                fixed_version: None,
                severity: Severity::High,
                cvss_score: Some(7.2),
                references: vec!["https://ghsa.example/advisory".to_string()],
                provider: "ghsa".to_string(),
            },
        ];
        let merged = IoCAggregator::merge(records);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].severity, Severity::High);
        assert_eq!(merged[0].cvss_score, Some(7.2));
        assert_eq!(merged[0].references.len(), 2);
    }

    #[test]
    fn exactly_one_threat_per_identifier() {
        let records = vec![IoCRecord {
            identifier: "CVE-2021-23337".to_string(),
            affected_range: "<4.17.21".to_string(),
            fixed_version: Some("4.17.21".to_string()),
            severity: Severity::High,
            cvss_score: Some(7.2),
            references: vec![],
            provider: "npm".to_string(),
        }];
        let threats = IoCAggregator::to_threats("lodash", "4.17.20", records);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].kind, ThreatKind::VulnerablePackage);
        assert_eq!(threats[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn query_with_no_enabled_providers_returns_no_threats() {
        let aggregator = IoCAggregator::new(&std::collections::HashSet::new(), 30, Arc::new(Cache::in_memory(100)), &network());
        let threats = aggregator.query("lodash", "4.17.20").await;
        assert!(threats.is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_stops_querying_further_providers() {
        let aggregator = IoCAggregator::new(&providers(), 0, Arc::new(Cache::in_memory(100)), &network());
        aggregator.query("lodash", "4.17.20").await;
        assert_eq!(aggregator.network_requests(), 0);
    }

    #[test]
    fn backoff_delay_grows_with_attempt_and_stays_bounded() {
        let first = IoCAggregator::backoff_delay(0);
        let later = IoCAggregator::backoff_delay(3);
        assert!(first.as_millis() >= 100);
        assert!(later.as_millis() >= 800);
        assert!(later.as_millis() <= 1300);
    }

    /// Spec §8 scenario 5: one provider reports a CVE for `lodash@4.17.20`;
    /// the merge/threat-conversion path yields exactly one `VULNERABLE_PACKAGE`
    /// threat carrying the CVE identifier, fixed version, and CVSS score.
    #[test]
    fn ioc_hit_produces_one_vulnerable_package_threat_with_cve_details() {
        let records = vec![IoCRecord {
            identifier: "CVE-2021-23337".to_string(),
            affected_range: "<4.17.21".to_string(),
            fixed_version: Some("4.17.21".to_string()),
            severity: Severity::High,
            cvss_score: Some(7.2),
            references: vec!["https://ghsa.example/advisory".to_string()],
            provider: "ghsa".to_string(),
        }];

        let threats = IoCAggregator::to_threats("lodash", "4.17.20", IoCAggregator::merge(records));

        assert_eq!(threats.len(), 1);
        let threat = &threats[0];
        assert_eq!(threat.kind, ThreatKind::VulnerablePackage);
        assert_eq!(threat.severity, Severity::High);
        assert_eq!(threat.package.canonical(), "lodash@4.17.20");
        assert!(threat.details.contains("CVE-2021-23337"));
        assert!(threat.details.contains("4.17.21"));
        assert!((threat.confidence.value() - 0.72).abs() < 1e-9);
    }

    /// Spec §8 scenario 5's "repeated scans within TTL record cache hits":
    /// once a package's records are cached, a second `query` within the TTL
    /// reuses them instead of consulting the providers again.
    #[tokio::test]
    async fn repeated_query_within_ttl_is_served_from_cache() {
        let cache = Arc::new(Cache::in_memory(100));
        cache.put(
            "ioc:lodash:4.17.20",
            vec![IoCRecord {
                identifier: "CVE-2021-23337".to_string(),
                affected_range: "<4.17.21".to_string(),
                fixed_version: Some("4.17.21".to_string()),
                severity: Severity::High,
                cvss_score: Some(7.2),
                references: vec![],
                provider: "ghsa".to_string(),
            }],
            3600,
        );
        let aggregator = IoCAggregator::new(&providers(), 30, Arc::clone(&cache), &network());

        let first = aggregator.query("lodash", "4.17.20").await;
        let second = aggregator.query("lodash", "4.17.20").await;

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(aggregator.network_requests(), 0);
        assert!(cache.stats().hits >= 2);
    }

    /// Exercises `query()` itself against a real HTTP response rather than
    /// the merge/cache helpers directly.
    #[tokio::test]
    async fn query_against_a_live_provider_yields_a_vulnerable_package_threat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "lodash@4.17.20": [{
                    "id": "CVE-2021-23337",
                    "vulnerable_range": "<4.17.21",
                    "patched_version": "4.17.21",
                    "severity": "HIGH",
                    "cvss_score": 7.2,
                    "references": ["https://ghsa.example/advisory"]
                }]
            })))
            .mount(&server)
            .await;

        let aggregator = aggregator_against(&server, 0);
        let threats = aggregator.query("lodash", "4.17.20").await;

        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].kind, ThreatKind::VulnerablePackage);
        assert!(threats[0].details.contains("CVE-2021-23337"));
        assert_eq!(aggregator.network_requests(), 1);
    }

    #[tokio::test]
    async fn query_many_issues_one_request_per_provider_for_a_whole_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let aggregator = aggregator_against(&server, 0);
        let packages = vec![("lodash".to_string(), "4.17.20".to_string()), ("left-pad".to_string(), "1.3.0".to_string())];
        let results = aggregator.query_many(&packages).await;

        assert_eq!(results.len(), 2);
        assert_eq!(aggregator.network_requests(), 1);
    }

    #[tokio::test]
    async fn rate_limited_response_without_retry_budget_degrades_to_no_threats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .mount(&server)
            .await;

        let aggregator = aggregator_against(&server, 0);
        let threats = aggregator.query("lodash", "4.17.20").await;

        assert!(threats.is_empty());
        assert_eq!(aggregator.network_requests(), 1);
    }
}

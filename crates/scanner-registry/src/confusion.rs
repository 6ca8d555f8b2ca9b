//! # Dependency-Confusion Analyzer (spec §4.5)
//!
//! Assesses whether a declared dependency could be hijacked by the public
//! registry, or is otherwise suspiciously new or mis-named. Unlike the
//! Analyzer Suite, this analyzer consumes repository and registry metadata
//! rather than artifact bytes, so it lives alongside the cache rather than
//! in `scanner-analyzers`.
//!
//! Falls back to emitting nothing — never a hard error — when the inputs
//! needed for a signal (git history, registry reachability) aren't
//! available; see `analyze`.

use chrono::{DateTime, Utc};
use regex::Regex;
use scanner_core::{Confidence, PackageRef, Severity, Threat, ThreatKind};
use std::collections::HashSet;

/// What's known about a package's presence in local version-control
/// history. Absent when the target isn't a git working tree.
#[derive(Debug, Clone)]
pub struct RepoHistory {
    pub earliest_commit_referencing: Option<DateTime<Utc>>,
    pub commits_touching: u64,
}

/// Everything the analyzer needs to judge one dependency. Fields the caller
/// couldn't determine are `None` and simply suppress the signal that needs
/// them, per the analyzer's fallback contract.
#[derive(Debug, Clone)]
pub struct DependencyConfusionInput {
    pub name: String,
    pub version: String,
    pub registry_created_at: Option<DateTime<Utc>>,
    pub registry_confirmed_present: bool,
    pub repo_history: Option<RepoHistory>,
}

/// Default regexes for the naming signal: names that look machine-generated
/// or deliberately bland.
fn default_suspicious_patterns() -> Vec<Regex> {
    vec![Regex::new(r"^[a-z]+\d+[a-z]+$").expect("valid pattern")]
}

pub struct DependencyConfusionAnalyzer {
    popular_names: HashSet<String>,
    suspicious_patterns: Vec<Regex>,
    min_commit_activity: u64,
}

impl Default for DependencyConfusionAnalyzer {
    fn default() -> Self {
        Self {
            popular_names: HashSet::new(),
            suspicious_patterns: default_suspicious_patterns(),
            min_commit_activity: 2,
        }
    }
}

impl DependencyConfusionAnalyzer {
    #[must_use]
    pub fn new(popular_names: HashSet<String>) -> Self {
        Self { popular_names, ..Self::default() }
    }

    #[must_use]
    pub fn with_min_commit_activity(mut self, min_commit_activity: u64) -> Self {
        self.min_commit_activity = min_commit_activity;
        self
    }

    /// Runs every signal that the input supports. Order matches spec §4.5:
    /// timeline, scope, naming, activity.
    #[must_use]
    pub fn analyze(&self, input: &DependencyConfusionInput) -> Vec<Threat> {
        let package = PackageRef::named(input.name.clone(), input.version.clone());
        let mut threats = Vec::new();

        if let Some(threat) = self.timeline_signal(input, &package) {
            threats.push(threat);
        }
        if let Some(threat) = self.scope_signal(input, &package) {
            threats.push(threat);
        }
        if let Some(threat) = self.naming_signal(input, &package) {
            threats.push(threat);
        }
        if let Some(threat) = self.activity_signal(input, &package) {
            threats.push(threat);
        }

        threats
    }

    fn timeline_signal(&self, input: &DependencyConfusionInput, package: &PackageRef) -> Option<Threat> {
        let registry_created_at = input.registry_created_at?;
        let earliest_commit = input.repo_history.as_ref()?.earliest_commit_referencing?;

        let delta_days = (registry_created_at - earliest_commit).num_days().abs();
        let (severity, confidence) = if delta_days < 1 {
            (Severity::Critical, 0.9)
        } else if delta_days < 7 {
            (Severity::High, 0.75)
        } else if delta_days < 30 {
            (Severity::Medium, 0.5)
        } else {
            return None;
        };

        Some(
            Threat::new(
                ThreatKind::DependencyConfusionTimeline,
                severity,
                confidence,
                format!("{} was referenced locally close to its registry creation date", input.name),
                package.clone(),
            )
            .with_details(format!(
                "registry created {registry_created_at}, earliest local reference {earliest_commit} ({delta_days} day delta)"
            )),
        )
    }

    fn scope_signal(&self, input: &DependencyConfusionInput, package: &PackageRef) -> Option<Threat> {
        if !input.name.starts_with('@') || input.registry_confirmed_present {
            return None;
        }
        Some(
            Threat::new(
                ThreatKind::DependencyConfusionScope,
                Severity::High,
                0.6,
                format!("scoped package {} is not confirmed present on the configured registry", input.name),
                package.clone(),
            )
            .with_details("a public registry resolution for this scope would shadow the intended private package"),
        )
    }

    fn naming_signal(&self, input: &DependencyConfusionInput, package: &PackageRef) -> Option<Threat> {
        let matches_pattern = self.suspicious_patterns.iter().any(|re| re.is_match(&input.name));
        let near_popular = self.closest_popular_name(&input.name);

        if !matches_pattern && near_popular.is_none() {
            return None;
        }

        let details = match &near_popular {
            Some(popular) => format!("name is within edit distance 2 of popular package '{popular}'"),
            None => "name matches a suspicious naming pattern".to_string(),
        };

        Some(
            Threat::new(
                ThreatKind::DependencyConfusionPattern,
                Severity::Medium,
                0.5,
                format!("{} has a suspicious or typosquat-like name", input.name),
                package.clone(),
            )
            .with_details(details),
        )
    }

    fn activity_signal(&self, input: &DependencyConfusionInput, package: &PackageRef) -> Option<Threat> {
        let commits = input.repo_history.as_ref()?.commits_touching;
        if commits >= self.min_commit_activity {
            return None;
        }
        Some(
            Threat::new(
                ThreatKind::DependencyConfusionActivity,
                Severity::Low,
                0.3,
                format!("{} has minimal commit activity in the local repository", input.name),
                package.clone(),
            )
            .with_details(format!("{commits} commit(s) touch this dependency")),
        )
    }

    fn closest_popular_name(&self, name: &str) -> Option<&str> {
        if name.len() < 5 {
            return None;
        }
        self.popular_names
            .iter()
            .find(|popular| {
                popular.as_str() != name && levenshtein_distance(name, popular) <= 2
            })
            .map(String::as_str)
    }
}

/// Classic dynamic-programming edit distance, used for typosquat detection.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (len_a, len_b) = (a_chars.len(), b_chars.len());

    let mut row: Vec<usize> = (0..=len_b).collect();
    for i in 1..=len_a {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=len_b {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            let temp = row[j];
            row[j] = (row[j] + 1).min(row[j - 1] + 1).min(prev_diag + cost);
            prev_diag = temp;
        }
    }
    row[len_b]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn popular() -> HashSet<String> {
        ["lodash", "react", "express"].into_iter().map(String::from).collect()
    }

    #[test]
    fn levenshtein_matches_known_distances() {
        assert_eq!(levenshtein_distance("serde", "sede"), 1);
        assert_eq!(levenshtein_distance("completely", "different"), 9);
        assert_eq!(levenshtein_distance("lodash", "lodash"), 0);
    }

    #[test]
    fn timeline_one_day_delta_is_critical() {
        let now = Utc::now();
        let analyzer = DependencyConfusionAnalyzer::default();
        let input = DependencyConfusionInput {
            name: "acme-internal".to_string(),
            version: "0.0.1".to_string(),
            registry_created_at: Some(now),
            registry_confirmed_present: true,
            repo_history: Some(RepoHistory {
                earliest_commit_referencing: Some(now - Duration::hours(12)),
                commits_touching: 5,
            }),
        };
        let threats = analyzer.analyze(&input);
        let timeline = threats
            .iter()
            .find(|t| t.kind == ThreatKind::DependencyConfusionTimeline)
            .expect("timeline threat");
        assert_eq!(timeline.severity, Severity::Critical);
    }

    #[test]
    fn timeline_seven_day_delta_is_high() {
        let now = Utc::now();
        let analyzer = DependencyConfusionAnalyzer::default();
        let input = DependencyConfusionInput {
            name: "acme-internal".to_string(),
            version: "0.0.1".to_string(),
            registry_created_at: Some(now),
            registry_confirmed_present: true,
            repo_history: Some(RepoHistory {
                earliest_commit_referencing: Some(now - Duration::days(1)),
                commits_touching: 5,
            }),
        };
        let threats = analyzer.analyze(&input);
        let timeline = threats
            .iter()
            .find(|t| t.kind == ThreatKind::DependencyConfusionTimeline)
            .expect("timeline threat");
        assert_eq!(timeline.severity, Severity::High);
    }

    #[test]
    fn missing_history_suppresses_timeline_without_erroring() {
        let analyzer = DependencyConfusionAnalyzer::default();
        let input = DependencyConfusionInput {
            name: "leftpad".to_string(),
            version: "1.0.0".to_string(),
            registry_created_at: None,
            registry_confirmed_present: true,
            repo_history: None,
        };
        let threats = analyzer.analyze(&input);
        assert!(threats.iter().all(|t| t.kind != ThreatKind::DependencyConfusionTimeline));
    }

    #[test]
    fn unconfirmed_scope_is_flagged() {
        let analyzer = DependencyConfusionAnalyzer::default();
        let input = DependencyConfusionInput {
            name: "@acme/internal-tools".to_string(),
            version: "1.0.0".to_string(),
            registry_created_at: None,
            registry_confirmed_present: false,
            repo_history: None,
        };
        let threats = analyzer.analyze(&input);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::DependencyConfusionScope));
    }

    #[test]
    fn typosquat_name_is_flagged() {
        let analyzer = DependencyConfusionAnalyzer::new(popular());
        let input = DependencyConfusionInput {
            name: "lodahs".to_string(),
            version: "1.0.0".to_string(),
            registry_created_at: None,
            registry_confirmed_present: true,
            repo_history: None,
        };
        let threats = analyzer.analyze(&input);
        assert!(threats.iter().any(|t| t.kind == ThreatKind::DependencyConfusionPattern));
    }

    #[test]
    fn legitimate_popular_name_is_not_flagged() {
        let analyzer = DependencyConfusionAnalyzer::new(popular());
        let input = DependencyConfusionInput {
            name: "lodash".to_string(),
            version: "4.17.21".to_string(),
            registry_created_at: None,
            registry_confirmed_present: true,
            repo_history: None,
        };
        let threats = analyzer.analyze(&input);
        assert!(threats.iter().all(|t| t.kind != ThreatKind::DependencyConfusionPattern));
    }

    #[test]
    fn low_activity_is_flagged_as_low_severity() {
        let analyzer = DependencyConfusionAnalyzer::default();
        let input = DependencyConfusionInput {
            name: "rarely-touched".to_string(),
            version: "0.1.0".to_string(),
            registry_created_at: None,
            registry_confirmed_present: true,
            repo_history: Some(RepoHistory { earliest_commit_referencing: None, commits_touching: 1 }),
        };
        let threats = analyzer.analyze(&input);
        let activity = threats
            .iter()
            .find(|t| t.kind == ThreatKind::DependencyConfusionActivity)
            .expect("activity threat");
        assert_eq!(activity.severity, Severity::Low);
    }
}

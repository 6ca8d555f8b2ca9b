//! Rule catalog for the pattern-driven Rule Engine (analyzer §4.3.1).

use serde::{Deserialize, Serialize};

use crate::threat::Severity;

/// A pattern-driven detector specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub severity: Severity,
    pub description: String,
    pub confidence_threshold: f64,
    /// Ordered, case-insensitive, multiline regular expressions.
    pub patterns: Vec<String>,
}

impl Rule {
    #[must_use]
    pub fn new(name: impl Into<String>, severity: Severity, confidence_threshold: f64) -> Self {
        Self {
            name: name.into(),
            severity,
            description: String::new(),
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
            patterns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }
}

/// A loaded set of rules, merging defaults with user-supplied overrides.
///
/// Merge semantics: rules are keyed by name; a user rule with the same name
/// as a default replaces it field-for-field (user wins per field is
/// approximated here at the whole-rule granularity, which is what the
/// source config format actually allows — rules are not partially
/// patchable).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Merge `user` rules into `self` (the defaults), user rules winning by
    /// name. Rules are loaded once per scan.
    #[must_use]
    pub fn merged_with(mut self, user: RuleSet) -> Self {
        for user_rule in user.rules {
            if let Some(existing) = self.rules.iter_mut().find(|r| r.name == user_rule.name) {
                *existing = user_rule;
            } else {
                self.rules.push(user_rule);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rule_overrides_default_by_name() {
        let defaults = RuleSet::new(vec![Rule::new("eval-usage", Severity::High, 0.5)]);
        let user = RuleSet::new(vec![Rule::new("eval-usage", Severity::Critical, 0.9)]);
        let merged = defaults.merged_with(user);
        assert_eq!(merged.rules().len(), 1);
        assert_eq!(merged.rules()[0].severity, Severity::Critical);
    }

    #[test]
    fn user_rule_with_new_name_is_appended() {
        let defaults = RuleSet::new(vec![Rule::new("a", Severity::Low, 0.1)]);
        let user = RuleSet::new(vec![Rule::new("b", Severity::Low, 0.1)]);
        let merged = defaults.merged_with(user);
        assert_eq!(merged.rules().len(), 2);
    }
}

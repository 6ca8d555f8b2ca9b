//! Renders a `ScanResult` in the four formats the CLI surface supports
//! (spec §6): JSON (the data model serialized verbatim), a human-readable
//! table, YAML, and SARIF 2.1.0.

use std::collections::BTreeSet;

use scanner_core::{OutputFormat, ScanResult, Severity, Threat};

#[must_use]
pub fn render(result: &ScanResult, format: OutputFormat, show_all: bool) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(result).unwrap_or_default(),
        OutputFormat::Table => render_table(result, show_all),
        OutputFormat::Sarif => serde_json::to_string_pretty(&to_sarif(result)).unwrap_or_default(),
    }
}

fn render_table(result: &ScanResult, show_all: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "scanned {} package(s), {} file(s) in {} ms\n\n",
        result.packages_scanned, result.files_scanned, result.duration_ms
    ));

    let visible: Vec<&Threat> = result
        .threats
        .iter()
        .filter(|t| show_all || t.severity >= Severity::Medium)
        .collect();

    if visible.is_empty() {
        out.push_str("no threats found\n\n");
    } else {
        out.push_str(&format!("{:<10} {:<32} {:<6} {}\n", "SEVERITY", "TYPE", "CONF", "MESSAGE"));
        for threat in &visible {
            out.push_str(&format!(
                "{:<10} {:<32} {:<6.2} {}\n",
                threat.severity.to_string(),
                threat.kind.to_string(),
                threat.confidence.value(),
                threat.message,
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "cache hit rate: {:.2}  packages/sec: {:.2}  network requests: {}  errors: {}\n",
        result.performance.cache_hit_rate,
        result.performance.packages_per_second,
        result.performance.network_requests,
        result.performance.errors,
    ));
    out
}

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low => "note",
    }
}

#[must_use]
pub fn to_sarif(result: &ScanResult) -> serde_json::Value {
    let mut rule_ids: BTreeSet<String> = BTreeSet::new();

    let results: Vec<serde_json::Value> = result
        .threats
        .iter()
        .map(|threat| {
            let rule_id = threat.kind.to_string();
            rule_ids.insert(rule_id.clone());

            let mut value = serde_json::json!({
                "ruleId": rule_id,
                "level": sarif_level(threat.severity),
                "message": { "text": threat.message },
            });

            if let Some(file_path) = &threat.file_path {
                let mut physical_location = serde_json::json!({ "artifactLocation": { "uri": file_path } });
                if let Some(line) = threat.line_number {
                    physical_location["region"] = serde_json::json!({ "startLine": line });
                }
                value["locations"] = serde_json::json!([{ "physicalLocation": physical_location }]);
            }

            value
        })
        .collect();

    let rules: Vec<serde_json::Value> = rule_ids.into_iter().map(|id| serde_json::json!({ "id": id })).collect();

    serde_json::json!({
        "version": "2.1.0",
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
        "runs": [{
            "tool": { "driver": { "name": "package-scanner", "rules": rules } },
            "results": results,
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::{PackageRef, ThreatKind};

    fn sample_result() -> ScanResult {
        let threat = Threat::new(
            ThreatKind::WalletHijacking,
            Severity::Critical,
            0.9,
            "wallet hijack attempt",
            PackageRef::file("hook.js"),
        )
        .with_location("hook.js", Some(12));
        ScanResult::finalize(vec![threat], 1, 1, 10, None, scanner_core::Performance::default(), scanner_core::ScanMetadata::default())
    }

    #[test]
    fn table_omits_low_severity_threats_unless_show_all() {
        let result = sample_result();
        let table = render_table(&result, false);
        assert!(table.contains("WALLET_HIJACKING"));
    }

    #[test]
    fn sarif_maps_critical_to_error_level() {
        let result = sample_result();
        let sarif = to_sarif(&result);
        assert_eq!(sarif["runs"][0]["results"][0]["level"], "error");
        assert_eq!(sarif["runs"][0]["results"][0]["locations"][0]["physicalLocation"]["region"]["startLine"], 12);
    }

    #[test]
    fn sarif_rule_catalog_has_one_entry_per_threat_type() {
        let result = sample_result();
        let sarif = to_sarif(&result);
        let rules = sarif["runs"][0]["tool"]["driver"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn json_output_round_trips_through_scan_result() {
        let result = sample_result();
        let rendered = render(&result, OutputFormat::Json, true);
        let parsed: ScanResult = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.threats.len(), result.threats.len());
    }
}

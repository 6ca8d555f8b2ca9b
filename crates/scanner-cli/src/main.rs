//! Command-line front end for the package scanner.
//!
//! Assembles a `ScanConfig` from the project configuration file, the
//! enumerated `*_` environment overlay, and CLI flags (in that precedence
//! order, per spec §6), runs one scan, and renders the result in the
//! requested format.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use scanner_core::{OutputFormat, ScanConfig, ScanError, Workers};
use scanner_pipeline::{Scanner, TargetResolver};

mod render;

const ENV_PREFIX: &str = "SCANNER";
const PROJECT_CONFIG_NAMES: &[&str] = &["scanner.config.json", "scanner.config.yaml", "scanner.config.yml"];

#[derive(Parser)]
#[command(name = "scanner")]
#[command(about = "Static analysis security scanner for npm/JS packages")]
struct Cli {
    /// File, directory, or package name to scan
    target: String,

    #[arg(long)]
    verbose: bool,

    #[arg(long, value_enum, default_value = "json")]
    format: CliFormat,

    #[arg(long, default_value_t = 3)]
    depth: u32,

    /// Show the resolved dependency tree annotated with threats
    #[arg(long)]
    tree: bool,

    /// Include LOW-severity threats in table output
    #[arg(long)]
    all: bool,

    #[arg(long)]
    parallel: bool,

    #[arg(long)]
    no_parallel: bool,

    /// Worker count, or "auto" for min(cores, 8)
    #[arg(long)]
    workers: Option<String>,

    /// Also write the SARIF rendering to this path regardless of --format
    #[arg(long)]
    sarif_file: Option<PathBuf>,

    /// Comma-separated subset of npm,ghsa,cve-nvd,snyk
    #[arg(long)]
    ioc_providers: Option<String>,

    #[arg(long)]
    no_ioc: bool,

    #[arg(long)]
    cache_stats: bool,

    #[arg(long)]
    network_stats: bool,

    /// Enable the L3 distributed cache layer
    #[arg(long)]
    enable_redis: bool,

    #[arg(long)]
    skip_cache: bool,

    #[arg(long)]
    include_dev: bool,

    #[arg(long)]
    debug: bool,

    /// Resolve the target into a Work Set and print its summary without
    /// running the Analyzer Suite or touching the network
    #[arg(long)]
    dry_run: bool,
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum CliFormat {
    Json,
    Table,
    Yaml,
    Sarif,
}

impl From<CliFormat> for OutputFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Json => Self::Json,
            CliFormat::Table => Self::Table,
            CliFormat::Yaml => Self::Yaml,
            CliFormat::Sarif => Self::Sarif,
        }
    }
}

/// Honors the enumerated `*_LOG_LEVEL`/`*_NO_COLOR`/`*_TIMESTAMP` environment
/// variables (spec §6) on top of the `--debug`/`--verbose` flags; an
/// explicit `*_LOG_LEVEL` wins over both flags.
fn init_tracing(debug: bool, verbose: bool) {
    let level = std::env::var(format!("{ENV_PREFIX}_LOG_LEVEL")).ok().unwrap_or_else(|| {
        if debug {
            "debug".to_string()
        } else if verbose {
            "info".to_string()
        } else {
            "warn".to_string()
        }
    });
    let no_color = std::env::var(format!("{ENV_PREFIX}_NO_COLOR")).is_ok() || std::env::var("NO_COLOR").is_ok();
    let with_timestamp = std::env::var(format!("{ENV_PREFIX}_TIMESTAMP")).map(|v| v != "0").unwrap_or(true);

    let builder = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(level)).with_ansi(!no_color);
    if with_timestamp {
        builder.init();
    } else {
        builder.without_time().init();
    }
}

fn read_project_config() -> Option<String> {
    PROJECT_CONFIG_NAMES.iter().find_map(|name| std::fs::read_to_string(name).ok())
}

fn build_config(cli: &Cli) -> anyhow::Result<ScanConfig> {
    if cli.parallel && cli.no_parallel {
        anyhow::bail!("--parallel and --no-parallel are mutually exclusive");
    }

    let mut config = ScanConfig::default();
    if let Some(raw) = read_project_config() {
        config = config.merge_document(&raw)?;
    }
    config = config.apply_env_overlay(ENV_PREFIX, |key| std::env::var(key).ok());

    config = config
        .with_max_depth(cli.depth)
        .with_include_dev(cli.include_dev)
        .with_skip_cache(cli.skip_cache)
        .with_verbose(cli.verbose)
        .with_output_format(cli.format.into())
        .with_ioc_enabled(!cli.no_ioc);

    if cli.no_parallel {
        config = config.with_parallel(false);
    }

    if let Some(workers) = &cli.workers {
        let workers = if workers.eq_ignore_ascii_case("auto") {
            Workers::Auto
        } else {
            Workers::Fixed(workers.parse().map_err(|_| anyhow::anyhow!("--workers expects a number or \"auto\""))?)
        };
        config = config.with_workers(workers);
    }

    if let Some(path) = &cli.sarif_file {
        config = config.with_sarif_file_path(path.clone());
    }

    if let Some(providers) = &cli.ioc_providers {
        let set: HashSet<String> = providers.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        config = config.with_ioc_providers(set);
    }

    config.show_all = cli.all;
    config.tree_show = cli.tree;
    if cli.enable_redis {
        config.cache.l3_enabled = true;
    }

    Ok(config)
}

fn write_sarif_file(path: &PathBuf, result: &scanner_core::ScanResult) {
    let document = render::to_sarif(result);
    match serde_json::to_string_pretty(&document) {
        Ok(text) => {
            if let Err(e) = std::fs::write(path, text) {
                tracing::warn!(error = %e, path = %path.display(), "could not write SARIF file");
            }
        }
        Err(e) => tracing::warn!(error = %e, "could not serialize SARIF document"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.verbose);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        return match TargetResolver::resolve(&cli.target, &config) {
            Ok(work_set) => {
                println!(
                    "mode={:?} items={} files_skipped={} bytes_scanned={}",
                    work_set.mode,
                    work_set.items.len(),
                    work_set.files_skipped,
                    work_set.bytes_scanned
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let scanner = Scanner::new(config.clone());
    let result = match scanner.scan(&cli.target).await {
        Ok(result) => result,
        Err(err @ (ScanError::Configuration(_) | ScanError::Fatal(_))) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
        Err(other) => {
            eprintln!("{other}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &config.sarif_file_path {
        write_sarif_file(path, &result);
    }

    println!("{}", render::render(&result, config.output_format, config.show_all));

    if cli.cache_stats {
        println!(
            "cache: hit_rate={:.2} (this run's aggregate across L1/L2/L3)",
            result.performance.cache_hit_rate
        );
    }
    if cli.network_stats {
        println!("network: requests={}", result.performance.network_requests);
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn conflicting_parallel_flags_are_rejected() {
        let cli = Cli::parse_from(["scanner", "left-pad", "--parallel", "--no-parallel"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn ioc_providers_are_split_on_commas() {
        let cli = Cli::parse_from(["scanner", "left-pad", "--ioc-providers", "npm, ghsa"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.ioc_providers, ["npm", "ghsa"].into_iter().map(String::from).collect());
    }

    #[test]
    fn workers_auto_is_case_insensitive() {
        let cli = Cli::parse_from(["scanner", "left-pad", "--workers", "AUTO"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.workers, Workers::Auto);
    }

    #[test]
    fn no_ioc_disables_ioc_in_config() {
        let cli = Cli::parse_from(["scanner", "left-pad", "--no-ioc"]);
        let config = build_config(&cli).unwrap();
        assert!(!config.ioc_enabled);
    }
}

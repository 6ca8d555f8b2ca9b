//! # Scanner Core
//!
//! Data model, configuration, and error taxonomy shared by every crate in
//! the package security scanner.
//!
//! ## Scope
//!
//! This crate owns the types every other crate builds on: [`Artifact`],
//! [`Threat`], [`Rule`], [`ScanResult`], and [`ScanConfig`]. It contains no
//! scanning logic of its own — the Target Resolver, Analyzer Suite,
//! Sandboxed Evaluator, Multi-Layer Cache, IoC Aggregator, and Scheduler
//! all live in their own crates and depend on this one, not the other way
//! around.
//!
//! ## Data model
//!
//! | Type | Produced by | Consumed by |
//! |------|-------------|-------------|
//! | [`Artifact`] | Target Resolver | Analyzer Suite, Sandboxed Evaluator |
//! | [`Threat`] | every analyzer | Result Aggregator |
//! | [`Rule`] | Rule Engine config | Rule Engine |
//! | [`ScanResult`] | Result Aggregator | callers |
//!
//! ## Invariants
//!
//! - `Severity` is totally ordered: `CRITICAL > HIGH > MEDIUM > LOW`.
//! - `Confidence` is clamped to `[0, 0.95]` at construction.
//! - Two threats are duplicates iff `(kind, package, file_path, line_number
//!   ?? 0)` are equal; [`threat::dedup_and_sort`] keeps the
//!   higher-confidence member and is idempotent.

mod artifact;
mod cancellation;
mod config;
mod error;
mod result;
mod rule;
pub mod threat;

pub use artifact::{Artifact, ArtifactKind, ContentKind, Fingerprint, PackageRef};
pub use cancellation::CancellationToken;
pub use config::{
    AllowlistConfig, CacheConfig, ConfigDocError, NetworkConfig, OutputFormat, SandboxConfig,
    ScanConfig, Workers,
};
pub use error::{ScanError, Result};
pub use result::{DependencyTreeNode, Performance, ScanMetadata, ScanResult};
pub use rule::{Rule, RuleSet};
pub use threat::{Confidence, RuleMatch, Severity, Threat, ThreatKind};

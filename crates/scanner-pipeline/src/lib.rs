//! # Scanner pipeline
//!
//! Drives one scan end to end:
//!
//! 1. The Target Resolver ([`target`]) classifies the scan target and builds
//!    the initial Work Set.
//! 2. For a registry target, the Artifact Fetcher ([`fetcher`]) downloads and
//!    extracts the package archive.
//! 3. The Scheduler ([`scheduler`]) fans the Work Set's items out across
//!    threads, running each through the Analyzer Suite and Sandboxed
//!    Evaluator. Declared dependencies are independently checked by the
//!    Dependency-Confusion Analyzer and the IoC Aggregator ([`ioc`]).
//! 4. The Result Aggregator ([`aggregator`]) assembles everything into one
//!    `ScanResult`.
//!
//! [`scanner::Scanner`] wires all of the above into the single entry point
//! `scanner-cli` drives.

pub mod aggregator;
pub mod error;
pub mod fetcher;
pub mod ioc;
pub mod scanner;
pub mod scheduler;
pub mod target;

pub use aggregator::{PerformanceInputs, ResultAggregator};
pub use error::{PipelineError, Result};
pub use fetcher::{ArtifactFetcher, ExtractedArchive, PackageMetadata};
pub use ioc::{IoCAggregator, IoCRecord};
pub use scanner::Scanner;
pub use scheduler::Scheduler;
pub use target::{TargetMode, TargetResolver, WorkItem, WorkSet};

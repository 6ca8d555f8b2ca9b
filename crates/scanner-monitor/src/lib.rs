//! # Sandboxed Evaluator
//!
//! Simulated-execution analysis of artifact source (spec §4.4), built on
//! three resource primitives shared with nothing outside this crate:
//!
//! - [`gas`] — a computational budget charged per unit of simulated work,
//!   standing in for the memory ceiling.
//! - [`cycle`] — Floyd and Tarjan cycle detection over the sequence of
//!   capability probes an evaluation observes, catching a repeating probe
//!   signature before it would spin forever under real execution.
//! - [`flush`] — a bounded capture buffer of observed capability-acquisition
//!   attempts, hard-stopping rather than silently evicting on overflow.
//!
//! [`evaluator::SandboxedEvaluator`] ties the three together behind the
//! single-call contract the rest of the scanner depends on: bytes and a
//! filename in, `{threats, safe, executionMs}` out.
//!
//! ## Threat Model
//!
//! An artifact's source can attempt to acquire a host capability it has
//! no business needing: reading the filesystem, spawning a process,
//! opening a socket, or generating code at runtime to evade static
//! analysis. The evaluator never grants any of these; it recognizes the
//! attempt and reports it.
//!
//! ## References
//!
//! - Floyd, R. W. (1967). "Nondeterministic Algorithms"
//!   *Journal of the ACM*, 14(4), 636-644.
//! - Tarjan, R. E. (1972). "Depth-first search and linear graph algorithms"
//!   *SIAM Journal on Computing*, 1(2), 146-160.
//! - Ethereum Yellow Paper, Section 9: Execution Model (gas accounting).
//!
//! ## Security Notes
//!
//! - A clean evaluation never overrides a CRITICAL static-analyzer finding.
//! - Scanner-owned files and test files bypass evaluation entirely.

mod cycle;
mod error;
mod evaluator;
mod flush;
mod gas;

pub use cycle::{Cycle, CycleDetector, ExecutionNode};
pub use error::{MonitorError, Result};
pub use evaluator::{EvaluationOutcome, SandboxedEvaluator};
pub use flush::{ContextManager, Frame};
pub use gas::{GasBudget, OperationType};

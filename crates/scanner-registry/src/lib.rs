//! # Multi-Layer Cache and Dependency-Confusion Analyzer
//!
//! Two pieces of the scanner that both deal in metadata rather than artifact
//! bytes, and so live apart from [`scanner_analyzers`](../scanner_analyzers):
//!
//! 1. **Multi-Layer Cache** ([`cache`]) - bounded in-process LRU backed by an
//!    on-disk Sled store, used to avoid re-fetching and re-analyzing packages
//!    the scanner has already seen.
//!
//! 2. **Dependency-Confusion Analyzer** ([`confusion`]) - judges whether a
//!    declared dependency could be hijacked by a public registry, using
//!    timeline, scope, naming and commit-activity signals.
//!
//! [`canonicalize`] underlies both: it derives the stable, key-order-independent
//! cache keys the cache indexes by, via RFC 8785 JSON canonicalization.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     scanner-registry                       │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌───────────────────┐        ┌─────────────────────────┐ │
//! │  │   CANONICALIZER    │        │   DEPENDENCY-CONFUSION  │ │
//! │  │                    │        │        ANALYZER         │ │
//! │  │  RFC 8785 JSON     │        │                          │ │
//! │  │  normalization     │        │  timeline / scope /      │ │
//! │  │  -> cache_key()    │        │  naming / activity       │ │
//! │  └─────────┬──────────┘        └─────────────────────────┘ │
//! │            │                                                │
//! │            ▼                                                │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                    MULTI-LAYER CACHE                   │ │
//! │  │                                                         │ │
//! │  │   L1 (in-process LRU) -> L2 (Sled) -> L3 (flag only)   │ │
//! │  │   promotion on hit, write-through on put                │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## References
//!
//! - **RFC 8785 (2020)** - "JSON Canonicalization Scheme (JCS)".
//!   <https://www.rfc-editor.org/rfc/rfc8785>
//! - **Sled Documentation** - embedded database used for the L2 layer.
//!   <https://sled.rs/>

mod cache;
mod confusion;
mod error;
pub mod canonicalize;
mod storage;

pub use cache::{Cache, CacheEntry, CacheSnapshot};
pub use canonicalize::cache_key;
pub use confusion::{DependencyConfusionAnalyzer, DependencyConfusionInput, RepoHistory};
pub use error::RegistryError;

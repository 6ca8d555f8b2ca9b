//! Errors local to the cache and dependency-confusion analyzer, folded into
//! the shared [`scanner_core::ScanError`] taxonomy at the crate boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cache storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<RegistryError> for scanner_core::ScanError {
    fn from(err: RegistryError) -> Self {
        // Cache failures degrade to a miss at the call site (§4.6); this
        // conversion exists for callers that choose to surface them instead.
        scanner_core::ScanError::Io(err.to_string())
    }
}

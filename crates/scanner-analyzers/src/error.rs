//! Errors local to the Analyzer Suite, folded into the shared
//! [`scanner_core::ScanError`] taxonomy at the crate boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("manifest is not valid JSON: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    #[error("archive digest could not be computed: {0}")]
    DigestUnavailable(String),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

impl From<AnalyzerError> for scanner_core::ScanError {
    fn from(err: AnalyzerError) -> Self {
        scanner_core::ScanError::analyzer("scanner-analyzers", err.to_string())
    }
}
